//! Deforming points with per-bone rigid motions.
//!
//! A posed point is a weighted combination of where each bone's rigid motion
//! would send it. Two ways of combining are supported. Linear blend skinning
//! averages the transformed points. It is cheap, but under twisting the
//! average of two rotations shrinks toward the axis ("candy wrapper").
//! Dual-quaternion skinning blends the motions instead, by repeated screw
//! linear interpolation, and applies the single result.

mod dual_quat;
mod transform;
mod blend;

pub use self::dual_quat::DualQuat;
pub use self::transform::RigidTransform;
pub use self::blend::{BlendMode, blend, blend_linear, blend_dual_quat};

//! Harmonic weight fields by heat diffusion.
//!
//! A bone's weight is the steady-state temperature of the body when the
//! bone's own heat sources are held at 1 and every other bone's at 0. At
//! steady state each free voxel is the average of its face neighbors inside
//! the region of interest, ie. the field solves the discrete Laplace equation
//!
//! ```text
//!     n(v) u(v) - sum_{w ~ v} u(w) = 0
//! ```
//!
//! where n(v) counts the in-domain neighbors (neighbors outside the domain
//! contribute nothing, a zero-flux condition). Fixed voxels move to the
//! right-hand side.
//!
//! Two solvers work on the same description of a problem:
//!
//! * `solve_exact` builds that system on a bounded domain and factors it
//!   (sparse Cholesky).
//! * `Relaxation` does Gauss-Seidel sweeps over a possibly much larger
//!   region, starting from whatever is already in the field.

mod exact;
mod relax;
mod problems;

pub use self::exact::solve_exact;
pub use self::relax::{Relaxation, solve_iteratively};
pub use self::problems::{LocalProblem, GlobalProblem};

use grid::Voxel;

/// Which voxels take part in a diffusion and which of them are held fixed.
/// Voxels outside the grid must report `false` from `in_domain`.
pub trait HeatProblem {
    fn in_domain(&self, v: Voxel) -> bool;
    /// Only asked of voxels in the domain.
    fn is_boundary(&self, v: Voxel) -> bool;
    /// Only asked of boundary voxels.
    fn boundary_value(&self, v: Voxel) -> f32;
}

/// Test problem: everything in a 2D/3D box is in the domain, the box's outer
/// layer is fixed to a given function.
#[cfg(test)]
pub struct BoxProblem<F> {
    pub region: ::grid::Region,
    pub value: F,
}

#[cfg(test)]
impl<F: Fn(Voxel) -> f32> HeatProblem for BoxProblem<F> {
    fn in_domain(&self, v: Voxel) -> bool {
        self.region.contains(v)
    }

    fn is_boundary(&self, v: Voxel) -> bool {
        (0..3).any(|k| {
            self.region.size[k] > 1 &&
                (v[k] == self.region.start[k] ||
                 v[k] == self.region.start[k] + self.region.size[k] as i32 - 1)
        })
    }

    fn boundary_value(&self, v: Voxel) -> f32 {
        (self.value)(v)
    }
}

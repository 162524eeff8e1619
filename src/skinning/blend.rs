use cgmath::{EuclideanSpace, Point3, Vector3};
use errors::{ErrorKind, Result};
use smallvec::SmallVec;
use super::DualQuat;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BlendMode {
    Linear,
    /// Blend at most `max_bones` of the heaviest bones.
    DualQuaternion { max_bones: usize },
}

/// Poses `p` with `weights[i]` of `transforms[i]` for each bone i.
pub fn blend(p: Point3<f64>, weights: &[f32], transforms: &[DualQuat], mode: BlendMode) -> Result<Point3<f64>> {
    match mode {
        BlendMode::Linear => blend_linear(p, weights, transforms),
        BlendMode::DualQuaternion { max_bones } => blend_dual_quat(p, weights, transforms, max_bones),
    }
}

fn weight_sum(weights: &[f32], transforms: &[DualQuat]) -> Result<f64> {
    check!(weights.len() == transforms.len())?;
    let sum = weights.iter().map(|&w| w as f64).sum::<f64>();
    if !(sum > 0.0) {
        bail!(ErrorKind::ZeroWeightSum);
    }
    Ok(sum)
}

pub fn blend_linear(p: Point3<f64>, weights: &[f32], transforms: &[DualQuat]) -> Result<Point3<f64>> {
    let sum = weight_sum(weights, transforms)?;

    let mut acc = Vector3::new(0.0, 0.0, 0.0);
    for (&w, dq) in weights.iter().zip(transforms) {
        if w == 0.0 {
            continue;
        }
        acc += dq.transform_point(p).to_vec() * (w as f64 / sum);
    }
    Ok(Point3::from_vec(acc))
}

pub fn blend_dual_quat(p: Point3<f64>, weights: &[f32], transforms: &[DualQuat], max_bones: usize) -> Result<Point3<f64>> {
    weight_sum(weights, transforms)?;

    // Heaviest bones first; the sort is stable so equal weights keep bone order
    let mut heaviest: SmallVec<[(f64, usize); 8]> = weights.iter()
        .enumerate()
        .filter(|&(_, &w)| w > 0.0)
        .map(|(i, &w)| (w as f64, i))
        .collect();
    heaviest.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(::std::cmp::Ordering::Equal));
    heaviest.truncate(max_bones.max(1));

    let (mut w, first) = match heaviest.first() {
        Some(&x) => x,
        None => bail!(ErrorKind::ZeroWeightSum),
    };
    let mut combined = transforms[first];
    for &(w2, i2) in &heaviest[1..] {
        combined = combined.sclerp(&transforms[i2], w2 / (w + w2));
        w += w2;
    }
    Ok(combined.transform_point(p))
}

#[cfg(test)]
fn close(a: Point3<f64>, b: Point3<f64>) -> bool {
    use cgmath::MetricSpace;
    a.distance(b) < 1e-9
}

#[test]
fn test_zero_weights() {
    let dqs = [DualQuat::identity(), DualQuat::identity()];
    let p = Point3::new(1.0, 2.0, 3.0);
    for &mode in &[BlendMode::Linear, BlendMode::DualQuaternion { max_bones: 4 }] {
        match blend(p, &[0.0, 0.0], &dqs, mode) {
            Err(::errors::Error(ErrorKind::ZeroWeightSum, _)) => (),
            r => panic!("expected ZeroWeightSum, got {:?}", r),
        }
    }
    assert!(blend(p, &[1.0], &dqs, BlendMode::Linear).is_err());
}

#[test]
fn test_blend() {
    use cgmath::{Quaternion, Rad, Rotation3};
    use std::f64::consts::PI;

    let id = DualQuat::identity();
    let shift = DualQuat::from_rotation_translation(Quaternion::new(1.0, 0.0, 0.0, 0.0), Vector3::new(4.0, 0.0, 0.0));
    let p = Point3::new(0.0, 1.0, 0.0);

    // Translations blend the same either way, and weights needn't sum to 1
    let lin = blend(p, &[1.0, 3.0], &[id, shift], BlendMode::Linear).unwrap();
    let dq = blend(p, &[1.0, 3.0], &[id, shift], BlendMode::DualQuaternion { max_bones: 4 }).unwrap();
    assert!(close(lin, Point3::new(3.0, 1.0, 0.0)));
    assert!(close(dq, Point3::new(3.0, 1.0, 0.0)));

    // A half turn twist: linear blend collapses the point onto the axis,
    // dual-quaternion blend rotates it a quarter turn.
    let twist = DualQuat::from_rotation_translation(Quaternion::from_angle_x(Rad(PI)), Vector3::new(0.0, 0.0, 0.0));
    let lin = blend(p, &[0.5, 0.5], &[id, twist], BlendMode::Linear).unwrap();
    let dq = blend(p, &[0.5, 0.5], &[id, twist], BlendMode::DualQuaternion { max_bones: 4 }).unwrap();
    assert!(close(lin, Point3::new(0.0, 0.0, 0.0)));
    assert!(close(dq, Point3::new(0.0, 0.0, 1.0)));

    // Only the heaviest bone survives with max_bones = 1
    let dq = blend(p, &[0.2, 0.7, 0.1], &[twist, shift, id], BlendMode::DualQuaternion { max_bones: 1 }).unwrap();
    assert!(close(dq, Point3::new(4.0, 1.0, 0.0)));
}

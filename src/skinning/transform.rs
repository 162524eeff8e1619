use cgmath::{EuclideanSpace, InnerSpace, Point3, Quaternion, Rotation, Vector3};
use super::DualQuat;

/// Rotation about `center` followed by a translation:
/// `x ↦ R (x - center) + center + translation`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RigidTransform {
    pub rotation: Quaternion<f64>,
    pub translation: Vector3<f64>,
    pub center: Point3<f64>,
}

impl RigidTransform {
    /// `None` if `rotation` has zero length.
    pub fn new(rotation: Quaternion<f64>, translation: Vector3<f64>, center: Point3<f64>) -> Option<RigidTransform> {
        let len = rotation.magnitude();
        if !(len > 1e-12) {
            return None;
        }
        Some(RigidTransform { rotation: rotation / len, translation, center })
    }

    pub fn identity() -> RigidTransform {
        RigidTransform {
            rotation: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            translation: Vector3::new(0.0, 0.0, 0.0),
            center: Point3::origin(),
        }
    }

    pub fn apply(&self, p: Point3<f64>) -> Point3<f64> {
        self.center + self.rotation.rotate_vector(p - self.center) + self.translation
    }

    /// Everything but the rotation about the origin.
    pub fn translation_component(&self) -> Vector3<f64> {
        let c = self.center.to_vec();
        self.rotation.rotate_vector(-c) + c + self.translation
    }

    pub fn to_dual_quat(&self) -> DualQuat {
        DualQuat::from_rotation_translation(self.rotation, self.translation_component())
    }
}

#[test]
fn test() {
    use cgmath::{MetricSpace, Rad, Rotation3};
    let t = RigidTransform::new(
        Quaternion::from_angle_x(Rad(1.1)) * 3.0,
        Vector3::new(-1.0, 0.5, 2.0),
        Point3::new(4.0, 5.0, 6.0),
    ).unwrap();
    let dq = t.to_dual_quat();
    for p in &[Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 5.0, 6.0), Point3::new(-3.0, 8.0, 1.5)] {
        assert!(t.apply(*p).distance(dq.transform_point(*p)) < 1e-9);
    }
    assert_eq!(t.apply(Point3::new(4.0, 5.0, 6.0)), Point3::new(3.0, 5.5, 8.0));

    assert!(RigidTransform::new(Quaternion::new(0.0, 0.0, 0.0, 0.0), Vector3::new(0.0, 0.0, 0.0), Point3::origin()).is_none());
}

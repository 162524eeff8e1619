use cgmath::{InnerSpace, Point3, Quaternion, Rotation, Vector3};
use std::ops::{Mul, Neg};

const EPSILON: f64 = 1e-12;

/// Unit dual quaternion `real + ε dual` encoding a rigid motion.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DualQuat {
    pub real: Quaternion<f64>,
    pub dual: Quaternion<f64>,
}

/// Screw parameters: rotate by `angle` about the line with direction
/// `direction` and moment `moment`, while sliding `pitch` along it.
struct Screw {
    angle: f64,
    pitch: f64,
    direction: Vector3<f64>,
    moment: Vector3<f64>,
}

impl DualQuat {
    pub fn identity() -> DualQuat {
        DualQuat {
            real: Quaternion::new(1.0, 0.0, 0.0, 0.0),
            dual: Quaternion::new(0.0, 0.0, 0.0, 0.0),
        }
    }

    /// Rotate by `rotation` (about the origin), then translate.
    pub fn from_rotation_translation(rotation: Quaternion<f64>, translation: Vector3<f64>) -> DualQuat {
        let real = rotation.normalize();
        let t = Quaternion::from_sv(0.0, translation);
        DualQuat { real, dual: (t * real) * 0.5 }
    }

    pub fn rotation(&self) -> Quaternion<f64> {
        self.real
    }

    pub fn translation(&self) -> Vector3<f64> {
        ((self.dual * 2.0) * self.real.conjugate()).v
    }

    pub fn conjugate(&self) -> DualQuat {
        DualQuat { real: self.real.conjugate(), dual: self.dual.conjugate() }
    }

    /// Rescale to unit length and make the dual part orthogonal to the real part.
    pub fn normalize(&self) -> DualQuat {
        let len = self.real.magnitude();
        let real = self.real / len;
        let dual = self.dual / len;
        let dual = dual - real * real.dot(dual);
        DualQuat { real, dual }
    }

    pub fn transform_point(&self, p: Point3<f64>) -> Point3<f64> {
        let dq = self.normalize();
        dq.real.rotate_point(p) + dq.translation()
    }

    fn to_screw(&self) -> Screw {
        let (wr, vr) = (self.real.s, self.real.v);
        let (wd, vd) = (self.dual.s, self.dual.v);
        let s = vr.magnitude();

        if s < EPSILON {
            // Pure translation
            let t = self.translation();
            let pitch = t.magnitude();
            let direction = if pitch > EPSILON { t / pitch } else { Vector3::unit_z() };
            return Screw { angle: 0.0, pitch, direction, moment: Vector3::new(0.0, 0.0, 0.0) };
        }

        let angle = 2.0 * s.atan2(wr);
        let direction = vr / s;
        let pitch = -2.0 * wd / s;
        let moment = (vd - direction * (0.5 * pitch * wr)) / s;
        Screw { angle, pitch, direction, moment }
    }

    fn from_screw(screw: &Screw) -> DualQuat {
        let (sin, cos) = (0.5 * screw.angle).sin_cos();
        let half_pitch = 0.5 * screw.pitch;
        DualQuat {
            real: Quaternion::from_sv(cos, screw.direction * sin),
            dual: Quaternion::from_sv(
                -half_pitch * sin,
                screw.moment * sin + screw.direction * (half_pitch * cos),
            ),
        }
    }

    /// The motion carried a fraction `t` of the way along its screw.
    pub fn pow(&self, t: f64) -> DualQuat {
        let mut screw = self.normalize().to_screw();
        screw.angle *= t;
        screw.pitch *= t;
        DualQuat::from_screw(&screw)
    }

    /// Screw linear interpolation: `t = 0` gives `self`, `t = 1` gives
    /// `other`, taking the shorter way round.
    pub fn sclerp(&self, other: &DualQuat, t: f64) -> DualQuat {
        let a = self.normalize();
        let mut b = other.normalize();
        if a.real.dot(b.real) < 0.0 {
            b = -b;
        }
        let diff = a.conjugate() * b;
        a * diff.pow(t)
    }
}

impl Mul for DualQuat {
    type Output = DualQuat;

    fn mul(self, rhs: DualQuat) -> DualQuat {
        DualQuat {
            real: self.real * rhs.real,
            dual: self.real * rhs.dual + self.dual * rhs.real,
        }
    }
}

impl Neg for DualQuat {
    type Output = DualQuat;

    fn neg(self) -> DualQuat {
        DualQuat { real: -self.real, dual: -self.dual }
    }
}

#[cfg(test)]
fn assert_close(a: Point3<f64>, b: Point3<f64>) {
    use cgmath::MetricSpace;
    assert!(a.distance(b) < 1e-9, "{:?} != {:?}", a, b);
}

#[test]
fn test_transform() {
    use cgmath::{Rad, Rotation3};
    let r = Quaternion::from_angle_z(Rad(::std::f64::consts::FRAC_PI_2));
    let dq = DualQuat::from_rotation_translation(r, Vector3::new(1.0, 2.0, 3.0));
    assert_close(dq.transform_point(Point3::new(1.0, 0.0, 0.0)), Point3::new(1.0, 3.0, 3.0));
    assert!((dq.translation() - Vector3::new(1.0, 2.0, 3.0)).magnitude() < 1e-12);

    // Composition applies the right factor first
    let shift = DualQuat::from_rotation_translation(Quaternion::new(1.0, 0.0, 0.0, 0.0), Vector3::new(5.0, 0.0, 0.0));
    let both = shift * dq;
    assert_close(both.transform_point(Point3::new(1.0, 0.0, 0.0)), Point3::new(6.0, 3.0, 3.0));

    // -q is the same motion
    assert_close((-dq).transform_point(Point3::new(0.0, 1.0, 0.0)), dq.transform_point(Point3::new(0.0, 1.0, 0.0)));
}

#[test]
fn test_sclerp() {
    use cgmath::{Rad, Rotation3};
    use std::f64::consts::FRAC_PI_2;

    let id = DualQuat::identity();

    // Halfway through a quarter turn is an eighth turn
    let rot = DualQuat::from_rotation_translation(Quaternion::from_angle_z(Rad(FRAC_PI_2)), Vector3::new(0.0, 0.0, 0.0));
    let half = id.sclerp(&rot, 0.5);
    let s = 0.5f64.sqrt();
    assert_close(half.transform_point(Point3::new(1.0, 0.0, 0.0)), Point3::new(s, s, 0.0));

    // Halfway along a translation
    let tr = DualQuat::from_rotation_translation(Quaternion::new(1.0, 0.0, 0.0, 0.0), Vector3::new(2.0, 0.0, 0.0));
    assert_close(id.sclerp(&tr, 0.5).transform_point(Point3::new(0.0, 0.0, 0.0)), Point3::new(1.0, 0.0, 0.0));

    // A turn about an off-origin axis keeps the axis fixed all the way
    let c = Vector3::new(1.0, 1.0, 0.0);
    let r = Quaternion::from_angle_z(Rad(FRAC_PI_2));
    let about_c = DualQuat::from_rotation_translation(r, c - r.rotate_vector(c));
    for &t in &[0.0, 0.25, 0.5, 0.9, 1.0] {
        let m = id.sclerp(&about_c, t);
        assert_close(m.transform_point(Point3::new(1.0, 1.0, 0.0)), Point3::new(1.0, 1.0, 0.0));
        assert_close(m.transform_point(Point3::new(1.0, 1.0, 7.0)), Point3::new(1.0, 1.0, 7.0));
    }
    // and moves other points along the circle
    let m = id.sclerp(&about_c, 0.5);
    assert_close(m.transform_point(Point3::new(2.0, 1.0, 0.0)), Point3::new(1.0 + s, 1.0 + s, 0.0));

    // Endpoints
    assert_close(id.sclerp(&about_c, 1.0).transform_point(Point3::new(2.0, 1.0, 0.0)), Point3::new(1.0, 2.0, 0.0));
    assert_close(rot.sclerp(&tr, 0.0).transform_point(Point3::new(1.0, 0.0, 0.0)), Point3::new(0.0, 1.0, 0.0));
}

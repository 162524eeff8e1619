use cgmath::{Matrix3, Point3, SquareMatrix, Vector3};
use errors::Result;
use super::Voxel;

/// Maps voxel indices to physical space and back: `p = origin + D (s ∘ i)`
/// where D is the direction matrix and s the spacing.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Geometry {
    pub origin: Point3<f64>,
    pub spacing: Vector3<f64>,
    pub direction: Matrix3<f64>,
    inverse_direction: Matrix3<f64>,
}

impl Geometry {
    pub fn new(origin: Point3<f64>, spacing: Vector3<f64>, direction: Matrix3<f64>) -> Result<Geometry> {
        check!(spacing.x > 0.0 && spacing.y > 0.0 && spacing.z > 0.0)?;
        let inverse_direction = match direction.invert() {
            Some(m) => m,
            None => bail!("volume direction matrix is singular"),
        };
        Ok(Geometry { origin, spacing, direction, inverse_direction })
    }

    pub fn identity() -> Geometry {
        Geometry {
            origin: Point3::new(0.0, 0.0, 0.0),
            spacing: Vector3::new(1.0, 1.0, 1.0),
            direction: Matrix3::identity(),
            inverse_direction: Matrix3::identity(),
        }
    }

    pub fn index_to_physical(&self, v: Voxel) -> Point3<f64> {
        self.continuous_index_to_physical(Vector3::new(v[0] as f64, v[1] as f64, v[2] as f64))
    }

    pub fn continuous_index_to_physical(&self, idx: Vector3<f64>) -> Point3<f64> {
        let scaled = Vector3::new(
            idx.x * self.spacing.x,
            idx.y * self.spacing.y,
            idx.z * self.spacing.z,
        );
        self.origin + self.direction * scaled
    }

    pub fn physical_to_continuous_index(&self, p: Point3<f64>) -> Vector3<f64> {
        let local = self.inverse_direction * (p - self.origin);
        Vector3::new(
            local.x / self.spacing.x,
            local.y / self.spacing.y,
            local.z / self.spacing.z,
        )
    }

    /// The same lattice, reindexed so voxel `start` becomes index zero.
    pub fn shifted(&self, start: Voxel) -> Geometry {
        Geometry { origin: self.index_to_physical(start), ..*self }
    }

    /// Nearest voxel index to a physical point. No bounds check.
    pub fn physical_to_nearest_index(&self, p: Point3<f64>) -> Voxel {
        let c = self.physical_to_continuous_index(p);
        [c.x.round() as i32, c.y.round() as i32, c.z.round() as i32]
    }
}

#[test]
fn test() {
    use cgmath::{Matrix3, Rad};
    let direction = Matrix3::from_angle_z(Rad(0.5));
    let geo = Geometry::new(
        Point3::new(1.0, -2.0, 3.0),
        Vector3::new(0.5, 2.0, 1.5),
        direction,
    ).unwrap();
    let p = geo.index_to_physical([3, 4, 5]);
    assert_eq!(geo.physical_to_nearest_index(p), [3, 4, 5]);
    let c = geo.physical_to_continuous_index(p);
    assert!((c - Vector3::new(3.0, 4.0, 5.0)).x.abs() < 1e-9);
    assert!((c - Vector3::new(3.0, 4.0, 5.0)).z.abs() < 1e-9);

    assert!(Geometry::new(Point3::new(0.0, 0.0, 0.0), Vector3::new(1.0, 0.0, 1.0), direction).is_err());
}

#[test]
fn test_shifted() {
    use cgmath::{Matrix3, Rad};
    let geo = Geometry::new(
        Point3::new(1.0, 2.0, 3.0),
        Vector3::new(2.0, 1.0, 0.5),
        Matrix3::from_angle_x(Rad(0.3)),
    ).unwrap();
    let moved = geo.shifted([-4, 2, 7]);
    let p = geo.index_to_physical([-3, 5, 7]);
    assert_eq!(moved.physical_to_nearest_index(p), [1, 3, 0]);
    assert_eq!(moved.spacing, geo.spacing);
    assert_eq!(moved.direction, geo.direction);
}

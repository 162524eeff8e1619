//! Voxel grids.
//!
//! Every volume in the crate (input labels, the body partition, domain masks,
//! weight fields) is a `Grid<T>`: a dense x-fastest array over a `Region`
//! together with the `Geometry` placing it in physical space. The element
//! type is chosen once where a volume is read or created; the algorithms are
//! written against the few traits they need (`Copy`, `PartialOrd`,
//! `Into<f64>`).

mod region;
mod geometry;

pub use self::region::{Voxel, Region, Voxels, NEIGHBORS, CORNERS, offset};
pub use self::geometry::Geometry;

use cgmath::{Point3, Vector3};
use errors::Result;
use std::ops::{Index, IndexMut};

/// Element types of label and scalar volumes: anything that can be compared
/// against the zero "background" value and read as a number.
pub trait Scalar: Copy + Default + PartialEq + Into<f64> {
    fn is_background(self) -> bool {
        self == Self::default()
    }
}

impl<T: Copy + Default + PartialEq + Into<f64>> Scalar for T {}

#[derive(Debug, Clone)]
pub struct Grid<T> {
    region: Region,
    geometry: Geometry,
    data: Vec<T>,
}

impl<T: Clone> Grid<T> {
    pub fn new(region: Region, geometry: Geometry, fill: T) -> Grid<T> {
        Grid { region, geometry, data: vec![fill; region.len()] }
    }

    /// New grid over the same voxels and geometry as `other`.
    pub fn like<U>(other: &Grid<U>, fill: T) -> Grid<T> {
        Grid::new(other.region, other.geometry, fill)
    }

    pub fn fill(&mut self, value: T) {
        for x in self.data.iter_mut() {
            *x = value.clone();
        }
    }
}

impl<T> Grid<T> {
    pub fn from_data(region: Region, geometry: Geometry, data: Vec<T>) -> Result<Grid<T>> {
        if data.len() != region.len() {
            bail!("grid data has {} elements, region needs {}", data.len(), region.len());
        }
        Ok(Grid { region, geometry, data })
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [T] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn contains(&self, v: Voxel) -> bool {
        self.region.contains(v)
    }

    pub fn voxels(&self) -> Voxels {
        self.region.voxels()
    }

    pub fn same_shape<U>(&self, other: &Grid<U>) -> bool {
        self.region == other.region
    }

    /// Nearest voxel to a physical point, if it lies in the grid.
    pub fn physical_to_index(&self, p: Point3<f64>) -> Option<Voxel> {
        let v = self.geometry.physical_to_nearest_index(p);
        if self.region.contains(v) { Some(v) } else { None }
    }

    pub fn index_to_physical(&self, v: Voxel) -> Point3<f64> {
        self.geometry.index_to_physical(v)
    }

    pub fn map<U, F: FnMut(&T) -> U>(&self, f: F) -> Grid<U> {
        Grid {
            region: self.region,
            geometry: self.geometry,
            data: self.data.iter().map(f).collect(),
        }
    }
}

impl<T: Copy> Grid<T> {
    pub fn get(&self, v: Voxel) -> Option<T> {
        self.region.linear_index(v).map(|i| self.data[i])
    }

    /// Sets `v` if it is inside the grid; returns whether it was.
    pub fn set(&mut self, v: Voxel, value: T) -> bool {
        match self.region.linear_index(v) {
            Some(i) => { self.data[i] = value; true }
            None => false,
        }
    }

    /// Value at the voxel nearest to a continuous index.
    pub fn nearest(&self, coord: Vector3<f64>) -> Option<T> {
        self.get([coord.x.round() as i32, coord.y.round() as i32, coord.z.round() as i32])
    }
}

impl<T: Copy + Into<f64>> Grid<T> {
    /// Trilinear interpolation at a continuous index. Every one of the eight
    /// surrounding voxels with a nonzero basis weight must be in the grid.
    pub fn trilinear(&self, coord: Vector3<f64>) -> Option<f64> {
        let base = [coord.x.floor(), coord.y.floor(), coord.z.floor()];
        let frac = [coord.x - base[0], coord.y - base[1], coord.z - base[2]];
        let base = [base[0] as i32, base[1] as i32, base[2] as i32];

        let mut value = 0.0;
        for corner in CORNERS.iter() {
            let w = trilinear_basis(frac, *corner);
            if w == 0.0 {
                continue;
            }
            value += w * self.get(offset(base, *corner))?.into();
        }
        Some(value)
    }
}

/// Basis weight of `corner` of the unit cell for fractional offsets `frac`.
pub fn trilinear_basis(frac: [f64; 3], corner: [i32; 3]) -> f64 {
    (0..3).fold(1.0, |w, k| {
        w * if corner[k] == 0 { 1.0 - frac[k] } else { frac[k] }
    })
}

impl<T> Index<Voxel> for Grid<T> {
    type Output = T;

    fn index(&self, v: Voxel) -> &T {
        match self.region.linear_index(v) {
            Some(i) => &self.data[i],
            None => panic!("voxel {:?} outside grid region {:?}", v, self.region),
        }
    }
}

impl<T> IndexMut<Voxel> for Grid<T> {
    fn index_mut(&mut self, v: Voxel) -> &mut T {
        match self.region.linear_index(v) {
            Some(i) => &mut self.data[i],
            None => panic!("voxel {:?} outside grid region {:?}", v, self.region),
        }
    }
}

#[test]
fn test_trilinear() {
    // 3x3x3 volume with value = 1 + x + 3y + 9z, plus a bump at the center
    // so the field is not globally linear.
    let region = Region::with_size([3, 3, 3]);
    let mut grid = Grid::new(region, Geometry::identity(), 0u16);
    for v in region.voxels() {
        grid[v] = (1 + v[0] + 3 * v[1] + 9 * v[2]) as u16;
    }
    grid[[1, 1, 1]] += 10;

    let value = |v: Voxel| grid[v] as f64;

    let coord = Vector3::new(0.25, 0.5, 0.75);
    let (fx, fy, fz) = (0.25, 0.5, 0.75);
    let expected =
        value([0, 0, 0]) * (1.0 - fx) * (1.0 - fy) * (1.0 - fz) +
        value([1, 0, 0]) * fx * (1.0 - fy) * (1.0 - fz) +
        value([0, 1, 0]) * (1.0 - fx) * fy * (1.0 - fz) +
        value([1, 1, 0]) * fx * fy * (1.0 - fz) +
        value([0, 0, 1]) * (1.0 - fx) * (1.0 - fy) * fz +
        value([1, 0, 1]) * fx * (1.0 - fy) * fz +
        value([0, 1, 1]) * (1.0 - fx) * fy * fz +
        value([1, 1, 1]) * fx * fy * fz;
    let got = grid.trilinear(coord).unwrap();
    assert!((got - expected).abs() < 1e-12);

    // On a voxel it's exact.
    assert_eq!(grid.trilinear(Vector3::new(2.0, 1.0, 0.0)), Some(value([2, 1, 0])));
    assert_eq!(grid.nearest(Vector3::new(1.4, 0.6, 1.51)), Some(grid[[1, 1, 2]]));

    // Needs a corner outside the grid.
    assert_eq!(grid.trilinear(Vector3::new(2.5, 0.0, 0.0)), None);
}

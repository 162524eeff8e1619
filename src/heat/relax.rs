use grid::{Grid, Region, NEIGHBORS, offset};
use super::HeatProblem;

/// Gauss-Seidel relaxation over the free voxels of a problem.
///
/// The free voxels and which of their neighbors are in the domain are found
/// once, so one `Relaxation` can sweep any number of fields over the same
/// region (eg. one per bone).
pub struct Relaxation {
    region: Region,
    /// Linear index of each free voxel, in scan order.
    cells: Vec<u32>,
    /// Bit k set if the voxel's k-th neighbor (see `NEIGHBORS`) is in the domain.
    neighbor_masks: Vec<u8>,
}

impl Relaxation {
    pub fn new<P: HeatProblem + ?Sized>(problem: &P, region: Region) -> Relaxation {
        let mut cells = vec![];
        let mut neighbor_masks = vec![];
        for (idx, v) in region.voxels().enumerate() {
            if !problem.in_domain(v) || problem.is_boundary(v) {
                continue;
            }
            let mut mask = 0u8;
            for (k, d) in NEIGHBORS.iter().enumerate() {
                let q = offset(v, *d);
                if region.contains(q) && problem.in_domain(q) {
                    mask |= 1 << k;
                }
            }
            if mask != 0 {
                cells.push(idx as u32);
                neighbor_masks.push(mask);
            }
        }
        Relaxation { region, cells, neighbor_masks }
    }

    pub fn num_free_voxels(&self) -> usize {
        self.cells.len()
    }

    /// One sweep: every free voxel becomes the average of its in-domain
    /// neighbors. Updated values are seen by the rest of the same sweep.
    pub fn sweep(&self, heat: &mut Grid<f32>) {
        assert_eq!(heat.region(), self.region, "relaxation on a grid of a different shape");

        let sx = self.region.size[0] as isize;
        let sxy = sx * self.region.size[1] as isize;
        let strides = [-1, 1, -sx, sx, -sxy, sxy];

        let data = heat.data_mut();
        for (&cell, &mask) in self.cells.iter().zip(&self.neighbor_masks) {
            let idx = cell as isize;
            let mut sum = 0.0f64;
            let mut count = 0;
            for k in 0..6 {
                if mask & (1 << k) != 0 {
                    sum += data[(idx + strides[k]) as usize] as f64;
                    count += 1;
                }
            }
            data[cell as usize] = (sum / count as f64) as f32;
        }
    }
}

/// Runs `iterations` sweeps of relaxation of `problem` on `heat`. Boundary
/// voxels must already hold their boundary values.
pub fn solve_iteratively<P: HeatProblem + ?Sized>(problem: &P, heat: &mut Grid<f32>, iterations: u32) {
    let relaxation = Relaxation::new(problem, heat.region());
    for _ in 0..iterations {
        relaxation.sweep(heat);
    }
}

#[test]
fn test_reconverge() {
    use grid::{Geometry, Voxel};
    use super::BoxProblem;

    let region = Region::with_size([5, 5, 1]);
    let truth = |v: Voxel| v[0] as f32 / 5.0 + v[1] as f32 / 5.0;
    let problem = BoxProblem { region, value: truth };

    let mut heat = Grid::new(region, Geometry::identity(), 0.0f32);
    for v in region.voxels() {
        heat[v] = if problem.is_boundary(v) { truth(v) } else { -1.0 };
    }
    solve_iteratively(&problem, &mut heat, 1000);
    for v in region.voxels() {
        assert!((heat[v] - truth(v)).abs() < 1e-4, "{:?}: {} != {}", v, heat[v], truth(v));
    }
}

#[test]
fn test_harmonic_is_fixed_point() {
    use grid::{Geometry, Voxel};
    use super::BoxProblem;

    let region = Region::new([-2, 0, 3], [6, 5, 4]);
    let f = |v: Voxel| 0.5 + 0.03 * v[0] as f32 - 0.02 * v[1] as f32 + 0.04 * v[2] as f32;
    let problem = BoxProblem { region, value: f };

    let mut heat = Grid::new(region, Geometry::identity(), 0.0f32);
    for v in region.voxels() {
        heat[v] = f(v);
    }
    let before = heat.clone();
    let relaxation = Relaxation::new(&problem, region);
    assert_eq!(relaxation.num_free_voxels(), 4 * 3 * 2);
    for _ in 0..10 {
        relaxation.sweep(&mut heat);
    }
    for v in region.voxels() {
        assert!((heat[v] - before[v]).abs() < 1e-5);
    }
}

#[test]
fn test_zero_flux() {
    use grid::{Geometry, Voxel};

    // L-shaped domain in a 4x4 grid; the corner (3, 3) is outside it and
    // must neither change nor leak into its neighbors.
    struct L;
    impl HeatProblem for L {
        fn in_domain(&self, v: Voxel) -> bool {
            v[2] == 0 && (0..4).contains(&v[0]) && (0..4).contains(&v[1]) && !(v[0] >= 2 && v[1] >= 2)
        }
        fn is_boundary(&self, v: Voxel) -> bool { v == [0, 0, 0] }
        fn boundary_value(&self, _: Voxel) -> f32 { 1.0 }
    }

    let region = Region::with_size([4, 4, 1]);
    let mut heat = Grid::new(region, Geometry::identity(), 0.0f32);
    heat[[0, 0, 0]] = 1.0;
    heat[[3, 3, 0]] = -1.0;
    solve_iteratively(&L, &mut heat, 500);
    // The only fixed value is 1, so everything connected to it goes to 1
    for v in region.voxels() {
        if L.in_domain(v) {
            assert!((heat[v] - 1.0).abs() < 1e-4);
        }
    }
    assert_eq!(heat[[3, 3, 0]], -1.0);
    assert_eq!(heat[[2, 2, 0]], 0.0);
}

use errors::{ErrorKind, Result};
use grid::{Grid, Voxel, NEIGHBORS, offset};
use nalgebra::DMatrix;
use nalgebra_sparse::{CooMatrix, CscMatrix};
use nalgebra_sparse::factorization::CscCholesky;
use std::collections::VecDeque;
use super::HeatProblem;

const NONE: u32 = !0;

/// Solves `problem` exactly, writing the solution into `heat` for every voxel
/// in the domain (boundary voxels get their boundary value). Voxels outside
/// the domain are not touched. Returns the number of unknowns.
pub fn solve_exact<P: HeatProblem + ?Sized>(problem: &P, heat: &mut Grid<f32>) -> Result<usize> {
    let region = heat.region();

    let mut in_domain = vec![];
    let mut num_boundary = 0;
    for v in region.voxels() {
        if !problem.in_domain(v) {
            continue;
        }
        if problem.is_boundary(v) {
            heat[v] = problem.boundary_value(v);
            num_boundary += 1;
        } else {
            in_domain.push(v);
        }
    }

    let n = in_domain.len();
    if n == 0 {
        return Ok(0);
    }
    if num_boundary == 0 {
        // Only zero-flux conditions; the solution isn't unique
        bail!(ErrorKind::NotPositiveDefinite(n));
    }

    let unknowns = order_unknowns(problem, heat, in_domain);
    let mut column = vec![NONE; region.len()];
    for (i, &v) in unknowns.iter().enumerate() {
        if let Some(idx) = region.linear_index(v) {
            column[idx] = i as u32;
        }
    }

    let mut coo = CooMatrix::new(n, n);
    let mut rhs = vec![0.0f64; n];
    for (row, &v) in unknowns.iter().enumerate() {
        let mut diag = 0.0;
        for d in NEIGHBORS.iter() {
            let q = offset(v, *d);
            if !problem.in_domain(q) {
                continue;
            }
            diag += 1.0;
            if problem.is_boundary(q) {
                rhs[row] += problem.boundary_value(q) as f64;
            } else if let Some(idx) = region.linear_index(q) {
                coo.push(row, column[idx] as usize, -1.0);
            }
        }
        coo.push(row, row, diag);
    }

    let csc = CscMatrix::from(&coo);
    let cholesky = CscCholesky::factor(&csc)
        .map_err(|_| ErrorKind::NotPositiveDefinite(n))?;
    let x = cholesky.solve(&DMatrix::from_column_slice(n, 1, &rhs));

    for (row, &v) in unknowns.iter().enumerate() {
        heat[v] = x[(row, 0)] as f32;
    }
    debug!("exact solve: {} unknowns, {} fixed", n, num_boundary);
    Ok(n)
}

/// Reverse Cuthill-McKee numbering: BFS from a far-away voxel, reversed. On a
/// voxel domain this keeps the factor's fill to about one BFS level per row
/// instead of one grid slice.
fn order_unknowns<P: HeatProblem + ?Sized>(problem: &P, heat: &Grid<f32>, unknowns: Vec<Voxel>) -> Vec<Voxel> {
    let region = heat.region();
    let is_unknown = |q: Voxel| {
        region.contains(q) && problem.in_domain(q) && !problem.is_boundary(q)
    };

    let mut seen = vec![false; region.len()];
    let mut order = Vec::with_capacity(unknowns.len());
    let mut queue = VecDeque::new();

    let mut bfs = |start: Voxel, seen: &mut Vec<bool>, order: &mut Vec<Voxel>| -> Voxel {
        let mut last = start;
        if let Some(idx) = region.linear_index(start) {
            seen[idx] = true;
        }
        queue.push_back(start);
        while let Some(v) = queue.pop_front() {
            order.push(v);
            last = v;
            for d in NEIGHBORS.iter() {
                let q = offset(v, *d);
                if !is_unknown(q) {
                    continue;
                }
                if let Some(idx) = region.linear_index(q) {
                    if !seen[idx] {
                        seen[idx] = true;
                        queue.push_back(q);
                    }
                }
            }
        }
        last
    };

    for &v in &unknowns {
        let idx = match region.linear_index(v) {
            Some(idx) => idx,
            None => continue,
        };
        if seen[idx] {
            continue;
        }
        // Find a far voxel of this component, then number from there
        let mut scratch = vec![];
        let far = bfs(v, &mut seen, &mut scratch);
        for u in &scratch {
            if let Some(i) = region.linear_index(*u) {
                seen[i] = false;
            }
        }
        bfs(far, &mut seen, &mut order);
    }

    order.reverse();
    order
}

#[test]
fn test_bilinear_2d() {
    use grid::{Geometry, Region};
    use super::BoxProblem;

    let region = Region::with_size([64, 64, 1]);
    let truth = |v: Voxel| v[0] as f32 / 64.0 + v[1] as f32 / 64.0;
    let problem = BoxProblem { region, value: truth };

    let mut heat = Grid::new(region, Geometry::identity(), -1.0f32);
    let n = solve_exact(&problem, &mut heat).unwrap();
    assert_eq!(n, 62 * 62);
    for v in region.voxels() {
        assert!((heat[v] - truth(v)).abs() < 1e-4, "{:?}: {} != {}", v, heat[v], truth(v));
    }
}

#[test]
fn test_partial_domain() {
    use grid::{Geometry, Region};

    // 1D rod inside a 3D grid: fixed 0 at one end, 1 at the other. Voxels
    // off the rod aren't touched.
    struct Rod;
    impl HeatProblem for Rod {
        fn in_domain(&self, v: Voxel) -> bool {
            v[1] == 1 && v[2] == 2 && v[0] >= 0 && v[0] <= 10
        }
        fn is_boundary(&self, v: Voxel) -> bool {
            v[0] == 0 || v[0] == 10
        }
        fn boundary_value(&self, v: Voxel) -> f32 {
            if v[0] == 0 { 0.0 } else { 1.0 }
        }
    }

    let mut heat = Grid::new(Region::with_size([11, 3, 4]), Geometry::identity(), -1.0f32);
    assert_eq!(solve_exact(&Rod, &mut heat).unwrap(), 9);
    for x in 0..11 {
        assert!((heat[[x, 1, 2]] - x as f32 / 10.0).abs() < 1e-5);
    }
    assert_eq!(heat[[3, 0, 2]], -1.0);
    assert_eq!(heat[[3, 1, 1]], -1.0);
}

#[test]
fn test_no_boundary() {
    use grid::{Geometry, Region};

    struct Floating;
    impl HeatProblem for Floating {
        fn in_domain(&self, v: Voxel) -> bool { v[0] >= 0 && v[0] < 4 && v[1] == 0 && v[2] == 0 }
        fn is_boundary(&self, _: Voxel) -> bool { false }
        fn boundary_value(&self, _: Voxel) -> f32 { 0.0 }
    }

    let mut heat = Grid::new(Region::with_size([4, 1, 1]), Geometry::identity(), 0.0f32);
    assert!(solve_exact(&Floating, &mut heat).is_err());
}

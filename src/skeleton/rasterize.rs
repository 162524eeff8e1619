//! Turn a bone into the voxels it passes through.

use cgmath::{MetricSpace, Point3};
use grid::{Grid, Voxel};
use super::{BoneIndex, Skeleton};

/// Voxels of `grid` crossed by the segment from `head` to `tail`, in order
/// from head to tail. Empty if either endpoint falls outside the grid.
pub fn rasterize_bone<T>(grid: &Grid<T>, bone: BoneIndex, head: Point3<f64>, tail: Point3<f64>) -> Vec<Voxel> {
    let a = match grid.physical_to_index(head) {
        Some(v) => v,
        None => {
            error!("bone {}: head {:?} is outside the volume", bone, head);
            return vec![];
        }
    };
    let b = match grid.physical_to_index(tail) {
        Some(v) => v,
        None => {
            error!("bone {}: tail {:?} is outside the volume", bone, tail);
            return vec![];
        }
    };

    let length = head.distance(tail);
    let mut voxels = line(a, b);

    // The head voxel always stays. Past that, discretization may carry the
    // walk a little further than the segment really goes.
    if let Some(cut) = voxels.iter().skip(1)
        .position(|&v| head.distance(grid.index_to_physical(v)) > length)
    {
        voxels.truncate(cut + 1);
    }
    voxels
}

/// Rasterizes every bone. A bone that can't be rasterized gets an empty list.
pub fn rasterize_skeleton<T>(grid: &Grid<T>, skel: &Skeleton) -> Vec<Vec<Voxel>> {
    skel.indices()
        .map(|i| {
            let bone = skel.bone(i);
            let voxels = rasterize_bone(grid, i, bone.head, bone.tail);
            debug!("bone {} rasterized to {} voxels", i, voxels.len());
            voxels
        })
        .collect()
}

/// 3D Bresenham line from `a` to `b`, both ends included. Takes exactly one
/// step along the dominant axis per voxel, so the line has
/// `max(|dx|, |dy|, |dz|) + 1` voxels.
fn line(a: Voxel, b: Voxel) -> Vec<Voxel> {
    let delta = [b[0] - a[0], b[1] - a[1], b[2] - a[2]];
    let abs = [delta[0].abs(), delta[1].abs(), delta[2].abs()];
    let step = [delta[0].signum(), delta[1].signum(), delta[2].signum()];

    let drive = (0..3).max_by_key(|&k| (abs[k], -(k as i32))).unwrap_or(0);
    let n = abs[drive];

    let mut err = [0; 3];
    for k in 0..3 {
        err[k] = 2 * abs[k] - n;
    }

    let mut v = a;
    let mut out = Vec::with_capacity(n as usize + 1);
    out.push(v);
    for _ in 0..n {
        for k in 0..3 {
            if k == drive {
                continue;
            }
            if err[k] > 0 {
                v[k] += step[k];
                err[k] -= 2 * n;
            }
            err[k] += 2 * abs[k];
        }
        v[drive] += step[drive];
        out.push(v);
    }
    out
}

#[test]
fn test_line() {
    assert_eq!(line([2, 2, 2], [2, 2, 2]), vec![[2, 2, 2]]);
    assert_eq!(line([0, 0, 0], [3, 0, 0]), vec![[0, 0, 0], [1, 0, 0], [2, 0, 0], [3, 0, 0]]);

    let l = line([0, 0, 0], [-6, 3, 2]);
    assert_eq!(l.len(), 7);
    assert_eq!(l[0], [0, 0, 0]);
    assert_eq!(l[6], [-6, 3, 2]);
    // Successive voxels touch (26-connected)
    for w in l.windows(2) {
        for k in 0..3 {
            assert!((w[1][k] - w[0][k]).abs() <= 1);
        }
    }
}

#[test]
fn test_rasterize() {
    use grid::{Geometry, Region};
    use cgmath::Vector3;

    let geo = Geometry::new(
        Point3::new(0.0, 0.0, 0.0),
        Vector3::new(2.0, 2.0, 2.0),
        ::cgmath::Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0),
    ).unwrap();
    let grid = Grid::new(Region::with_size([10, 10, 10]), geo, 0u8);

    let voxels = rasterize_bone(&grid, 0, Point3::new(2.0, 2.0, 2.0), Point3::new(10.0, 2.0, 2.0));
    assert_eq!(voxels, vec![[1, 1, 1], [2, 1, 1], [3, 1, 1], [4, 1, 1], [5, 1, 1]]);

    // Tail outside the volume
    let voxels = rasterize_bone(&grid, 0, Point3::new(2.0, 2.0, 2.0), Point3::new(50.0, 2.0, 2.0));
    assert!(voxels.is_empty());
}

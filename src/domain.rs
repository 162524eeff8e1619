//! The region each bone's diffusion problem is solved on.
//!
//! Solving on the whole body per bone would mean factoring a matrix with one
//! row per body voxel, for every bone. Instead each bone gets a domain not
//! much bigger than the part of the body it owns, and the exact solve runs
//! there. The domain is either
//!
//! * the bone's partition region, grown a few voxels into voxels no other
//!   bone owns (`DomainPolicy::Expansion`), or
//! * the voxels inside a capsule of the bone's envelope radius around the
//!   segment, plus the bone's partition region (`DomainPolicy::Envelope`).
//!
//! In both cases only the largest connected piece is kept; an island cut off
//! from the bone's heat source would make the system singular.

use cgmath::{InnerSpace, Point3};
use errors::{ErrorKind, Result};
use grid::{Grid, NEIGHBORS, offset};
use skeleton::{Bone, BoneIndex, Label, Skeleton, BACKGROUND, UNKNOWN, bone_label};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DomainPolicy {
    /// Grow the partition region for `distance` BFS steps.
    Expansion { distance: u32 },
    /// Capsule around the bone with its envelope radius.
    Envelope,
}

pub fn compute_bone_domain(
    partition: &Grid<Label>,
    skel: &Skeleton,
    bone: BoneIndex,
    policy: DomainPolicy,
) -> Result<Grid<bool>> {
    let mut domain = match policy {
        DomainPolicy::Expansion { distance } => expand_partition_region(partition, bone, distance)?,
        DomainPolicy::Envelope => envelope_domain(partition, skel.bone(bone), bone)?,
    };

    let (kept, num_removed) = keep_largest_component(&mut domain);
    if kept == 0 {
        bail!(ErrorKind::EmptyDomain(bone));
    }
    if num_removed != 0 {
        debug!("bone {}: removed {} islands from the domain", bone, num_removed);
    }
    debug!("bone {}: domain has {} voxels", bone, kept);
    Ok(domain)
}

/// The bone's partition region grown by up to `distance` face steps.
///
/// Growth only enters voxels that are already this bone's or that no bone
/// reached (`UNKNOWN`, left behind when the partition is capped by
/// `max_partition_distance`). Another bone's region is never entered, nor is
/// any other foreground, so a capped partition still gets weights near its
/// bones without domains overlapping across bone boundaries.
fn expand_partition_region(partition: &Grid<Label>, bone: BoneIndex, distance: u32) -> Result<Grid<bool>> {
    let label = bone_label(bone);
    let mut domain = partition.map(|&l| l == label);

    let (_, sizes) = connected_components(&domain);
    match sizes.len() {
        0 => bail!(ErrorKind::EmptyDomain(bone)),
        1 => (),
        n => bail!(ErrorKind::DisconnectedPartition(bone, n)),
    }

    // Own or unclaimed
    let can_grow_into = |l: Label| l == label || l == UNKNOWN;

    let mut frontier = domain.voxels().filter(|&v| domain[v]).collect::<Vec<_>>();
    for _ in 0..distance {
        let mut next = vec![];
        for &v in &frontier {
            for d in NEIGHBORS.iter() {
                let q = offset(v, *d);
                match partition.get(q) {
                    Some(l) if can_grow_into(l) && !domain[q] => {
                        domain[q] = true;
                        next.push(q);
                    }
                    _ => (),
                }
            }
        }
        if next.is_empty() {
            break;
        }
        frontier = next;
    }

    Ok(domain)
}

fn envelope_domain(partition: &Grid<Label>, bone: &Bone, bone_idx: BoneIndex) -> Result<Grid<bool>> {
    let radius = match bone.radius {
        Some(r) => r,
        None => bail!(ErrorKind::MissingRadius(bone_idx)),
    };
    let label = bone_label(bone_idx);
    let capsule = Capsule::new(bone.head, bone.tail, radius);

    let mut domain = Grid::like(partition, false);
    for v in partition.voxels() {
        let l = partition[v];
        domain[v] = match l {
            BACKGROUND => false,
            _ if l == label => true,
            _ => capsule.contains(partition.index_to_physical(v)),
        };
    }
    Ok(domain)
}

/// Two end spheres joined by a cylinder.
struct Capsule {
    head: Point3<f64>,
    axis: ::cgmath::Vector3<f64>, // unit, or zero for a degenerate bone
    length: f64,
    radius2: f64,
}

impl Capsule {
    fn new(head: Point3<f64>, tail: Point3<f64>, radius: f64) -> Capsule {
        let d = tail - head;
        let length = d.magnitude();
        let axis = if length > 0.0 { d / length } else { d };
        Capsule { head, axis, length, radius2: radius * radius }
    }

    fn contains(&self, p: Point3<f64>) -> bool {
        let rel = p - self.head;
        let tail_rel = rel - self.axis * self.length;
        if rel.magnitude2() <= self.radius2 || tail_rel.magnitude2() <= self.radius2 {
            return true;
        }
        let t = rel.dot(self.axis);
        t >= 0.0 && t <= self.length && rel.magnitude2() - t * t <= self.radius2
    }
}

/// Labels the 6-connected components of `mask`: 0 outside the mask, k + 1
/// for the k-th component found in scan order. Also returns their sizes.
pub fn connected_components(mask: &Grid<bool>) -> (Grid<u32>, Vec<usize>) {
    let mut comp = Grid::like(mask, 0u32);
    let mut sizes = vec![];
    let mut stack = vec![];

    for start in mask.voxels() {
        if !mask[start] || comp[start] != 0 {
            continue;
        }
        let id = sizes.len() as u32 + 1;
        let mut size = 0;
        comp[start] = id;
        stack.push(start);
        while let Some(v) = stack.pop() {
            size += 1;
            for d in NEIGHBORS.iter() {
                let q = offset(v, *d);
                if mask.get(q) == Some(true) && comp[q] == 0 {
                    comp[q] = id;
                    stack.push(q);
                }
            }
        }
        sizes.push(size);
    }

    (comp, sizes)
}

/// Clears every component of `mask` but the biggest (the first found, on a
/// tie). Returns the size kept and the number of components removed.
pub fn keep_largest_component(mask: &mut Grid<bool>) -> (usize, usize) {
    let (comp, sizes) = connected_components(mask);
    let largest = match sizes.iter().enumerate().max_by_key(|&(i, &s)| (s, -(i as i64))) {
        Some((i, &size)) => (i as u32 + 1, size),
        None => return (0, 0),
    };
    for (m, &c) in mask.data_mut().iter_mut().zip(comp.data()) {
        *m = c == largest.0;
    }
    (largest.1, sizes.len() - 1)
}

#[cfg(test)]
fn partition_from_rows(rows: &[&str]) -> Grid<Label> {
    use grid::{Geometry, Region};
    // One char per voxel: '.' background, '?' unknown, digit = bone
    let region = Region::with_size([rows[0].len() as u32, rows.len() as u32, 1]);
    let mut grid = Grid::new(region, Geometry::identity(), BACKGROUND);
    for (y, row) in rows.iter().enumerate() {
        for (x, c) in row.chars().enumerate() {
            grid[[x as i32, y as i32, 0]] = match c {
                '.' => BACKGROUND,
                '?' => UNKNOWN,
                d => bone_label(d.to_digit(10).unwrap() as BoneIndex),
            };
        }
    }
    grid
}

#[cfg(test)]
fn two_bones() -> Skeleton {
    use skeleton::test_bone;
    let mut bones = vec![
        test_bone([1.0, 1.0, 0.0], [4.0, 1.0, 0.0], None),
        test_bone([5.0, 1.0, 0.0], [9.0, 1.0, 0.0], Some(0)),
    ];
    bones[1].radius = Some(1.5);
    Skeleton::new(bones).unwrap()
}

#[test]
fn test_expansion() {
    let part = partition_from_rows(&[
        "000??11111",
        "000??11111",
        "..0.....??",
        "..0.....??",
    ]);
    let skel = two_bones();

    for distance in 0..4 {
        let domain = compute_bone_domain(&part, &skel, 0, DomainPolicy::Expansion { distance }).unwrap();
        for v in part.voxels() {
            if part[v] == bone_label(0) {
                assert!(domain[v]);
            }
            if domain[v] {
                assert!(part[v] == bone_label(0) || part[v] == UNKNOWN);
            }
        }
    }

    let domain = compute_bone_domain(&part, &skel, 0, DomainPolicy::Expansion { distance: 1 }).unwrap();
    assert!(domain[[3, 0, 0]]);
    assert!(!domain[[4, 0, 0]]);
    let domain = compute_bone_domain(&part, &skel, 0, DomainPolicy::Expansion { distance: 2 }).unwrap();
    assert!(domain[[4, 1, 0]]);
    // The unknown voxels at the right are only reachable through bone 1
    assert!(!domain[[9, 3, 0]]);
}

#[test]
fn test_disconnected_partition() {
    let part = partition_from_rows(&[
        "00.11",
        "...00",
    ]);
    let skel = two_bones();
    match compute_bone_domain(&part, &skel, 0, DomainPolicy::Expansion { distance: 2 }) {
        Err(::errors::Error(ErrorKind::DisconnectedPartition(0, 2), _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }
    // Bone 1 is fine
    assert!(compute_bone_domain(&part, &skel, 1, DomainPolicy::Expansion { distance: 2 }).is_ok());
}

#[test]
fn test_envelope() {
    let part = partition_from_rows(&[
        "0000011111??",
        "0000011111??",
        "0000011111??",
        "000001111...",
        "00000000000.",
        "1...........",
    ]);
    let skel = two_bones();

    // Bone 0 has no radius
    match compute_bone_domain(&part, &skel, 0, DomainPolicy::Envelope) {
        Err(::errors::Error(ErrorKind::MissingRadius(0), _)) => (),
        r => panic!("unexpected {:?}", r.map(|_| ())),
    }

    // Bone 1 runs from (5, 1) to (9, 1) with radius 1.5
    let domain = compute_bone_domain(&part, &skel, 1, DomainPolicy::Envelope).unwrap();
    assert!(domain[[4, 1, 0]]);   // head cap, owned by bone 0
    assert!(!domain[[3, 1, 0]]);
    assert!(domain[[10, 1, 0]]);  // tail cap, unknown
    assert!(!domain[[11, 1, 0]]);
    assert!(domain[[7, 2, 0]]);
    assert!(domain[[7, 3, 0]]);   // owned, outside the capsule
    assert!(!domain[[7, 4, 0]]);  // owned by bone 0, outside the capsule
    assert!(!domain[[9, 3, 0]]);  // background
    // Owned by bone 1 but an island; removed
    assert!(!domain[[0, 5, 0]]);
}

#[test]
fn test_keep_largest_component() {
    let part = partition_from_rows(&[
        "11.1111.1",
        "...1.....",
        "11.......",
    ]);
    let mut mask = part.map(|&l| l == bone_label(1));
    assert_eq!(connected_components(&mask).1, vec![2, 5, 1, 2]);
    assert_eq!(keep_largest_component(&mut mask), (5, 3));
    assert_eq!(mask.data().iter().filter(|&&b| b).count(), 5);
    assert!(mask[[3, 1, 0]]);
    assert!(!mask[[0, 0, 0]]);
}

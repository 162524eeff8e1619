//! Splitting the body between the bones.
//!
//! Every interior voxel goes to the bone whose rasterized voxels are fewest
//! face-steps away. This is a multi-source BFS: all bones' seed voxels make
//! up the first frontier and each round claims the still-unknown neighbors
//! of the previous round's voxels. Within a round the frontier is walked in
//! ascending label order, so a voxel at equal distance from two bones goes
//! to the one with the lower index.
//!
//! The partition also decides where the heat sources of the diffusion are,
//! see `compute_source_map`.

use grid::{Grid, Scalar, Voxel, NEIGHBORS, offset};
use skeleton::{BoneIndex, Label, BACKGROUND, UNKNOWN, bone_label, label_bone};

/// Labels each interior voxel of `body` (any non-zero value) with its nearest
/// bone. `seeds[b]` are the rasterized voxels of bone b. BFS stops after
/// `max_distance` rounds if given; unreached interior voxels stay `UNKNOWN`.
pub fn compute_body_partition<T: Scalar>(
    body: &Grid<T>,
    seeds: &[Vec<Voxel>],
    max_distance: Option<u32>,
) -> Grid<Label> {
    let mut part = Grid::like(body, BACKGROUND);

    let mut frontier = vec![];
    let mut num_outside = 0;
    for (bone, voxels) in seeds.iter().enumerate() {
        let label = bone_label(bone as BoneIndex);
        for &v in voxels {
            match body.get(v) {
                Some(x) if !x.is_background() => {
                    // First writer wins
                    if part[v] == BACKGROUND {
                        part[v] = label;
                        frontier.push(v);
                    }
                }
                _ => num_outside += 1,
            }
        }
    }
    if num_outside != 0 {
        warn!("{} skeleton voxels are outside the body and were not used as seeds", num_outside);
    }
    debug!("partition: {} seed voxels", frontier.len());

    for (p, &b) in part.data_mut().iter_mut().zip(body.data()) {
        if *p == BACKGROUND && !b.is_background() {
            *p = UNKNOWN;
        }
    }

    let mut rounds = 0;
    while !frontier.is_empty() {
        if let Some(max) = max_distance {
            if rounds >= max {
                break;
            }
        }
        frontier.sort_by_key(|&v| part[v]);

        let mut next = vec![];
        for &v in &frontier {
            let label = part[v];
            for d in NEIGHBORS.iter() {
                let q = offset(v, *d);
                if part.get(q) == Some(UNKNOWN) {
                    part[q] = label;
                    next.push(q);
                }
            }
        }
        frontier = next;
        rounds += 1;
    }
    debug!("partition: {} BFS rounds", rounds);

    let num_unknown = part.data().iter().filter(|&&l| l == UNKNOWN).count();
    if num_unknown != 0 {
        warn!("{} interior voxels were not reached by any bone", num_unknown);
    }

    part
}

/// Where the heat of the diffusion comes from.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeatSources {
    /// Body voxels whose input label is at least `min_label`.
    BoneTissue { min_label: u16 },
    /// The rasterized skeleton itself.
    Skeleton,
}

/// Labels every heat-source voxel with the bone that owns it in `partition`.
/// All other voxels are `BACKGROUND`. A bone with no source voxel of its own
/// falls back to its skeleton seeds.
pub fn compute_source_map<T: Scalar>(
    body: &Grid<T>,
    partition: &Grid<Label>,
    seeds: &[Vec<Voxel>],
    sources: HeatSources,
) -> Grid<Label> {
    let mut map = Grid::like(partition, BACKGROUND);
    let mut counts = vec![0usize; seeds.len()];

    if let HeatSources::BoneTissue { min_label } = sources {
        let min_label = min_label as f64;
        for ((m, &b), &p) in map.data_mut().iter_mut().zip(body.data()).zip(partition.data()) {
            if let Some(bone) = label_bone(p) {
                if b.into() >= min_label {
                    *m = p;
                    if let Some(c) = counts.get_mut(bone as usize) {
                        *c += 1;
                    }
                }
            }
        }
    }

    for (bone, voxels) in seeds.iter().enumerate() {
        if counts[bone] != 0 {
            continue;
        }
        if sources != HeatSources::Skeleton {
            warn!("bone {}: no bone tissue in its region, using its skeleton voxels as heat source", bone);
        }
        let label = bone_label(bone as BoneIndex);
        for &v in voxels {
            if partition.get(v) == Some(label) {
                map[v] = label;
                counts[bone] += 1;
            }
        }
    }

    map
}

#[cfg(test)]
fn bfs_distances(body: &Grid<u8>, seeds: &[Voxel]) -> Grid<Option<u32>> {
    let mut dist = Grid::like(body, None);
    let mut frontier = vec![];
    for &s in seeds {
        if body.get(s).map(|x| x != 0) == Some(true) && dist[s].is_none() {
            dist[s] = Some(0);
            frontier.push(s);
        }
    }
    let mut d = 0;
    while !frontier.is_empty() {
        d += 1;
        let mut next = vec![];
        for &v in &frontier {
            for n in NEIGHBORS.iter() {
                let q = offset(v, *n);
                if body.get(q).map(|x| x != 0) == Some(true) && dist[q].is_none() {
                    dist[q] = Some(d);
                    next.push(q);
                }
            }
        }
        frontier = next;
    }
    dist
}

#[cfg(test)]
fn u_shaped_body() -> Grid<u8> {
    use grid::{Geometry, Region};
    // 12x9x2 slab with a wall down the middle that's open at the bottom, so
    // some voxels near the wall are far from the bone on the other side.
    let region = Region::with_size([12, 9, 2]);
    let mut body = Grid::new(region, Geometry::identity(), 1u8);
    for y in 0..7 {
        for z in 0..2 {
            body[[6, y, z]] = 0;
        }
    }
    body
}

#[test]
fn test_nearest_bone() {
    let body = u_shaped_body();
    let seeds = vec![
        vec![[2, 1, 0], [2, 2, 0], [2, 3, 0]],
        vec![[9, 1, 1], [9, 2, 1]],
        vec![[5, 8, 0]],
    ];
    let part = compute_body_partition(&body, &seeds, None);

    let dists = seeds.iter().map(|s| bfs_distances(&body, s)).collect::<Vec<_>>();
    for v in body.voxels() {
        if body[v] == 0 {
            assert_eq!(part[v], BACKGROUND);
            continue;
        }
        let owner = label_bone(part[v]).expect("every interior voxel is reachable") as usize;
        let d_owner = dists[owner][v].unwrap();
        for (b, d) in dists.iter().enumerate() {
            if let Some(d_other) = d[v] {
                assert!(d_owner <= d_other, "voxel {:?}: owner {} at {}, bone {} at {}", v, owner, d_owner, b, d_other);
                // Ties go to the lower index
                if d_owner == d_other {
                    assert!(owner <= b);
                }
            }
        }
    }
}

#[test]
fn test_seeding() {
    let body = u_shaped_body();
    // Bone 1 overlaps bone 0 at [3, 3, 0]; [6, 3, 0] is in the wall
    let seeds = vec![
        vec![[3, 3, 0]],
        vec![[3, 3, 0], [6, 3, 0], [4, 3, 0]],
    ];
    let part = compute_body_partition(&body, &seeds, Some(0));
    assert_eq!(part[[3, 3, 0]], bone_label(0));
    assert_eq!(part[[4, 3, 0]], bone_label(1));
    assert_eq!(part[[6, 3, 0]], BACKGROUND);
    // BFS never ran
    assert_eq!(part[[0, 0, 0]], UNKNOWN);

    let part = compute_body_partition(&body, &seeds, Some(1));
    assert_eq!(part[[2, 3, 0]], bone_label(0));
    assert_eq!(part[[5, 3, 0]], bone_label(1));
    assert_eq!(part[[1, 3, 0]], UNKNOWN);
}

#[test]
fn test_source_map() {
    let mut body = u_shaped_body();
    // Some bone tissue around bone 0's seeds only
    body[[1, 2, 0]] = 250;
    body[[2, 2, 1]] = 210;
    let seeds = vec![vec![[2, 2, 0]], vec![[9, 2, 0], [9, 3, 0]]];
    let part = compute_body_partition(&body, &seeds, None);

    let map = compute_source_map(&body, &part, &seeds, HeatSources::BoneTissue { min_label: 209 });
    assert_eq!(map[[1, 2, 0]], bone_label(0));
    assert_eq!(map[[2, 2, 1]], bone_label(0));
    assert_eq!(map[[2, 2, 0]], BACKGROUND);
    // Bone 1 fell back to its skeleton
    assert_eq!(map[[9, 2, 0]], bone_label(1));
    assert_eq!(map[[9, 3, 0]], bone_label(1));
    assert_eq!(map.data().iter().filter(|&&l| l != BACKGROUND).count(), 4);

    let map = compute_source_map(&body, &part, &seeds, HeatSources::Skeleton);
    assert_eq!(map[[1, 2, 0]], BACKGROUND);
    assert_eq!(map[[2, 2, 0]], bone_label(0));
    assert_eq!(map.data().iter().filter(|&&l| l != BACKGROUND).count(), 3);
}

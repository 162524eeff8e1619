//! Moving things with the weights: points, and whole label volumes.

use cgmath::{Point3, Vector3};
use errors::{ErrorKind, Result};
use grid::{Geometry, Grid, Region, Scalar, Voxel};
use skeleton::Skeleton;
use skinning::{BlendMode, DualQuat, RigidTransform, blend};
use weights::WeightMap;

/// Poses points of the space a `WeightMap` was computed in.
pub struct Poser<'a> {
    map: &'a WeightMap,
    geometry: Geometry,
    transforms: Vec<DualQuat>,
    mode: BlendMode,
}

impl<'a> Poser<'a> {
    /// `poses[b]` is bone b's rigid motion. `geometry` places the weight
    /// map's voxels in space.
    pub fn new(map: &'a WeightMap, geometry: Geometry, poses: &[RigidTransform], mode: BlendMode) -> Poser<'a> {
        Poser {
            map,
            geometry,
            transforms: poses.iter().map(|t| t.to_dual_quat()).collect(),
            mode,
        }
    }

    pub fn num_bones(&self) -> usize {
        self.transforms.len()
    }

    /// Where `p` goes. `scratch` must hold two weights per bone.
    pub fn pose_point_with(&self, p: Point3<f64>, scratch: &mut [f32]) -> Result<Point3<f64>> {
        let coord = self.geometry.physical_to_continuous_index(p);
        let (weights, corner_weights) = scratch.split_at_mut(self.num_bones());
        if !self.map.lerp(coord, weights, corner_weights) {
            bail!(ErrorKind::ZeroWeightSum);
        }
        blend(p, weights, &self.transforms, self.mode)
    }

    pub fn pose_point(&self, p: Point3<f64>) -> Result<Point3<f64>> {
        let mut scratch = vec![0.0; 2 * self.num_bones()];
        self.pose_point_with(p, &mut scratch)
    }

    /// Poses each point; `None` for those with no usable weights.
    pub fn pose_points(&self, points: &[Point3<f64>]) -> Vec<Option<Point3<f64>>> {
        let mut scratch = vec![0.0; 2 * self.num_bones()];
        let posed = points.iter()
            .map(|&p| self.pose_point_with(p, &mut scratch).ok())
            .collect::<Vec<_>>();
        let num_failed = posed.iter().filter(|p| p.is_none()).count();
        if num_failed != 0 {
            warn!("{} of {} points have no weights and were not posed", num_failed, points.len());
        }
        posed
    }
}

/// Room left around the posed skeleton when no bone has an envelope radius.
pub const DEFAULT_POSE_PADDING: f64 = 10.0;

/// The voxels of `geometry`'s lattice covering the posed skeleton, padded
/// on every side by the largest envelope radius. The start may be negative:
/// posing can move a body out of the box it was scanned in.
pub fn posed_region(geometry: &Geometry, skel: &Skeleton, poses: &[RigidTransform]) -> Region {
    let padding = skel.bones().iter()
        .filter_map(|bone| bone.radius)
        .fold(None, |max: Option<f64>, r| Some(max.map_or(r, |m| m.max(r))))
        .unwrap_or(DEFAULT_POSE_PADDING);

    let mut lo = [f64::INFINITY; 3];
    let mut hi = [f64::NEG_INFINITY; 3];
    for (bone, pose) in skel.bones().iter().zip(poses) {
        for &p in &[bone.head, bone.tail] {
            let c = geometry.physical_to_continuous_index(pose.apply(p));
            for k in 0..3 {
                lo[k] = lo[k].min(c[k]);
                hi[k] = hi[k].max(c[k]);
            }
        }
    }
    if lo[0] > hi[0] {
        return Region::with_size([0, 0, 0]);
    }

    let mut start = [0; 3];
    let mut size = [0; 3];
    for k in 0..3 {
        let pad = padding / geometry.spacing[k];
        let first = (lo[k] - pad).floor() as i32;
        let last = (hi[k] + pad).ceil() as i32;
        start[k] = first;
        size[k] = (last - first + 1) as u32;
    }
    Region::new(start, size)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoseStats {
    pub posed: usize,
    /// No usable weights at the voxel.
    pub failed: usize,
    /// Posed outside the output volume.
    pub outside: usize,
    /// Empty output voxels filled by splatting.
    pub filled: usize,
    /// Voxels whose neighbourhood was still spread over more than one output
    /// voxel at the largest splat radius.
    pub unsettled: usize,
}

/// Moves every foreground voxel of `labels` to where `poser` sends its
/// center. The output covers `region` of the input lattice (see
/// `posed_region`), reindexed to start at zero, and starts as background.
/// When two voxels land on the same spot the later one (in scan order)
/// wins.
///
/// A rotation or stretch spreads neighbouring voxels apart and leaves holes,
/// so each voxel also splats sub-voxel samples of itself into still-empty
/// output voxels. The sampling is refined by doubling the radius, up to
/// `max_splat_radius`, until neighbouring samples land at most one voxel
/// apart. A radius of zero turns splatting off.
pub fn pose_label_volume<T: Scalar>(
    labels: &Grid<T>,
    poser: &Poser,
    region: Region,
    max_splat_radius: u32,
) -> (Grid<T>, PoseStats) {
    let geometry = labels.geometry().shifted(region.start);
    let mut out = Grid::new(Region::with_size(region.size), geometry, T::default());
    let mut stats = PoseStats::default();
    let mut scratch = vec![0.0; 2 * poser.num_bones()];

    for v in labels.voxels() {
        let label = labels[v];
        if label.is_background() {
            continue;
        }
        let q = match poser.pose_point_with(labels.index_to_physical(v), &mut scratch) {
            Ok(p) => match out.physical_to_index(p) {
                Some(q) => q,
                None => {
                    stats.outside += 1;
                    continue;
                }
            },
            Err(_) => {
                stats.failed += 1;
                continue;
            }
        };
        out[q] = label;
        stats.posed += 1;

        let (filled, settled) = splat(labels, poser, &mut out, v, q, max_splat_radius, &mut scratch);
        stats.filled += filled;
        if !settled {
            stats.unsettled += 1;
        }
    }

    if stats.failed != 0 {
        warn!("{} voxels have no weights and were left out", stats.failed);
    }
    if stats.outside != 0 {
        warn!("{} voxels were posed outside the volume", stats.outside);
    }
    if stats.unsettled != 0 {
        warn!("{} voxels still spread apart at splat radius {}", stats.unsettled, max_splat_radius);
    }
    info!("posed {} voxels, {} more filled by splatting", stats.posed, stats.filled);
    (out, stats)
}

/// Samples this far from a voxel's center stay inside its cell, so an
/// unmoved voxel splats only onto itself.
const HALF_CELL: f64 = 0.4995;

/// Splats sub-voxel samples of voxel `v`, which was posed onto `q`, into
/// empty voxels of `out`. At radius r the samples sit `HALF_CELL / r` apart;
/// those already taken at r/2 are skipped. Returns how many voxels were
/// filled and whether the samples settled within one voxel of each other.
fn splat<T: Scalar>(
    labels: &Grid<T>,
    poser: &Poser,
    out: &mut Grid<T>,
    v: Voxel,
    q: Voxel,
    max_radius: u32,
    scratch: &mut [f32],
) -> (usize, bool) {
    let label = labels[v];
    let center = Vector3::new(v[0] as f64, v[1] as f64, v[2] as f64);
    let mut filled = 0;
    let mut spread = 0;
    let mut radius = 1;

    while radius <= max_radius {
        let step = HALF_CELL / radius as f64;
        let r = radius as i32;
        spread = 0;
        for d in Region::new([-r, -r, -r], [2 * radius + 1; 3]).voxels() {
            if d.iter().all(|&x| x % 2 == 0) {
                continue;
            }
            let idx = center + Vector3::new(d[0] as f64, d[1] as f64, d[2] as f64) * step;
            let p = match poser.pose_point_with(labels.geometry().continuous_index_to_physical(idx), scratch) {
                Ok(p) => p,
                Err(_) => continue,
            };
            let n = match out.physical_to_index(p) {
                Some(n) => n,
                None => continue,
            };
            let dist = (0..3).map(|k| (n[k] - q[k]).abs() as u32 / radius).max().unwrap_or(0);
            spread = spread.max(dist);
            if out[n].is_background() {
                out[n] = label;
                filled += 1;
            }
        }
        if spread <= 1 {
            break;
        }
        radius *= 2;
    }
    (filled, spread <= 1)
}

#[cfg(test)]
fn two_halves() -> (Grid<u8>, WeightMap, Skeleton) {
    use skeleton::test_bone;

    // 8x4x4 volume; bone 0 owns x < 4, bone 1 owns x >= 4
    let region = Region::with_size([8, 4, 4]);
    let mut labels = Grid::new(region, Geometry::identity(), 1u8);
    labels[[0, 0, 0]] = 0;
    let body = region.voxels().filter(|&v| labels[v] != 0).collect::<Vec<_>>();
    let mut map = WeightMap::new(&body, region);
    for &v in &body {
        map.insert(v, if v[0] < 4 { 0 } else { 1 }, 1.0);
    }
    let skel = Skeleton::new(vec![
        test_bone([0.0, 1.5, 1.5], [3.0, 1.5, 1.5], None),
        test_bone([4.0, 1.5, 1.5], [7.0, 1.5, 1.5], Some(0)),
    ]).unwrap();
    (labels, map, skel)
}

#[test]
fn test_posed_region() {
    let (_, _, mut skel) = two_halves();
    let shift = RigidTransform::new(
        ::cgmath::Quaternion::new(1.0, 0.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 0.0),
    ).unwrap();
    let poses = [RigidTransform::identity(), shift];

    // Posed bones span (0, 1.5, 1.5)..(7, 2.5, 1.5), padded by 10
    let region = posed_region(&Geometry::identity(), &skel, &poses);
    assert_eq!(region, Region::new([-10, -9, -9], [28, 23, 22]));

    // Envelope radii replace the default padding
    let mut bones = skel.bones().to_vec();
    bones[0].radius = Some(1.0);
    bones[1].radius = Some(2.0);
    skel = Skeleton::new(bones).unwrap();
    let region = posed_region(&Geometry::identity(), &skel, &poses);
    assert_eq!(region, Region::new([-2, -1, -1], [12, 7, 6]));

    // Coarser spacing needs fewer voxels of padding
    let geo = Geometry::new(
        Point3::new(0.0, 0.0, 0.0),
        Vector3::new(2.0, 1.0, 1.0),
        Geometry::identity().direction,
    ).unwrap();
    let region = posed_region(&geo, &skel, &poses);
    assert_eq!(region.start, [-1, -1, -1]);
    assert_eq!(region.size[0], 7);
}

#[test]
fn test_pose_label_volume() {
    use cgmath::Quaternion;

    let (labels, map, skel) = two_halves();
    let still = RigidTransform::identity();
    let shift = RigidTransform::new(
        Quaternion::new(1.0, 0.0, 0.0, 0.0),
        Vector3::new(0.0, 1.0, 0.0),
        Point3::new(0.0, 0.0, 0.0),
    ).unwrap();
    let poses = [still, shift];
    let poser = Poser::new(&map, Geometry::identity(), &poses, BlendMode::DualQuaternion { max_bones: 4 });

    let region = posed_region(labels.geometry(), &skel, &poses);
    let (posed, stats) = pose_label_volume(&labels, &poser, region, 64);
    assert_eq!(posed.region(), Region::with_size(region.size));
    assert_eq!(posed.geometry().origin, Point3::new(-10.0, -9.0, -9.0));

    // Bone 1's half moves up a row, past the edge of the input volume, and
    // nothing is lost
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.outside, 0);
    assert_eq!(stats.posed, 8 * 4 * 4 - 1);
    let at = |x: f64, y: f64, z: f64| posed[posed.physical_to_index(Point3::new(x, y, z)).unwrap()];
    assert_eq!(at(0.0, 0.0, 0.0), 0);
    assert_eq!(at(1.0, 0.0, 0.0), 1);
    assert_eq!(at(2.0, 3.0, 3.0), 1);
    assert_eq!(at(2.0, 4.0, 3.0), 0);
    assert_eq!(at(6.0, 0.0, 2.0), 0);
    assert_eq!(at(6.0, 1.0, 2.0), 1);
    assert_eq!(at(6.0, 4.0, 2.0), 1);
    assert_eq!(at(6.0, 5.0, 2.0), 0);
    // An unmoved voxel splats only onto itself
    assert_eq!(at(1.0, 0.0, 4.0), 0);
    assert_eq!(at(-1.0, 2.0, 2.0), 0);
}

#[test]
fn test_rotation_fills_holes() {
    use cgmath::{Deg, Quaternion, Rotation, Rotation3};
    use skeleton::test_bone;

    // A 20x20x3 slab turned 45 degrees about z around its center
    let region = Region::with_size([20, 20, 3]);
    let labels = Grid::new(region, Geometry::identity(), 3u8);
    let body = region.voxels().collect::<Vec<_>>();
    let mut map = WeightMap::new(&body, region);
    for &v in &body {
        map.insert(v, 0, 1.0);
    }
    let skel = Skeleton::new(vec![test_bone([2.0, 9.5, 1.0], [17.0, 9.5, 1.0], None)]).unwrap();
    let center = Point3::new(9.5, 9.5, 1.0);
    let turn = RigidTransform::new(
        Quaternion::from_angle_z(Deg(45.0)),
        Vector3::new(0.0, 0.0, 0.0),
        center,
    ).unwrap();
    let poser = Poser::new(&map, Geometry::identity(), &[turn], BlendMode::DualQuaternion { max_bones: 4 });
    let out_region = posed_region(labels.geometry(), &skel, &[turn]);
    let unturn = Quaternion::from_angle_z(Deg(-45.0));

    // (voxels well inside the turned slab, how many of them are empty,
    //  how many voxels well outside it are set)
    let count = |posed: &Grid<u8>| {
        let mut interior = 0;
        let mut holes = 0;
        let mut strays = 0;
        for q in posed.voxels() {
            let p = center + unturn.rotate_vector(posed.index_to_physical(q) - center);
            let inside = |lo: f64, hi: f64| p.x >= lo && p.x <= hi && p.y >= lo && p.y <= hi;
            let in_slab = p.z > -0.5 && p.z < 2.5;
            if in_slab && inside(1.0, 18.0) {
                interior += 1;
                if posed[q] == 0 {
                    holes += 1;
                }
            } else if (!in_slab || !inside(-2.0, 21.0)) && posed[q] != 0 {
                strays += 1;
            }
        }
        (interior, holes, strays)
    };

    // Scattering voxel centers alone leaves holes
    let (posed, stats) = pose_label_volume(&labels, &poser, out_region, 0);
    assert_eq!(stats.posed, 20 * 20 * 3);
    assert_eq!(stats.outside, 0);
    assert_eq!(stats.filled, 0);
    let (interior, holes, _) = count(&posed);
    assert!(interior > 0);
    assert!(holes > 0);

    let (posed, stats) = pose_label_volume(&labels, &poser, out_region, 64);
    assert_eq!(stats.posed, 20 * 20 * 3);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.outside, 0);
    assert_eq!(stats.unsettled, 0);
    assert!(stats.filled > 0);
    let (_, holes, strays) = count(&posed);
    assert_eq!(holes, 0);
    assert_eq!(strays, 0);
}

#[test]
fn test_pose_points() {
    use cgmath::Quaternion;

    let (_, map, _) = two_halves();
    let lift = |dz: f64| RigidTransform::new(
        Quaternion::new(1.0, 0.0, 0.0, 0.0),
        Vector3::new(0.0, 0.0, dz),
        Point3::new(0.0, 0.0, 0.0),
    ).unwrap();
    let poser = Poser::new(&map, Geometry::identity(), &[lift(1.0), lift(3.0)], BlendMode::Linear);

    let posed = poser.pose_points(&[
        Point3::new(1.0, 1.0, 1.0),
        Point3::new(3.5, 1.0, 1.0),
        Point3::new(40.0, 1.0, 1.0),
    ]);
    assert_eq!(posed[0], Some(Point3::new(1.0, 1.0, 2.0)));
    // Halfway between the two bones' columns
    let p = posed[1].unwrap();
    assert!((p.z - 3.0).abs() < 1e-6);
    assert_eq!(posed[2], None);

    match poser.pose_point(Point3::new(-5.0, 0.0, 0.0)) {
        Err(::errors::Error(ErrorKind::ZeroWeightSum, _)) => (),
        r => panic!("unexpected {:?}", r),
    }
}

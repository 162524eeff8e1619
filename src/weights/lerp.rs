use cgmath::Vector3;
use grid::{CORNERS, Voxel, offset, trilinear_basis};
use smallvec::SmallVec;
use super::{WeightEntry, WeightMap};

impl WeightMap {
    /// Trilinearly interpolates the weights at the continuous index `coord`
    /// into `out` (indexed by bone).
    ///
    /// Masked corners are left out and the rest renormalized. With a
    /// filiation table, corners whose heaviest bone is unrelated to the
    /// heaviest bone of the most influential usable corner are left out too,
    /// so weights from across a gap (a hand resting on a thigh) don't leak
    /// in. Returns false, with `out` all zero, if no corner is usable.
    ///
    /// `scratch` holds each corner's weights in turn and must be at least as
    /// long as `out`; its contents on entry don't matter.
    pub fn lerp(&self, coord: Vector3<f64>, out: &mut [f32], scratch: &mut [f32]) -> bool {
        for x in out.iter_mut() {
            *x = 0.0;
        }

        let base = [coord.x.floor(), coord.y.floor(), coord.z.floor()];
        let frac = [coord.x - base[0], coord.y - base[1], coord.z - base[2]];
        let base = [base[0] as i32, base[1] as i32, base[2] as i32];

        let mut corners: SmallVec<[(f64, Voxel); 8]> = CORNERS.iter()
            .map(|c| (trilinear_basis(frac, *c), offset(base, *c)))
            .filter(|&(w, _)| w > 0.0 && w <= 1.0)
            .collect();
        // Stable, so equal weights keep corner order
        corners.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(::std::cmp::Ordering::Equal));

        let check_filiation = self.has_filiation();
        let mut reference = WeightEntry::invalid();
        let corner_weights = &mut scratch[..out.len()];
        let mut sum = 0.0f64;

        for &(w, corner) in &corners {
            if self.is_masked(corner) {
                continue;
            }
            let dominant = self.get(corner, corner_weights);
            if check_filiation {
                if !reference.is_valid() {
                    reference = dominant;
                }
                if self.is_unfiliated(reference.bone, dominant.bone) {
                    continue;
                }
            }
            for (o, &cw) in out.iter_mut().zip(corner_weights.iter()) {
                *o += (w * cw as f64) as f32;
            }
            sum += w;
        }

        if sum == 0.0 {
            for x in out.iter_mut() {
                *x = 0.0;
            }
            return false;
        }
        for x in out.iter_mut() {
            *x = (*x as f64 / sum) as f32;
        }
        true
    }
}

#[cfg(test)]
use super::test_map;
#[cfg(test)]
use grid::Region;

#[test]
fn test_matches_trilinear() {
    use grid::{Geometry, Grid};

    // One bone with a different weight at every voxel of a 3x3x3 cube
    let mut map = test_map([3, 3, 3]);
    let mut field = Grid::new(Region::with_size([3, 3, 3]), Geometry::identity(), 0.0f32);
    for v in field.voxels() {
        field[v] = 0.05 + 0.01 * (v[0] + 3 * v[1] + 9 * v[2]) as f32 + if v == [1, 1, 1] { 0.5 } else { 0.0 };
        assert!(map.insert(v, 0, field[v]));
    }

    let mut out = [0.0f32; 1];
    let mut scratch = [0.0f32; 1];
    for &(x, y, z) in &[(0.5, 0.5, 0.5), (0.1, 1.7, 0.3), (1.9, 1.2, 1.6), (1.0, 2.0, 0.25)] {
        let coord = Vector3::new(x, y, z);
        assert!(map.lerp(coord, &mut out, &mut scratch));
        let expected = field.trilinear(coord).unwrap();
        assert!((out[0] as f64 - expected).abs() < 1e-5, "at {:?}: {} != {}", coord, out[0], expected);
    }
}

#[test]
fn test_single_bone_sums_to_one() {
    let mut map = test_map([4, 4, 4]);
    for v in map.voxels().to_vec() {
        map.insert(v, 2, 1.0);
    }
    map.set_weights_filiation(3, &[(1, 0), (2, 1)], 0);

    let mut out = [0.0f32; 3];
    let mut scratch = [0.0f32; 3];
    assert!(map.lerp(Vector3::new(1.3, 2.5, 0.9), &mut out, &mut scratch));
    assert_eq!(out[0], 0.0);
    assert_eq!(out[1], 0.0);
    assert!((out.iter().sum::<f32>() - 1.0).abs() < 1e-6);
}

#[test]
fn test_masked_corners() {
    use grid::{Geometry, Grid};

    let mut map = test_map([2, 2, 1]);
    map.insert([0, 0, 0], 0, 1.0);
    map.insert([1, 0, 0], 1, 1.0);
    map.insert([0, 1, 0], 0, 1.0);
    map.insert([1, 1, 0], 1, 1.0);

    // Mask out the bone 1 column
    let mut mask = Grid::new(Region::with_size([2, 2, 1]), Geometry::identity(), 1u8);
    mask[[1, 0, 0]] = 0;
    mask[[1, 1, 0]] = 0;
    map.set_mask_image(&mask, 1.0);

    let mut out = [0.0f32; 2];
    let mut scratch = [0.0f32; 2];
    assert!(map.lerp(Vector3::new(0.75, 0.5, 0.0), &mut out, &mut scratch));
    assert_eq!(out, [1.0, 0.0]);

    // Only masked corners nearby
    assert!(!map.lerp(Vector3::new(1.0, 0.5, 0.0), &mut out, &mut scratch));
    assert_eq!(out, [0.0, 0.0]);
    // Outside the map
    assert!(!map.lerp(Vector3::new(-3.0, 0.0, 0.0), &mut out, &mut scratch));
}

#[test]
fn test_unfiliated_corners() {
    // Bone 1 is bone 0's child. The left half of a 2x2x2 cell is bone 0, the
    // right half bone 1.
    let mut map = test_map([2, 2, 2]);
    for v in map.voxels().to_vec() {
        map.insert(v, if v[0] == 0 { 0 } else { 1 }, 1.0);
    }
    let p = Vector3::new(0.4, 0.5, 0.5);
    let mut out = [0.0f32; 2];
    let mut scratch = [0.0f32; 2];

    // Without filiation both bones blend
    assert!(map.lerp(p, &mut out, &mut scratch));
    assert!((out[0] - 0.6).abs() < 1e-6);
    assert!((out[1] - 0.4).abs() < 1e-6);

    // Parent and child are one link apart, so max_degree = 0 separates them
    map.set_weights_filiation(2, &[(1, 0)], 0);
    assert!(map.lerp(p, &mut out, &mut scratch));
    assert!((out[0] - 1.0).abs() < 1e-6);
    assert_eq!(out[1], 0.0);
    // The other side of the cell is dominated by bone 1
    assert!(map.lerp(Vector3::new(0.6, 0.5, 0.5), &mut out, &mut scratch));
    assert_eq!(out[0], 0.0);
    assert!((out[1] - 1.0).abs() < 1e-6);

    map.set_weights_filiation(2, &[(1, 0)], 1);
    assert!(map.lerp(p, &mut out, &mut scratch));
    assert!((out[1] - 0.4).abs() < 1e-6);
}

#[test]
fn test_scratch_reuse() {
    let mut map = test_map([2, 1, 1]);
    map.insert([0, 0, 0], 0, 1.0);
    map.insert([1, 0, 0], 1, 0.75);
    map.insert([1, 0, 0], 0, 0.25);

    // Leftovers from an earlier call, and room to spare, change nothing
    let mut out = [0.0f32; 2];
    let mut scratch = [7.0f32; 5];
    assert!(map.lerp(Vector3::new(0.5, 0.0, 0.0), &mut out, &mut scratch));
    let first = out;
    assert!((first[0] - 0.625).abs() < 1e-6);
    assert!((first[1] - 0.375).abs() < 1e-6);
    assert!(map.lerp(Vector3::new(0.5, 0.0, 0.0), &mut out, &mut scratch));
    assert_eq!(out, first);
    assert_eq!(scratch[4], 7.0);
}

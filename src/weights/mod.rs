//! Compact storage of all bones' weights.
//!
//! Dense, the weights of a body would be one float volume per bone. But a
//! voxel only has a handful of bones with weight above the cutoff, so the
//! map stores, for every body voxel, just its (bone, weight) entries.
//!
//! The entries live in a table with one *column* per body voxel and as many
//! *rows* as the most crowded voxel needs:
//!
//! ```text
//!               col 0      col 1      col 2    ...
//!     row 0   (b0, .9)   (b0, .4)   (b3, 1.)
//!     row 1   (b1, .1)   (b2, .6)      -
//!     row 2      -       (b1, .1)      -
//! ```
//!
//! A lookup volume maps each voxel of the region to its column and a count
//! per column says how many rows are valid. Rows are appended the first time
//! some column overflows, so the table stays as short as it can be.

mod lerp;

use grid::{Grid, Region, Scalar, Voxel};
use skeleton::{BoneIndex, FiliationTable, NO_BONE};

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct WeightEntry {
    pub bone: BoneIndex,
    pub value: f32,
}

impl WeightEntry {
    pub fn invalid() -> WeightEntry {
        WeightEntry { bone: NO_BONE, value: 0.0 }
    }

    pub fn is_valid(&self) -> bool {
        self.bone != NO_BONE
    }
}

const NO_COLUMN: u32 = !0;

struct Mask {
    /// Weight-map region cropped to the mask image's region.
    region: Region,
    foreground: Grid<bool>,
}

struct Filiation {
    table: FiliationTable,
    max_degree: u32,
}

pub struct WeightMap {
    region: Region,
    /// Column of each voxel in `region`, NO_COLUMN if it has none.
    lut: Vec<u32>,
    /// Voxel of each column.
    columns: Vec<Voxel>,
    counts: Vec<u16>,
    rows: Vec<Vec<WeightEntry>>,
    min_weight: f32,
    mask: Option<Mask>,
    filiation: Option<Filiation>,
}

impl WeightMap {
    /// Empty map with a column for each of `voxels` that lies in `region`.
    pub fn new(voxels: &[Voxel], region: Region) -> WeightMap {
        let mut lut = vec![NO_COLUMN; region.len()];
        let mut columns = Vec::with_capacity(voxels.len());
        for &v in voxels {
            if let Some(idx) = region.linear_index(v) {
                if lut[idx] == NO_COLUMN {
                    lut[idx] = columns.len() as u32;
                    columns.push(v);
                }
            }
        }
        let counts = vec![0; columns.len()];
        WeightMap {
            region,
            lut,
            columns,
            counts,
            rows: vec![],
            min_weight: 0.0,
            mask: None,
            filiation: None,
        }
    }

    /// Weights below this are dropped on insertion. Non-positive weights
    /// are always dropped.
    pub fn set_min_weight(&mut self, min_weight: f32) {
        self.min_weight = min_weight;
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    /// Voxels that have a column, in column order.
    pub fn voxels(&self) -> &[Voxel] {
        &self.columns
    }

    fn column(&self, v: Voxel) -> Option<usize> {
        let idx = self.region.linear_index(v)?;
        match self.lut[idx] {
            NO_COLUMN => None,
            col => Some(col as usize),
        }
    }

    /// Records weight `value` of `bone` at `v`. Returns false (and stores
    /// nothing) if the value is below the cutoff or `v` has no column.
    pub fn insert(&mut self, v: Voxel, bone: BoneIndex, value: f32) -> bool {
        if !(value > 0.0) || value < self.min_weight {
            return false;
        }
        let col = match self.column(v) {
            Some(col) => col,
            None => return false,
        };

        let count = self.counts[col] as usize;
        if count == self.rows.len() {
            self.rows.push(vec![WeightEntry::invalid(); self.columns.len()]);
            trace!("weight map grew to {} rows", self.rows.len());
        }
        self.rows[count][col] = WeightEntry { bone, value };
        self.counts[col] += 1;
        true
    }

    /// Inserts a whole bone's weight field. Returns how many entries were kept.
    pub fn insert_field(&mut self, bone: BoneIndex, field: &Grid<f32>) -> usize {
        let mut num_inserted = 0;
        for col in 0..self.columns.len() {
            let v = self.columns[col];
            if let Some(value) = field.get(v) {
                if self.insert(v, bone, value) {
                    num_inserted += 1;
                }
            }
        }
        num_inserted
    }

    /// Fills `out` (indexed by bone) with the weights at `v`, zero for
    /// bones with no entry, and returns the heaviest entry (the first one
    /// stored on a tie). The entry is invalid if `v` has no column or no
    /// entries.
    pub fn get(&self, v: Voxel, out: &mut [f32]) -> WeightEntry {
        for x in out.iter_mut() {
            *x = 0.0;
        }
        let col = match self.column(v) {
            Some(col) => col,
            None => return WeightEntry::invalid(),
        };

        let mut best = WeightEntry::invalid();
        for row in &self.rows[..self.counts[col] as usize] {
            let entry = row[col];
            if let Some(x) = out.get_mut(entry.bone as usize) {
                *x = entry.value;
            }
            if !best.is_valid() || entry.value > best.value {
                best = entry;
            }
        }
        best
    }

    /// Only voxels where `image` is at least `min_foreground` take part in
    /// interpolation.
    pub fn set_mask_image<T: Scalar>(&mut self, image: &Grid<T>, min_foreground: f64) {
        let region = self.region.crop(&image.region());
        let foreground = image.map(|&x| x.into() >= min_foreground);
        self.mask = Some(Mask { region, foreground });
    }

    pub fn is_masked(&self, v: Voxel) -> bool {
        if !self.region.contains(v) {
            return true;
        }
        match self.mask {
            None => false,
            Some(ref mask) => !mask.region.contains(v) || !mask.foreground[v],
        }
    }

    /// Interpolation will only blend bones at most `max_degree` parent links
    /// apart. `ancestry` holds (child, parent) pairs.
    pub fn set_weights_filiation(&mut self, num_bones: usize, ancestry: &[(BoneIndex, BoneIndex)], max_degree: u32) {
        let table = FiliationTable::new(num_bones, ancestry);
        self.filiation = Some(Filiation { table, max_degree });
    }

    /// Whether `a` and `b` are too far apart in the ancestry graph to blend.
    /// An invalid bone is unrelated to everything. Without a filiation table
    /// valid bones are always related.
    pub fn is_unfiliated(&self, a: BoneIndex, b: BoneIndex) -> bool {
        if a == NO_BONE || b == NO_BONE {
            return true;
        }
        match self.filiation {
            None => false,
            Some(ref f) => match f.table.hops(a, b) {
                Some(hops) => hops > f.max_degree,
                None => true,
            },
        }
    }

    fn has_filiation(&self) -> bool {
        self.filiation.is_some()
    }
}

#[cfg(test)]
pub fn test_map(size: [u32; 3]) -> WeightMap {
    let region = Region::with_size(size);
    let voxels = region.voxels().collect::<Vec<_>>();
    WeightMap::new(&voxels, region)
}

#[test]
fn test_insert_get() {
    let mut map = test_map([3, 2, 2]);
    map.set_min_weight(0.01);
    let mut out = vec![9.0; 4];

    assert!(map.insert([1, 1, 0], 2, 0.5));
    assert!(map.insert([1, 1, 0], 0, 0.25));
    assert!(map.insert([2, 0, 1], 3, 0.75));
    assert_eq!(map.num_rows(), 2);

    let best = map.get([1, 1, 0], &mut out);
    assert_eq!(out, vec![0.25, 0.0, 0.5, 0.0]);
    assert_eq!(best, WeightEntry { bone: 2, value: 0.5 });

    let best = map.get([2, 0, 1], &mut out);
    assert_eq!(out, vec![0.0, 0.0, 0.0, 0.75]);
    assert_eq!(best.bone, 3);

    // Untouched voxel
    let best = map.get([0, 0, 0], &mut out);
    assert_eq!(out, vec![0.0; 4]);
    assert!(!best.is_valid());

    // Rejected
    assert!(!map.insert([0, 0, 0], 1, 0.001));
    assert!(!map.insert([0, 0, 0], 1, 0.0));
    assert!(!map.insert([0, 0, 0], 1, -1.0));
    assert!(!map.insert([3, 0, 0], 1, 0.5));
    assert!(!map.get([3, 0, 0], &mut out).is_valid());
    assert_eq!(map.num_rows(), 2);
}

#[test]
fn test_unlisted_voxels() {
    let region = Region::with_size([4, 1, 1]);
    let mut map = WeightMap::new(&[[1, 0, 0], [2, 0, 0], [7, 0, 0]], region);
    assert_eq!(map.num_columns(), 2);
    assert!(map.insert([2, 0, 0], 0, 1.0));
    assert!(!map.insert([0, 0, 0], 0, 1.0));

    // Ties go to the first entry stored
    assert!(map.insert([1, 0, 0], 1, 0.5));
    assert!(map.insert([1, 0, 0], 0, 0.5));
    let mut out = [0.0; 2];
    assert_eq!(map.get([1, 0, 0], &mut out).bone, 1);
}

#[test]
fn test_mask() {
    use grid::Geometry;

    let mut map = test_map([4, 4, 1]);
    assert!(!map.is_masked([3, 3, 0]));
    assert!(map.is_masked([4, 0, 0]));

    // Mask image only covers x < 3
    let mut image = Grid::new(Region::with_size([3, 4, 1]), Geometry::identity(), 5u16);
    image[[0, 0, 0]] = 0;
    image[[1, 0, 0]] = 2;
    map.set_mask_image(&image, 3.0);
    assert!(map.is_masked([0, 0, 0]));
    assert!(map.is_masked([1, 0, 0]));
    assert!(!map.is_masked([2, 0, 0]));
    assert!(map.is_masked([3, 0, 0]));
}

#[test]
fn test_filiation() {
    let mut map = test_map([1, 1, 1]);
    assert!(!map.is_unfiliated(0, 5));
    assert!(map.is_unfiliated(0, NO_BONE));

    // 0 - 1 - 2, 3 on its own
    map.set_weights_filiation(4, &[(1, 0), (2, 1)], 1);
    assert!(!map.is_unfiliated(0, 0));
    assert!(!map.is_unfiliated(0, 1));
    assert!(map.is_unfiliated(0, 2));
    assert!(map.is_unfiliated(2, 0));
    assert!(map.is_unfiliated(0, 3));
    assert!(map.is_unfiliated(NO_BONE, 0));
}

use std::cmp::{max, min};

/// Integer voxel coordinate.
pub type Voxel = [i32; 3];

/// Offsets to the six face-adjacent neighbors of a voxel.
pub static NEIGHBORS: [[i32; 3]; 6] = [
    [-1, 0, 0],
    [1, 0, 0],
    [0, -1, 0],
    [0, 1, 0],
    [0, 0, -1],
    [0, 0, 1],
];

/// Offsets to the eight corners of the unit cell whose minimum corner is the
/// origin. Bit k of the position selects the offset along axis k.
pub static CORNERS: [[i32; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [0, 1, 0],
    [1, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [0, 1, 1],
    [1, 1, 1],
];

pub fn offset(v: Voxel, d: [i32; 3]) -> Voxel {
    [v[0] + d[0], v[1] + d[1], v[2] + d[2]]
}

/// Axis-aligned box of voxels `start <= v < start + size`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Region {
    pub start: Voxel,
    pub size: [u32; 3],
}

impl Region {
    pub fn new(start: Voxel, size: [u32; 3]) -> Region {
        Region { start, size }
    }

    pub fn with_size(size: [u32; 3]) -> Region {
        Region { start: [0, 0, 0], size }
    }

    pub fn len(&self) -> usize {
        self.size[0] as usize * self.size[1] as usize * self.size[2] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, v: Voxel) -> bool {
        (0..3).all(|k| {
            let rel = v[k] as i64 - self.start[k] as i64;
            rel >= 0 && rel < self.size[k] as i64
        })
    }

    /// Position of `v` in x-fastest scan order.
    pub fn linear_index(&self, v: Voxel) -> Option<usize> {
        if !self.contains(v) {
            return None;
        }
        let x = (v[0] - self.start[0]) as usize;
        let y = (v[1] - self.start[1]) as usize;
        let z = (v[2] - self.start[2]) as usize;
        let (sx, sy) = (self.size[0] as usize, self.size[1] as usize);
        Some(x + sx * (y + sy * z))
    }

    /// Inverse of `linear_index`.
    pub fn voxel_at(&self, idx: usize) -> Voxel {
        let (sx, sy) = (self.size[0] as usize, self.size[1] as usize);
        [
            self.start[0] + (idx % sx) as i32,
            self.start[1] + ((idx / sx) % sy) as i32,
            self.start[2] + (idx / (sx * sy)) as i32,
        ]
    }

    /// Intersection of two regions (empty if they don't overlap).
    pub fn crop(&self, other: &Region) -> Region {
        let mut start = [0; 3];
        let mut size = [0; 3];
        for k in 0..3 {
            let lo = max(self.start[k] as i64, other.start[k] as i64);
            let hi = min(
                self.start[k] as i64 + self.size[k] as i64,
                other.start[k] as i64 + other.size[k] as i64,
            );
            start[k] = lo as i32;
            size[k] = if hi > lo { (hi - lo) as u32 } else { 0 };
        }
        Region { start, size }
    }

    /// Iterates over every voxel in scan order.
    pub fn voxels(&self) -> Voxels {
        Voxels { region: *self, next: 0, len: self.len() }
    }
}

pub struct Voxels {
    region: Region,
    next: usize,
    len: usize,
}

impl Iterator for Voxels {
    type Item = Voxel;

    fn next(&mut self) -> Option<Voxel> {
        if self.next == self.len {
            return None;
        }
        let v = self.region.voxel_at(self.next);
        self.next += 1;
        Some(v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.len - self.next;
        (n, Some(n))
    }
}

#[test]
fn test_linear_index() {
    let region = Region::new([1, -2, 0], [3, 4, 2]);
    assert_eq!(region.len(), 24);
    for (i, v) in region.voxels().enumerate() {
        assert_eq!(region.linear_index(v), Some(i));
        assert_eq!(region.voxel_at(i), v);
    }
    assert_eq!(region.linear_index([0, 0, 0]), None);
    assert_eq!(region.linear_index([4, 0, 0]), None);
    assert!(region.contains([3, 1, 1]));
}

#[test]
fn test_crop() {
    let a = Region::new([0, 0, 0], [4, 4, 4]);
    let b = Region::new([2, -1, 3], [5, 2, 5]);
    assert_eq!(a.crop(&b), Region::new([2, 0, 3], [2, 1, 1]));
    let c = Region::new([10, 0, 0], [1, 1, 1]);
    assert!(a.crop(&c).is_empty());
}

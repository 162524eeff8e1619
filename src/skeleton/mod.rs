//! The armature: an ordered list of bones, each a line segment with an
//! optional envelope radius and an optional parent.
//!
//! Bones are referred to by their position in the list, a `BoneIndex`. When a
//! bone is written into a label volume it is shifted up by `FIRST_BONE_LABEL`
//! so the two reserved labels keep their meaning:
//!
//! ```text
//!     0          background (outside the body)
//!     1          interior voxel not (yet) owned by any bone
//!     2, 3, ...  bone 0, bone 1, ...
//! ```

pub mod filiation;
pub mod rasterize;
pub mod read;

pub use self::filiation::FiliationTable;
pub use self::rasterize::{rasterize_bone, rasterize_skeleton};
pub use self::read::{Armature, parse_armature, read_armature};

use cgmath::{InnerSpace, Point3};
use errors::Result;

pub type BoneIndex = u16;
/// Marks "no bone", eg. the dominant bone of a voxel with no weights.
pub const NO_BONE: BoneIndex = !0;

pub type Label = u16;
pub const BACKGROUND: Label = 0;
pub const UNKNOWN: Label = 1;
pub const FIRST_BONE_LABEL: Label = 2;

pub fn bone_label(bone: BoneIndex) -> Label {
    bone + FIRST_BONE_LABEL
}

/// Which bone a label stands for, if any.
pub fn label_bone(label: Label) -> Option<BoneIndex> {
    if label >= FIRST_BONE_LABEL { Some(label - FIRST_BONE_LABEL) } else { None }
}

#[derive(Debug, Clone)]
pub struct Bone {
    pub head: Point3<f64>,
    pub tail: Point3<f64>,
    pub radius: Option<f64>,
    pub parent: Option<BoneIndex>,
}

impl Bone {
    pub fn length(&self) -> f64 {
        (self.tail - self.head).magnitude()
    }
}

pub struct Skeleton {
    bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>) -> Result<Skeleton> {
        // Every bone needs a label below the NO_BONE marker
        check!(bones.len() < (NO_BONE - FIRST_BONE_LABEL) as usize)?;
        for (i, bone) in bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent as usize >= bones.len() || parent as usize == i {
                    bail!("bone {} has invalid parent {}", i, parent);
                }
            }
            if let Some(r) = bone.radius {
                check!(r >= 0.0)?;
            }
        }
        Ok(Skeleton { bones })
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn bone(&self, idx: BoneIndex) -> &Bone {
        &self.bones[idx as usize]
    }

    pub fn indices(&self) -> impl Iterator<Item = BoneIndex> {
        0..self.bones.len() as BoneIndex
    }

    /// (child, parent) for every bone with a parent.
    pub fn ancestry_pairs(&self) -> Vec<(BoneIndex, BoneIndex)> {
        self.bones.iter().enumerate()
            .filter_map(|(i, bone)| bone.parent.map(|p| (i as BoneIndex, p)))
            .collect()
    }
}

#[cfg(test)]
pub fn test_bone(head: [f64; 3], tail: [f64; 3], parent: Option<BoneIndex>) -> Bone {
    Bone {
        head: Point3::new(head[0], head[1], head[2]),
        tail: Point3::new(tail[0], tail[1], tail[2]),
        radius: None,
        parent,
    }
}

#[test]
fn test_labels() {
    assert_eq!(bone_label(0), 2);
    assert_eq!(label_bone(bone_label(7)), Some(7));
    assert_eq!(label_bone(UNKNOWN), None);
    assert_eq!(label_bone(BACKGROUND), None);
}

#[test]
fn test_parent_validation() {
    let ok = Skeleton::new(vec![
        test_bone([0.0, 0.0, 0.0], [1.0, 0.0, 0.0], None),
        test_bone([1.0, 0.0, 0.0], [2.0, 0.0, 0.0], Some(0)),
    ]).unwrap();
    assert_eq!(ok.ancestry_pairs(), vec![(1, 0)]);
    assert_eq!(ok.bone(1).length(), 1.0);

    assert!(Skeleton::new(vec![test_bone([0.0; 3], [1.0; 3], Some(0))]).is_err());
    assert!(Skeleton::new(vec![test_bone([0.0; 3], [1.0; 3], Some(3))]).is_err());
}

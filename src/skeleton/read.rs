//! Reading armature files.
//!
//! An armature file is JSON:
//!
//! ```text
//!     {
//!       "bones": [
//!         {
//!           "head": [x, y, z],
//!           "tail": [x, y, z],
//!           "radius": 4.5,                  (optional)
//!           "parent": 0,                    (optional)
//!           "pose": {                       (optional)
//!             "rotation": [w, x, y, z],     (or three rows of a 3x3 matrix)
//!             "translation": [x, y, z],
//!             "center": [x, y, z]           (optional, default: head)
//!           }
//!         },
//!         ...
//!       ]
//!     }
//! ```
//!
//! Points are in the physical space of the label volume.

use cgmath::{Matrix, Matrix3, Point3, Quaternion, Vector3};
use errors::{ErrorKind, Result};
use json::{self, JsonValue};
use skinning::RigidTransform;
use std::fs;
use std::path::Path;
use super::{Bone, BoneIndex, Skeleton};

pub struct Armature {
    pub skeleton: Skeleton,
    /// Pose of each bone, if the file gave one.
    pub poses: Vec<Option<RigidTransform>>,
}

impl Armature {
    /// Poses for every bone; bones without one stay where they are.
    pub fn pose_transforms(&self) -> Vec<RigidTransform> {
        self.poses.iter()
            .map(|p| match *p {
                Some(t) => t,
                None => RigidTransform::identity(),
            })
            .collect()
    }
}

pub fn read_armature(path: &Path) -> Result<Armature> {
    let s = fs::read_to_string(path)?;
    parse_armature(&s)
}

pub fn parse_armature(s: &str) -> Result<Armature> {
    let root = json::parse(s)?;
    let bones_json = &root["bones"];
    if !bones_json.is_array() {
        return Err(bad("missing \"bones\" array".to_string()));
    }

    let mut bones = vec![];
    let mut poses = vec![];
    for (i, b) in bones_json.members().enumerate() {
        let head = point(&b["head"]).ok_or_else(|| bad(format!("bone {}: bad head", i)))?;
        let tail = point(&b["tail"]).ok_or_else(|| bad(format!("bone {}: bad tail", i)))?;
        let radius = optional_f64(&b["radius"]).map_err(|_| bad(format!("bone {}: bad radius", i)))?;
        let parent = match optional_f64(&b["parent"]) {
            Ok(None) => None,
            Ok(Some(p)) if p >= 0.0 && p.fract() == 0.0 && p < BoneIndex::max_value() as f64 => {
                Some(p as BoneIndex)
            }
            _ => return Err(bad(format!("bone {}: bad parent", i))),
        };
        let pose = if b["pose"].is_null() {
            None
        } else {
            Some(pose(&b["pose"], head).ok_or_else(|| bad(format!("bone {}: bad pose", i)))?)
        };

        bones.push(Bone { head, tail, radius, parent });
        poses.push(pose);
    }

    let skeleton = Skeleton::new(bones)?;
    Ok(Armature { skeleton, poses })
}

fn bad(msg: String) -> ::errors::Error {
    ErrorKind::BadArmature(msg).into()
}

fn optional_f64(v: &JsonValue) -> ::std::result::Result<Option<f64>, ()> {
    if v.is_null() {
        return Ok(None);
    }
    v.as_f64().map(Some).ok_or(())
}

fn numbers(v: &JsonValue, n: usize) -> Option<Vec<f64>> {
    if !v.is_array() || v.len() != n {
        return None;
    }
    v.members().map(|x| x.as_f64()).collect()
}

fn vector(v: &JsonValue) -> Option<Vector3<f64>> {
    numbers(v, 3).map(|x| Vector3::new(x[0], x[1], x[2]))
}

fn point(v: &JsonValue) -> Option<Point3<f64>> {
    numbers(v, 3).map(|x| Point3::new(x[0], x[1], x[2]))
}

fn rotation(v: &JsonValue) -> Option<Quaternion<f64>> {
    if let Some(q) = numbers(v, 4) {
        return Some(Quaternion::new(q[0], q[1], q[2], q[3]));
    }
    if v.is_array() && v.len() == 3 {
        let r0 = vector(&v[0])?;
        let r1 = vector(&v[1])?;
        let r2 = vector(&v[2])?;
        let m = Matrix3::from_cols(r0, r1, r2).transpose();
        return Some(Quaternion::from(m));
    }
    None
}

fn pose(v: &JsonValue, head: Point3<f64>) -> Option<RigidTransform> {
    let rotation = if v["rotation"].is_null() {
        Quaternion::new(1.0, 0.0, 0.0, 0.0)
    } else {
        rotation(&v["rotation"])?
    };
    let translation = if v["translation"].is_null() {
        Vector3::new(0.0, 0.0, 0.0)
    } else {
        vector(&v["translation"])?
    };
    let center = if v["center"].is_null() { head } else { point(&v["center"])? };
    RigidTransform::new(rotation, translation, center)
}

#[test]
fn test() {
    let src = r#"{
        "bones": [
            { "head": [0, 0, 0], "tail": [0, 0, 10], "radius": 3 },
            { "head": [0, 0, 10], "tail": [0, 0, 20], "parent": 0,
              "pose": { "rotation": [[0, -1, 0], [1, 0, 0], [0, 0, 1]], "translation": [1, 2, 3] } }
        ]
    }"#;
    let arm = parse_armature(src).unwrap();
    assert_eq!(arm.skeleton.len(), 2);
    assert_eq!(arm.skeleton.bone(0).radius, Some(3.0));
    assert_eq!(arm.skeleton.bone(1).parent, Some(0));
    assert!(arm.poses[0].is_none());

    // 90 degrees about z around the head (0, 0, 10), then moved by (1, 2, 3)
    let pose = arm.poses[1].unwrap();
    let p = pose.apply(Point3::new(1.0, 0.0, 10.0));
    assert!((p.x - 1.0).abs() < 1e-9);
    assert!((p.y - 3.0).abs() < 1e-9);
    assert!((p.z - 13.0).abs() < 1e-9);

    assert!(parse_armature(r#"{"bones": [{"head": [0, 0], "tail": [0, 0, 1]}]}"#).is_err());
    assert!(parse_armature(r#"{"bones": [{"head": [0, 0, 0], "tail": [0, 0, 1], "parent": 1.5}]}"#).is_err());
    assert!(parse_armature(r#"{"joints": []}"#).is_err());
}

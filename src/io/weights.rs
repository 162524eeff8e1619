//! Weight fields on disk: one float volume per bone in a directory, named
//! so that sorting the names gives bone order.

use errors::Result;
use grid::{Grid, Region, Voxel};
use skeleton::BoneIndex;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use util::OutDir;
use weights::WeightMap;
use super::mha::{read_mha, write_mha_to};

pub fn weight_file_name(bone: BoneIndex) -> String {
    format!("weight_{:03}.mha", bone)
}

/// Writes the weight field of `bone` into `out`.
pub fn write_weight_field(out: &mut OutDir, bone: BoneIndex, field: &Grid<f32>) -> Result<()> {
    let name = weight_file_name(bone);
    let mut w = BufWriter::new(out.create_file(&name)?);
    write_mha_to(&mut w, field)?;
    w.flush()?;
    debug!("wrote {}", name);
    Ok(())
}

/// The .mha files in `dir`, sorted by name.
pub fn list_weight_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_mha = path.extension()
            .map(|ext| ext.eq_ignore_ascii_case("mha"))
            .unwrap_or(false);
        if is_mha && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Builds a weight map from weight files. The i-th file holds the weights
/// of bone i. Files whose region differs from `region` are skipped.
pub fn read_weight_map(
    files: &[PathBuf],
    voxels: &[Voxel],
    region: Region,
    min_weight: f32,
) -> Result<WeightMap> {
    let mut map = WeightMap::new(voxels, region);
    map.set_min_weight(min_weight);

    for (i, path) in files.iter().enumerate() {
        let field: Grid<f32> = read_mha(path)?;
        if field.region() != region {
            warn!("{}: region {:?} doesn't match the labels' {:?}, skipping",
                path.display(), field.region(), region);
            continue;
        }
        let inserted = map.insert_field(i as BoneIndex, &field);
        debug!("{}: {} weights for bone {}", path.display(), inserted, i);
    }

    info!("read {} weight files, {} weight rows", files.len(), map.num_rows());
    Ok(map)
}

#[test]
fn test() {
    use grid::Geometry;

    let dir = ::std::env::temp_dir().join(format!("voxskin-weights-{}", ::std::process::id()));
    let _ = fs::remove_dir_all(&dir);

    let region = Region::with_size([4, 1, 1]);
    let mut out = OutDir::new(dir.clone()).unwrap();
    for bone in 0..2u16 {
        let mut field = Grid::new(region, Geometry::identity(), 0.0f32);
        for x in 0..4 {
            let w = x as f32 / 3.0;
            field[[x, 0, 0]] = if bone == 0 { 1.0 - w } else { w };
        }
        write_weight_field(&mut out, bone, &field).unwrap();
    }
    // Wrong size, gets skipped
    let small = Grid::new(Region::with_size([2, 1, 1]), Geometry::identity(), 1.0f32);
    write_weight_field(&mut out, 2, &small).unwrap();
    fs::write(dir.join("notes.txt"), b"not a volume").unwrap();

    let files = list_weight_files(&dir).unwrap();
    assert_eq!(files.len(), 3);
    assert!(files[0].ends_with("weight_000.mha"));
    assert!(files[1].ends_with("weight_001.mha"));

    let voxels = region.voxels().collect::<Vec<_>>();
    let map = read_weight_map(&files, &voxels, region, 0.0).unwrap();
    let _ = fs::remove_dir_all(&dir);

    let mut out = [0.0; 3];
    map.get([1, 0, 0], &mut out);
    assert!((out[0] - 2.0 / 3.0).abs() < 1e-6);
    assert!((out[1] - 1.0 / 3.0).abs() < 1e-6);
    assert_eq!(out[2], 0.0);
    assert_eq!(map.num_rows(), 2);
    let best = map.get([3, 0, 0], &mut out);
    assert_eq!(best.bone, 1);
    assert_eq!(out[0], 0.0);
}

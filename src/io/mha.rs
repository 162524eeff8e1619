//! MetaImage (.mha/.mhd) volumes.
//!
//! A MetaImage file is a text header of `Key = Value` lines followed by the
//! raw voxel data (or, for .mhd, the name of a file holding it):
//!
//! ```text
//!     ObjectType = Image
//!     NDims = 3
//!     BinaryData = True
//!     BinaryDataByteOrderMSB = False
//!     CompressedData = False
//!     TransformMatrix = 1 0 0 0 1 0 0 0 1
//!     Offset = 0 0 0
//!     ElementSpacing = 1 1 1
//!     DimSize = 64 64 64
//!     ElementType = MET_USHORT
//!     ElementDataFile = LOCAL
//!     <data, x fastest>
//! ```
//!
//! `TransformMatrix` lists the direction matrix one column (axis) at a time.
//! Compressed data isn't supported. Voxel values are converted to the
//! element type asked for, whatever the file holds.

use cgmath::{Matrix3, Point3, Vector3};
use errors::{ErrorKind, Result};
use grid::{Geometry, Grid, Region, Scalar};
use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub trait MetaElement: Scalar {
    const ELEMENT_TYPE: &'static str;
    fn from_f64(x: f64) -> Self;
    fn write_le<W: Write>(self, w: &mut W) -> io::Result<()>;
}

macro_rules! def_meta_element {
    ($t:ty, $name:expr, int) => {
        impl MetaElement for $t {
            const ELEMENT_TYPE: &'static str = $name;
            fn from_f64(x: f64) -> $t { x.round() as $t }
            fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
                w.write_all(&self.to_le_bytes())
            }
        }
    };
    ($t:ty, $name:expr, float) => {
        impl MetaElement for $t {
            const ELEMENT_TYPE: &'static str = $name;
            fn from_f64(x: f64) -> $t { x as $t }
            fn write_le<W: Write>(self, w: &mut W) -> io::Result<()> {
                w.write_all(&self.to_le_bytes())
            }
        }
    };
}

def_meta_element!(u8, "MET_UCHAR", int);
def_meta_element!(i8, "MET_CHAR", int);
def_meta_element!(u16, "MET_USHORT", int);
def_meta_element!(i16, "MET_SHORT", int);
def_meta_element!(u32, "MET_UINT", int);
def_meta_element!(i32, "MET_INT", int);
def_meta_element!(f32, "MET_FLOAT", float);
def_meta_element!(f64, "MET_DOUBLE", float);

fn bad(msg: String) -> ::errors::Error {
    ErrorKind::BadVolume(msg).into()
}

/// Splits a file into its header fields and the offset where data starts.
fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, String>, usize)> {
    let mut fields = HashMap::new();
    let mut pos = 0;
    while pos < bytes.len() {
        let end = bytes[pos..].iter().position(|&b| b == b'\n')
            .map(|i| pos + i + 1)
            .unwrap_or(bytes.len());
        let line = String::from_utf8_lossy(&bytes[pos..end]);
        pos = end;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(2, '=');
        let key = parts.next().unwrap_or("").trim().to_string();
        let value = match parts.next() {
            Some(v) => v.trim().to_string(),
            None => return Err(bad(format!("header line without '=': {}", line))),
        };
        let done = key == "ElementDataFile";
        fields.insert(key, value);
        if done {
            return Ok((fields, pos));
        }
    }
    Err(bad("no ElementDataFile in header".to_string()))
}

fn numbers(fields: &HashMap<String, String>, key: &str, n: usize) -> Result<Option<Vec<f64>>> {
    let value = match fields.get(key) {
        Some(v) => v,
        None => return Ok(None),
    };
    let xs = value.split_whitespace()
        .map(|s| s.parse::<f64>())
        .collect::<::std::result::Result<Vec<_>, _>>()?;
    if xs.len() != n {
        return Err(bad(format!("{} should have {} values", key, n)));
    }
    Ok(Some(xs))
}

fn is_true(fields: &HashMap<String, String>, key: &str) -> bool {
    fields.get(key).map(|v| v.eq_ignore_ascii_case("true")) == Some(true)
}

fn decode(data: &[u8], element_type: &str, msb: bool, len: usize) -> Result<Vec<f64>> {
    macro_rules! decode_as {
        ($t:ty, $size:expr) => {{
            if data.len() < len * $size {
                return Err(bad(format!("expected {} bytes of data, found {}", len * $size, data.len())));
            }
            data[..len * $size].chunks($size)
                .map(|c| {
                    let mut b = [0u8; $size];
                    b.copy_from_slice(c);
                    let x = if msb { <$t>::from_be_bytes(b) } else { <$t>::from_le_bytes(b) };
                    x as f64
                })
                .collect()
        }};
    }
    let values = match element_type {
        "MET_UCHAR" => decode_as!(u8, 1),
        "MET_CHAR" => decode_as!(i8, 1),
        "MET_USHORT" => decode_as!(u16, 2),
        "MET_SHORT" => decode_as!(i16, 2),
        "MET_UINT" => decode_as!(u32, 4),
        "MET_INT" => decode_as!(i32, 4),
        "MET_FLOAT" => decode_as!(f32, 4),
        "MET_DOUBLE" => decode_as!(f64, 8),
        t => return Err(bad(format!("unsupported element type {}", t))),
    };
    Ok(values)
}

pub fn read_mha<T: MetaElement>(path: &Path) -> Result<Grid<T>> {
    let bytes = fs::read(path)?;
    let (fields, data_start) = parse_header(&bytes)?;

    if let Some(n) = fields.get("NDims") {
        if n.parse::<u32>()? != 3 {
            return Err(bad(format!("{}: only 3D volumes are supported", path.display())));
        }
    }
    if is_true(&fields, "CompressedData") {
        return Err(bad(format!("{}: compressed data is not supported", path.display())));
    }

    let dims = numbers(&fields, "DimSize", 3)?
        .ok_or_else(|| bad("missing DimSize".to_string()))?;
    let size = [dims[0] as u32, dims[1] as u32, dims[2] as u32];
    let spacing = numbers(&fields, "ElementSpacing", 3)?
        .or(numbers(&fields, "ElementSize", 3)?)
        .unwrap_or_else(|| vec![1.0; 3]);
    let origin = numbers(&fields, "Offset", 3)?
        .or(numbers(&fields, "Origin", 3)?)
        .or(numbers(&fields, "Position", 3)?)
        .unwrap_or_else(|| vec![0.0; 3]);
    let m = numbers(&fields, "TransformMatrix", 9)?
        .or(numbers(&fields, "Rotation", 9)?)
        .or(numbers(&fields, "Orientation", 9)?)
        .unwrap_or_else(|| vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    let geometry = Geometry::new(
        Point3::new(origin[0], origin[1], origin[2]),
        Vector3::new(spacing[0], spacing[1], spacing[2]),
        Matrix3::new(m[0], m[1], m[2], m[3], m[4], m[5], m[6], m[7], m[8]),
    )?;
    let region = Region::with_size(size);

    let element_type = fields.get("ElementType")
        .ok_or_else(|| bad("missing ElementType".to_string()))?;
    let msb = is_true(&fields, "BinaryDataByteOrderMSB") || is_true(&fields, "ElementByteOrderMSB");
    let data_file = fields.get("ElementDataFile").map(|s| s.as_str()).unwrap_or("LOCAL");

    let values = if data_file == "LOCAL" {
        decode(&bytes[data_start..], element_type, msb, region.len())?
    } else {
        let data_path = path.parent().unwrap_or_else(|| Path::new(".")).join(data_file);
        let data = fs::read(&data_path)?;
        decode(&data, element_type, msb, region.len())?
    };

    debug!("read {}: {:?} {}", path.display(), size, element_type);
    Grid::from_data(region, geometry, values.into_iter().map(T::from_f64).collect())
}

pub fn write_mha_to<T: MetaElement, W: Write>(w: &mut W, grid: &Grid<T>) -> Result<()> {
    let geo = grid.geometry();
    let size = grid.region().size;
    let d = geo.direction;
    writeln!(w, "ObjectType = Image")?;
    writeln!(w, "NDims = 3")?;
    writeln!(w, "BinaryData = True")?;
    writeln!(w, "BinaryDataByteOrderMSB = False")?;
    writeln!(w, "CompressedData = False")?;
    writeln!(w, "TransformMatrix = {} {} {} {} {} {} {} {} {}",
        d.x.x, d.x.y, d.x.z, d.y.x, d.y.y, d.y.z, d.z.x, d.z.y, d.z.z)?;
    writeln!(w, "Offset = {} {} {}", geo.origin.x, geo.origin.y, geo.origin.z)?;
    writeln!(w, "ElementSpacing = {} {} {}", geo.spacing.x, geo.spacing.y, geo.spacing.z)?;
    writeln!(w, "DimSize = {} {} {}", size[0], size[1], size[2])?;
    writeln!(w, "ElementType = {}", T::ELEMENT_TYPE)?;
    writeln!(w, "ElementDataFile = LOCAL")?;

    let mut buf = Vec::with_capacity(grid.data().len() * ::std::mem::size_of::<T>());
    for &x in grid.data() {
        x.write_le(&mut buf)?;
    }
    w.write_all(&buf)?;
    Ok(())
}

pub fn write_mha<T: MetaElement>(path: &Path, grid: &Grid<T>) -> Result<()> {
    let mut f = io::BufWriter::new(fs::File::create(path)?);
    write_mha_to(&mut f, grid)?;
    f.flush()?;
    Ok(())
}

#[test]
fn test() {
    use cgmath::Rad;

    let geo = Geometry::new(
        Point3::new(-10.0, 2.5, 3.0),
        Vector3::new(0.5, 0.75, 2.0),
        Matrix3::from_angle_y(Rad(0.3)),
    ).unwrap();
    let region = Region::with_size([3, 4, 2]);
    let mut grid = Grid::new(region, geo, 0i16);
    for (i, v) in region.voxels().enumerate() {
        grid[v] = i as i16 * 100 - 700;
    }

    let mut bytes = vec![];
    write_mha_to(&mut bytes, &grid).unwrap();
    let path = ::std::env::temp_dir().join(format!("voxskin-test-{}.mha", ::std::process::id()));
    fs::write(&path, &bytes).unwrap();

    // Read back as a different type
    let back: Grid<f32> = read_mha(&path).unwrap();
    let _ = fs::remove_file(&path);

    assert_eq!(back.region(), region);
    for v in region.voxels() {
        assert_eq!(back[v], grid[v] as f32);
    }
    let p = back.index_to_physical([2, 3, 1]);
    let q = grid.index_to_physical([2, 3, 1]);
    assert!((p.x - q.x).abs() < 1e-9 && (p.y - q.y).abs() < 1e-9 && (p.z - q.z).abs() < 1e-9);
}

#[test]
fn test_big_endian() {
    let mut bytes = b"NDims = 3\nDimSize = 2 1 1\nElementType = MET_USHORT\nBinaryDataByteOrderMSB = True\nElementDataFile = LOCAL\n".to_vec();
    bytes.extend_from_slice(&[0x01, 0x02, 0x00, 0x07]);
    let path = ::std::env::temp_dir().join(format!("voxskin-test-be-{}.mha", ::std::process::id()));
    fs::write(&path, &bytes).unwrap();
    let grid: Grid<u16> = read_mha(&path).unwrap();
    let _ = fs::remove_file(&path);
    assert_eq!(grid.data(), &[0x0102, 0x0007]);
    assert_eq!(grid.geometry().spacing, Vector3::new(1.0, 1.0, 1.0));
}

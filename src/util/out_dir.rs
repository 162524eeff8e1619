use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::fs;
use errors::Result;

/// Directory that output volumes are written into. Created (with any
/// missing parents) when the first file is.
pub struct OutDir {
    path: PathBuf,
    created: bool,
}

impl OutDir {
    pub fn new(path: PathBuf) -> Result<OutDir> {
        if path.is_file() {
            bail!("output path {} is a file", path.display());
        }
        Ok(OutDir { path, created: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create_file(&mut self, filename: &str) -> Result<fs::File> {
        if !self.created {
            match fs::create_dir_all(&self.path) {
                Ok(()) => (),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => (),
                Err(e) => Err(e)?,
            }
            self.created = true;
        }
        Ok(fs::File::create(self.path.join(filename))?)
    }
}

#[test]
fn test() {
    use std::io::Write;

    let root = ::std::env::temp_dir().join(format!("voxskin-outdir-{}", ::std::process::id()));
    let path = root.join("a").join("b");
    let _ = fs::remove_dir_all(&root);

    let mut out = OutDir::new(path.clone()).unwrap();
    assert!(!path.exists());
    out.create_file("x.txt").unwrap().write_all(b"x").unwrap();
    out.create_file("y.txt").unwrap();
    assert!(path.join("x.txt").is_file());
    assert!(OutDir::new(path.join("x.txt")).is_err());

    let _ = fs::remove_dir_all(&root);
}

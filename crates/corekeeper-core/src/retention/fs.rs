use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::CoreDir;
use crate::naming::is_core_name;

/// Core directory on the local filesystem.
///
/// The listing streams `read_dir` and never holds the whole directory in
/// memory. Names that are not valid UTF-8 are skipped and never touched.
#[derive(Debug, Clone)]
pub struct FsCoreDir {
    dir: PathBuf,
}

impl FsCoreDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl CoreDir for FsCoreDir {
    fn path(&self) -> &Path {
        &self.dir
    }

    fn entries(&self) -> io::Result<Box<dyn Iterator<Item = io::Result<String>> + '_>> {
        let listing = fs::read_dir(&self.dir)?;
        Ok(Box::new(listing.filter_map(|entry| {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err)),
            };
            let name = entry.file_name().into_string().ok()?;
            if !is_core_name(&name) {
                return None;
            }
            match entry.file_type() {
                Ok(kind) if kind.is_dir() => None,
                // Gone since the listing; nothing to retain or delete.
                Err(err) if err.kind() == io::ErrorKind::NotFound => None,
                _ => Some(Ok(name)),
            }
        })))
    }

    fn remove(&self, name: &str) -> io::Result<()> {
        fs::remove_file(self.dir.join(name))
    }
}

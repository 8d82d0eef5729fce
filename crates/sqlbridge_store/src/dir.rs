//! Directory-backed byte store.

use crate::error::{StoreError, StoreResult};
use crate::store::ByteStore;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Files the engine may leave next to a database file.
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

/// A byte store that keeps each blob as a file inside one directory.
///
/// The directory is either supplied by the caller (and left in place on
/// drop) or a private temporary directory that is deleted together with
/// the store.
///
/// # Example
///
/// ```no_run
/// use sqlbridge_store::{ByteStore, DirStore};
/// use std::path::Path;
///
/// let store = DirStore::open(Path::new("/var/lib/app/stores")).unwrap();
/// store.create("dbfile_42", None).unwrap();
/// let path = store.locate("dbfile_42").unwrap();
/// assert!(path.ends_with("dbfile_42"));
/// ```
#[derive(Debug)]
pub struct DirStore {
    root: PathBuf,
    // Held only to keep the temporary directory alive.
    _temp: Option<TempDir>,
}

impl DirStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn open(root: &Path) -> StoreResult<Self> {
        fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            _temp: None,
        })
    }

    /// Creates a store inside a fresh temporary directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temporary directory cannot be created.
    pub fn temporary() -> StoreResult<Self> {
        let temp = tempfile::Builder::new().prefix("sqlbridge-").tempdir()?;
        Ok(Self {
            root: temp.path().to_path_buf(),
            _temp: Some(temp),
        })
    }

    /// Returns the directory holding the blobs.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns true if this store deletes its directory on drop.
    #[must_use]
    pub fn is_temporary(&self) -> bool {
        self._temp.is_some()
    }

    fn path_for(&self, name: &str) -> StoreResult<PathBuf> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0']);
        if invalid {
            return Err(StoreError::invalid_name(name));
        }
        Ok(self.root.join(name))
    }
}

impl ByteStore for DirStore {
    fn locate(&self, name: &str) -> StoreResult<PathBuf> {
        self.path_for(name)
    }

    fn create(&self, name: &str, data: Option<&[u8]>) -> StoreResult<()> {
        let path = self.path_for(name)?;
        let mut file = fs::File::create(&path)?;
        if let Some(data) = data {
            file.write_all(data)?;
        }
        file.sync_all()?;
        tracing::trace!(name, bytes = data.map_or(0, <[u8]>::len), "created blob");
        Ok(())
    }

    fn read_all(&self, name: &str) -> StoreResult<Vec<u8>> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(StoreError::not_found(name)),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, name: &str) -> StoreResult<()> {
        let path = self.path_for(name)?;
        remove_if_present(&path)?;
        for suffix in SIDECAR_SUFFIXES {
            remove_if_present(&self.root.join(format!("{name}{suffix}")))?;
        }
        tracing::trace!(name, "removed blob");
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.path_for(name).map(|p| p.is_file()).unwrap_or(false)
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

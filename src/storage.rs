//! Persistent storage used for staging downloaded packages

#[cfg(test)]
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
#[cfg(test)]
use std::path::PathBuf;
#[cfg(test)]
use std::sync::{Mutex, PoisonError};

/// File operations consumed by download drivers
pub trait Storage: Send + Sync {
    /// Size of the file at `path`, `None` if it does not exist
    fn file_size(&self, path: &Path) -> io::Result<Option<u64>>;

    /// Delete the file at `path`
    fn delete(&self, path: &Path) -> io::Result<()>;

    /// Append `data` to `dir/name`, creating the file if needed
    fn append(&self, dir: &Path, name: &str, data: &[u8]) -> io::Result<()>;
}

/// Storage backed by the host filesystem
#[derive(Debug, Clone, Default)]
pub struct FsStorage;

impl FsStorage {
    pub fn new() -> Self {
        Self
    }
}

impl Storage for FsStorage {
    fn file_size(&self, path: &Path) -> io::Result<Option<u64>> {
        match fs::metadata(path) {
            Ok(meta) => Ok(Some(meta.len())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn append(&self, dir: &Path, name: &str, data: &[u8]) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(dir.join(name))?;
        file.write_all(data)
    }
}

/// In-memory storage, counts every access
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    accesses: Mutex<usize>,
    fail_delete: Mutex<bool>,
    fail_size: Mutex<bool>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch(&self) {
        *self.accesses.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    /// Contents of a stored file
    pub fn contents(&self, path: &Path) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Put a file in place without counting an access
    pub fn insert(&self, path: impl Into<PathBuf>, data: Vec<u8>) {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), data);
    }

    /// Number of storage operations performed
    pub fn access_count(&self) -> usize {
        *self.accesses.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every following delete fail
    pub fn set_fail_delete(&self, fail: bool) {
        *self.fail_delete.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    /// Make every following size query fail
    pub fn set_fail_size(&self, fail: bool) {
        *self.fail_size.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }
}

#[cfg(test)]
impl Storage for MemoryStorage {
    fn file_size(&self, path: &Path) -> io::Result<Option<u64>> {
        self.touch();
        if *self.fail_size.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(io::Error::other("stat failed"));
        }
        let files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(files.get(path).map(|f| f.len() as u64))
    }

    fn delete(&self, path: &Path) -> io::Result<()> {
        self.touch();
        if *self.fail_delete.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "delete refused"));
        }
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }

    fn append(&self, dir: &Path, name: &str, data: &[u8]) -> io::Result<()> {
        self.touch();
        let mut files = self.files.lock().unwrap_or_else(PoisonError::into_inner);
        files
            .entry(dir.join(name))
            .or_default()
            .extend_from_slice(data);
        Ok(())
    }
}

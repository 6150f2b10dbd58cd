//! Cache storage in a JSON file shared between processes.

use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use super::{CacheStore, Entries};
use crate::error::{MpesaError, Result};

/// File name used by [`FileStore::in_dir`].
pub const CACHE_FILE_NAME: &str = ".mpesa-cache.json";

/// JSON file holding every cache entry.
///
/// Each [`update`](CacheStore::update) takes an exclusive lock on a `<file>.lock` sidecar,
/// reads the whole map, and if the callback changed it, writes a temporary file next to the
/// cache and renames it over the original. Readers therefore never see a partial file.
///
/// A missing file is an empty cache. So is an unreadable or corrupt one; it is logged and
/// overwritten by the next write.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    /// Stores entries in the file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Stores entries in `.mpesa-cache.json` inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(CACHE_FILE_NAME))
    }

    /// Returns the cache file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".lock");
        PathBuf::from(name)
    }

    fn parent(&self) -> &Path {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        }
    }

    fn read(&self) -> Entries {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Entries::new(),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "cache file is unreadable, starting empty"
                );
                return Entries::new();
            }
        };
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Entries::new();
        }
        serde_json::from_slice(&bytes).unwrap_or_else(|err| {
            warn!(
                path = %self.path.display(),
                error = %err,
                "cache file is corrupt, starting empty"
            );
            Entries::new()
        })
    }

    fn write(&self, entries: &Entries) -> Result<()> {
        let parent = self.parent();
        let json = serde_json::to_vec_pretty(entries)
            .map_err(|err| MpesaError::configuration(format!("cannot encode cache: {err}")))?;
        let mut tmp =
            NamedTempFile::new_in(parent).map_err(|err| io_error("create", parent, &err))?;
        tmp.write_all(&json).map_err(|err| io_error("write", tmp.path(), &err))?;
        tmp.as_file().sync_all().map_err(|err| io_error("sync", tmp.path(), &err))?;
        tmp.persist(&self.path).map_err(|err| io_error("replace", &self.path, &err.error))?;
        debug!(path = %self.path.display(), entries = entries.len(), "cache file written");
        Ok(())
    }
}

impl CacheStore for FileStore {
    fn update(&self, f: &mut dyn FnMut(&mut Entries) -> bool) -> Result<()> {
        let parent = self.parent();
        fs::create_dir_all(parent).map_err(|err| io_error("create", parent, &err))?;

        let lock_path = self.lock_path();
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|err| io_error("open", &lock_path, &err))?;
        lock.lock().map_err(|err| io_error("lock", &lock_path, &err))?;

        let mut entries = self.read();
        let result = if f(&mut entries) { self.write(&entries) } else { Ok(()) };

        release(&lock, &lock_path);
        result
    }
}

fn release(lock: &File, path: &Path) {
    if let Err(err) = lock.unlock() {
        // Dropping the handle releases the lock anyway.
        warn!(path = %path.display(), error = %err, "failed to release cache lock");
    }
}

fn io_error(action: &str, path: &Path, err: &std::io::Error) -> MpesaError {
    MpesaError::configuration(format!("cannot {action} cache file {}: {err}", path.display()))
}

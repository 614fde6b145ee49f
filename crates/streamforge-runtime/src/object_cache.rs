//! Compiled-artifact caching, keyed by a signature the caller derives
//! from the pipeline's kernel/binding shape (so a byte-identical pipeline
//! recompiled in a later process can skip straight to the cached object).

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::error::{Result, RuntimeError};

pub trait ObjectCache: Send + Sync {
    fn load(&self, key: &str) -> Option<Vec<u8>>;
    fn store(&self, key: &str, object: &[u8]) -> Result<()>;
}

/// Process-local cache, cleared on exit. Used when `--enable-object-cache`
/// is set without a cache directory.
#[derive(Default)]
pub struct InMemoryObjectCache {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl ObjectCache for InMemoryObjectCache {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().get(key).cloned()
    }

    fn store(&self, key: &str, object: &[u8]) -> Result<()> {
        self.entries.lock().insert(key.to_string(), object.to_vec());
        Ok(())
    }
}

/// Cache backed by one file per key under `dir`, guarded by a process-wide
/// lock so concurrent compiles of the same pipeline don't race on the
/// same path.
pub struct FileObjectCache {
    dir: PathBuf,
    io_lock: Mutex<()>,
}

impl FileObjectCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), io_lock: Mutex::new(()) }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.so"))
    }
}

impl ObjectCache for FileObjectCache {
    fn load(&self, key: &str) -> Option<Vec<u8>> {
        let _guard = self.io_lock.lock();
        fs::read(self.path_for(key)).ok()
    }

    fn store(&self, key: &str, object: &[u8]) -> Result<()> {
        let _guard = self.io_lock.lock();
        fs::create_dir_all(&self.dir).map_err(|e| RuntimeError::ObjectCache(e.to_string()))?;
        fs::write(self.path_for(key), object).map_err(|e| RuntimeError::ObjectCache(e.to_string()))
    }
}

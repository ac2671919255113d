use crate::{error::Result, io::paths::models_cache_dir};

use log::debug;
use std::{
    fs,
    path::{Path, PathBuf},
};

/// Byte-blob store keyed by a fixed identifier. Purely an optimisation:
/// callers treat read failures as misses and swallow write failures.
pub trait BlobCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
}

/// One file per key under a cache directory.
#[derive(Debug, Clone)]
pub struct DiskCache {
    dir: PathBuf,
}

impl DiskCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Platform cache dir, e.g. `$XDG_CACHE_HOME/vocal-split-core/models`.
    pub fn open_default() -> Result<Self> {
        Ok(Self::new(models_cache_dir()?))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.onnx"))
    }
}

impl BlobCache for DiskCache {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        debug!("cache hit: {} ({} bytes)", path.display(), bytes.len());
        Ok(Some(bytes))
    }

    fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let dest = self.path_for(key);
        let tmp = dest.with_extension("part");
        fs::write(&tmp, bytes)?;

        if dest.exists() {
            fs::remove_file(&dest).ok();
        }
        fs::rename(&tmp, &dest)?;
        debug!("cached {} bytes at {}", bytes.len(), dest.display());
        Ok(())
    }
}

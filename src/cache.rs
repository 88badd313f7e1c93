use sha2::{Digest, Sha256};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A failure to read or write a cache entry.
#[derive(Debug, Error)]
#[error("cannot access cache entry '{path}': {source}")]
pub struct CacheError {
    path: PathBuf,
    #[source]
    source: std::io::Error,
}

/// Opaque values keyed by string, one file per key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    /// A cache stored under `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The file holding `key`: its sha256, in hex.
    pub fn path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        self.dir.join(format!("{:x}", hasher.finalize()))
    }

    /// The value of `key`, if cached.
    pub fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let path = self.path(key);

        match fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError { path, source }),
        }
    }

    /// Store `value` under `key`.
    pub fn put(&self, key: &str, value: &str) -> Result<(), CacheError> {
        let path = self.path(key);
        let error = |source| CacheError {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(&self.dir).map_err(error)?;
        fs::write(&path, value).map_err(error)
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn path_is_sha256() {
        let cache = Cache::new("/cache");
        assert_eq!(
            cache.path(""),
            PathBuf::from("/cache/e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn put_get() {
        // Setup
        let dir = TempDir::new().unwrap();
        let cache = Cache::new(dir.path().join("kslurm"));

        // Execute
        let before = cache.get("account:tester").unwrap();
        cache.put("account:tester", "def-lab").unwrap();
        let after = cache.get("account:tester").unwrap();

        // Verify
        assert_eq!(before, None);
        assert_eq!(after, Some("def-lab".to_string()));
        assert_eq!(cache.get("account:other").unwrap(), None);
        assert!(cache.path("account:tester").starts_with(cache.dir()));
    }
}

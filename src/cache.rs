use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub hash: String,
    pub code: String,
}

/// Content-addressed memo of transformed module text. Entries live in memory for the cache's
/// lifetime and, with a directory, persist as one JSON file per module.
#[derive(Debug, Default)]
pub struct TransformCache {
    cache_dir: Option<PathBuf>,
    memory: DashMap<PathBuf, CacheEntry>,
}

impl TransformCache {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Self {
        let cache_dir = cache_dir.into();
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).ok();
        }
        Self {
            cache_dir: Some(cache_dir),
            memory: DashMap::new(),
        }
    }

    /// Digest of the source plus a salt naming the transform configuration.
    pub fn compute_hash(source: &str, salt: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update([0u8]);
        hasher.update(source.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    fn get_cache_path(&self, file_path: &Path) -> Option<PathBuf> {
        let dir = self.cache_dir.as_ref()?;
        let safe_name = file_path
            .to_string_lossy()
            .replace('/', "_")
            .replace('\\', "_")
            .replace(':', "_");
        Some(dir.join(format!("{}.json", safe_name)))
    }

    pub fn get(&self, file_path: &Path, source: &str, salt: &str) -> Option<String> {
        let current_hash = Self::compute_hash(source, salt);

        if let Some(entry) = self.memory.get(file_path) {
            if entry.hash == current_hash {
                return Some(entry.code.clone());
            }
        }

        let cache_path = self.get_cache_path(file_path)?;
        if !cache_path.exists() {
            return None;
        }
        let data = fs::read_to_string(&cache_path).ok()?;
        let entry: CacheEntry = match serde_json::from_str(&data) {
            Ok(e) => e,
            Err(e) => {
                warn!(file = %file_path.display(), error = %e, "discarding corrupt cache entry");
                fs::remove_file(cache_path).ok();
                return None;
            }
        };

        if entry.hash == current_hash {
            let code = entry.code.clone();
            self.memory.insert(file_path.to_path_buf(), entry);
            Some(code)
        } else {
            None
        }
    }

    pub fn set(&self, file_path: &Path, source: &str, salt: &str, code: &str) {
        let entry = CacheEntry {
            hash: Self::compute_hash(source, salt),
            code: code.to_string(),
        };
        if let Some(cache_path) = self.get_cache_path(file_path) {
            if let Ok(data) = serde_json::to_string(&entry) {
                fs::write(cache_path, data).ok();
            }
        }
        self.memory.insert(file_path.to_path_buf(), entry);
    }

    pub fn len(&self) -> usize {
        self.memory.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memory.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_requires_same_source_and_salt() {
        let cache = TransformCache::in_memory();
        let path = Path::new("/s/a.jsx");
        cache.set(path, "<p/>", "h|Fragment", "h(\"p\", null)");
        assert_eq!(cache.get(path, "<p/>", "h|Fragment").as_deref(), Some("h(\"p\", null)"));
        assert_eq!(cache.get(path, "<p />", "h|Fragment"), None);
        assert_eq!(cache.get(path, "<p/>", "jsx|Frag"), None);
    }

    #[test]
    fn test_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = Path::new("/s/b.jsx");
        TransformCache::with_dir(dir.path()).set(path, "src", "salt", "out");
        let reopened = TransformCache::with_dir(dir.path());
        assert_eq!(reopened.get(path, "src", "salt").as_deref(), Some("out"));
    }

    #[test]
    fn test_corrupt_entry_is_discarded() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TransformCache::with_dir(dir.path());
        let path = Path::new("/s/c.jsx");
        let cache_file = cache.get_cache_path(path).unwrap();
        fs::write(&cache_file, "{ not json").unwrap();
        assert_eq!(cache.get(path, "src", "salt"), None);
        assert!(!cache_file.exists());
    }
}

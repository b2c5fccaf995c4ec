use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};

use anyhow::Context;

use super::{Cache, CacheEntry, ContentHash};

/// One JSON file per content hash under `dir`.
#[derive(Debug)]
pub struct DiskCache {
    dir: PathBuf,
    tmp_counter: AtomicUsize,
}

impl DiskCache {
    pub fn new(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create cache directory {}", dir.display()))?;
        Ok(Self {
            dir,
            tmp_counter: AtomicUsize::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, hash: &ContentHash) -> PathBuf {
        self.dir.join(format!("{}.json", hash))
    }
}

impl Cache for DiskCache {
    fn get(&self, hash: &ContentHash) -> anyhow::Result<Option<CacheEntry>> {
        let path = self.entry_path(hash);
        let content = match fs::read(&path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read {}", path.display()))
            }
        };
        let entry = serde_json::from_slice(&content)
            .with_context(|| format!("corrupt cache entry {}", path.display()))?;
        Ok(Some(entry))
    }

    fn put(&self, hash: &ContentHash, entry: &CacheEntry) -> anyhow::Result<()> {
        let path = self.entry_path(hash);
        if path.is_file() {
            return Ok(());
        }
        // Readers never observe a half-written entry.
        let tmp = self.dir.join(format!(
            "{}.{}.{}.tmp",
            hash,
            std::process::id(),
            self.tmp_counter.fetch_add(1, Ordering::Relaxed)
        ));
        let content = serde_json::to_vec(entry)?;
        let stored = fs::write(&tmp, content).and_then(|()| fs::rename(&tmp, &path));
        if let Err(err) = stored {
            let _ = fs::remove_file(&tmp);
            return Err(err).with_context(|| format!("failed to store {}", path.display()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::{DeclaredDependency, ExportSet, ExportedBinding, Exports};

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            code: "export const a = 1;\n".to_string(),
            dependencies: vec![DeclaredDependency::named("./b", ["b"])],
            exports: Exports::Static(ExportSet {
                bindings: vec![ExportedBinding::new("a", Some(0..20))],
                ..Default::default()
            }),
        }
    }

    #[test]
    fn persists_across_instances() {
        let temp_dir = TempDir::new().unwrap();
        let hash = ContentHash::of_bytes(b"module a");

        let cache = DiskCache::new(temp_dir.path()).unwrap();
        assert!(cache.get(&hash).unwrap().is_none());
        cache.put(&hash, &sample_entry()).unwrap();

        let reopened = DiskCache::new(temp_dir.path()).unwrap();
        assert_eq!(reopened.get(&hash).unwrap(), Some(sample_entry()));
    }

    #[test]
    fn corrupt_entry_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let hash = ContentHash::of_bytes(b"module a");
        fs::write(cache.entry_path(&hash), b"{ not json").unwrap();

        assert!(cache.get(&hash).is_err());
    }

    #[test]
    fn leaves_no_temporary_files() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        cache.put(&ContentHash::of_bytes(b"a"), &sample_entry()).unwrap();
        cache.put(&ContentHash::of_bytes(b"b"), &sample_entry()).unwrap();

        let mut names = fs::read_dir(cache.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect::<Vec<_>>();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|name| name.ends_with(".json")));
    }

    #[test]
    fn failed_store_cleans_up() {
        let temp_dir = TempDir::new().unwrap();
        let cache = DiskCache::new(temp_dir.path()).unwrap();
        let hash = ContentHash::of_bytes(b"a");
        // A non-empty directory where the entry belongs makes the rename fail.
        let blocker = cache.entry_path(&hash);
        fs::create_dir_all(blocker.join("inner")).unwrap();

        assert!(cache.put(&hash, &sample_entry()).is_err());
        let leftovers = fs::read_dir(cache.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".tmp"))
            .collect::<Vec<_>>();
        assert!(leftovers.is_empty(), "left {:?}", leftovers);
    }
}

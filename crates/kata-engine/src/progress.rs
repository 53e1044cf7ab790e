//! Persistent completion records.
//!
//! Each catalog set keeps one record, a JSON array of completed exercise
//! indices, stored under the set's key. Progress is a convenience: a missing
//! or corrupt record reads as "nothing completed" and a failed write is
//! logged and otherwise ignored.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::error::{KataError, Result};

/// Indices of completed exercises, in ascending order.
pub type CompletedSet = BTreeSet<usize>;

/// Key-value storage for progress records.
pub trait ProgressStore: fmt::Debug + Send + Sync {
    /// Returns the record stored under `key`, or `None` if there is none.
    fn read(&self, key: &str) -> Result<Option<String>>;

    /// Stores `contents` under `key`, replacing any previous record.
    fn write(&self, key: &str, contents: &str) -> Result<()>;

    /// Deletes the record under `key`. Deleting a missing record succeeds.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Parses a record. Non-integer and negative entries are skipped; anything
/// other than a JSON array yields `None`.
fn parse_record(contents: &str) -> Option<CompletedSet> {
    let value: serde_json::Value = serde_json::from_str(contents).ok()?;
    let entries = value.as_array()?;
    Some(
        entries
            .iter()
            .filter_map(serde_json::Value::as_u64)
            .filter_map(|index| usize::try_from(index).ok())
            .collect(),
    )
}

/// Reads the completed set for `key`, treating any failure as empty.
pub fn load_completed(store: &dyn ProgressStore, key: &str) -> CompletedSet {
    match store.read(key) {
        Ok(Some(contents)) => parse_record(&contents).unwrap_or_else(|| {
            warn!(key, "Ignoring corrupt progress record");
            CompletedSet::new()
        }),
        Ok(None) => CompletedSet::new(),
        Err(e) => {
            warn!(key, error = %e, "Failed to read progress, starting fresh");
            CompletedSet::new()
        }
    }
}

/// Writes `completed` under `key`. Failures are logged, not returned.
pub fn save_completed(store: &dyn ProgressStore, key: &str, completed: &CompletedSet) {
    let contents = match serde_json::to_string(completed) {
        Ok(contents) => contents,
        Err(e) => {
            warn!(key, error = %e, "Failed to serialize progress");
            return;
        }
    };
    if let Err(e) = store.write(key, &contents) {
        warn!(key, error = %e, "Failed to save progress");
    }
}

/// Deletes the record under `key`. Failures are logged, not returned.
pub fn clear_completed(store: &dyn ProgressStore, key: &str) {
    if let Err(e) = store.remove(key) {
        warn!(key, error = %e, "Failed to delete progress");
    }
}

// ============================================================================
// File store
// ============================================================================

/// Stores each record as `<key>.json` in a directory.
#[derive(Debug, Clone)]
pub struct FileProgressStore {
    dir: PathBuf,
}

impl FileProgressStore {
    /// Creates a store rooted at `dir`. The directory is created on first
    /// write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns `<data dir>/kata/progress` for the current platform.
    #[must_use]
    pub fn default_dir() -> Option<PathBuf> {
        dirs::data_dir().map(|dir| dir.join("kata").join("progress"))
    }

    /// Returns the store directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file holding the record for `key`.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", record_file_stem(key)))
    }
}

/// Returns the file name, without extension, a [`FileProgressStore`] uses
/// for `key`.
///
/// Characters other than ASCII letters, digits, `-` and `_` are replaced
/// with `_` so a key can never escape the store directory. Distinct keys
/// can therefore share a stem; catalog validation rejects such pairs.
#[must_use]
pub fn record_file_stem(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl ProgressStore for FileProgressStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(KataError::progress_store(key, e.to_string())),
        }
    }

    fn write(&self, key: &str, contents: &str) -> Result<()> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        std::fs::create_dir_all(&self.dir)
            .and_then(|()| std::fs::write(&tmp, contents))
            .and_then(|()| std::fs::rename(&tmp, &path))
            .map_err(|e| {
                std::fs::remove_file(&tmp).ok();
                KataError::progress_store(key, e.to_string())
            })
    }

    fn remove(&self, key: &str) -> Result<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(KataError::progress_store(key, e.to_string())),
        }
    }
}

// ============================================================================
// Memory store
// ============================================================================

/// Keeps records in memory. Used by tests and throwaway sessions.
#[derive(Debug, Default)]
pub struct MemoryProgressStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryProgressStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self, key: &str) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.records
            .lock()
            .map_err(|_| KataError::progress_store(key, "store lock poisoned"))
    }
}

impl ProgressStore for MemoryProgressStore {
    fn read(&self, key: &str) -> Result<Option<String>> {
        Ok(self.records(key)?.get(key).cloned())
    }

    fn write(&self, key: &str, contents: &str) -> Result<()> {
        self.records(key)?
            .insert(key.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.records(key)?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// A store whose every operation fails.
    #[derive(Debug)]
    struct BrokenStore;

    impl ProgressStore for BrokenStore {
        fn read(&self, key: &str) -> Result<Option<String>> {
            Err(KataError::progress_store(key, "disk on fire"))
        }

        fn write(&self, key: &str, _contents: &str) -> Result<()> {
            Err(KataError::progress_store(key, "disk on fire"))
        }

        fn remove(&self, key: &str) -> Result<()> {
            Err(KataError::progress_store(key, "disk on fire"))
        }
    }

    #[test]
    fn test_parse_record() {
        assert_eq!(
            parse_record("[3, 0, 1, 3]").unwrap(),
            CompletedSet::from([0, 1, 3])
        );
        assert_eq!(
            parse_record("[1, -2, \"x\", 2.5, 4]").unwrap(),
            CompletedSet::from([1, 4])
        );
        assert!(parse_record("{\"a\": 1}").is_none());
        assert!(parse_record("not json").is_none());
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryProgressStore::new();
        assert!(load_completed(&store, "k").is_empty());

        save_completed(&store, "k", &CompletedSet::from([2, 5]));
        assert_eq!(store.read("k").unwrap().as_deref(), Some("[2,5]"));
        assert_eq!(load_completed(&store, "k"), CompletedSet::from([2, 5]));

        clear_completed(&store, "k");
        assert_eq!(store.read("k").unwrap(), None);
    }

    #[test]
    fn test_corrupt_record_reads_as_empty() {
        let store = MemoryProgressStore::new();
        store.write("k", "{{{").unwrap();
        assert!(load_completed(&store, "k").is_empty());
    }

    #[test]
    fn test_store_failures_fail_open() {
        assert!(load_completed(&BrokenStore, "k").is_empty());
        save_completed(&BrokenStore, "k", &CompletedSet::from([1]));
        clear_completed(&BrokenStore, "k");
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileProgressStore::new(dir.path().join("nested"));

        assert_eq!(store.read("html-progress").unwrap(), None);
        store.write("html-progress", "[0]").unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.path().join("nested/html-progress.json")).unwrap(),
            "[0]"
        );
        assert_eq!(store.read("html-progress").unwrap().as_deref(), Some("[0]"));

        store.write("html-progress", "[0,1]").unwrap();
        assert_eq!(load_completed(&store, "html-progress"), CompletedSet::from([0, 1]));
        assert!(!dir.path().join("nested/html-progress.json.tmp").exists());

        store.remove("html-progress").unwrap();
        store.remove("html-progress").unwrap();
        assert_eq!(store.read("html-progress").unwrap(), None);
    }

    #[test]
    fn test_file_store_sanitizes_keys() {
        let store = FileProgressStore::new("/data");
        assert_eq!(
            store.path_for("../etc/passwd"),
            PathBuf::from("/data/___etc_passwd.json")
        );
    }

    #[test]
    fn test_record_file_stem() {
        assert_eq!(record_file_stem("html-basics_v2"), "html-basics_v2");
        assert_eq!(record_file_stem("css.progress"), "css_progress");
        assert_eq!(record_file_stem("café"), "caf_");
    }

    #[test]
    fn test_default_dir_ends_with_kata_progress() {
        if let Some(dir) = FileProgressStore::default_dir() {
            assert!(dir.ends_with("kata/progress"));
        }
    }
}

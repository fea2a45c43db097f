//! Durable key-value store
//! Holds `apps` (the ordered record sequence) and `settings` (flat map).
//! The store is an explicitly owned handle injected into every service;
//! there is no process-wide instance.

#[cfg(feature = "desktop")]
pub mod plugin;

use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::apps::AppRecord;
use crate::error::{ShellError, ShellResult};

pub const APPS_KEY: &str = "apps";
pub const SETTINGS_KEY: &str = "settings";

/// Every mutation is durable once it returns
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> ShellResult<Option<Value>>;
    fn set(&self, key: &str, value: Value) -> ShellResult<()>;
    fn delete(&self, key: &str) -> ShellResult<()>;
    fn clear(&self) -> ShellResult<()>;
}

/// Reads the ordered app collection (empty when never written)
pub fn load_apps(store: &dyn KeyValueStore) -> ShellResult<Vec<AppRecord>> {
    match store.get(APPS_KEY)? {
        Some(value) => Ok(serde_json::from_value(value)?),
        None => Ok(Vec::new()),
    }
}

/// Replaces the whole collection in one write
pub fn save_apps(store: &dyn KeyValueStore, apps: &[AppRecord]) -> ShellResult<()> {
    store.set(APPS_KEY, serde_json::to_value(apps)?)
}

/// Reads the raw settings map; a non-object value counts as unset
pub fn load_settings(store: &dyn KeyValueStore) -> ShellResult<Option<Map<String, Value>>> {
    Ok(match store.get(SETTINGS_KEY)? {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    })
}

pub fn save_settings(store: &dyn KeyValueStore, settings: &Map<String, Value>) -> ShellResult<()> {
    store.set(SETTINGS_KEY, Value::Object(settings.clone()))
}

/// A single JSON object on disk, replaced atomically on every write
///
/// Writes go to a hidden sibling temp file which is fsync'd and renamed over
/// the target, so readers only ever see a complete previous or next state.
pub struct JsonFileStore {
    path: PathBuf,
    entries: RwLock<Map<String, Value>>,
}

impl JsonFileStore {
    /// Opens (or lazily creates) the store file
    /// A file that exists but cannot be parsed is an error, not an empty store
    pub fn open(path: impl Into<PathBuf>) -> ShellResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            let content = fs::read_to_string(&path)?;
            if content.trim().is_empty() {
                Map::new()
            } else {
                match serde_json::from_str::<Value>(&content)? {
                    Value::Object(map) => map,
                    _ => {
                        return Err(ShellError::Store(format!(
                            "{} does not hold a JSON object",
                            path.display()
                        )))
                    }
                }
            }
        } else {
            Map::new()
        };

        info!("Opened store at {:?} ({} keys)", path, entries.len());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Applies `f` to a copy of the entries, persists it, then publishes it
    /// A failed write leaves both disk and memory untouched
    fn mutate(&self, f: impl FnOnce(&mut Map<String, Value>)) -> ShellResult<()> {
        let mut entries = self.entries.write();
        let mut next = entries.clone();
        f(&mut next);
        write_atomically(&self.path, &Value::Object(next.clone()))?;
        *entries = next;
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> ShellResult<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> ShellResult<()> {
        self.mutate(|entries| {
            entries.insert(key.to_string(), value);
        })
    }

    fn delete(&self, key: &str) -> ShellResult<()> {
        self.mutate(|entries| {
            entries.remove(key);
        })
    }

    fn clear(&self) -> ShellResult<()> {
        self.mutate(Map::clear)
    }
}

fn write_atomically(path: &Path, value: &Value) -> ShellResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| ShellError::Store(format!("{} has no parent directory", path.display())))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .ok_or_else(|| ShellError::Store(format!("{} has no file name", path.display())))?;
    let tmp_path = parent.join(format!(".{}.tmp", file_name.to_string_lossy()));

    let contents = serde_json::to_vec_pretty(value)?;
    let mut tmp_file = File::create(&tmp_path)?;
    tmp_file.write_all(&contents)?;
    tmp_file.sync_all()?;
    drop(tmp_file);

    fs::rename(&tmp_path, path)?;
    debug!("Persisted store to {:?} ({} bytes)", path, contents.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(id: &str) -> AppRecord {
        AppRecord {
            id: id.to_string(),
            name: format!("App {}", id),
            url: "https://example.com/".to_string(),
            domain: "example.com".to_string(),
            logo: String::new(),
        }
    }

    #[test]
    fn test_round_trips_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let store = JsonFileStore::open(&path).unwrap();
        save_apps(&store, &[record("1"), record("2")]).unwrap();
        store.set(SETTINGS_KEY, json!({ "startAtLogin": true })).unwrap();

        let reopened = JsonFileStore::open(&path).unwrap();
        let apps = load_apps(&reopened).unwrap();
        assert_eq!(apps.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(reopened.get(SETTINGS_KEY).unwrap(), Some(json!({ "startAtLogin": true })));
        assert!(!dir.path().join(".store.json.tmp").exists());
    }

    #[test]
    fn test_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("nested").join("store.json")).unwrap();
        assert!(load_apps(&store).unwrap().is_empty());
        assert_eq!(store.get("anything").unwrap(), None);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        fs::write(&path, "[1, 2").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(ShellError::Store(_))));

        fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(JsonFileStore::open(&path), Err(ShellError::Store(_))));
    }

    #[test]
    fn test_delete_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = JsonFileStore::open(&path).unwrap();

        store.set("a", json!(1)).unwrap();
        store.set("b", json!(2)).unwrap();
        store.delete("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap(), Some(json!(2)));

        store.clear().unwrap();
        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("b").unwrap(), None);
    }
}

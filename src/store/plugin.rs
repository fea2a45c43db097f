use serde_json::Value;
use std::sync::Arc;
use tauri::{AppHandle, Runtime};
use tauri_plugin_store::{Store, StoreExt};
use tracing::info;

use super::KeyValueStore;
use crate::error::{ShellError, ShellResult};

/// `KeyValueStore` backed by tauri-plugin-store
/// The plugin keeps the file under the app data directory; every mutation
/// is followed by an explicit save so it is durable when the command returns.
pub struct PluginStore<R: Runtime> {
    store: Arc<Store<R>>,
}

impl<R: Runtime> PluginStore<R> {
    pub fn open(app: &AppHandle<R>, file_name: &str) -> ShellResult<Self> {
        let store = app
            .store(file_name)
            .map_err(|e| ShellError::Store(format!("Failed to open {}: {}", file_name, e)))?;
        info!("Opened plugin store {}", file_name);
        Ok(Self { store })
    }

    fn save(&self) -> ShellResult<()> {
        self.store
            .save()
            .map_err(|e| ShellError::Store(format!("Failed to save store: {}", e)))
    }
}

impl<R: Runtime> KeyValueStore for PluginStore<R> {
    fn get(&self, key: &str) -> ShellResult<Option<Value>> {
        Ok(self.store.get(key))
    }

    fn set(&self, key: &str, value: Value) -> ShellResult<()> {
        self.store.set(key, value);
        self.save()
    }

    fn delete(&self, key: &str) -> ShellResult<()> {
        self.store.delete(key);
        self.save()
    }

    fn clear(&self) -> ShellResult<()> {
        self.store.clear();
        self.save()
    }
}

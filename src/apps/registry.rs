use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::normalize::normalize_url;
use super::{AppDraft, AppRecord, EventBus, IdGenerator};
use crate::error::{ShellError, ShellResult};
use crate::network::Reachability;
use crate::session::{is_valid_app_id, PartitionId, PartitionManager};
use crate::store::{self, KeyValueStore};

/// The Shell's app collection and its partition lifecycle
///
/// Every mutation reads the whole collection, changes it and writes it back
/// while holding `write_lock`, so concurrent commands in this process never
/// lose each other's updates. The lock is never held across the network probe.
pub struct AppRegistry {
    store: Arc<dyn KeyValueStore>,
    partitions: Arc<PartitionManager>,
    probe: Arc<dyn Reachability>,
    events: Arc<EventBus>,
    ids: IdGenerator,
    write_lock: Mutex<()>,
}

impl AppRegistry {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        partitions: Arc<PartitionManager>,
        probe: Arc<dyn Reachability>,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            store,
            partitions,
            probe,
            events,
            ids: IdGenerator::new(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn partitions(&self) -> &Arc<PartitionManager> {
        &self.partitions
    }

    pub fn list_apps(&self) -> ShellResult<Vec<AppRecord>> {
        store::load_apps(self.store.as_ref())
    }

    pub fn get_app(&self, id: &str) -> ShellResult<Option<AppRecord>> {
        Ok(self.list_apps()?.into_iter().find(|app| app.id == id))
    }

    pub fn require_app(&self, id: &str) -> ShellResult<AppRecord> {
        self.get_app(id)?
            .ok_or_else(|| ShellError::AppNotFound(id.to_string()))
    }

    /// Draft -> Validated -> Probed -> Persisted -> SessionProvisioned
    /// Any failure aborts the whole registration and leaves no record behind
    pub async fn register_app(&self, draft: AppDraft) -> ShellResult<AppRecord> {
        if draft.url.trim().is_empty() {
            warn!("Rejected registration without URL");
            return Err(ShellError::EmptyUrl);
        }

        let normalized = normalize_url(&draft.url)?;
        info!("Registering app for {}", normalized);

        if let Err(e) = self.probe.check(&normalized).await {
            error!("Error adding app: {}", e);
            return Err(e);
        }

        let record = self.persist_new(draft, normalized)?;

        if let Err(e) = self.partitions.provision(&record.partition()) {
            error!("Failed to provision partition for app {}: {}", record.id, e);
            self.rollback(&record.id);
            return Err(e);
        }

        self.events.publish_updated();
        info!("Registered app {} ({})", record.id, record.url);
        Ok(record)
    }

    fn persist_new(&self, draft: AppDraft, normalized: String) -> ShellResult<AppRecord> {
        let _guard = self.write_lock.lock();
        let mut apps = self.list_apps()?;

        // Never hand out an id whose partition still exists on disk, so a
        // new record always starts from empty storage
        let id = self.ids.next_id(|candidate| {
            apps.iter().any(|app| app.id == candidate)
                || self.partitions.exists(&PartitionId::for_app(candidate))
        });

        let record = draft.into_record(id, normalized)?;
        apps.push(record.clone());
        store::save_apps(self.store.as_ref(), &apps)?;
        Ok(record)
    }

    fn rollback(&self, id: &str) {
        let _guard = self.write_lock.lock();
        let result = self.list_apps().and_then(|mut apps| {
            apps.retain(|app| app.id != id);
            store::save_apps(self.store.as_ref(), &apps)
        });
        if let Err(e) = result {
            error!("Failed to roll back registration of {}: {}", id, e);
        }
    }

    /// Inserts or replaces a complete record by id
    /// The URL is normalized and the domain re-derived before storage
    pub fn save_app(&self, mut record: AppRecord) -> ShellResult<AppRecord> {
        if !is_valid_app_id(&record.id) {
            return Err(ShellError::InvalidAppId(record.id));
        }
        if record.url.trim().is_empty() {
            return Err(ShellError::EmptyUrl);
        }
        record.url = normalize_url(&record.url)?;
        record.domain = url::Url::parse(&record.url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| ShellError::InvalidUrl(record.url.clone()))?;

        let inserted = {
            let _guard = self.write_lock.lock();
            let mut apps = self.list_apps()?;
            let inserted = match apps.iter_mut().find(|app| app.id == record.id) {
                Some(existing) => {
                    *existing = record.clone();
                    false
                }
                None => {
                    apps.push(record.clone());
                    true
                }
            };
            store::save_apps(self.store.as_ref(), &apps)?;
            inserted
        };

        if inserted {
            // A new id never inherits storage a crash left behind
            let partition = record.partition();
            if self.partitions.exists(&partition) {
                warn!("Discarding leftover partition {} for new app", partition);
                self.partitions.remove(&partition)?;
            }
            self.partitions.provision(&partition)?;
        }

        self.events.publish_updated();
        info!("Saved app {} (new: {})", record.id, inserted);
        Ok(record)
    }

    /// Returns false, leaving the record untouched, when the name is blank
    pub fn rename_app(&self, id: &str, new_name: &str) -> ShellResult<bool> {
        let new_name = new_name.trim();
        if new_name.is_empty() {
            warn!("Ignoring blank rename of app {}", id);
            return Ok(false);
        }

        {
            let _guard = self.write_lock.lock();
            let mut apps = self.list_apps()?;
            let app = apps
                .iter_mut()
                .find(|app| app.id == id)
                .ok_or_else(|| ShellError::AppNotFound(id.to_string()))?;
            app.name = new_name.to_string();
            store::save_apps(self.store.as_ref(), &apps)?;
        }

        self.events.publish_updated();
        info!("Renamed app {} to {:?}", id, new_name);
        Ok(true)
    }

    /// Removes the record first, then tears its partition down, so a reader
    /// never sees a record whose storage is mid-teardown
    pub fn delete_app(&self, id: &str) -> ShellResult<bool> {
        {
            let _guard = self.write_lock.lock();
            let mut apps = self.list_apps()?;
            let before = apps.len();
            apps.retain(|app| app.id != id);
            if apps.len() == before {
                return Err(ShellError::AppNotFound(id.to_string()));
            }
            store::save_apps(self.store.as_ref(), &apps)?;
        }
        self.events.publish_updated();

        // Ids outside the partition alphabet (older stores) never had a
        // directory to remove
        if !is_valid_app_id(id) {
            warn!("Deleted app {:?} has no partition", id);
            return Ok(true);
        }

        let partition = PartitionId::for_app(id);
        if let Err(e) = self.partitions.remove(&partition) {
            error!("App {} deleted but its partition was not removed: {}", id, e);
            return Err(e);
        }

        info!("Deleted app {}", id);
        Ok(true)
    }

    /// Applies a new display order; `ids` must be a permutation of the
    /// registered ids, and only the order changes
    pub fn reorder_apps(&self, ids: &[String]) -> ShellResult<Vec<AppRecord>> {
        let reordered = {
            let _guard = self.write_lock.lock();
            let apps = self.list_apps()?;
            if ids.len() != apps.len() {
                return Err(ShellError::InvalidOrder);
            }

            let mut by_id: HashMap<String, AppRecord> =
                apps.into_iter().map(|app| (app.id.clone(), app)).collect();
            let reordered = ids
                .iter()
                .map(|id| by_id.remove(id).ok_or(ShellError::InvalidOrder))
                .collect::<ShellResult<Vec<_>>>()?;

            store::save_apps(self.store.as_ref(), &reordered)?;
            reordered
        };

        self.events.publish_updated();
        info!("Reordered {} apps", reordered.len());
        Ok(reordered)
    }

    /// Wipes one app's cookies, cache and storage; the record stays
    pub fn clear_app_storage(&self, id: &str) -> ShellResult<bool> {
        let app = self.require_app(id)?;
        self.partitions.clear_storage(&app.partition())?;
        Ok(true)
    }

    /// Wipes the whole store (apps and settings) and every partition,
    /// including orphans a crash may have left behind
    pub fn clear_all_data(&self) -> ShellResult<()> {
        let count = {
            let _guard = self.write_lock.lock();
            let count = self.list_apps()?.len();
            self.store.clear()?;
            count
        };
        self.events.publish_updated();

        let removed = self.partitions.remove_all()?;
        info!("Cleared all data ({} apps, {} partitions)", count, removed);
        Ok(())
    }
}

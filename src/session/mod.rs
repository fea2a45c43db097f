//! Per-app storage partitions
//! Every registered app browses inside its own partition `app-<id>`: a
//! directory holding the webview's cookies, cache and local storage plus
//! the partition's explicit policy (`partition.json`).
//!
//! Lifecycle: provisioned when the record is saved (or lazily on first
//! use), wiped by "clear app data", removed with the record. A new record id
//! always means a new, empty partition.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::app::APP_IDENTIFIER;
use crate::error::{ShellError, ShellResult};

/// Policy file kept inside each partition directory
pub const POLICY_FILE: &str = "partition.json";

const PARTITION_PREFIX: &str = "app-";

const ONE_YEAR_SECS: u64 = 365 * 24 * 60 * 60;

/// Identifier of one app's partition, always `app-<id>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartitionId(String);

impl PartitionId {
    pub fn for_app(app_id: &str) -> Self {
        Self(format!("{}{}", PARTITION_PREFIX, app_id))
    }

    /// Parses a partition directory name back into an id
    pub fn from_dir_name(name: &str) -> Option<Self> {
        name.strip_prefix(PARTITION_PREFIX)
            .filter(|id| is_valid_app_id(id))
            .map(Self::for_app)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn app_id(&self) -> &str {
        &self.0[PARTITION_PREFIX.len()..]
    }

    /// Name of the persistent webview partition (`persist:app-<id>`)
    pub fn persist_name(&self) -> String {
        format!("persist:{}", self.0)
    }

    /// Stable 16-byte id of the WebKit data store backing this partition on
    /// macOS, where the engine keys storage by identifier instead of directory
    pub fn data_store_identifier(&self) -> [u8; 16] {
        let namespace = Uuid::new_v5(&Uuid::NAMESPACE_DNS, APP_IDENTIFIER.as_bytes());
        Uuid::new_v5(&namespace, self.0.as_bytes()).into_bytes()
    }
}

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// App ids double as directory names, so they stay within a safe alphabet
pub fn is_valid_app_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Long-lived cookie that marks a partition as persistent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerCookie {
    pub name: String,
    pub value: String,
    pub max_age_secs: u64,
    pub secure: bool,
}

impl Default for MarkerCookie {
    fn default() -> Self {
        Self {
            name: "session-persistence".to_string(),
            value: "true".to_string(),
            max_age_secs: ONE_YEAR_SECS,
            secure: true,
        }
    }
}

/// Security-relevant defaults applied to a partition, kept reviewable on disk
///
/// Wrapped sites are trusted by the user who added them: permission requests
/// (camera, notifications, ...) are granted. The shell adds no content policy
/// of its own, so a site runs under exactly the CSP its server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionPolicy {
    pub auto_grant_permissions: bool,
    pub persistence_marker: Option<MarkerCookie>,
}

impl Default for PartitionPolicy {
    fn default() -> Self {
        Self {
            auto_grant_permissions: true,
            persistence_marker: Some(MarkerCookie::default()),
        }
    }
}

/// Platform hook for storage held by a live webview of the partition
pub trait SessionBackend: Send + Sync {
    fn clear_live_storage(&self, partition: &PartitionId) -> Result<(), String>;
}

/// Headless backend: partitions only exist as directories
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectoryBackend;

impl SessionBackend for DirectoryBackend {
    fn clear_live_storage(&self, _partition: &PartitionId) -> Result<(), String> {
        Ok(())
    }
}

/// Owns the partition directory tree (`<data>/sessions/app-<id>/`)
pub struct PartitionManager {
    root: PathBuf,
    template: PartitionPolicy,
    backend: Arc<dyn SessionBackend>,
}

impl PartitionManager {
    pub fn new(root: impl Into<PathBuf>, backend: Arc<dyn SessionBackend>) -> Self {
        Self {
            root: root.into(),
            template: PartitionPolicy::default(),
            backend,
        }
    }

    /// Replaces the policy written into newly provisioned partitions
    pub fn with_policy(mut self, template: PartitionPolicy) -> Self {
        self.template = template;
        self
    }

    pub fn dir_for(&self, partition: &PartitionId) -> ShellResult<PathBuf> {
        if !is_valid_app_id(partition.app_id()) {
            return Err(ShellError::InvalidAppId(partition.app_id().to_string()));
        }
        Ok(self.root.join(partition.as_str()))
    }

    /// Ensures the directory exists and carries a policy; idempotent
    pub fn provision(&self, partition: &PartitionId) -> ShellResult<PathBuf> {
        let dir = self.dir_for(partition)?;
        fs::create_dir_all(&dir)?;

        let policy_path = dir.join(POLICY_FILE);
        if !policy_path.exists() {
            fs::write(&policy_path, serde_json::to_vec_pretty(&self.template)?)?;
            info!("Provisioned partition {} at {:?}", partition, dir);
        } else {
            debug!("Partition {} already provisioned", partition);
        }
        Ok(dir)
    }

    /// Policy of a partition; partitions are configured lazily, so a missing
    /// or unreadable policy yields the current template
    pub fn policy(&self, partition: &PartitionId) -> PartitionPolicy {
        let path = match self.dir_for(partition) {
            Ok(dir) => dir.join(POLICY_FILE),
            Err(_) => return self.template.clone(),
        };
        match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!("Unreadable policy for {}: {}", partition, e);
                self.template.clone()
            }),
            Err(_) => self.template.clone(),
        }
    }

    pub fn exists(&self, partition: &PartitionId) -> bool {
        self.dir_for(partition).map(|d| d.is_dir()).unwrap_or(false)
    }

    /// Wipes cookies, cache and local/session storage but keeps the policy
    pub fn clear_storage(&self, partition: &PartitionId) -> ShellResult<()> {
        let dir = self.dir_for(partition)?;
        let failed = |reason: String| ShellError::StorageClearFailed {
            partition: partition.to_string(),
            reason,
        };

        self.backend.clear_live_storage(partition).map_err(failed)?;

        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(failed(e.to_string())),
        };

        for entry in entries {
            let entry = entry.map_err(|e| failed(e.to_string()))?;
            if entry.file_name() == POLICY_FILE {
                continue;
            }
            let path = entry.path();
            let result = if path.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            result.map_err(|e| failed(format!("{}: {}", path.display(), e)))?;
        }

        info!("Cleared storage of partition {}", partition);
        Ok(())
    }

    /// Clears then deletes the partition; a missing directory is fine
    pub fn remove(&self, partition: &PartitionId) -> ShellResult<()> {
        self.clear_storage(partition)?;

        let dir = self.dir_for(partition)?;
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!("Removed partition directory {:?}", dir);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ShellError::StorageClearFailed {
                partition: partition.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Partitions present on disk, including orphans of deleted records
    pub fn list(&self) -> ShellResult<Vec<PartitionId>> {
        let entries = match fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut partitions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.path().is_dir() {
                continue;
            }
            if let Some(partition) = entry.file_name().to_str().and_then(PartitionId::from_dir_name) {
                partitions.push(partition);
            }
        }
        partitions.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(partitions)
    }

    /// Removes every partition, returning how many were removed
    pub fn remove_all(&self) -> ShellResult<usize> {
        let partitions = self.list()?;
        for partition in &partitions {
            self.remove(partition)?;
        }
        Ok(partitions.len())
    }
}

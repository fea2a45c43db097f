use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::app::APP_ID;
use crate::session::PartitionPolicy;

/// Shell configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    /// Root of everything the shell writes (store, partitions, icon cache)
    pub data_dir: PathBuf,

    /// Directory desktop shortcuts are written to
    pub shortcut_dir: PathBuf,

    /// Default window icon restored when leaving an app view
    pub default_icon: Option<PathBuf>,

    /// Network limits
    pub network: NetworkConfig,

    /// Policy written into every newly provisioned partition
    pub partition_policy: PartitionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Upper bound for the registration reachability probe, in milliseconds
    pub probe_timeout_ms: u64,

    /// Upper bound for a whole icon download, in milliseconds
    pub download_timeout_ms: u64,

    /// Maximum number of HTTP redirects followed while downloading an icon
    pub max_redirect_hops: usize,

    /// Largest icon body accepted, in bytes
    pub max_icon_bytes: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 10_000, // 10s
            download_timeout_ms: 30_000, // 30s
            max_redirect_hops: 5,
            max_icon_bytes: 10 * 1024 * 1024, // 10 MiB
        }
    }
}

impl NetworkConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }
}

impl Default for ShellConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_ID);
        let shortcut_dir = dirs::desktop_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            data_dir,
            shortcut_dir,
            default_icon: None,
            network: NetworkConfig::default(),
            partition_policy: PartitionPolicy::default(),
        }
    }
}

impl ShellConfig {
    /// Builds a configuration rooted at `data_dir`, keeping every other default
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            shortcut_dir: data_dir.join("shortcuts"),
            data_dir,
            ..Self::default()
        }
    }

    /// Per-app storage partitions live here, one subdirectory per `app-<id>`
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// Downloaded and converted icons
    pub fn icon_cache_dir(&self) -> PathBuf {
        self.data_dir.join("icons")
    }

    /// The durable key-value store file used by the headless store
    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(crate::app::STORE_FILE_NAME)
    }

    /// Load configuration from file, falling back to defaults
    pub fn load() -> Self {
        if let Some(config_path) = Self::get_config_path() {
            if config_path.exists() {
                match std::fs::read_to_string(&config_path)
                    .map_err(|e| e.to_string())
                    .and_then(|contents| {
                        serde_json::from_str::<ShellConfig>(&contents).map_err(|e| e.to_string())
                    }) {
                    Ok(config) => {
                        info!("Loaded shell config from {:?}", config_path);
                        return config;
                    }
                    Err(e) => warn!("Ignoring unreadable shell config {:?}: {}", config_path, e),
                }
            }
        }

        Self::default()
    }

    fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_ID).join("shell.config.json"))
    }
}

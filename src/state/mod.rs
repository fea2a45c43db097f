/// Application state shared by every command handler
///
/// Bundles the injected services the shell operates on:
/// - the app registry (collection, partitions, probe, events)
/// - the shortcut service (icon pipeline and platform writers)
/// - settings and the login item
/// - the launch target resolved from `--app-id`
///
/// Everything here is an explicit handle built once at startup; nothing is
/// reached through a global.
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

use crate::apps::{AppRegistry, EventBus};
use crate::config::ShellConfig;
use crate::error::{ShellError, ShellResult};
use crate::launch::StartupTarget;
use crate::network::{Downloader, HttpProbe, Reachability};
use crate::session::{PartitionManager, SessionBackend};
use crate::settings::{LoginItems, SettingsService};
use crate::shortcut::{IconPipeline, ShortcutService};
use crate::store::KeyValueStore;

/// Central application state container
/// Managed by Tauri and handed to commands as `State<'_, AppState>`
pub struct AppState {
    config: ShellConfig,
    registry: Arc<AppRegistry>,
    shortcuts: ShortcutService,
    settings: SettingsService,
    startup_target: Mutex<Option<StartupTarget>>,
}

impl AppState {
    /// Wires the services over the given store and platform hooks
    pub fn new(
        config: ShellConfig,
        store: Arc<dyn KeyValueStore>,
        session_backend: Arc<dyn SessionBackend>,
        login_items: Arc<dyn LoginItems>,
    ) -> ShellResult<Self> {
        let probe: Arc<dyn Reachability> = Arc::new(HttpProbe::new(config.network.probe_timeout())?);
        Self::with_probe(config, store, session_backend, login_items, probe)
    }

    /// Same as `new` with a caller-supplied reachability check
    pub fn with_probe(
        config: ShellConfig,
        store: Arc<dyn KeyValueStore>,
        session_backend: Arc<dyn SessionBackend>,
        login_items: Arc<dyn LoginItems>,
        probe: Arc<dyn Reachability>,
    ) -> ShellResult<Self> {
        let partitions = Arc::new(
            PartitionManager::new(config.sessions_dir(), session_backend)
                .with_policy(config.partition_policy.clone()),
        );
        let registry = Arc::new(AppRegistry::new(
            store.clone(),
            partitions,
            probe,
            Arc::new(EventBus::new()),
        ));

        let downloader = Downloader::new(
            config.network.max_redirect_hops,
            config.network.download_timeout(),
            config.network.max_icon_bytes,
        )
            .map_err(|e| ShellError::Io(std::io::Error::other(e.to_string())))?;
        let icons = IconPipeline::new(downloader, config.icon_cache_dir());
        let shortcuts = ShortcutService::for_current_exe(icons, config.shortcut_dir.clone())?;

        info!("Shell state ready, data under {:?}", config.data_dir);
        Ok(Self {
            settings: SettingsService::new(store, login_items),
            config,
            registry,
            shortcuts,
            startup_target: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &ShellConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<AppRegistry> {
        &self.registry
    }

    pub fn shortcuts(&self) -> &ShortcutService {
        &self.shortcuts
    }

    pub fn settings(&self) -> &SettingsService {
        &self.settings
    }

    pub fn set_startup_target(&self, target: StartupTarget) {
        *self.startup_target.lock() = Some(target);
    }

    /// The launch target, handed out once; later calls get `Home`
    pub fn take_startup_target(&self) -> StartupTarget {
        self.startup_target.lock().take().unwrap_or(StartupTarget::Home)
    }

    /// Wipes records, settings and every partition, then drops the login item
    pub fn clear_all_data(&self) -> ShellResult<()> {
        self.registry.clear_all_data()?;
        if let Err(e) = self.settings.reset_login_item() {
            warn!("Data cleared but login item could not be removed: {}", e);
        }
        Ok(())
    }
}

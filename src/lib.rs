//! Appalyzer turns websites into desktop apps: each registered site gets
//! its own window, its own persistent storage partition and an optional
//! desktop shortcut that opens it directly.

pub mod app;
pub mod apps;
pub mod config;
pub mod error;
pub mod launch;
pub mod network;
pub mod platform;
pub mod session;
pub mod settings;
pub mod shortcut;
pub mod site_view;
pub mod state;
pub mod store;

#[cfg(feature = "desktop")]
mod commands;

use tracing_subscriber::EnvFilter;

pub use apps::{AppDraft, AppRecord, AppRegistry};
pub use config::ShellConfig;
pub use error::{ShellError, ShellResult};
pub use state::AppState;

/// Installs the global tracing subscriber (`RUST_LOG`, default
/// `appalyzer=info`); later calls are no-ops
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("appalyzer=info,appalyzer_lib=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(feature = "desktop")]
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    use tauri::Manager;
    use tracing::info;

    init_tracing();
    info!("Starting {} {}", app::APP_NAME, app::APP_VERSION);

    tauri::Builder::default()
        // Must be registered first so a second launch exits before doing any work
        .plugin(tauri_plugin_single_instance::init(|app, args, _cwd| {
            info!("Second instance launched with {:?}", args);
            commands::route_launch(app, launch::parse_app_id_arg(&args));
        }))
        .plugin(tauri_plugin_store::Builder::new().build())
        .plugin(tauri_plugin_shell::init())
        .setup(|app| {
            bootstrap(app.handle())?;
            if let Some(window) = app.get_webview_window(commands::MAIN_WINDOW) {
                window.set_title(&app::window_title(None))?;
            }
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::list_apps,
            commands::get_app,
            commands::register_app,
            commands::save_app,
            commands::rename_app,
            commands::delete_app,
            commands::reorder_apps,
            commands::clear_app_storage,
            commands::clear_all_data,
            commands::normalize_url,
            commands::create_shortcut,
            commands::take_startup_target,
            commands::get_settings,
            commands::set_settings,
            commands::save_setting,
            commands::window_control,
            commands::set_window_title,
            commands::set_window_icon,
            commands::reset_window_icon,
            commands::open_external,
            commands::open_app_view,
            commands::open_auth_window,
        ])
        .run(tauri::generate_context!())
        .expect("error while running tauri application");
}

/// Builds the shell state over the plugin store and starts forwarding
/// collection changes to the UI
#[cfg(feature = "desktop")]
fn bootstrap(handle: &tauri::AppHandle) -> anyhow::Result<()> {
    use anyhow::Context;
    use std::sync::Arc;
    use tauri::{Emitter, Manager};
    use tracing::{error, info};

    use crate::apps::events::{next_event, APPS_UPDATED_EVENT};
    use crate::launch::StartupTarget;
    use crate::settings::AutostartEntry;
    use crate::store::plugin::PluginStore;

    let config = ShellConfig::load();
    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", config.data_dir))?;

    let store = Arc::new(PluginStore::open(handle, app::STORE_FILE_NAME)?);
    let backend = Arc::new(commands::WebviewStorageBackend::new(handle.clone()));
    let login_items = Arc::new(AutostartEntry::native()?);
    let state = AppState::new(config, store, backend, login_items).context("Failed to build shell state")?;

    let target = StartupTarget::resolve(launch::parse_app_id_arg(std::env::args()), state.registry())?;
    info!("Startup target: {:?}", target);
    state.set_startup_target(target);

    let mut events = state.registry().events().subscribe();
    let emitter = handle.clone();
    tauri::async_runtime::spawn(async move {
        while let Some(event) = next_event(&mut events).await {
            if let Err(e) = emitter.emit(APPS_UPDATED_EVENT, &event) {
                error!("Failed to forward {}: {}", APPS_UPDATED_EVENT, e);
            }
        }
    });

    handle.manage(state);
    Ok(())
}

/// Tauri command handlers exposed to the shell UI
///
/// One command per shell operation. Handlers stay thin: they pull the
/// services out of `AppState`, call them, and do the window work that needs
/// a live `AppHandle`. Errors reach the UI as `{ kind, message }`.
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tauri::image::Image;
use tauri::webview::{NewWindowResponse, WebviewWindowBuilder};
use tauri::{AppHandle, Emitter, Manager, Runtime, State, Url, WebviewUrl, WebviewWindow, Window};
use tauri_plugin_shell::ShellExt;
use tracing::{debug, error, info, warn};

use crate::app::window_title;
use crate::apps::normalize::normalize_url as normalize;
use crate::apps::{AppDraft, AppRecord};
use crate::error::{ShellError, ShellResult};
use crate::launch::StartupTarget;
use crate::session::{PartitionId, PartitionPolicy, SessionBackend};
use crate::settings::Settings;
use crate::shortcut::ShortcutOutcome;
use crate::site_view::{
    is_auth_callback, is_same_site, NavigationDecision, SiteViewConfig, AUTH_WINDOW_PREFIX,
    SITE_WINDOW_PREFIX,
};
use crate::state::AppState;

pub const MAIN_WINDOW: &str = "main";

fn window_error(e: tauri::Error) -> ShellError {
    ShellError::Window(e.to_string())
}

/// Clears storage held by an open site window before its directory is wiped
pub struct WebviewStorageBackend<R: Runtime> {
    app: AppHandle<R>,
}

impl<R: Runtime> WebviewStorageBackend<R> {
    pub fn new(app: AppHandle<R>) -> Self {
        Self { app }
    }
}

impl<R: Runtime> SessionBackend for WebviewStorageBackend<R> {
    fn clear_live_storage(&self, partition: &PartitionId) -> Result<(), String> {
        let label = format!("{}{}", SITE_WINDOW_PREFIX, partition.app_id());
        match self.app.get_webview_window(&label) {
            Some(window) => window.clear_all_browsing_data().map_err(|e| e.to_string()),
            None => self.remove_data_store(partition),
        }
    }
}

impl<R: Runtime> WebviewStorageBackend<R> {
    /// WebKit on macOS keeps a partition's storage in an identified data
    /// store outside its directory
    #[cfg(target_os = "macos")]
    fn remove_data_store(&self, partition: &PartitionId) -> Result<(), String> {
        let name = partition.to_string();
        self.app
            .remove_data_store(partition.data_store_identifier(), move |result| {
                if let Err(e) = result {
                    warn!("Failed to remove data store of {}: {}", name, e);
                }
            })
            .map_err(|e| e.to_string())
    }

    #[cfg(not(target_os = "macos"))]
    fn remove_data_store(&self, _partition: &PartitionId) -> Result<(), String> {
        Ok(())
    }
}

/// Hands a URL to the OS default handler
fn open_in_os<R: Runtime>(app: &AppHandle<R>, url: &str) -> ShellResult<()> {
    #[allow(deprecated)]
    app.shell()
        .open(url, None)
        .map_err(|e| ShellError::Window(format!("Failed to open {}: {}", url, e)))
}

/// Destroys any site or login window still showing `app_id`
fn close_app_windows<R: Runtime>(app: &AppHandle<R>, app_id: &str) {
    for prefix in [SITE_WINDOW_PREFIX, AUTH_WINDOW_PREFIX] {
        if let Some(window) = app.get_webview_window(&format!("{}{}", prefix, app_id)) {
            if let Err(e) = window.destroy() {
                warn!("Failed to close window for app {}: {}", app_id, e);
            }
        }
    }
}

/// Resolves a forwarded `--app-id` launch and tells the UI where to go
pub fn route_launch<R: Runtime>(app: &AppHandle<R>, app_id: Option<String>) {
    let state = app.state::<AppState>();
    match StartupTarget::resolve(app_id, state.registry()) {
        Ok(target) => {
            if let Some((event, id)) = target.event() {
                if let Err(e) = app.emit(event, id) {
                    error!("Failed to emit {}: {}", event, e);
                }
            }
        }
        Err(e) => error!("Failed to resolve launch target: {}", e),
    }

    if let Some(window) = app.get_webview_window(MAIN_WINDOW) {
        let _ = window.unminimize();
        let _ = window.show();
        let _ = window.set_focus();
    }
}

// ---- app collection ----

#[tauri::command]
pub fn list_apps(state: State<'_, AppState>) -> ShellResult<Vec<AppRecord>> {
    state.registry().list_apps()
}

#[tauri::command]
pub fn get_app(state: State<'_, AppState>, app_id: String) -> ShellResult<Option<AppRecord>> {
    state.registry().get_app(&app_id)
}

/// Validates, normalizes and probes the URL, then persists the record and
/// provisions its partition
#[tauri::command]
pub async fn register_app(state: State<'_, AppState>, draft: AppDraft) -> ShellResult<AppRecord> {
    info!("register_app: {}", draft.url);
    state.registry().register_app(draft).await
}

#[tauri::command]
pub fn save_app(state: State<'_, AppState>, app: AppRecord) -> ShellResult<AppRecord> {
    state.registry().save_app(app)
}

#[tauri::command]
pub fn rename_app(state: State<'_, AppState>, app_id: String, new_name: String) -> ShellResult<bool> {
    state.registry().rename_app(&app_id, &new_name)
}

#[tauri::command]
pub fn delete_app(app: AppHandle, state: State<'_, AppState>, app_id: String) -> ShellResult<bool> {
    close_app_windows(&app, &app_id);
    state.registry().delete_app(&app_id)
}

#[tauri::command]
pub fn reorder_apps(state: State<'_, AppState>, app_ids: Vec<String>) -> ShellResult<Vec<AppRecord>> {
    state.registry().reorder_apps(&app_ids)
}

#[tauri::command]
pub fn clear_app_storage(state: State<'_, AppState>, app_id: String) -> ShellResult<bool> {
    state.registry().clear_app_storage(&app_id)
}

#[tauri::command]
pub fn clear_all_data(app: AppHandle, state: State<'_, AppState>) -> ShellResult<bool> {
    for record in state.registry().list_apps()? {
        close_app_windows(&app, &record.id);
    }
    state.clear_all_data()?;
    Ok(true)
}

#[tauri::command]
pub fn normalize_url(url: String) -> ShellResult<String> {
    normalize(&url)
}

#[tauri::command]
pub async fn create_shortcut(state: State<'_, AppState>, app_id: String) -> ShellResult<ShortcutOutcome> {
    let record = state.registry().require_app(&app_id)?;
    state.shortcuts().create_shortcut(&record).await
}

#[tauri::command]
pub fn take_startup_target(state: State<'_, AppState>) -> StartupTarget {
    state.take_startup_target()
}

// ---- settings ----

#[tauri::command]
pub fn get_settings(state: State<'_, AppState>) -> ShellResult<Settings> {
    state.settings().get_settings()
}

#[tauri::command]
pub fn set_settings(state: State<'_, AppState>, settings: Map<String, Value>) -> ShellResult<Settings> {
    state.settings().set_settings(settings)
}

#[tauri::command]
pub fn save_setting(state: State<'_, AppState>, key: String, value: Value) -> ShellResult<Settings> {
    state.settings().save_setting(&key, value)
}

// ---- window ----

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WindowAction {
    Minimize,
    Maximize,
    Unmaximize,
    ToggleMaximize,
    Close,
}

#[tauri::command]
pub async fn window_control(window: Window, action: WindowAction) -> ShellResult<()> {
    debug!("window_control: {:?}", action);
    match action {
        WindowAction::Minimize => window.minimize(),
        WindowAction::Maximize => window.maximize(),
        WindowAction::Unmaximize => window.unmaximize(),
        WindowAction::ToggleMaximize => {
            if window.is_maximized().unwrap_or(false) {
                window.unmaximize()
            } else {
                window.maximize()
            }
        }
        WindowAction::Close => window.close(),
    }
    .map_err(window_error)
}

#[tauri::command]
pub fn set_window_title(window: Window, app_name: Option<String>) -> ShellResult<()> {
    window.set_title(&window_title(app_name.as_deref())).map_err(window_error)
}

fn default_icon(app: &AppHandle, state: &AppState) -> Option<Image<'static>> {
    if let Some(path) = state.config().default_icon.as_ref().filter(|p| p.is_file()) {
        match Image::from_path(path) {
            Ok(icon) => return Some(icon),
            Err(e) => warn!("Configured default icon {:?} unusable: {}", path, e),
        }
    }
    app.default_window_icon().map(|icon| icon.clone().to_owned())
}

/// Shows the app's logo as the window icon; falls back to the default icon
/// and returns `false` when the logo cannot be loaded
#[tauri::command]
pub async fn set_window_icon(
    app: AppHandle,
    window: Window,
    state: State<'_, AppState>,
    icon_url: String,
) -> ShellResult<bool> {
    let loaded = state
        .shortcuts()
        .icons()
        .load_bytes(&icon_url)
        .await
        .and_then(|bytes| {
            Image::from_bytes(&bytes).map_err(|e| ShellError::IconConversionFailed(e.to_string()))
        });

    match loaded {
        Ok(icon) => {
            window.set_icon(icon).map_err(window_error)?;
            Ok(true)
        }
        Err(e) => {
            error!("Error setting window icon from {}: {}", icon_url, e);
            if let Some(icon) = default_icon(&app, &state) {
                window.set_icon(icon).map_err(window_error)?;
            }
            Ok(false)
        }
    }
}

#[tauri::command]
pub fn reset_window_icon(app: AppHandle, window: Window, state: State<'_, AppState>) -> ShellResult<()> {
    match default_icon(&app, &state) {
        Some(icon) => window.set_icon(icon).map_err(window_error),
        None => {
            warn!("No default window icon available");
            Ok(())
        }
    }
}

#[tauri::command]
pub fn open_external(app: AppHandle, url: String) -> ShellResult<()> {
    let parsed = Url::parse(url.trim()).map_err(|_| ShellError::InvalidUrl(url.clone()))?;
    open_in_os(&app, parsed.as_str())
}

// ---- site views ----

/// Binds the window to the partition's WebKit data store; elsewhere the data
/// directory alone isolates it
#[cfg(target_os = "macos")]
fn with_data_store<'a, R: Runtime, M: Manager<R>>(
    builder: WebviewWindowBuilder<'a, R, M>,
    config: &SiteViewConfig,
) -> WebviewWindowBuilder<'a, R, M> {
    builder.data_store_identifier(config.data_store_identifier)
}

#[cfg(not(target_os = "macos"))]
fn with_data_store<'a, R: Runtime, M: Manager<R>>(
    builder: WebviewWindowBuilder<'a, R, M>,
    _config: &SiteViewConfig,
) -> WebviewWindowBuilder<'a, R, M> {
    builder
}

/// Opens (or focuses) the window showing one app in its own partition
#[tauri::command]
pub async fn open_app_view(app: AppHandle, state: State<'_, AppState>, app_id: String) -> ShellResult<String> {
    let record = state.registry().require_app(&app_id)?;
    let config = SiteViewConfig::for_app(&record, state.registry().partitions())?;

    if let Some(existing) = app.get_webview_window(&config.label) {
        existing.show().map_err(window_error)?;
        existing.set_focus().map_err(window_error)?;
        return Ok(config.label);
    }

    let app_url = config.parsed_url()?;
    let navigation_origin = app_url.clone();
    let nav_handle = app.clone();
    let popup_handle = app.clone();

    let builder = WebviewWindowBuilder::new(&app, &config.label, WebviewUrl::External(app_url))
        .title(&config.title)
        .inner_size(config.width, config.height)
        .data_directory(config.data_directory.clone())
        .initialization_script(&config.initialization_script())
        .on_navigation(move |target| match NavigationDecision::for_navigation(target) {
            NavigationDecision::Stay => {
                if !is_same_site(&navigation_origin, target) {
                    debug!("Leaving {} for {}", navigation_origin, target);
                }
                true
            }
            NavigationDecision::OpenExternal => {
                if let Err(e) = open_in_os(&nav_handle, target.as_str()) {
                    error!("{}", e);
                }
                false
            }
        })
        .on_new_window(move |target, _features| match NavigationDecision::for_new_window(&target) {
            NavigationDecision::Stay => NewWindowResponse::Allow,
            NavigationDecision::OpenExternal => {
                if let Err(e) = open_in_os(&popup_handle, target.as_str()) {
                    error!("{}", e);
                }
                NewWindowResponse::Deny
            }
        });
    let window = with_data_store(builder, &config).build().map_err(window_error)?;

    apply_permission_policy(&window, &config.policy);
    info!("Opened app {} in window {}", record.id, config.label);
    Ok(config.label)
}

/// Opens a login window in the app's partition; it closes itself once the
/// provider redirects back with a token or code
#[tauri::command]
pub async fn open_auth_window(
    app: AppHandle,
    state: State<'_, AppState>,
    url: String,
    app_id: String,
) -> ShellResult<String> {
    let partition = state.registry().require_app(&app_id)?.partition();
    let config = SiteViewConfig::for_auth(&url, &partition, state.registry().partitions())?;

    if let Some(existing) = app.get_webview_window(&config.label) {
        existing.destroy().map_err(window_error)?;
    }

    let label = config.label.clone();
    let handle = app.clone();
    let builder = WebviewWindowBuilder::new(&app, &config.label, WebviewUrl::External(config.parsed_url()?))
        .title(&config.title)
        .inner_size(config.width, config.height)
        .data_directory(config.data_directory.clone())
        .initialization_script(&config.initialization_script())
        .on_navigation(move |target| {
            if is_auth_callback(target.as_str()) {
                info!("Auth callback reached, closing {}", label);
                let handle = handle.clone();
                let label = label.clone();
                tauri::async_runtime::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    if let Some(window) = handle.get_webview_window(&label) {
                        let _ = window.close();
                    }
                });
            }
            true
        });
    let window = with_data_store(builder, &config).build().map_err(window_error)?;

    apply_permission_policy(&window, &config.policy);
    Ok(config.label)
}

/// Grants camera, microphone, notification and similar requests when the
/// partition policy says so
#[cfg(target_os = "windows")]
fn apply_permission_policy(window: &WebviewWindow, policy: &PartitionPolicy) {
    use webview2_com::Microsoft::Web::WebView2::Win32::COREWEBVIEW2_PERMISSION_STATE_ALLOW;
    use webview2_com::PermissionRequestedEventHandler;

    if !policy.auto_grant_permissions {
        return;
    }

    let result = window.with_webview(|webview| unsafe {
        let Ok(core) = webview.controller().CoreWebView2() else {
            error!("WebView2 core unavailable, permissions stay at defaults");
            return;
        };
        let handler = PermissionRequestedEventHandler::create(Box::new(|_, args| {
            if let Some(args) = args {
                args.SetState(COREWEBVIEW2_PERMISSION_STATE_ALLOW)?;
            }
            Ok(())
        }));
        let mut token = 0;
        if let Err(e) = core.add_PermissionRequested(&handler, &mut token) {
            error!("Failed to register permission handler: {}", e);
        }
    });

    if let Err(e) = result {
        error!("Failed to reach webview: {}", e);
    }
}

/// WebKit keeps its own permission prompts
#[cfg(not(target_os = "windows"))]
fn apply_permission_policy(window: &WebviewWindow, policy: &PartitionPolicy) {
    if policy.auto_grant_permissions {
        debug!("Permission auto-grant not available for {}", window.label());
    }
}

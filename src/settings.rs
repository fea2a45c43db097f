//! User settings and the start-at-login switch
//!
//! Settings are a flat JSON map under the `settings` key. Only
//! `startAtLogin` has meaning to the shell; any other key the UI stores is
//! kept as-is.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};

use crate::app::{APP_IDENTIFIER, APP_NAME};
use crate::error::{ShellError, ShellResult};
use crate::platform;
use crate::shortcut::DesktopEntry;
use crate::store::{self, KeyValueStore};

pub const START_AT_LOGIN: &str = "startAtLogin";

const RUN_KEY: &str = r"HKCU\Software\Microsoft\Windows\CurrentVersion\Run";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "startAtLogin", default, deserialize_with = "lenient_bool")]
    pub start_at_login: bool,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Reads a stored flag that an older build may have saved as a non-boolean
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Value::deserialize(deserializer)?.as_bool().unwrap_or(false))
}

/// Rejects values the shell gives meaning to but cannot interpret
fn validate_setting(key: &str, value: &Value) -> ShellResult<()> {
    if key == START_AT_LOGIN && !value.is_boolean() {
        return Err(ShellError::InvalidSetting(format!(
            "{} must be true or false, got {}",
            START_AT_LOGIN, value
        )));
    }
    Ok(())
}

/// Registers or unregisters the shell as a login item
pub trait LoginItems: Send + Sync {
    fn set_enabled(&self, enabled: bool) -> ShellResult<()>;
    fn is_enabled(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutostartKind {
    /// `~/.config/autostart/*.desktop`
    XdgDesktop,
    /// `~/Library/LaunchAgents/*.plist`
    LaunchAgent,
    /// A value under the current user's `Run` registry key
    RegistryRun,
}

/// The platform's per-user autostart mechanism pointed at `exe`
pub struct AutostartEntry {
    kind: AutostartKind,
    dir: PathBuf,
    exe: PathBuf,
}

impl AutostartEntry {
    pub fn new(kind: AutostartKind, dir: impl Into<PathBuf>, exe: impl Into<PathBuf>) -> Self {
        Self {
            kind,
            dir: dir.into(),
            exe: exe.into(),
        }
    }

    /// The entry for this OS and the running executable
    pub fn native() -> ShellResult<Self> {
        let exe = std::env::current_exe()?;
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));

        let entry = if cfg!(target_os = "windows") {
            Self::new(AutostartKind::RegistryRun, PathBuf::new(), exe)
        } else if cfg!(target_os = "macos") {
            Self::new(AutostartKind::LaunchAgent, home.join("Library").join("LaunchAgents"), exe)
        } else {
            let config = dirs::config_dir().unwrap_or_else(|| home.join(".config"));
            Self::new(AutostartKind::XdgDesktop, config.join("autostart"), exe)
        };
        Ok(entry)
    }

    /// File backing the entry; `None` for the registry
    pub fn path(&self) -> Option<PathBuf> {
        match self.kind {
            AutostartKind::XdgDesktop => Some(self.desktop_entry().path_in(&self.dir)),
            AutostartKind::LaunchAgent => Some(self.dir.join(format!("{}.plist", APP_IDENTIFIER))),
            AutostartKind::RegistryRun => None,
        }
    }

    fn desktop_entry(&self) -> DesktopEntry {
        DesktopEntry::builder(APP_NAME, &self.exe).autostart().build()
    }

    fn launch_agent_plist(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{}</string>
    </array>
    <key>RunAtLoad</key>
    <true/>
</dict>
</plist>
"#,
            xml_escape(APP_IDENTIFIER),
            xml_escape(&self.exe.to_string_lossy())
        )
    }

    fn write_file(&self, path: &Path, content: String) -> ShellResult<()> {
        fs::create_dir_all(&self.dir)?;
        fs::write(path, content)?;
        Ok(())
    }

    fn remove_file(path: &Path) -> ShellResult<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn reg(&self, args: &[&str]) -> ShellResult<bool> {
        let mut cmd = platform::background_command("reg");
        cmd.args(args);
        let status = platform::status_with_timeout(cmd, platform::COMMAND_TIMEOUT)?;
        Ok(status.success())
    }
}

impl LoginItems for AutostartEntry {
    fn set_enabled(&self, enabled: bool) -> ShellResult<()> {
        info!("Setting start at login: {}", enabled);
        match (self.kind, self.path()) {
            (AutostartKind::RegistryRun, _) => {
                if enabled {
                    let command = format!("\"{}\"", self.exe.to_string_lossy());
                    let ok = self.reg(&["add", RUN_KEY, "/v", APP_NAME, "/t", "REG_SZ", "/d", &command, "/f"])?;
                    if !ok {
                        return Err(ShellError::Io(std::io::Error::other("reg add failed")));
                    }
                } else if self.is_enabled() {
                    let ok = self.reg(&["delete", RUN_KEY, "/v", APP_NAME, "/f"])?;
                    if !ok {
                        return Err(ShellError::Io(std::io::Error::other("reg delete failed")));
                    }
                }
                Ok(())
            }
            (kind, Some(path)) if enabled => {
                let content = if kind == AutostartKind::LaunchAgent {
                    self.launch_agent_plist()
                } else {
                    self.desktop_entry().render()
                };
                self.write_file(&path, content)
            }
            (_, Some(path)) => Self::remove_file(&path),
            (_, None) => Ok(()),
        }
    }

    fn is_enabled(&self) -> bool {
        match self.path() {
            Some(path) => path.is_file(),
            None => self
                .reg(&["query", RUN_KEY, "/v", APP_NAME])
                .unwrap_or(false),
        }
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Settings persisted in the durable store
pub struct SettingsService {
    store: Arc<dyn KeyValueStore>,
    login_items: Arc<dyn LoginItems>,
}

impl SettingsService {
    pub fn new(store: Arc<dyn KeyValueStore>, login_items: Arc<dyn LoginItems>) -> Self {
        Self { store, login_items }
    }

    /// Stored settings, or the defaults when none were ever saved
    pub fn get_settings(&self) -> ShellResult<Settings> {
        match store::load_settings(self.store.as_ref())? {
            Some(map) => Ok(serde_json::from_value(Value::Object(map))?),
            None => Ok(Settings::default()),
        }
    }

    /// Replaces the whole settings map; nothing is written when a value is
    /// invalid
    pub fn set_settings(&self, settings: Map<String, Value>) -> ShellResult<Settings> {
        for (key, value) in &settings {
            validate_setting(key, value)?;
        }
        store::save_settings(self.store.as_ref(), &settings)?;
        if let Some(value) = settings.get(START_AT_LOGIN) {
            self.apply_login_item(value)?;
        }
        self.get_settings()
    }

    /// Updates one key, keeping the rest
    pub fn save_setting(&self, key: &str, value: Value) -> ShellResult<Settings> {
        validate_setting(key, &value)?;
        let mut settings = store::load_settings(self.store.as_ref())?.unwrap_or_default();
        settings.insert(key.to_string(), value.clone());
        store::save_settings(self.store.as_ref(), &settings)?;

        if key == START_AT_LOGIN {
            self.apply_login_item(&value)?;
        }
        self.get_settings()
    }

    /// Unregisters the login item after the store was wiped
    pub fn reset_login_item(&self) -> ShellResult<()> {
        if self.login_items.is_enabled() {
            self.login_items.set_enabled(false)?;
        }
        Ok(())
    }

    fn apply_login_item(&self, value: &Value) -> ShellResult<()> {
        let enabled = value.as_bool() == Some(true);
        self.login_items.set_enabled(enabled).map_err(|e| {
            error!("Failed to update login item: {}", e);
            e
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::JsonFileStore;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingLoginItems {
        calls: Mutex<Vec<bool>>,
    }

    impl LoginItems for RecordingLoginItems {
        fn set_enabled(&self, enabled: bool) -> ShellResult<()> {
            self.calls.lock().push(enabled);
            Ok(())
        }

        fn is_enabled(&self) -> bool {
            self.calls.lock().last().copied().unwrap_or(false)
        }
    }

    fn service(dir: &Path) -> (SettingsService, Arc<RecordingLoginItems>) {
        let store = Arc::new(JsonFileStore::open(dir.join("store.json")).unwrap());
        let login = Arc::new(RecordingLoginItems::default());
        (SettingsService::new(store, login.clone()), login)
    }

    #[test]
    fn test_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, _) = service(dir.path());
        assert_eq!(settings.get_settings().unwrap(), Settings::default());
        assert_eq!(
            serde_json::to_value(Settings::default()).unwrap(),
            json!({ "startAtLogin": false })
        );
    }

    #[test]
    fn test_save_setting_merges_and_applies_login_item() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, login) = service(dir.path());

        settings.save_setting("theme", json!("dark")).unwrap();
        assert!(login.calls.lock().is_empty());

        let current = settings.save_setting(START_AT_LOGIN, json!(true)).unwrap();
        assert!(current.start_at_login);
        assert_eq!(current.extra.get("theme"), Some(&json!("dark")));
        assert_eq!(*login.calls.lock(), vec![true]);
    }

    #[test]
    fn test_set_settings_replaces_map() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, login) = service(dir.path());
        settings.save_setting("theme", json!("dark")).unwrap();

        let mut full = Map::new();
        full.insert(START_AT_LOGIN.into(), json!(false));
        let current = settings.set_settings(full).unwrap();

        assert!(!current.start_at_login);
        assert!(current.extra.is_empty());
        assert_eq!(*login.calls.lock(), vec![false]);
    }

    #[test]
    fn test_non_boolean_start_at_login_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, login) = service(dir.path());
        settings.save_setting(START_AT_LOGIN, json!(true)).unwrap();

        for bad in [json!("true"), json!(null), json!(1)] {
            let err = settings.save_setting(START_AT_LOGIN, bad.clone()).unwrap_err();
            assert_eq!(err.kind(), "InvalidSetting");

            let mut full = Map::new();
            full.insert(START_AT_LOGIN.into(), bad);
            full.insert("theme".into(), json!("light"));
            assert!(matches!(settings.set_settings(full), Err(ShellError::InvalidSetting(_))));
        }

        // Nothing was persisted and the login item was left alone
        let current = settings.get_settings().unwrap();
        assert!(current.start_at_login);
        assert!(current.extra.is_empty());
        assert_eq!(*login.calls.lock(), vec![true]);
    }

    #[test]
    fn test_malformed_stored_flag_reads_as_false() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::open(dir.path().join("store.json")).unwrap();
        let mut stored = Map::new();
        stored.insert(START_AT_LOGIN.into(), json!("true"));
        stored.insert("theme".into(), json!("dark"));
        store::save_settings(&store, &stored).unwrap();

        let (settings, _) = service(dir.path());
        let current = settings.get_settings().unwrap();
        assert!(!current.start_at_login);
        assert_eq!(current.extra.get("theme"), Some(&json!("dark")));
    }

    #[test]
    fn test_reset_login_item() {
        let dir = tempfile::tempdir().unwrap();
        let (settings, login) = service(dir.path());
        settings.reset_login_item().unwrap();
        assert!(login.calls.lock().is_empty());

        settings.save_setting(START_AT_LOGIN, json!(true)).unwrap();
        settings.reset_login_item().unwrap();
        assert_eq!(*login.calls.lock(), vec![true, false]);
    }

    #[test]
    fn test_xdg_autostart_entry() {
        let dir = tempfile::tempdir().unwrap();
        let entry = AutostartEntry::new(AutostartKind::XdgDesktop, dir.path(), "/usr/bin/appalyzer");
        let path = entry.path().unwrap();

        entry.set_enabled(true).unwrap();
        assert!(entry.is_enabled());
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("Exec=/usr/bin/appalyzer\n"));
        assert!(content.contains("X-GNOME-Autostart-enabled=true"));

        entry.set_enabled(false).unwrap();
        assert!(!entry.is_enabled());
        // Disabling twice is fine
        entry.set_enabled(false).unwrap();
    }

    #[test]
    fn test_launch_agent_plist() {
        let dir = tempfile::tempdir().unwrap();
        let entry = AutostartEntry::new(AutostartKind::LaunchAgent, dir.path(), "/Applications/A&B.app/appalyzer");
        entry.set_enabled(true).unwrap();

        let path = entry.path().unwrap();
        assert_eq!(path.file_name().unwrap().to_string_lossy(), format!("{}.plist", APP_IDENTIFIER));
        let plist = fs::read_to_string(path).unwrap();
        assert!(plist.contains("<string>/Applications/A&amp;B.app/appalyzer</string>"));
        assert!(plist.contains("<key>RunAtLoad</key>\n    <true/>"));
    }
}

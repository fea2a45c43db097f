//! Desktop shortcuts that relaunch the shell straight into one app
//!
//! Creating a shortcut is three steps, each failing with its own error kind:
//! acquire the logo on disk, convert it to the platform's icon format, then
//! write the platform shortcut pointing at this executable with
//! `--app-id=<id>`. A failure never touches the persisted record.

pub mod desktop_entry;
pub mod icon;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info};

use crate::app::{APP_ID_ARG, APP_NAME};
use crate::apps::AppRecord;
use crate::error::{ShellError, ShellResult};
use crate::platform;

pub use desktop_entry::DesktopEntry;
pub use icon::{IconFormat, IconPipeline};

static HOSTILE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1F]"#).expect("valid file name regex"));

/// Makes an app name usable as a file name on every platform
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = HOSTILE_CHARS.replace_all(name.trim(), "_");
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "app".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Everything a platform writer needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutSpec {
    pub name: String,
    pub target: PathBuf,
    pub args: Vec<String>,
    pub icon: PathBuf,
    pub comment: String,
}

impl ShortcutSpec {
    pub fn for_app(app: &AppRecord, target: impl Into<PathBuf>, icon: impl Into<PathBuf>) -> Self {
        Self {
            name: app.name.clone(),
            target: target.into(),
            args: vec![format!("{}{}", APP_ID_ARG, app.id)],
            icon: icon.into(),
            comment: format!("Launch {} in {}", app.name, APP_NAME),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShortcutOutcome {
    pub shortcut_path: PathBuf,
    pub icon_path: PathBuf,
}

/// Writes an XDG desktop entry (`<name>.desktop`, mode 0755)
pub fn write_desktop_entry(spec: &ShortcutSpec, dir: &Path) -> ShellResult<PathBuf> {
    let entry = spec
        .args
        .iter()
        .fold(DesktopEntry::builder(&spec.name, &spec.target), |b, a| b.arg(a))
        .icon(&spec.icon)
        .comment(&spec.comment)
        .build();
    let path = entry.path_in(dir);

    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&path, entry.render()))
        .and_then(|_| platform::make_executable(&path))
        .map_err(|e| ShellError::ShortcutCreationFailed(format!("{}: {}", path.display(), e)))?;
    Ok(path)
}

/// Writes an executable `<name>.command` script Finder can double-click
pub fn write_command_script(spec: &ShortcutSpec, dir: &Path) -> ShellResult<PathBuf> {
    let path = dir.join(format!("{}.command", sanitize_file_name(&spec.name)));
    let args = spec
        .args
        .iter()
        .map(|a| platform::sh_quote(a))
        .collect::<Vec<_>>()
        .join(" ");
    let script = format!(
        "#!/bin/sh\n# {}\nexec {} {}\n",
        spec.comment,
        platform::sh_quote(&spec.target.to_string_lossy()),
        args
    );

    fs::create_dir_all(dir)
        .and_then(|_| fs::write(&path, script))
        .and_then(|_| platform::make_executable(&path))
        .map_err(|e| ShellError::ShortcutCreationFailed(format!("{}: {}", path.display(), e)))?;
    Ok(path)
}

/// PowerShell that creates a `.lnk` through the WScript.Shell COM object
pub fn lnk_script(spec: &ShortcutSpec, path: &Path) -> String {
    let q = |s: &str| platform::powershell_quote(s);
    format!(
        "$s = (New-Object -ComObject WScript.Shell).CreateShortcut({}); \
         $s.TargetPath = {}; $s.Arguments = {}; $s.IconLocation = {}; \
         $s.Description = {}; $s.WorkingDirectory = {}; $s.Save()",
        q(&path.to_string_lossy()),
        q(&spec.target.to_string_lossy()),
        q(&spec.args.join(" ")),
        q(&format!("{},0", spec.icon.to_string_lossy())),
        q(&spec.comment),
        q(&spec
            .target
            .parent()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_default()),
    )
}

pub async fn write_windows_shortcut(spec: &ShortcutSpec, dir: &Path) -> ShellResult<PathBuf> {
    write_windows_shortcut_with(spec, dir, "powershell", platform::COMMAND_TIMEOUT).await
}

async fn write_windows_shortcut_with(
    spec: &ShortcutSpec,
    dir: &Path,
    shell: &str,
    timeout: Duration,
) -> ShellResult<PathBuf> {
    let path = dir.join(format!("{}.lnk", sanitize_file_name(&spec.name)));
    let mut cmd = platform::background_command(shell);
    cmd.args(["-NoProfile", "-NonInteractive", "-Command"])
        .arg(lnk_script(spec, &path));

    let output = platform::output_with_timeout(cmd, timeout)
        .await
        .map_err(|e| ShellError::ShortcutCreationFailed(format!("Failed to run PowerShell: {}", e)))?;

    if !output.status.success() {
        return Err(ShellError::ShortcutCreationFailed(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(path)
}

/// Dispatches to this platform's shortcut writer
pub async fn write_shortcut(spec: &ShortcutSpec, dir: &Path) -> ShellResult<PathBuf> {
    if cfg!(target_os = "windows") {
        write_windows_shortcut(spec, dir).await
    } else if cfg!(target_os = "macos") {
        write_command_script(spec, dir)
    } else {
        write_desktop_entry(spec, dir)
    }
}

/// Acquire, convert, write
pub struct ShortcutService {
    icons: IconPipeline,
    shortcut_dir: PathBuf,
    target: PathBuf,
    format: IconFormat,
}

impl ShortcutService {
    pub fn new(icons: IconPipeline, shortcut_dir: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        Self {
            icons,
            shortcut_dir: shortcut_dir.into(),
            target: target.into(),
            format: IconFormat::native(),
        }
    }

    /// Uses the running executable as the shortcut target
    pub fn for_current_exe(icons: IconPipeline, shortcut_dir: impl Into<PathBuf>) -> ShellResult<Self> {
        let target = std::env::current_exe()?;
        Ok(Self::new(icons, shortcut_dir, target))
    }

    pub fn icons(&self) -> &IconPipeline {
        &self.icons
    }

    pub async fn create_shortcut(&self, app: &AppRecord) -> ShellResult<ShortcutOutcome> {
        info!("Creating shortcut for app {} ({})", app.id, app.name);

        let source = self.icons.acquire(app).await.map_err(|e| {
            error!("Icon acquisition failed for {}: {}", app.id, e);
            e
        })?;
        let icon_path = self.icons.convert(&source, self.format).map_err(|e| {
            error!("Icon conversion failed for {}: {}", app.id, e);
            e
        })?;

        let spec = ShortcutSpec::for_app(app, &self.target, &icon_path);
        let shortcut_path = write_shortcut(&spec, &self.shortcut_dir).await.map_err(|e| {
            error!("Shortcut creation failed for {}: {}", app.id, e);
            e
        })?;

        info!("Shortcut created at {:?}", shortcut_path);
        Ok(ShortcutOutcome {
            shortcut_path,
            icon_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::test_support::TINY_PNG;
    use crate::network::Downloader;

    fn record(logo: &str) -> AppRecord {
        AppRecord {
            id: "1712345678901".into(),
            name: "Notion".into(),
            url: "https://notion.so/".into(),
            domain: "notion.so".into(),
            logo: logo.into(),
        }
    }

    fn service(dir: &Path) -> ShortcutService {
        let icons = IconPipeline::new(
            Downloader::new(5, Duration::from_secs(5), 1024 * 1024).unwrap(),
            dir.join("icons"),
        );
        ShortcutService::new(icons, dir.join("Desktop"), "/opt/appalyzer/appalyzer")
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Notion"), "Notion");
        assert_eq!(sanitize_file_name("a/b:c*d"), "a_b_c_d");
        assert_eq!(sanitize_file_name(" ..hidden. "), "hidden");
        assert_eq!(sanitize_file_name("..."), "app");
    }

    #[test]
    fn test_spec_for_app() {
        let spec = ShortcutSpec::for_app(&record(""), "/bin/appalyzer", "/tmp/i.png");
        assert_eq!(spec.args, vec!["--app-id=1712345678901".to_string()]);
        assert_eq!(spec.comment, "Launch Notion in Appalyzer");
    }

    #[test]
    fn test_lnk_script_quotes_values() {
        let mut spec = ShortcutSpec::for_app(&record(""), "C:\\Program Files\\Appalyzer\\appalyzer.exe", "C:\\icons\\1.ico");
        spec.name = "Bob's App".into();
        let script = lnk_script(&spec, Path::new("C:\\Users\\bob\\Desktop\\Bob's App.lnk"));
        assert!(script.contains("CreateShortcut('C:\\Users\\bob\\Desktop\\Bob''s App.lnk')"));
        assert!(script.contains("$s.Arguments = '--app-id=1712345678901'"));
        assert!(script.contains("$s.IconLocation = 'C:\\icons\\1.ico,0'"));
        assert!(script.ends_with("$s.Save()"));
    }

    #[test]
    fn test_command_script() {
        let dir = tempfile::tempdir().unwrap();
        let spec = ShortcutSpec::for_app(&record(""), "/Applications/Appalyzer.app/Contents/MacOS/appalyzer", "/tmp/i.png");
        let path = write_command_script(&spec, dir.path()).unwrap();
        assert_eq!(path, dir.path().join("Notion.command"));
        let script = fs::read_to_string(path).unwrap();
        assert!(script.starts_with("#!/bin/sh\n"));
        assert!(script.contains("exec '/Applications/Appalyzer.app/Contents/MacOS/appalyzer' '--app-id=1712345678901'"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_create_shortcut_from_local_logo() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("notion.png");
        fs::write(&logo, TINY_PNG).unwrap();

        let outcome = service(dir.path())
            .create_shortcut(&record(&logo.to_string_lossy()))
            .await
            .unwrap();

        assert_eq!(outcome.shortcut_path, dir.path().join("Desktop").join("Notion.desktop"));
        assert_eq!(outcome.icon_path, dir.path().join("icons").join("notion.png"));
        let entry = fs::read_to_string(&outcome.shortcut_path).unwrap();
        assert!(entry.contains("Exec=/opt/appalyzer/appalyzer --app-id=1712345678901\n"));
        assert!(entry.contains("Comment=Launch Notion in Appalyzer\n"));
    }

    #[tokio::test]
    async fn test_failures_map_to_kinds() {
        let dir = tempfile::tempdir().unwrap();
        let err = service(dir.path()).create_shortcut(&record("")).await.unwrap_err();
        assert_eq!(err.kind(), "IconSourceMissing");

        let bogus = dir.path().join("logo.png");
        fs::write(&bogus, b"not an image").unwrap();
        let err = service(dir.path())
            .create_shortcut(&record(&bogus.to_string_lossy()))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "IconConversionFailed");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_shortcut_helper_is_bounded() {
        let dir = tempfile::tempdir().unwrap();
        let helper = dir.path().join("hang.sh");
        fs::write(&helper, "#!/bin/sh\nsleep 5\n").unwrap();
        platform::make_executable(&helper).unwrap();

        let spec = ShortcutSpec::for_app(&record(""), "/bin/appalyzer", "/tmp/i.ico");
        let err = write_windows_shortcut_with(&spec, dir.path(), &helper.to_string_lossy(), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::ShortcutCreationFailed(ref m) if m.contains("timed out")));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_unwritable_shortcut_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logo = dir.path().join("notion.png");
        fs::write(&logo, TINY_PNG).unwrap();
        // A file where the shortcut directory should be
        fs::write(dir.path().join("Desktop"), b"").unwrap();

        let err = service(dir.path())
            .create_shortcut(&record(&logo.to_string_lossy()))
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::ShortcutCreationFailed(_)));
    }
}

//! XDG Desktop Entry rendering (Linux shortcuts and autostart entries)

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesktopEntry {
    pub name: String,
    pub exec: PathBuf,
    pub args: Vec<String>,
    pub icon: Option<PathBuf>,
    pub comment: Option<String>,
    pub categories: Vec<String>,
    pub autostart: bool,
}

impl DesktopEntry {
    pub fn builder(name: impl Into<String>, exec: impl Into<PathBuf>) -> DesktopEntryBuilder {
        DesktopEntryBuilder {
            entry: DesktopEntry {
                name: name.into(),
                exec: exec.into(),
                args: Vec::new(),
                icon: None,
                comment: None,
                categories: vec!["Network".to_string(), "WebBrowser".to_string()],
                autostart: false,
            },
        }
    }

    /// The `Exec=` value, with program and arguments quoted the XDG way
    pub fn exec_line(&self) -> String {
        std::iter::once(quote_exec_arg(&self.exec.to_string_lossy()))
            .chain(self.args.iter().map(|a| quote_exec_arg(a)))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn render(&self) -> String {
        let mut out = String::from("[Desktop Entry]\n");
        let _ = writeln!(out, "Type=Application");
        let _ = writeln!(out, "Version=1.0");
        let _ = writeln!(out, "Name={}", escape_value(&self.name));
        if let Some(comment) = &self.comment {
            let _ = writeln!(out, "Comment={}", escape_value(comment));
        }
        let _ = writeln!(out, "Exec={}", self.exec_line());
        if let Some(icon) = &self.icon {
            let _ = writeln!(out, "Icon={}", escape_value(&icon.to_string_lossy()));
        }
        let _ = writeln!(out, "Terminal=false");
        if !self.categories.is_empty() {
            let _ = writeln!(out, "Categories={};", self.categories.join(";"));
        }
        if self.autostart {
            let _ = writeln!(out, "X-GNOME-Autostart-enabled=true");
        }
        out
    }

    pub fn file_name(&self) -> String {
        format!("{}.desktop", super::sanitize_file_name(&self.name))
    }

    pub fn path_in(&self, dir: &Path) -> PathBuf {
        dir.join(self.file_name())
    }
}

pub struct DesktopEntryBuilder {
    entry: DesktopEntry,
}

impl DesktopEntryBuilder {
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.entry.args.push(arg.into());
        self
    }

    pub fn icon(mut self, icon: impl Into<PathBuf>) -> Self {
        self.entry.icon = Some(icon.into());
        self
    }

    pub fn comment(mut self, comment: impl Into<String>) -> Self {
        self.entry.comment = Some(comment.into());
        self
    }

    pub fn autostart(mut self) -> Self {
        self.entry.autostart = true;
        self.entry.categories.clear();
        self
    }

    pub fn build(self) -> DesktopEntry {
        self.entry
    }
}

fn escape_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
        .replace('\t', "\\t")
}

/// Quotes an `Exec` argument when it holds reserved characters; literal
/// percent signs are always doubled
fn quote_exec_arg(arg: &str) -> String {
    let arg = arg.replace('%', "%%");
    let reserved = |c: char| {
        c.is_whitespace()
            || matches!(c, '"' | '\'' | '\\' | '>' | '<' | '~' | '|' | '&' | ';' | '$' | '*' | '?' | '#' | '(' | ')' | '`')
    };
    if !arg.chars().any(reserved) {
        return arg;
    }

    let mut quoted = String::with_capacity(arg.len() + 2);
    quoted.push('"');
    for c in arg.chars() {
        if matches!(c, '"' | '`' | '$' | '\\') {
            quoted.push('\\');
        }
        quoted.push(c);
    }
    quoted.push('"');
    // Desktop entry values escape backslashes once more
    escape_value(&quoted)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_shortcut() {
        let entry = DesktopEntry::builder("Notion", "/opt/appalyzer/appalyzer")
            .arg("--app-id=1712345678901")
            .icon("/home/u/.local/share/appalyzer/icons/1712345678901.png")
            .comment("Launch Notion in Appalyzer")
            .build();

        let rendered = entry.render();
        assert!(rendered.starts_with("[Desktop Entry]\nType=Application\n"));
        assert!(rendered.contains("Name=Notion\n"));
        assert!(rendered.contains("Exec=/opt/appalyzer/appalyzer --app-id=1712345678901\n"));
        assert!(rendered.contains("Icon=/home/u/.local/share/appalyzer/icons/1712345678901.png\n"));
        assert!(rendered.contains("Categories=Network;WebBrowser;\n"));
        assert_eq!(entry.file_name(), "Notion.desktop");
    }

    #[test]
    fn test_exec_quoting() {
        let entry = DesktopEntry::builder("x", "/Applications/My Apps/appalyzer")
            .arg("--app-id=1")
            .arg("100%")
            .build();
        assert_eq!(
            entry.exec_line(),
            "\"/Applications/My Apps/appalyzer\" --app-id=1 100%%"
        );
    }

    #[test]
    fn test_autostart_entry() {
        let rendered = DesktopEntry::builder("Appalyzer", "/usr/bin/appalyzer").autostart().build().render();
        assert!(rendered.contains("X-GNOME-Autostart-enabled=true\n"));
        assert!(!rendered.contains("Categories="));
    }
}

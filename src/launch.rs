//! Routing of `--app-id=<id>` launches coming from desktop shortcuts

use serde::Serialize;
use tracing::{info, warn};

use crate::app::APP_ID_ARG;
use crate::apps::AppRegistry;
use crate::error::ShellResult;

pub const OPEN_APP_EVENT: &str = "open-app";
pub const APP_NOT_FOUND_EVENT: &str = "app-not-found";

/// First non-empty `--app-id=` value among the arguments
pub fn parse_app_id_arg<I, S>(args: I) -> Option<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    args.into_iter().find_map(|arg| {
        arg.as_ref()
            .strip_prefix(APP_ID_ARG)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    })
}

/// Where the shell should land once the home view is ready
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "appId", rename_all = "camelCase")]
pub enum StartupTarget {
    Home,
    OpenApp(String),
    AppNotFound(String),
}

impl StartupTarget {
    /// Resolves a launch request against the current collection
    pub fn resolve(app_id: Option<String>, registry: &AppRegistry) -> ShellResult<Self> {
        let Some(id) = app_id else {
            return Ok(StartupTarget::Home);
        };

        if registry.get_app(&id)?.is_some() {
            info!("Launch requested app {}", id);
            Ok(StartupTarget::OpenApp(id))
        } else {
            warn!("Launch requested unknown app {}, staying home", id);
            Ok(StartupTarget::AppNotFound(id))
        }
    }

    /// UI event name and payload, `None` for a plain launch
    pub fn event(&self) -> Option<(&'static str, &str)> {
        match self {
            StartupTarget::Home => None,
            StartupTarget::OpenApp(id) => Some((OPEN_APP_EVENT, id)),
            StartupTarget::AppNotFound(id) => Some((APP_NOT_FOUND_EVENT, id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_app_id_arg() {
        assert_eq!(
            parse_app_id_arg(["/usr/bin/appalyzer", "--app-id=1712345678901"]),
            Some("1712345678901".to_string())
        );
        assert_eq!(
            parse_app_id_arg(["appalyzer", "--app-id=", "--app-id=42", "--app-id=43"]),
            Some("42".to_string())
        );
        assert_eq!(parse_app_id_arg(["appalyzer", "--verbose"]), None);
        assert_eq!(parse_app_id_arg(Vec::<String>::new()), None);
    }

    #[test]
    fn test_event_payloads() {
        assert_eq!(StartupTarget::Home.event(), None);
        assert_eq!(
            StartupTarget::OpenApp("1".into()).event(),
            Some((OPEN_APP_EVENT, "1"))
        );
        assert_eq!(
            StartupTarget::AppNotFound("2".into()).event(),
            Some((APP_NOT_FOUND_EVENT, "2"))
        );
    }

    #[test]
    fn test_serializes_for_ui() {
        let json = serde_json::to_value(StartupTarget::OpenApp("7".into())).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "openApp", "appId": "7" }));
        let json = serde_json::to_value(StartupTarget::Home).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "home" }));
    }
}

//! Window configuration and navigation policy for embedded sites

use serde::Serialize;
use std::path::PathBuf;
use url::Url;

use crate::app::window_title;
use crate::apps::AppRecord;
use crate::error::{ShellError, ShellResult};
use crate::session::{MarkerCookie, PartitionId, PartitionManager, PartitionPolicy};

pub const SITE_WINDOW_PREFIX: &str = "app-";
pub const AUTH_WINDOW_PREFIX: &str = "auth-";

/// Query or fragment parameters that mark the end of an OAuth round trip
const AUTH_CALLBACK_PARAMS: [&str; 5] = ["code", "token", "auth_token", "access_token", "id_token"];

/// Everything needed to open one app in its own partition
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteViewConfig {
    pub label: String,
    pub title: String,
    pub url: String,
    pub data_directory: PathBuf,
    /// WebKit data store id (macOS keys storage by id, not by directory)
    pub data_store_identifier: [u8; 16],
    pub policy: PartitionPolicy,
    pub width: f64,
    pub height: f64,
}

impl SiteViewConfig {
    /// Provisions the partition on first use and reads its policy
    pub fn for_app(app: &AppRecord, partitions: &PartitionManager) -> ShellResult<Self> {
        let partition = app.partition();
        let data_directory = partitions.provision(&partition)?;
        Ok(Self {
            label: format!("{}{}", SITE_WINDOW_PREFIX, app.id),
            title: window_title(Some(&app.name)),
            url: app.url.clone(),
            data_directory,
            data_store_identifier: partition.data_store_identifier(),
            policy: partitions.policy(&partition),
            width: 1200.0,
            height: 800.0,
        })
    }

    /// A modal login window sharing the app's partition
    pub fn for_auth(url: &str, partition: &PartitionId, partitions: &PartitionManager) -> ShellResult<Self> {
        let parsed = Url::parse(url).map_err(|_| ShellError::InvalidUrl(url.to_string()))?;
        Ok(Self {
            label: format!("{}{}", AUTH_WINDOW_PREFIX, partition.app_id()),
            title: window_title(None),
            url: parsed.to_string(),
            data_directory: partitions.provision(partition)?,
            data_store_identifier: partition.data_store_identifier(),
            policy: partitions.policy(partition),
            width: 800.0,
            height: 600.0,
        })
    }

    pub fn parsed_url(&self) -> ShellResult<Url> {
        Url::parse(&self.url).map_err(|_| ShellError::InvalidUrl(self.url.clone()))
    }

    pub fn initialization_script(&self) -> String {
        initialization_script(&self.policy)
    }
}

/// `document.cookie` assignment for the persistence marker
pub fn marker_cookie_string(cookie: &MarkerCookie) -> String {
    let mut s = format!(
        "{}={}; max-age={}; path=/",
        cookie.name, cookie.value, cookie.max_age_secs
    );
    if cookie.secure {
        s.push_str("; secure");
    }
    s
}

/// Script run in every page of the partition before the site's own code
/// Sets the persistence marker cookie on secure pages; the value is embedded
/// as a JSON string literal.
pub fn initialization_script(policy: &PartitionPolicy) -> String {
    let cookie = serde_json::to_string(&policy.persistence_marker.as_ref().map(marker_cookie_string))
        .unwrap_or_else(|_| "null".into());

    format!(
        r#"(function () {{
  var cookie = {cookie};
  if (cookie && location.protocol === 'https:') {{
    document.cookie = cookie;
  }}
}})();"#
    )
}

/// What to do with a navigation leaving the current page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NavigationDecision {
    /// Load it in the site view
    Stay,
    /// Hand it to the OS default handler
    OpenExternal,
}

fn is_web(url: &Url) -> bool {
    matches!(url.scheme(), "http" | "https")
}

fn is_inert(url: &Url) -> bool {
    matches!(url.scheme(), "about" | "data" | "blob")
}

impl NavigationDecision {
    /// In-place navigations: any web page stays, since sites bounce through
    /// their own auth domains; other schemes (`mailto:`, `tel:`) go to the OS
    pub fn for_navigation(target: &Url) -> Self {
        if is_web(target) || is_inert(target) {
            NavigationDecision::Stay
        } else {
            NavigationDecision::OpenExternal
        }
    }

    /// Popups never open inside the shell; `about:blank` placeholders are
    /// the only ones allowed through
    pub fn for_new_window(target: &Url) -> Self {
        if target.as_str() == "about:blank" {
            NavigationDecision::Stay
        } else {
            NavigationDecision::OpenExternal
        }
    }
}

/// Whether `url` carries one of the OAuth callback parameters
pub fn is_auth_callback(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return AUTH_CALLBACK_PARAMS.iter().any(|p| url.contains(&format!("{}=", p)));
    };

    let in_query = parsed
        .query_pairs()
        .any(|(k, _)| AUTH_CALLBACK_PARAMS.contains(&k.as_ref()));
    let in_fragment = parsed.fragment().is_some_and(|fragment| {
        url::form_urlencoded::parse(fragment.as_bytes())
            .any(|(k, _)| AUTH_CALLBACK_PARAMS.contains(&k.as_ref()))
    });
    in_query || in_fragment
}

/// Same registrable host, ignoring a `www.` prefix
pub fn is_same_site(app_url: &Url, target: &Url) -> bool {
    let host = |u: &Url| {
        u.host_str()
            .map(|h| h.strip_prefix("www.").unwrap_or(h).to_ascii_lowercase())
    };
    match (host(app_url), host(target)) {
        (Some(a), Some(b)) => a == b || b.ends_with(&format!(".{}", a)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DirectoryBackend;
    use std::sync::Arc;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn record() -> AppRecord {
        AppRecord {
            id: "1712345678901".into(),
            name: "Notion".into(),
            url: "https://notion.so/".into(),
            domain: "notion.so".into(),
            logo: String::new(),
        }
    }

    #[test]
    fn test_for_app_provisions_partition() {
        let dir = tempfile::tempdir().unwrap();
        let partitions = PartitionManager::new(dir.path(), Arc::new(DirectoryBackend));

        let config = SiteViewConfig::for_app(&record(), &partitions).unwrap();
        assert_eq!(config.label, "app-1712345678901");
        assert_eq!(config.title, window_title(Some("Notion")));
        assert_eq!(config.data_directory, dir.path().join("app-1712345678901"));
        assert!(partitions.exists(&record().partition()));
        assert!(config.policy.auto_grant_permissions);
    }

    #[test]
    fn test_auth_window_config() {
        let dir = tempfile::tempdir().unwrap();
        let partitions = PartitionManager::new(dir.path(), Arc::new(DirectoryBackend));
        let partition = PartitionId::for_app("42");

        let config = SiteViewConfig::for_auth("https://accounts.example.com/login", &partition, &partitions).unwrap();
        assert_eq!(config.label, "auth-42");
        assert_eq!(config.data_directory, dir.path().join("app-42"));
        assert_eq!(config.data_store_identifier, partition.data_store_identifier());

        assert!(SiteViewConfig::for_auth("not a url", &partition, &partitions).is_err());
    }

    #[test]
    fn test_initialization_script_embeds_policy() {
        let script = initialization_script(&PartitionPolicy::default());
        assert!(script.contains("session-persistence=true; max-age=31536000; path=/; secure"));
        // The site's own content policy is left untouched
        assert!(!script.contains("Content-Security-Policy"));

        let bare = PartitionPolicy {
            auto_grant_permissions: false,
            persistence_marker: None,
        };
        let script = initialization_script(&bare);
        assert!(script.contains("var cookie = null;"));
    }

    #[test]
    fn test_navigation_decisions() {
        assert_eq!(NavigationDecision::for_navigation(&url("https://notion.so/page")), NavigationDecision::Stay);
        assert_eq!(NavigationDecision::for_navigation(&url("https://accounts.google.com/")), NavigationDecision::Stay);
        assert_eq!(NavigationDecision::for_navigation(&url("about:blank")), NavigationDecision::Stay);
        assert_eq!(NavigationDecision::for_navigation(&url("mailto:a@b.c")), NavigationDecision::OpenExternal);
        assert_eq!(NavigationDecision::for_navigation(&url("tel:+123")), NavigationDecision::OpenExternal);

        assert_eq!(NavigationDecision::for_new_window(&url("https://notion.so/x")), NavigationDecision::OpenExternal);
        assert_eq!(NavigationDecision::for_new_window(&url("about:blank")), NavigationDecision::Stay);
    }

    #[test]
    fn test_auth_callback_detection() {
        assert!(is_auth_callback("https://app.example.com/callback?code=abc&state=1"));
        assert!(is_auth_callback("https://app.example.com/cb#access_token=xyz&type=bearer"));
        assert!(is_auth_callback("https://app.example.com/cb?id_token=1"));
        assert!(!is_auth_callback("https://app.example.com/login?redirect=/home"));
        assert!(!is_auth_callback("https://app.example.com/promo?barcode_id=9"));
    }

    #[test]
    fn test_same_site() {
        let app = url("https://notion.so/");
        assert!(is_same_site(&app, &url("https://www.notion.so/x")));
        assert!(is_same_site(&app, &url("https://api.notion.so/x")));
        assert!(!is_same_site(&app, &url("https://notnotion.so/")));
        assert!(!is_same_site(&app, &url("mailto:a@b.c")));
    }
}

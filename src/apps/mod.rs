//! Registered website apps
//! An `AppRecord` is the only persisted entity: the identity of one wrapped
//! website. Each record owns exactly one storage partition named `app-<id>`.
//!
//! - `normalize`: canonical form of user-entered URLs
//! - `registry`: the Shell operations over the ordered collection
//! - `events`: "apps updated" notifications for the UI
pub mod events;
pub mod normalize;
pub mod registry;

use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{ShellError, ShellResult};

pub use events::{AppsEvent, EventBus};
pub use registry::AppRegistry;

/// Favicon service used when the draft carries no logo
const FAVICON_SERVICE: &str = "https://www.google.com/s2/favicons?sz=128&domain=";

/// A user-registered website, as stored under the `apps` key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: String,
    pub name: String,
    pub url: String,
    pub domain: String,
    #[serde(default)]
    pub logo: String,
}

impl AppRecord {
    /// Storage partition bound to this record
    pub fn partition(&self) -> crate::session::PartitionId {
        crate::session::PartitionId::for_app(&self.id)
    }

    /// True when the logo must be downloaded before use
    pub fn has_remote_logo(&self) -> bool {
        is_remote(&self.logo)
    }
}

/// Fields assembled by the caller before registration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppDraft {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub logo: Option<String>,
}

impl AppDraft {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Completes the draft into a record for an already normalized URL
    /// Missing name and logo are guessed from the domain
    pub fn into_record(self, id: String, normalized_url: String) -> ShellResult<AppRecord> {
        let domain = url::Url::parse(&normalized_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_string))
            .ok_or_else(|| ShellError::InvalidUrl(normalized_url.clone()))?;

        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| display_name_for(&domain));
        let logo = self
            .logo
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| favicon_url_for(&domain));

        Ok(AppRecord {
            id,
            name,
            url: normalized_url,
            domain,
            logo,
        })
    }
}

/// "mail.example.com" -> "Mail"
pub fn display_name_for(domain: &str) -> String {
    let label = domain.split('.').next().unwrap_or(domain);
    let mut chars = label.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => domain.to_string(),
    }
}

pub fn favicon_url_for(domain: &str) -> String {
    format!("{}{}", FAVICON_SERVICE, domain)
}

pub(crate) fn is_remote(location: &str) -> bool {
    let lower = location.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Issues record ids: millisecond timestamps, strictly increasing in-process
#[derive(Debug, Default)]
pub struct IdGenerator {
    last: Mutex<i64>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id not rejected by `taken`
    pub fn next_id(&self, taken: impl Fn(&str) -> bool) -> String {
        let mut last = self.last.lock();
        let mut candidate = Utc::now().timestamp_millis().max(*last + 1);
        while taken(&candidate.to_string()) {
            candidate += 1;
        }
        *last = candidate;
        candidate.to_string()
    }
}

//! Typed failures of Shell operations
//! Every command handler returns one of these to the UI, serialized as
//! `{ "kind": "...", "message": "..." }` so the view can branch on the kind
//! and show the message next to the preserved form input.
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("URL is required")]
    EmptyUrl,

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("URL is not accessible: {0}")]
    Unreachable(String),

    #[error("App not found: {0}")]
    AppNotFound(String),

    #[error("Icon source missing: {0}")]
    IconSourceMissing(String),

    #[error("Icon conversion failed: {0}")]
    IconConversionFailed(String),

    #[error("Shortcut creation failed: {0}")]
    ShortcutCreationFailed(String),

    #[error("Failed to clear storage for {partition}: {reason}")]
    StorageClearFailed { partition: String, reason: String },

    #[error("Invalid app id: {0:?}")]
    InvalidAppId(String),

    #[error("App order must be a permutation of the registered apps")]
    InvalidOrder,

    #[error("Invalid setting: {0}")]
    InvalidSetting(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Window error: {0}")]
    Window(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ShellError {
    /// Stable machine-readable kind sent to the UI
    pub fn kind(&self) -> &'static str {
        match self {
            ShellError::EmptyUrl => "EmptyURL",
            ShellError::InvalidUrl(_) => "InvalidURL",
            ShellError::Unreachable(_) => "Unreachable",
            ShellError::AppNotFound(_) => "AppNotFound",
            ShellError::IconSourceMissing(_) => "IconSourceMissing",
            ShellError::IconConversionFailed(_) => "IconConversionFailed",
            ShellError::ShortcutCreationFailed(_) => "ShortcutCreationFailed",
            ShellError::StorageClearFailed { .. } => "StorageClearFailed",
            ShellError::InvalidAppId(_) => "InvalidAppId",
            ShellError::InvalidOrder => "InvalidOrder",
            ShellError::InvalidSetting(_) => "InvalidSetting",
            ShellError::Store(_) => "Store",
            ShellError::Window(_) => "Window",
            ShellError::Io(_) => "Io",
        }
    }
}

impl From<serde_json::Error> for ShellError {
    fn from(e: serde_json::Error) -> Self {
        ShellError::Store(e.to_string())
    }
}

impl Serialize for ShellError {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ShellError", 2)?;
        state.serialize_field("kind", self.kind())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

pub type ShellResult<T> = Result<T, ShellError>;

//! Outbound HTTP used by the shell
//! - `probe`: bounded reachability check run before an app is registered
//! - `download`: redirect-bounded fetches of icon images

pub mod download;
pub mod probe;

pub use download::{DownloadError, Downloader};
pub use probe::{HttpProbe, Reachability};

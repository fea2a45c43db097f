use async_trait::async_trait;
use reqwest::{redirect, Client, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{ShellError, ShellResult};

/// Best-effort liveness check of a site before it is registered
/// Not a security check: any HTTP answer counts as reachable.
#[async_trait]
pub trait Reachability: Send + Sync {
    async fn check(&self, url: &str) -> ShellResult<()>;
}

/// Probes with a HEAD request (GET when HEAD is refused) and drops the
/// response unread, so no body is ever consumed
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> ShellResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .redirect(redirect::Policy::limited(10))
            .build()
            .map_err(|e| ShellError::Unreachable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, timeout })
    }

    async fn send(&self, url: &str, head: bool) -> ShellResult<StatusCode> {
        let request = if head {
            self.client.head(url)
        } else {
            self.client.get(url)
        };

        // The client timeout already bounds the request; this also bounds DNS stalls
        let response = tokio::time::timeout(self.timeout, request.send())
            .await
            .map_err(|_| ShellError::Unreachable(format!("{} timed out after {:?}", url, self.timeout)))?
            .map_err(|e| ShellError::Unreachable(format!("{}: {}", url, e)))?;

        Ok(response.status())
    }
}

#[async_trait]
impl Reachability for HttpProbe {
    async fn check(&self, url: &str) -> ShellResult<()> {
        let status = match self.send(url, true).await? {
            StatusCode::METHOD_NOT_ALLOWED | StatusCode::NOT_IMPLEMENTED => {
                debug!("HEAD refused by {}, probing with GET", url);
                self.send(url, false).await?
            }
            status => status,
        };

        if status.is_server_error() {
            warn!("{} answered {} during probe, treating as reachable", url, status);
        } else {
            debug!("{} reachable ({})", url, status);
        }
        Ok(())
    }
}

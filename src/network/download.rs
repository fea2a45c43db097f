use reqwest::{header, redirect, Client, StatusCode};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid URL {0}")]
    InvalidUrl(String),

    #[error("stopped after {0} redirects")]
    TooManyRedirects(usize),

    #[error("redirect from {0} without a usable Location header")]
    BadRedirect(String),

    #[error("server answered {0}")]
    Status(StatusCode),

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("download timed out after {0:?}")]
    Timeout(Duration),

    #[error("body exceeds {0} bytes")]
    TooLarge(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fetches images, following redirects by hand so loops are cut off after
/// `max_hops` instead of spinning forever
pub struct Downloader {
    client: Client,
    max_hops: usize,
    timeout: Duration,
    max_bytes: usize,
}

impl Downloader {
    pub fn new(max_hops: usize, timeout: Duration, max_bytes: usize) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            max_hops,
            timeout,
            max_bytes,
        })
    }

    /// Downloads `url` fully into memory
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        tokio::time::timeout(self.timeout, self.follow(url))
            .await
            .map_err(|_| DownloadError::Timeout(self.timeout))?
    }

    /// Downloads `url` into `dest`; the file only appears once complete
    pub async fn download_to_file(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let bytes = self.fetch_bytes(url).await?;

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        let part = dest.with_extension("part");
        fs::write(&part, &bytes)?;
        fs::rename(&part, dest)?;

        info!("Downloaded {} ({} bytes) to {:?}", url, bytes.len(), dest);
        Ok(())
    }

    async fn follow(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        let mut current = Url::parse(url).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;
        let mut hops = 0;

        loop {
            debug!("Downloading from: {}", current);
            let response = self.client.get(current.clone()).send().await?;
            let status = response.status();

            if status.is_redirection() && status != StatusCode::NOT_MODIFIED {
                if hops == self.max_hops {
                    return Err(DownloadError::TooManyRedirects(hops));
                }
                let next = response
                    .headers()
                    .get(header::LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|location| current.join(location).ok())
                    .ok_or_else(|| DownloadError::BadRedirect(current.to_string()))?;
                debug!("Redirecting to: {}", next);
                current = next;
                hops += 1;
                continue;
            }

            if status != StatusCode::OK {
                return Err(DownloadError::Status(status));
            }

            return self.read_body(response).await;
        }
    }

    /// Reads the body chunk by chunk, giving up once it passes `max_bytes`
    async fn read_body(&self, mut response: reqwest::Response) -> Result<Vec<u8>, DownloadError> {
        if response.content_length().is_some_and(|len| len > self.max_bytes as u64) {
            return Err(DownloadError::TooLarge(self.max_bytes));
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(DownloadError::TooLarge(self.max_bytes));
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::test_support::{serve_fixture, LARGE_ICON_LEN, TINY_PNG};

    fn downloader(max_hops: usize) -> Downloader {
        Downloader::new(max_hops, Duration::from_secs(5), 1024 * 1024).unwrap()
    }

    #[tokio::test]
    async fn test_fetches_direct() {
        let base = serve_fixture().await;
        let bytes = downloader(5).fetch_bytes(&format!("{}/icon.png", base)).await.unwrap();
        assert_eq!(bytes, TINY_PNG);
    }

    #[tokio::test]
    async fn test_follows_redirects_within_bound() {
        let base = serve_fixture().await;
        // /hop/4 -> 3 -> 2 -> 1 -> 0 -> /icon.png: five redirects
        let bytes = downloader(5).fetch_bytes(&format!("{}/hop/4", base)).await.unwrap();
        assert_eq!(bytes, TINY_PNG);

        let err = downloader(4).fetch_bytes(&format!("{}/hop/4", base)).await.unwrap_err();
        assert!(matches!(err, DownloadError::TooManyRedirects(4)));
    }

    #[tokio::test]
    async fn test_redirect_loop_is_cut_off() {
        let base = serve_fixture().await;
        let err = downloader(5).fetch_bytes(&format!("{}/loop", base)).await.unwrap_err();
        assert!(matches!(err, DownloadError::TooManyRedirects(5)));
    }

    #[tokio::test]
    async fn test_non_ok_status() {
        let base = serve_fixture().await;
        let err = downloader(5).fetch_bytes(&format!("{}/missing.png", base)).await.unwrap_err();
        assert!(matches!(err, DownloadError::Status(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn test_oversized_body_is_refused() {
        let base = serve_fixture().await;
        let url = format!("{}/large.png", base);

        let capped = Downloader::new(5, Duration::from_secs(5), 1024).unwrap();
        let err = capped.fetch_bytes(&url).await.unwrap_err();
        assert!(matches!(err, DownloadError::TooLarge(1024)));

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("big.png");
        assert!(capped.download_to_file(&url, &dest).await.is_err());
        assert!(!dest.exists());

        let bytes = downloader(5).fetch_bytes(&url).await.unwrap();
        assert_eq!(bytes.len(), LARGE_ICON_LEN);
    }

    #[tokio::test]
    async fn test_download_to_file() {
        let base = serve_fixture().await;
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("icons").join("42.png");

        downloader(5)
            .download_to_file(&format!("{}/icon.png", base), &dest)
            .await
            .unwrap();

        assert_eq!(fs::read(&dest).unwrap(), TINY_PNG);
        assert!(!dest.with_extension("part").exists());
    }
}

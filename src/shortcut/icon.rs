use std::fs;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use crate::apps::{is_remote, AppRecord};
use crate::error::{ShellError, ShellResult};
use crate::network::Downloader;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const ICO_HEADER: [u8; 4] = [0, 0, 1, 0];
const ICO_HEADER_LEN: usize = 6;
const ICO_ENTRY_LEN: usize = 16;

/// Icon container the platform's shortcuts understand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IconFormat {
    Ico,
    Png,
}

impl IconFormat {
    pub fn native() -> Self {
        if cfg!(target_os = "windows") {
            IconFormat::Ico
        } else {
            IconFormat::Png
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            IconFormat::Ico => "ico",
            IconFormat::Png => "png",
        }
    }
}

/// Width and height from a PNG's IHDR chunk
pub fn png_dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if bytes.len() < 24 || bytes[..8] != PNG_SIGNATURE || &bytes[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes([bytes[16], bytes[17], bytes[18], bytes[19]]);
    let height = u32::from_be_bytes([bytes[20], bytes[21], bytes[22], bytes[23]]);
    Some((width, height))
}

pub fn is_ico(bytes: &[u8]) -> bool {
    bytes.len() >= ICO_HEADER_LEN + ICO_ENTRY_LEN && bytes[..4] == ICO_HEADER
}

/// Wraps PNG data in a single-image ICO container
/// PNG-compressed entries are read natively by Windows; sizes of 256 and
/// above are encoded as 0 in the directory entry.
pub fn png_to_ico(png: &[u8]) -> ShellResult<Vec<u8>> {
    let (width, height) = png_dimensions(png)
        .ok_or_else(|| ShellError::IconConversionFailed("source is not a PNG image".to_string()))?;
    if width == 0 || height == 0 {
        return Err(ShellError::IconConversionFailed(format!(
            "invalid PNG dimensions {}x{}",
            width, height
        )));
    }

    let dimension = |d: u32| if d >= 256 { 0u8 } else { d as u8 };
    let size = u32::try_from(png.len())
        .map_err(|_| ShellError::IconConversionFailed("image too large".to_string()))?;

    let mut ico = Vec::with_capacity(ICO_HEADER_LEN + ICO_ENTRY_LEN + png.len());
    // ICONDIR
    ico.extend_from_slice(&0u16.to_le_bytes());
    ico.extend_from_slice(&1u16.to_le_bytes());
    ico.extend_from_slice(&1u16.to_le_bytes());
    // ICONDIRENTRY
    ico.push(dimension(width));
    ico.push(dimension(height));
    ico.push(0); // palette
    ico.push(0); // reserved
    ico.extend_from_slice(&1u16.to_le_bytes()); // planes
    ico.extend_from_slice(&32u16.to_le_bytes()); // bits per pixel
    ico.extend_from_slice(&size.to_le_bytes());
    ico.extend_from_slice(&((ICO_HEADER_LEN + ICO_ENTRY_LEN) as u32).to_le_bytes());
    ico.extend_from_slice(png);
    Ok(ico)
}

/// Gets app logos onto disk and into the platform's icon format
pub struct IconPipeline {
    downloader: Downloader,
    cache_dir: PathBuf,
}

impl IconPipeline {
    pub fn new(downloader: Downloader, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            downloader,
            cache_dir: cache_dir.into(),
        }
    }

    /// Local file holding the app's logo, downloading remote logos first
    pub async fn acquire(&self, app: &AppRecord) -> ShellResult<PathBuf> {
        let logo = app.logo.trim();
        if logo.is_empty() {
            return Err(ShellError::IconSourceMissing(format!("no logo provided for app {}", app.id)));
        }

        if is_remote(logo) {
            let dest = self.cache_dir.join(format!("{}.png", app.id));
            self.downloader
                .download_to_file(logo, &dest)
                .await
                .map_err(|e| {
                    error!("Failed to download icon {}: {}", logo, e);
                    ShellError::IconSourceMissing(format!("{}: {}", logo, e))
                })?;
            return Ok(dest);
        }

        let path = PathBuf::from(logo);
        if !path.is_file() {
            return Err(ShellError::IconSourceMissing(format!("source image not found: {}", logo)));
        }
        Ok(path)
    }

    /// Converts an acquired image into `<cache>/<stem>.<ext>`
    pub fn convert(&self, source: &Path, format: IconFormat) -> ShellResult<PathBuf> {
        if !source.is_file() {
            return Err(ShellError::IconSourceMissing(format!(
                "source image not found: {}",
                source.display()
            )));
        }
        let bytes = fs::read(source)?;
        info!("Image file read, size: {}", bytes.len());

        let converted = match format {
            IconFormat::Ico if is_ico(&bytes) => bytes,
            IconFormat::Ico => png_to_ico(&bytes)?,
            IconFormat::Png if png_dimensions(&bytes).is_some() => bytes,
            IconFormat::Png => {
                return Err(ShellError::IconConversionFailed(format!(
                    "{} is not a PNG image",
                    source.display()
                )))
            }
        };

        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "icon".to_string());
        let dest = self.cache_dir.join(format!("{}.{}", stem, format.extension()));

        fs::create_dir_all(&self.cache_dir)
            .and_then(|_| fs::write(&dest, &converted))
            .map_err(|e| ShellError::IconConversionFailed(format!("{}: {}", dest.display(), e)))?;

        info!("Icon written to {:?} ({} bytes)", dest, converted.len());
        Ok(dest)
    }

    /// Raw bytes of a logo, remote or local (window icons)
    pub async fn load_bytes(&self, location: &str) -> ShellResult<Vec<u8>> {
        if is_remote(location) {
            self.downloader
                .fetch_bytes(location)
                .await
                .map_err(|e| ShellError::IconSourceMissing(format!("{}: {}", location, e)))
        } else {
            fs::read(location)
                .map_err(|e| ShellError::IconSourceMissing(format!("{}: {}", location, e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::test_support::{serve_fixture, TINY_PNG};
    use std::time::Duration;

    fn pipeline(dir: &Path) -> IconPipeline {
        IconPipeline::new(Downloader::new(5, Duration::from_secs(5), 1024 * 1024).unwrap(), dir.join("icons"))
    }

    fn app_with_logo(logo: &str) -> AppRecord {
        AppRecord {
            id: "77".into(),
            name: "Example".into(),
            url: "https://example.com/".into(),
            domain: "example.com".into(),
            logo: logo.into(),
        }
    }

    #[test]
    fn test_png_dimensions() {
        assert_eq!(png_dimensions(TINY_PNG), Some((1, 1)));
        assert_eq!(png_dimensions(b"GIF89a"), None);
    }

    #[test]
    fn test_png_to_ico_layout() {
        let ico = png_to_ico(TINY_PNG).unwrap();
        assert!(is_ico(&ico));
        assert_eq!(&ico[4..6], &1u16.to_le_bytes());
        assert_eq!(ico[6], 1); // width
        assert_eq!(ico[7], 1); // height
        assert_eq!(&ico[14..18], &(TINY_PNG.len() as u32).to_le_bytes());
        assert_eq!(&ico[18..22], &22u32.to_le_bytes());
        assert_eq!(&ico[22..], TINY_PNG);
    }

    #[test]
    fn test_large_png_encodes_zero_dimension() {
        let mut png = TINY_PNG.to_vec();
        png[16..20].copy_from_slice(&256u32.to_be_bytes());
        png[20..24].copy_from_slice(&512u32.to_be_bytes());
        let ico = png_to_ico(&png).unwrap();
        assert_eq!(ico[6], 0);
        assert_eq!(ico[7], 0);
    }

    #[test]
    fn test_convert_rejects_non_png() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("logo.jpg");
        fs::write(&source, [0xFF, 0xD8, 0xFF, 0xE0, 0, 0, 0, 0]).unwrap();

        let pipeline = pipeline(dir.path());
        assert!(matches!(
            pipeline.convert(&source, IconFormat::Ico),
            Err(ShellError::IconConversionFailed(_))
        ));
        assert!(matches!(
            pipeline.convert(&dir.path().join("nope.png"), IconFormat::Ico),
            Err(ShellError::IconSourceMissing(_))
        ));
    }

    #[test]
    fn test_convert_writes_into_cache() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("logo.png");
        fs::write(&source, TINY_PNG).unwrap();
        let pipeline = pipeline(dir.path());

        let ico = pipeline.convert(&source, IconFormat::Ico).unwrap();
        assert_eq!(ico, dir.path().join("icons").join("logo.ico"));
        assert!(is_ico(&fs::read(&ico).unwrap()));

        let png = pipeline.convert(&source, IconFormat::Png).unwrap();
        assert_eq!(fs::read(png).unwrap(), TINY_PNG);
    }

    #[tokio::test]
    async fn test_acquire_missing_sources() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        for logo in ["", "/definitely/not/here.png"] {
            let err = pipeline.acquire(&app_with_logo(logo)).await.unwrap_err();
            assert!(matches!(err, ShellError::IconSourceMissing(_)), "logo {:?}", logo);
        }
    }

    #[tokio::test]
    async fn test_acquire_downloads_remote_logo() {
        let base = serve_fixture().await;
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline(dir.path());

        let path = pipeline
            .acquire(&app_with_logo(&format!("{}/hop/1", base)))
            .await
            .unwrap();
        assert_eq!(path, dir.path().join("icons").join("77.png"));
        assert_eq!(fs::read(&path).unwrap(), TINY_PNG);

        let err = pipeline
            .acquire(&app_with_logo(&format!("{}/loop", base)))
            .await
            .unwrap_err();
        assert!(matches!(err, ShellError::IconSourceMissing(_)));
    }
}

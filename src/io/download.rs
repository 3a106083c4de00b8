use crate::types::{DamageError, DamageResult};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Downloads remote band files once and keeps them in a local cache directory
pub struct BandDownloader {
    cache_dir: PathBuf,
    max_retries: u32,
    timeout: Duration,
}

impl BandDownloader {
    pub fn new<P: AsRef<Path>>(cache_dir: P, max_retries: u32, timeout: Duration) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            max_retries: max_retries.max(1),
            timeout,
        }
    }

    /// Default cache location: `<platform cache dir>/damagemap/bands`
    pub fn default_cache_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("damagemap")
            .join("bands")
    }

    pub fn is_remote(href: &str) -> bool {
        href.starts_with("http://") || href.starts_with("https://")
    }

    /// Local file name used to cache a URL
    pub fn cache_path(&self, url: &str) -> PathBuf {
        let without_scheme = url
            .trim_start_matches("https://")
            .trim_start_matches("http://");
        let mut name: String = without_scheme
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
            .collect();
        if let Some(stripped) = name.strip_suffix(".gz") {
            name = stripped.to_string();
        }
        // Flattening is lossy, so a digest of the full URL keeps names unique
        let digest = Sha256::digest(url.as_bytes());
        let tag: String = digest[..6].iter().map(|b| format!("{:02x}", b)).collect();
        self.cache_dir.join(format!("{}_{}", tag, name))
    }

    /// Return a local path for `url`, downloading it if it is not cached yet
    pub fn fetch(&self, url: &str) -> DamageResult<PathBuf> {
        let output_path = self.cache_path(url);
        if let Ok(metadata) = std::fs::metadata(&output_path) {
            if metadata.len() > 0 {
                log::debug!("Using cached band file: {}", output_path.display());
                return Ok(output_path);
            }
        }

        std::fs::create_dir_all(&self.cache_dir)?;
        log::info!("Downloading band file from: {}", url);

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("damagemap/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| DamageError::Provider(format!("Failed to create HTTP client: {}", e)))?;

        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            log::debug!("Download attempt {} of {}", attempt, self.max_retries);

            match Self::try_download_once(&client, url, &output_path) {
                Ok(()) => {
                    log::info!("Downloaded band file to: {}", output_path.display());
                    return Ok(output_path);
                }
                Err(e) => {
                    log::warn!("Download attempt {} failed: {}", attempt, e);
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        std::thread::sleep(Duration::from_secs(2));
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            DamageError::Provider(format!("Download of {} failed after all retries", url))
        }))
    }

    fn try_download_once(
        client: &reqwest::blocking::Client,
        url: &str,
        output_path: &Path,
    ) -> DamageResult<()> {
        let response = client
            .get(url)
            .send()
            .map_err(|e| DamageError::Provider(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(DamageError::Provider(format!(
                "HTTP {} {}: {}",
                response.status().as_u16(),
                response.status().canonical_reason().unwrap_or(""),
                url
            )));
        }

        let content = response
            .bytes()
            .map_err(|e| DamageError::Provider(format!("Failed to read response body: {}", e)))?;
        log::debug!("Downloaded {} bytes", content.len());

        store_payload(&content, output_path)
            .map_err(|e| DamageError::Provider(format!("Bad payload from {}: {}", url, e)))
    }
}

/// Decompress if gzipped, then write via a `.part` file so a partial file is never cached
pub(crate) fn store_payload(content: &[u8], output_path: &Path) -> DamageResult<()> {
    let payload = if is_gzip_content(content) {
        decompress_gzip(content)?
    } else {
        content.to_vec()
    };
    if payload.is_empty() {
        return Err(DamageError::Provider("empty band file".to_string()));
    }

    let partial = output_path.with_extension("part");
    std::fs::write(&partial, payload)?;
    std::fs::rename(&partial, output_path)?;
    Ok(())
}

/// Check if content is gzip format by examining magic bytes
pub(crate) fn is_gzip_content(content: &[u8]) -> bool {
    content.len() >= 2 && content[0] == 0x1F && content[1] == 0x8B
}

pub(crate) fn decompress_gzip(gzip_data: &[u8]) -> DamageResult<Vec<u8>> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoder = GzDecoder::new(gzip_data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(|e| DamageError::Provider(format!("Failed to decompress gzip data: {}", e)))?;

    log::debug!("Decompressed {} bytes", decompressed.len());
    Ok(decompressed)
}

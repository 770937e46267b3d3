use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncWriteExt, BufWriter};
use url::Url;

use crate::config::ArtifactConfig;

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("Download request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Download returned HTTP {0}")]
    Status(reqwest::StatusCode),
    #[error("Expected model weights but received {0}")]
    UnexpectedContent(String),
    #[error("Failed to write artifact: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid artifact URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// What the health endpoint reports about the weight file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStatus {
    pub found: bool,
    pub path: PathBuf,
    pub size_bytes: Option<u64>,
}

/// Finds the serialized weights on disk, or fetches them once from the
/// configured remote URL.
#[derive(Clone)]
pub struct ArtifactLocator {
    candidates: Vec<PathBuf>,
    remote_url: Option<String>,
    download_path: PathBuf,
    buffer_bytes: usize,
    client: reqwest::Client,
}

impl ArtifactLocator {
    pub fn new(config: &ArtifactConfig) -> Self {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            // a stalled body fails the load instead of holding every waiting request
            .read_timeout(Duration::from_secs(config.download_read_timeout_secs.max(1)))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });

        Self {
            candidates: config.candidate_paths(),
            remote_url: config.remote_url.clone(),
            download_path: config.resolved_download_path(),
            buffer_bytes: config.download_buffer_bytes.max(1),
            client,
        }
    }

    pub fn remote_url(&self) -> Option<&str> {
        self.remote_url.as_deref()
    }

    fn first_existing(&self) -> Option<&PathBuf> {
        self.candidates.iter().find(|path| path.is_file())
    }

    pub fn find_local(&self) -> Option<PathBuf> {
        for path in &self.candidates {
            if path.is_file() {
                log::info!("Model file found: {}", path.display());
                return Some(path.clone());
            }
            log::debug!("Checking: {} - not found", path.display());
        }
        log::warn!("Model file not found in any expected location");
        None
    }

    /// First local candidate, else a fresh download when a remote URL is
    /// configured. Failures are logged and reported as `None`.
    pub async fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = self.find_local() {
            return Some(path);
        }
        if self.download_path.is_file() {
            return Some(self.download_path.clone());
        }

        let url = self.remote_url.as_deref()?;
        match self.fetch(url).await {
            Ok(path) => Some(path),
            Err(e) => {
                log::error!("Failed to download model artifact: {}", e);
                None
            }
        }
    }

    /// Streams `url` to the download path through a `.part` file so an
    /// interrupted transfer never looks like a usable artifact.
    pub async fn fetch(&self, url: &str) -> Result<PathBuf, ArtifactError> {
        let direct = direct_download_url(url)?;
        log::info!("Downloading model artifact from {}", direct);

        let mut response = self.client.get(&direct).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ArtifactError::Status(status));
        }
        if let Some(content_type) = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .filter(|v| v.starts_with("text/html"))
        {
            return Err(ArtifactError::UnexpectedContent(content_type.to_string()));
        }

        if let Some(parent) = self
            .download_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(&self.download_path);
        match self.stream_to(&mut response, &partial).await {
            Ok(written) => {
                tokio::fs::rename(&partial, &self.download_path).await?;
                log::info!(
                    "Downloaded {:.1} MB to {}",
                    written as f64 / (1024.0 * 1024.0),
                    self.download_path.display()
                );
                Ok(self.download_path.clone())
            }
            Err(e) => {
                if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
                    log::debug!("No partial download to remove: {}", cleanup);
                }
                Err(e)
            }
        }
    }

    async fn stream_to(
        &self,
        response: &mut reqwest::Response,
        target: &Path,
    ) -> Result<u64, ArtifactError> {
        let file = tokio::fs::File::create(target).await?;
        let mut writer = BufWriter::with_capacity(self.buffer_bytes, file);
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            writer.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        writer.flush().await?;
        Ok(written)
    }

    /// Read-only: never downloads. Sees the same files `locate` would use.
    pub fn status(&self) -> ArtifactStatus {
        let existing = self
            .first_existing()
            .or_else(|| Some(&self.download_path).filter(|path| path.is_file()));
        match existing {
            Some(path) => ArtifactStatus {
                found: true,
                path: path.clone(),
                size_bytes: std::fs::metadata(path).ok().map(|m| m.len()),
            },
            None => ArtifactStatus {
                found: false,
                path: self.download_path.clone(),
                size_bytes: None,
            },
        }
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Rewrites Google Drive share links into their direct-download form; any
/// other URL is returned unchanged.
pub fn direct_download_url(raw: &str) -> Result<String, url::ParseError> {
    let parsed = Url::parse(raw)?;
    let is_drive = matches!(
        parsed.host_str(),
        Some("drive.google.com") | Some("docs.google.com")
    );
    if !is_drive {
        return Ok(raw.to_string());
    }
    Ok(match drive_file_id(&parsed) {
        Some(id) => format!("https://drive.google.com/uc?export=download&id={}&confirm=t", id),
        None => raw.to_string(),
    })
}

fn drive_file_id(url: &Url) -> Option<String> {
    if let Some(segments) = url.path_segments() {
        let segments: Vec<&str> = segments.collect();
        if let Some(pos) = segments.iter().position(|s| *s == "d") {
            if let Some(id) = segments.get(pos + 1).filter(|s| !s.is_empty()) {
                return Some(id.to_string());
            }
        }
    }
    url.query_pairs()
        .find(|(key, _)| key == "id")
        .map(|(_, value)| value.into_owned())
}

//! Event media lookup.
//!
//! Frigate serves a snapshot and a clip per event under
//! `/api/events/{id}/snapshot.jpg` and `/api/events/{id}/clip.mp4`. Depending
//! on [`MediaMode`] the fetcher either hands out the public URL or downloads
//! the file from the internal API so it can be uploaded.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use frigate_stream::Event;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use url::Url;

use crate::config::{Config, MediaMode};
use crate::utils::http_client;
use crate::{Error, Result};

/// Where a piece of media can be read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaRef {
    Url(String),
    File(PathBuf),
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaRef::Url(url) => write!(f, "{}", url),
            MediaRef::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Kind of media attached to an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Snapshot,
    Clip,
}

impl MediaKind {
    /// File name used by the Frigate API.
    pub fn file_name(self) -> &'static str {
        match self {
            MediaKind::Snapshot => "snapshot.jpg",
            MediaKind::Clip => "clip.mp4",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Snapshot => "jpg",
            MediaKind::Clip => "mp4",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Snapshot => write!(f, "snapshot"),
            MediaKind::Clip => write!(f, "clip"),
        }
    }
}

/// `{base}/api/events/{id}/snapshot.jpg` or `.../clip.mp4`.
pub fn event_media_url(base: &str, event_id: &str, kind: MediaKind) -> String {
    format!(
        "{}/api/events/{}/{}",
        base.trim_end_matches('/'),
        event_id,
        kind.file_name()
    )
}

/// Link to the event list in the Frigate UI, filtered to this event's camera,
/// label and zone.
pub fn event_review_url(base: &str, event: &Event) -> String {
    let base = base.trim_end_matches('/');
    let raw = format!("{}/events", base);
    let zone = event.zone().unwrap_or_default();

    match Url::parse(&raw) {
        Ok(mut url) => {
            url.query_pairs_mut()
                .append_pair("cameras", event.camera())
                .append_pair("labels", event.label())
                .append_pair("zones", zone);
            url.to_string()
        }
        Err(_) => format!(
            "{}?cameras={}&labels={}&zones={}",
            raw,
            event.camera(),
            event.label(),
            zone
        ),
    }
}

/// Resolves event ids to media references.
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn snapshot_ref(&self, event_id: &str) -> Result<MediaRef>;

    async fn clip_ref(&self, event_id: &str) -> Result<MediaRef>;

    /// Called once a reference is no longer needed.
    async fn release(&self, _media: &MediaRef) {}
}

/// [`MediaFetcher`] backed by the Frigate HTTP API.
pub struct FrigateMediaFetcher {
    mode: MediaMode,
    api_url: String,
    external_url: String,
    download_dir: PathBuf,
    client: Client,
}

impl FrigateMediaFetcher {
    pub fn new(
        mode: MediaMode,
        api_url: impl Into<String>,
        external_url: impl Into<String>,
        download_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        Ok(Self {
            mode,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            external_url: external_url.into().trim_end_matches('/').to_string(),
            download_dir: download_dir.into(),
            client: http_client::build_client()?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            config.media.mode,
            config.frigate.api_url(),
            config.frigate.external_url(),
            config.media.download_dir(),
        )
    }

    pub fn mode(&self) -> MediaMode {
        self.mode
    }

    async fn resolve(&self, event_id: &str, kind: MediaKind) -> Result<MediaRef> {
        match self.mode {
            MediaMode::Link => Ok(MediaRef::Url(event_media_url(
                &self.external_url,
                event_id,
                kind,
            ))),
            MediaMode::Download => {
                let path = self.download(event_id, kind).await?;
                Ok(MediaRef::File(path))
            }
        }
    }

    async fn download(&self, event_id: &str, kind: MediaKind) -> Result<PathBuf> {
        let url = event_media_url(&self.api_url, event_id, kind);
        let path = download_path(&self.download_dir, event_id, kind);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::media(format!("{} request for event {} failed: {}", kind, event_id, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::media(format!(
                "{} for event {} not available: {} from {}",
                kind, event_id, status, url
            )));
        }

        tokio::fs::create_dir_all(&self.download_dir).await?;
        // Declared before the file so the handle closes first on drop.
        let partial = PartialDownload::new(path);
        let mut file = tokio::fs::File::create(partial.path()).await?;
        let mut body = response.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| {
                Error::media(format!(
                    "{} download for event {} interrupted: {}",
                    kind, event_id, e
                ))
            })?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;
        drop(file);

        if written == 0 {
            return Err(Error::media(format!(
                "{} for event {} is empty",
                kind, event_id
            )));
        }

        let path = partial.keep();
        debug!(
            "Downloaded {} for event {} ({} bytes) to {}",
            kind,
            event_id,
            written,
            path.display()
        );
        Ok(path)
    }
}

#[async_trait]
impl MediaFetcher for FrigateMediaFetcher {
    async fn snapshot_ref(&self, event_id: &str) -> Result<MediaRef> {
        self.resolve(event_id, MediaKind::Snapshot).await
    }

    async fn clip_ref(&self, event_id: &str) -> Result<MediaRef> {
        self.resolve(event_id, MediaKind::Clip).await
    }

    async fn release(&self, media: &MediaRef) {
        if let MediaRef::File(path) = media {
            if path.starts_with(&self.download_dir) {
                remove_quietly(path).await;
            }
        }
    }
}

/// `{dir}/{event_id}.{ext}` with path separators removed from the id.
fn download_path(dir: &Path, event_id: &str, kind: MediaKind) -> PathBuf {
    let safe: String = event_id
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' => '_',
            c => c,
        })
        .collect();
    dir.join(format!("{}-{}.{}", safe, kind, kind.extension()))
}

/// Download target that is deleted on drop unless [`keep`](Self::keep) is
/// called. Covers errors as well as a caller abandoning the future.
struct PartialDownload {
    path: PathBuf,
    keep: bool,
}

impl PartialDownload {
    fn new(path: PathBuf) -> Self {
        Self { path, keep: false }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for PartialDownload {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove partial download {}: {}", self.path.display(), e);
            }
        }
    }
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

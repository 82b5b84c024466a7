//! Free mirror backends and the first-wins mirror race.
//!
//! Two interchangeable families of unauthenticated search endpoints resolve
//! an (artist, title) query to a playable video reference. Every failure
//! mode here is a soft miss: timeouts, non-2xx statuses, and malformed
//! bodies are logged at debug level and the race simply continues with the
//! remaining mirrors.

use crate::media::Provenance;
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Which mirror family an endpoint belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorFamily {
    A,
    B,
}

impl MirrorFamily {
    pub fn provenance(&self) -> Provenance {
        match self {
            MirrorFamily::A => Provenance::MirrorA,
            MirrorFamily::B => Provenance::MirrorB,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MirrorFamily::A => "mirror-a",
            MirrorFamily::B => "mirror-b",
        }
    }
}

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {0})")]
    Api(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Request timeout")]
    Timeout,
}

/// A usable search result from a mirror.
#[derive(Debug, Clone)]
pub struct MirrorHit {
    pub video_id: String,
    pub title: String,
    pub thumbnail_url: String,
    pub duration_secs: u32,
    pub channel: String,
    pub family: MirrorFamily,
}

/// One mirror endpoint (one hostname of one family).
#[async_trait]
pub trait MirrorBackend: Send + Sync {
    fn family(&self) -> MirrorFamily;

    fn host(&self) -> &str;

    /// Search for a track. `Ok(None)` is an empty-but-well-formed result.
    async fn search(&self, query: &str) -> Result<Option<MirrorHit>, MirrorError>;
}

/// Race every mirror concurrently; the first usable hit wins and stragglers
/// are dropped. Each call carries its own timeout; one slow mirror never
/// holds up the others.
pub async fn race_mirrors(
    backends: &[Arc<dyn MirrorBackend>],
    query: &str,
    per_call_timeout: Duration,
) -> Option<MirrorHit> {
    let mut in_flight: FuturesUnordered<_> = backends
        .iter()
        .map(|backend| {
            let backend = backend.clone();
            let query = query.to_string();
            async move {
                let result =
                    tokio::time::timeout(per_call_timeout, backend.search(&query)).await;
                (backend, result)
            }
        })
        .collect();

    while let Some((backend, result)) = in_flight.next().await {
        match result {
            Ok(Ok(Some(hit))) => {
                crate::server::metrics::MIRROR_REQUESTS
                    .with_label_values(&[backend.family().name(), "hit"])
                    .inc();
                return Some(hit);
            }
            Ok(Ok(None)) => {
                crate::server::metrics::MIRROR_REQUESTS
                    .with_label_values(&[backend.family().name(), "empty"])
                    .inc();
                debug!("Mirror {} returned no results for {:?}", backend.host(), query);
            }
            Ok(Err(e)) => {
                crate::server::metrics::MIRROR_REQUESTS
                    .with_label_values(&[backend.family().name(), "error"])
                    .inc();
                debug!("Mirror {} failed for {:?}: {}", backend.host(), query, e);
            }
            Err(_) => {
                crate::server::metrics::MIRROR_REQUESTS
                    .with_label_values(&[backend.family().name(), "timeout"])
                    .inc();
                debug!("Mirror {} timed out for {:?}", backend.host(), query);
            }
        }
    }

    None
}

fn map_reqwest_error(e: reqwest::Error) -> MirrorError {
    if e.is_timeout() {
        MirrorError::Timeout
    } else {
        MirrorError::Connection(e.to_string())
    }
}

// =============================================================================
// Family A: Invidious-style endpoints
// =============================================================================

pub struct InvidiousMirror {
    client: Client,
    host: String,
}

impl InvidiousMirror {
    pub fn new(client: Client, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct InvidiousVideo {
    #[serde(rename = "videoId")]
    video_id: String,
    title: String,
    #[serde(default)]
    author: String,
    #[serde(rename = "lengthSeconds", default)]
    length_seconds: u32,
    #[serde(rename = "videoThumbnails", default)]
    video_thumbnails: Vec<InvidiousThumbnail>,
}

#[derive(Debug, Deserialize)]
struct InvidiousThumbnail {
    url: String,
    #[serde(default)]
    width: u32,
}

fn parse_invidious_body(body: &str, family: MirrorFamily) -> Result<Option<MirrorHit>, MirrorError> {
    let videos: Vec<InvidiousVideo> = serde_json::from_str(body)
        .map_err(|e| MirrorError::InvalidResponse(e.to_string()))?;
    let Some(video) = videos.into_iter().find(|v| !v.video_id.is_empty()) else {
        return Ok(None);
    };
    // Widest thumbnail available, falling back to the first.
    let thumbnail_url = video
        .video_thumbnails
        .iter()
        .max_by_key(|t| t.width)
        .or_else(|| video.video_thumbnails.first())
        .map(|t| t.url.clone())
        .unwrap_or_default();
    Ok(Some(MirrorHit {
        video_id: video.video_id,
        title: video.title,
        thumbnail_url,
        duration_secs: video.length_seconds,
        channel: video.author,
        family,
    }))
}

#[async_trait]
impl MirrorBackend for InvidiousMirror {
    fn family(&self) -> MirrorFamily {
        MirrorFamily::A
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn search(&self, query: &str) -> Result<Option<MirrorHit>, MirrorError> {
        let url = format!(
            "{}/api/v1/search?q={}&type=video",
            self.host,
            urlencoding::encode(query)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        if !response.status().is_success() {
            return Err(MirrorError::Api(response.status().as_u16()));
        }
        let body = response.text().await.map_err(map_reqwest_error)?;
        parse_invidious_body(&body, self.family())
    }
}

// =============================================================================
// Family B: Piped-style endpoints
// =============================================================================

pub struct PipedMirror {
    client: Client,
    host: String,
}

impl PipedMirror {
    pub fn new(client: Client, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PipedSearchResponse {
    #[serde(default)]
    items: Vec<PipedItem>,
}

#[derive(Debug, Deserialize)]
struct PipedItem {
    #[serde(default)]
    url: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnail: String,
    #[serde(default)]
    duration: u32,
    #[serde(rename = "uploaderName", default)]
    uploader_name: String,
}

fn parse_piped_body(body: &str, family: MirrorFamily) -> Result<Option<MirrorHit>, MirrorError> {
    let parsed: PipedSearchResponse = serde_json::from_str(body)
        .map_err(|e| MirrorError::InvalidResponse(e.to_string()))?;
    // Video ids arrive embedded in a watch URL ("/watch?v=<id>").
    let hit = parsed.items.into_iter().find_map(|item| {
        let video_id = item.url.split("v=").nth(1)?.to_string();
        if video_id.is_empty() {
            return None;
        }
        Some(MirrorHit {
            video_id,
            title: item.title,
            thumbnail_url: item.thumbnail,
            duration_secs: item.duration,
            channel: item.uploader_name,
            family,
        })
    });
    Ok(hit)
}

#[async_trait]
impl MirrorBackend for PipedMirror {
    fn family(&self) -> MirrorFamily {
        MirrorFamily::B
    }

    fn host(&self) -> &str {
        &self.host
    }

    async fn search(&self, query: &str) -> Result<Option<MirrorHit>, MirrorError> {
        let url = format!(
            "{}/search?q={}&filter=videos",
            self.host,
            urlencoding::encode(query)
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_reqwest_error)?;
        if !response.status().is_success() {
            return Err(MirrorError::Api(response.status().as_u16()));
        }
        let body = response.text().await.map_err(map_reqwest_error)?;
        parse_piped_body(&body, self.family())
    }
}

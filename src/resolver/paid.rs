//! Quota-metered paid search API client.
//!
//! This tier is the last resort: callers must clear it with the quota
//! ledger before invoking it, and bulk enrichment never reaches it at all.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaidApiError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {0}): {1}")]
    Api(u16, String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone)]
pub struct PaidHit {
    pub video_id: String,
    pub title: String,
    pub thumbnail_url: String,
}

#[async_trait]
pub trait PaidSearch: Send + Sync {
    async fn search(&self, artist: &str, title: &str) -> Result<Option<PaidHit>, PaidApiError>;
}

/// YouTube Data API style search client.
///
/// A search request costs 100 quota units; the ledger is consulted and
/// charged by the resolution service, not here.
pub struct YoutubeDataApi {
    client: Client,
    base_url: String,
    api_key: String,
}

impl YoutubeDataApi {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: SearchItemId,
    #[serde(default)]
    snippet: Option<Snippet>,
}

#[derive(Debug, Deserialize)]
struct SearchItemId {
    #[serde(rename = "videoId", default)]
    video_id: String,
}

#[derive(Debug, Deserialize)]
struct Snippet {
    #[serde(default)]
    title: String,
    #[serde(default)]
    thumbnails: Thumbnails,
}

#[derive(Debug, Deserialize, Default)]
struct Thumbnails {
    #[serde(default)]
    high: Option<Thumbnail>,
    #[serde(default)]
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

fn parse_search_body(body: &str) -> Result<Option<PaidHit>, PaidApiError> {
    let parsed: SearchResponse =
        serde_json::from_str(body).map_err(|e| PaidApiError::InvalidResponse(e.to_string()))?;
    let Some(item) = parsed
        .items
        .into_iter()
        .find(|i| !i.id.video_id.is_empty())
    else {
        return Ok(None);
    };
    let (title, thumbnail_url) = item
        .snippet
        .map(|s| {
            let url = s
                .thumbnails
                .high
                .or(s.thumbnails.default)
                .map(|t| t.url)
                .unwrap_or_default();
            (s.title, url)
        })
        .unwrap_or_default();
    Ok(Some(PaidHit {
        video_id: item.id.video_id,
        title,
        thumbnail_url,
    }))
}

#[async_trait]
impl PaidSearch for YoutubeDataApi {
    async fn search(&self, artist: &str, title: &str) -> Result<Option<PaidHit>, PaidApiError> {
        let query = format!("{} {}", artist, title);
        let url = format!(
            "{}/search?part=snippet&type=video&maxResults=1&q={}&key={}",
            self.base_url,
            urlencoding::encode(&query),
            self.api_key
        );
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| PaidApiError::Connection(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaidApiError::Api(status.as_u16(), body));
        }
        let body = response
            .text()
            .await
            .map_err(|e| PaidApiError::Connection(e.to_string()))?;
        parse_search_body(&body)
    }
}

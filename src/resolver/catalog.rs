//! Free metadata catalog resolver (artwork and duration, no playable id).

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("API error (status {0})")]
    Api(u16),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Artwork and duration metadata for a track, without a playable reference.
#[derive(Debug, Clone)]
pub struct CatalogHit {
    pub title: String,
    pub artist: String,
    pub artwork_url: String,
    pub duration_secs: u32,
}

#[async_trait]
pub trait ArtCatalog: Send + Sync {
    /// Look up artwork and duration. `Ok(None)` means the catalog has no
    /// match; callers treat errors and misses the same way (soft miss).
    async fn lookup(&self, artist: &str, title: &str) -> Result<Option<CatalogHit>, CatalogError>;
}

/// iTunes-style search catalog.
///
/// Artwork URLs embed their resolution ("100x100"), which the API lets us
/// rewrite to request a larger rendition.
pub struct ItunesCatalog {
    client: Client,
    base_url: String,
}

const HD_RESOLUTION: &str = "600x600";

impl ItunesCatalog {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ItunesSearchResponse {
    #[serde(default)]
    results: Vec<ItunesTrack>,
}

#[derive(Debug, Deserialize)]
struct ItunesTrack {
    #[serde(rename = "trackName", default)]
    track_name: String,
    #[serde(rename = "artistName", default)]
    artist_name: String,
    #[serde(rename = "artworkUrl100", default)]
    artwork_url_100: String,
    #[serde(rename = "trackTimeMillis", default)]
    track_time_millis: u64,
}

fn upscale_artwork(url: &str) -> String {
    url.replace("100x100", HD_RESOLUTION)
}

fn parse_catalog_body(body: &str) -> Result<Option<CatalogHit>, CatalogError> {
    let parsed: ItunesSearchResponse =
        serde_json::from_str(body).map_err(|e| CatalogError::InvalidResponse(e.to_string()))?;
    let Some(track) = parsed
        .results
        .into_iter()
        .find(|t| !t.artwork_url_100.is_empty())
    else {
        return Ok(None);
    };
    Ok(Some(CatalogHit {
        title: track.track_name,
        artist: track.artist_name,
        artwork_url: upscale_artwork(&track.artwork_url_100),
        duration_secs: (track.track_time_millis / 1000) as u32,
    }))
}

#[async_trait]
impl ArtCatalog for ItunesCatalog {
    async fn lookup(&self, artist: &str, title: &str) -> Result<Option<CatalogHit>, CatalogError> {
        let term = format!("{} {}", artist, title);
        let url = format!(
            "{}/search?term={}&media=music&entity=song&limit=5",
            self.base_url,
            urlencoding::encode(&term)
        );
        let response = self.client.get(&url).send().await.map_err(|e| {
            CatalogError::Connection(e.to_string())
        })?;
        if !response.status().is_success() {
            return Err(CatalogError::Api(response.status().as_u16()));
        }
        let body = response
            .text()
            .await
            .map_err(|e| CatalogError::Connection(e.to_string()))?;
        let hit = parse_catalog_body(&body)?;
        if hit.is_none() {
            debug!("Catalog returned no artwork for {} - {}", artist, title);
        }
        Ok(hit)
    }
}

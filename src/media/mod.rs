//! Media reference model and lookup-key normalization.

mod cache;

pub use cache::{MediaCache, CACHE_TTL};

use serde::{Deserialize, Serialize};

/// Which resolution tier produced a media reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    Cache,
    MirrorA,
    MirrorB,
    Catalog,
    PaidApi,
}

/// Playable media metadata attached to a track.
///
/// `video_id` may be empty for catalog-only references (artwork and
/// duration, no playable stream).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReference {
    pub video_id: String,
    pub thumbnail_url: String,
    pub duration_secs: u32,
    pub provenance: Provenance,
}

impl MediaReference {
    pub fn is_playable(&self) -> bool {
        !self.video_id.is_empty()
    }
}

/// Fold an (artist, title) pair into the cache lookup key.
///
/// Case-folded, punctuation stripped, whitespace collapsed, so
/// "Daft Punk" / "  daft punk!!" / "DAFT PUNK" all collide.
pub fn normalized_key(artist: &str, title: &str) -> String {
    format!("{}::{}", fold(artist), fold(title))
}

fn fold(s: &str) -> String {
    let stripped: String = s
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c
            } else {
                ' '
            }
        })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

//! Set generation: request model, stream events, providers, orchestrator.

pub mod orchestrator;
pub mod providers;

pub use orchestrator::{run_generation, OrchestratorSettings};
pub use providers::{ProviderError, TrackListProvider};

use crate::media::MediaReference;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Numeric constraints a generated set must respect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetConstraints {
    /// Energy bounds on a 0-10 scale.
    #[serde(default)]
    pub energy_min: Option<u8>,
    #[serde(default)]
    pub energy_max: Option<u8>,
    /// 0.0 = one artist is fine, 1.0 = every track a different artist.
    #[serde(default)]
    pub diversity: Option<f32>,
    /// Inclusive release-year window.
    #[serde(default)]
    pub era_start: Option<u16>,
    #[serde(default)]
    pub era_end: Option<u16>,
    /// Artists or terms that must not appear.
    #[serde(default)]
    pub denylist: Vec<String>,
}

/// A generation request. Immutable once issued; a retry is a new request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    pub track_count: usize,
    #[serde(default)]
    pub constraints: SetConstraints,
    /// Provider ids to race, in priority order (used only for tie-breaks).
    /// Empty means every configured provider.
    #[serde(default)]
    pub roster: Vec<String>,
}

/// A track as returned by a provider, before media enrichment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackSkeleton {
    pub index: usize,
    pub title: String,
    pub artist: String,
}

/// Lifecycle of one provider within a race. Terminal once Succeeded/Failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Events emitted over a generation stream, in strict causal order per
/// provider. Exactly one of `Complete`/`AllFailed` terminates a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StreamEvent {
    Started {
        roster: Vec<String>,
    },
    ProviderStarted {
        provider: String,
    },
    /// The first provider to fully succeed. Exactly one per stream.
    PrimaryResult {
        provider: String,
        tracks: Vec<TrackSkeleton>,
    },
    /// Every other succeeding provider.
    AlternativeResult {
        provider: String,
        tracks: Vec<TrackSkeleton>,
    },
    ProviderFailed {
        provider: String,
        error: String,
    },
    /// Incremental media enrichment, one per track per provider. `media` is
    /// `None` for tracks still unresolved when the enrichment window closes.
    TrackEnriched {
        provider: String,
        index: usize,
        media: Option<MediaReference>,
    },
    Complete {
        primary: String,
        alternatives: Vec<String>,
        failed: Vec<String>,
    },
    /// Terminal event when zero providers succeeded.
    AllFailed {
        errors: BTreeMap<String, String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_event_tagging() {
        let event = StreamEvent::Started {
            roster: vec!["a".to_string(), "b".to_string()],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "started");
        assert_eq!(json["roster"][0], "a");

        let event = StreamEvent::PrimaryResult {
            provider: "b".to_string(),
            tracks: vec![TrackSkeleton {
                index: 0,
                title: "One More Time".to_string(),
                artist: "Daft Punk".to_string(),
            }],
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "primary-result");
        assert_eq!(json["tracks"][0]["artist"], "Daft Punk");
    }

    #[test]
    fn test_track_enriched_null_media() {
        let event = StreamEvent::TrackEnriched {
            provider: "a".to_string(),
            index: 3,
            media: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "track-enriched");
        assert!(json["media"].is_null());
    }

    #[test]
    fn test_request_roundtrip_with_defaults() {
        let raw = r#"{"prompt": "sunset rooftop set", "track_count": 8, "roster": ["a"]}"#;
        let request: GenerationRequest = serde_json::from_str(raw).unwrap();
        assert_eq!(request.track_count, 8);
        assert!(request.constraints.denylist.is_empty());
        assert!(request.constraints.energy_min.is_none());
    }

    #[test]
    fn test_all_failed_serializes_error_map() {
        let mut errors = BTreeMap::new();
        errors.insert("a".to_string(), "timeout".to_string());
        let event = StreamEvent::AllFailed { errors };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "all-failed");
        assert_eq!(json["errors"]["a"], "timeout");
    }
}

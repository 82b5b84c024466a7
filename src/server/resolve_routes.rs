//! Media resolution and quota endpoints.

use super::state::AppState;
use crate::media::MediaReference;
use crate::quota::{QuotaCategory, QuotaStatus};
use crate::resolver::ResolveOptions;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

pub fn resolve_routes() -> Router<AppState> {
    Router::new()
        .route("/resolve", get(resolve_one))
        .route("/resolve/batch", post(resolve_batch))
        .route("/quota/{category}", get(quota_status))
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct ResolveParams {
    artist: String,
    title: String,
    #[serde(default)]
    hd: bool,
    #[serde(default)]
    allow_paid: bool,
    #[serde(default = "default_true")]
    require_playable: bool,
}

#[derive(Debug, Serialize)]
struct ResolveResponse {
    found: bool,
    media: Option<MediaReference>,
}

async fn resolve_one(
    State(state): State<AppState>,
    Query(params): Query<ResolveParams>,
) -> Result<Json<ResolveResponse>, (StatusCode, String)> {
    if params.artist.trim().is_empty() || params.title.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "artist and title are required".to_string(),
        ));
    }
    let opts = ResolveOptions {
        require_playable: params.require_playable,
        prefer_hd_artwork: params.hd,
        allow_paid: params.allow_paid,
    };
    let media = state.resolver.resolve(&params.artist, &params.title, opts).await;
    Ok(Json(ResolveResponse {
        found: media.is_some(),
        media,
    }))
}

#[derive(Debug, Deserialize)]
struct TrackPair {
    artist: String,
    title: String,
}

#[derive(Debug, Deserialize)]
struct BatchRequest {
    pairs: Vec<TrackPair>,
    #[serde(default)]
    hd: bool,
}

#[derive(Debug, Serialize)]
struct BatchResponse {
    results: Vec<Option<MediaReference>>,
}

/// Bulk resolution. The paid tier is never reachable from here; callers
/// wanting a metered lookup go through the single-track endpoint.
async fn resolve_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> Result<Json<BatchResponse>, (StatusCode, String)> {
    if request.pairs.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "pairs must not be empty".to_string()));
    }
    let pairs: Vec<(String, String)> = request
        .pairs
        .into_iter()
        .map(|p| (p.artist, p.title))
        .collect();
    let opts = ResolveOptions {
        require_playable: true,
        prefer_hd_artwork: request.hd,
        allow_paid: false,
    };
    let results = state.resolver.resolve_batch(&pairs, opts).await;
    Ok(Json(BatchResponse { results }))
}

async fn quota_status(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> Result<Json<QuotaStatus>, (StatusCode, String)> {
    let category = QuotaCategory::parse(&category)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Unknown category: {}", category)))?;
    Ok(Json(state.ledger.check(category)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::OrchestratorSettings;
    use crate::kv::SqliteKvBackend;
    use crate::media::{MediaCache, Provenance};
    use crate::quota::QuotaLedger;
    use crate::resolver::ResolutionService;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_state() -> AppState {
        let backend = Arc::new(SqliteKvBackend::in_memory().unwrap());
        AppState {
            resolver: Arc::new(ResolutionService::new(
                MediaCache::new(Some(backend.clone())),
                QuotaLedger::new(Some(backend.clone()), 10_000),
                vec![],
                None,
                None,
                Duration::from_secs(3),
                3,
            )),
            providers: vec![],
            ledger: QuotaLedger::new(Some(backend), 10_000),
            orchestrator: OrchestratorSettings::default(),
        }
    }

    #[tokio::test]
    async fn test_resolve_requires_artist_and_title() {
        let params = ResolveParams {
            artist: "  ".to_string(),
            title: "x".to_string(),
            hd: false,
            allow_paid: false,
            require_playable: true,
        };
        let result = resolve_one(State(test_state()), Query(params)).await;
        assert_eq!(result.unwrap_err().0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_resolve_miss_reports_not_found() {
        let params = ResolveParams {
            artist: "A".to_string(),
            title: "B".to_string(),
            hd: false,
            allow_paid: false,
            require_playable: true,
        };
        let Json(response) = resolve_one(State(test_state()), Query(params)).await.unwrap();
        assert!(!response.found);
        assert!(response.media.is_none());
    }

    #[tokio::test]
    async fn test_batch_rejects_empty_pairs() {
        let request = BatchRequest {
            pairs: vec![],
            hd: false,
        };
        let result = resolve_batch(State(test_state()), Json(request)).await;
        assert_eq!(result.unwrap_err().0, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_batch_is_index_aligned() {
        let state = test_state();
        let request = BatchRequest {
            pairs: vec![
                TrackPair {
                    artist: "A".to_string(),
                    title: "B".to_string(),
                },
                TrackPair {
                    artist: "C".to_string(),
                    title: "D".to_string(),
                },
            ],
            hd: false,
        };
        let Json(response) = resolve_batch(State(state), Json(request)).await.unwrap();
        assert_eq!(response.results.len(), 2);
    }

    #[tokio::test]
    async fn test_quota_route_unknown_category_404() {
        let result = quota_status(State(test_state()), Path("video".to_string())).await;
        assert_eq!(result.unwrap_err().0, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_quota_route_reports_status() {
        let state = test_state();
        state.ledger.consume(crate::quota::QuotaCategory::Search);
        let Json(status) = quota_status(State(state), Path("search".to_string()))
            .await
            .unwrap();
        assert!(status.available);
        assert_eq!(status.remaining, 9_900);
        assert_eq!(status.cost, 100);
    }

    #[test]
    fn test_provenance_serializes_kebab_case() {
        let json = serde_json::to_string(&Provenance::MirrorA).unwrap();
        assert_eq!(json, "\"mirror-a\"");
    }
}

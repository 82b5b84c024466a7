//! Streaming generation endpoint.
//!
//! Events go out as SSE as the race produces them. Client disconnect drops
//! the stream, which cancels the race and its enrichment sub-tasks through
//! a drop guard on the cancellation token.

use super::state::AppState;
use crate::generation::providers::TrackListProvider;
use crate::generation::{run_generation, GenerationRequest};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::post;
use axum::{Json, Router};
use futures::Stream;
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub fn generate_routes() -> Router<AppState> {
    Router::new().route("/generate", post(generate))
}

async fn generate(
    State(state): State<AppState>,
    Json(request): Json<GenerationRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, (StatusCode, String)> {
    if request.track_count == 0 {
        return Err((StatusCode::BAD_REQUEST, "track_count must be > 0".into()));
    }
    let providers = select_providers(&state.providers, &request.roster)
        .map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    info!(
        "Generation request: {} tracks, {} providers",
        request.track_count,
        providers.len()
    );

    let cancel = CancellationToken::new();
    let receiver = run_generation(
        request,
        providers,
        state.resolver.clone(),
        state.orchestrator.clone(),
        cancel.clone(),
    );

    // The guard lives inside the stream closure, so dropping the response
    // body cancels everything downstream.
    let guard = cancel.drop_guard();
    let stream = ReceiverStream::new(receiver).map(move |event| {
        let _ = &guard;
        Event::default().json_data(&event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Pick the providers named by the roster, in roster order. An empty roster
/// means the full configured set.
fn select_providers(
    configured: &[Arc<dyn TrackListProvider>],
    roster: &[String],
) -> Result<Vec<Arc<dyn TrackListProvider>>, String> {
    if configured.is_empty() {
        return Err("No providers configured".to_string());
    }
    if roster.is_empty() {
        return Ok(configured.to_vec());
    }
    roster
        .iter()
        .map(|id| {
            configured
                .iter()
                .find(|p| p.id() == id)
                .cloned()
                .ok_or_else(|| format!("Unknown provider: {}", id))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::providers::ProviderError;
    use crate::generation::TrackSkeleton;
    use async_trait::async_trait;

    #[derive(Debug)]
    struct NamedProvider(&'static str);

    #[async_trait]
    impl TrackListProvider for NamedProvider {
        fn id(&self) -> &str {
            self.0
        }
        async fn generate(
            &self,
            _: &GenerationRequest,
        ) -> Result<Vec<TrackSkeleton>, ProviderError> {
            Ok(vec![])
        }
    }

    fn configured() -> Vec<Arc<dyn TrackListProvider>> {
        vec![
            Arc::new(NamedProvider("alpha")),
            Arc::new(NamedProvider("beta")),
        ]
    }

    #[test]
    fn test_empty_roster_selects_all() {
        let selected = select_providers(&configured(), &[]).unwrap();
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn test_roster_order_is_preserved() {
        let roster = vec!["beta".to_string(), "alpha".to_string()];
        let selected = select_providers(&configured(), &roster).unwrap();
        assert_eq!(selected[0].id(), "beta");
        assert_eq!(selected[1].id(), "alpha");
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let roster = vec!["gamma".to_string()];
        let err = select_providers(&configured(), &roster).unwrap_err();
        assert!(err.contains("gamma"));
    }
}

//! Shared helpers for end-to-end tests: a real server on an ephemeral port
//! with injectable providers and mirror backends.
#![allow(dead_code)]

use async_trait::async_trait;
use setforge_server::generation::providers::{ProviderError, TrackListProvider};
use setforge_server::generation::{GenerationRequest, OrchestratorSettings, TrackSkeleton};
use setforge_server::kv::SqliteKvBackend;
use setforge_server::media::MediaCache;
use setforge_server::quota::QuotaLedger;
use setforge_server::resolver::{
    MirrorBackend, MirrorError, MirrorFamily, MirrorHit, ResolutionService,
};
use setforge_server::server::{make_router, AppState};
use std::sync::Arc;
use std::time::Duration;

pub struct TestServer {
    pub base_url: String,
}

impl TestServer {
    /// Spawn a server with no providers and no mirrors.
    pub async fn spawn() -> Self {
        Self::spawn_with(vec![], vec![]).await
    }

    pub async fn spawn_with(
        providers: Vec<Arc<dyn TrackListProvider>>,
        mirrors: Vec<Arc<dyn MirrorBackend>>,
    ) -> Self {
        let backend = Arc::new(SqliteKvBackend::in_memory().unwrap());
        let ledger = QuotaLedger::new(Some(backend.clone()), 10_000);
        let resolver = Arc::new(ResolutionService::new(
            MediaCache::new(Some(backend)),
            ledger.clone(),
            mirrors,
            None,
            None,
            Duration::from_secs(1),
            3,
        ));
        let state = AppState {
            resolver,
            providers,
            ledger,
            orchestrator: OrchestratorSettings {
                enrichment_timeout: Duration::from_secs(5),
                ..Default::default()
            },
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, make_router(state)).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
        }
    }
}

/// Provider that answers with a fixed number of tracks after a short delay.
#[derive(Debug)]
pub struct StubProvider {
    pub id: String,
    pub track_count: usize,
    pub fail: bool,
}

#[async_trait]
impl TrackListProvider for StubProvider {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(
        &self,
        _request: &GenerationRequest,
    ) -> Result<Vec<TrackSkeleton>, ProviderError> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if self.fail {
            return Err(ProviderError::Connection("stub down".to_string()));
        }
        Ok((0..self.track_count)
            .map(|index| TrackSkeleton {
                index,
                title: format!("Track {}", index),
                artist: format!("Artist {}", index),
            })
            .collect())
    }
}

/// Mirror that always returns a hit derived from the query.
pub struct StubMirror;

#[async_trait]
impl MirrorBackend for StubMirror {
    fn family(&self) -> MirrorFamily {
        MirrorFamily::A
    }

    fn host(&self) -> &str {
        "stub"
    }

    async fn search(&self, query: &str) -> Result<Option<MirrorHit>, MirrorError> {
        Ok(Some(MirrorHit {
            video_id: format!("vid-{}", query.len()),
            title: query.to_string(),
            thumbnail_url: "https://stub.example/t.jpg".to_string(),
            duration_secs: 180,
            channel: "stub".to_string(),
            family: MirrorFamily::A,
        }))
    }
}

use crate::generation::providers::TrackListProvider;
use crate::generation::OrchestratorSettings;
use crate::quota::QuotaLedger;
use crate::resolver::ResolutionService;
use std::sync::Arc;

/// Shared handles for all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<ResolutionService>,
    pub providers: Vec<Arc<dyn TrackListProvider>>,
    pub ledger: QuotaLedger,
    pub orchestrator: OrchestratorSettings,
}

//! Provider race orchestrator.
//!
//! One task per provider plus a collector reading completions in arrival
//! order: the first success becomes the primary result, later successes
//! become alternatives, failures are reported immediately and never cancel
//! their siblings. Media enrichment runs as a sub-task per succeeding
//! provider, emitting incremental `track-enriched` events behind that
//! provider's result event, and the terminal `complete`/`all-failed` event
//! is held until every sub-task has settled.

use super::providers::TrackListProvider;
use super::{GenerationRequest, StreamEvent, TrackSkeleton};
use crate::resolver::{ResolutionService, ResolveOptions};
use crate::server::metrics;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Tracks per enrichment batch handed to the resolution service.
    pub enrichment_batch_size: usize,
    /// Budget for one provider's whole enrichment pass; tracks still
    /// unresolved at the deadline are emitted with no media (best effort).
    pub enrichment_timeout: Duration,
    /// Ask the resolution service for high-resolution artwork.
    pub prefer_hd_artwork: bool,
    /// Event channel capacity.
    pub channel_capacity: usize,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            enrichment_batch_size: 4,
            enrichment_timeout: Duration::from_secs(20),
            prefer_hd_artwork: false,
            channel_capacity: 64,
        }
    }
}

/// Event sink shared by the collector and its sub-tasks.
///
/// Emission is suppressed once the stream is cancelled, and a dropped
/// receiver cancels the stream so in-flight work stops promptly.
#[derive(Clone)]
struct EventSink {
    sender: mpsc::Sender<StreamEvent>,
    cancel: CancellationToken,
}

impl EventSink {
    /// Returns false when the stream is gone and callers should stop.
    async fn emit(&self, event: StreamEvent) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        tokio::select! {
            _ = self.cancel.cancelled() => false,
            sent = self.sender.send(event) => {
                if sent.is_err() {
                    // Receiver dropped: treat as caller abort.
                    self.cancel.cancel();
                    false
                } else {
                    true
                }
            }
        }
    }
}

enum ProviderCompletion {
    Succeeded {
        provider: String,
        tracks: Vec<TrackSkeleton>,
    },
    Failed {
        provider: String,
        error: String,
    },
}

/// Start a generation race and return the live event stream.
///
/// Dropping the receiver or cancelling `cancel` aborts all in-flight work;
/// an aborted stream ends without a terminal event.
pub fn run_generation(
    request: GenerationRequest,
    providers: Vec<Arc<dyn TrackListProvider>>,
    resolver: Arc<ResolutionService>,
    settings: OrchestratorSettings,
    cancel: CancellationToken,
) -> mpsc::Receiver<StreamEvent> {
    let (sender, receiver) = mpsc::channel(settings.channel_capacity.max(1));
    let sink = EventSink { sender, cancel };

    tokio::spawn(collect(request, providers, resolver, settings, sink));

    receiver
}

async fn collect(
    request: GenerationRequest,
    providers: Vec<Arc<dyn TrackListProvider>>,
    resolver: Arc<ResolutionService>,
    settings: OrchestratorSettings,
    sink: EventSink,
) {
    metrics::GENERATIONS.with_label_values(&["started"]).inc();

    let roster: Vec<String> = providers.iter().map(|p| p.id().to_string()).collect();
    if !sink.emit(StreamEvent::Started { roster }).await {
        return;
    }

    // Fan out, roster order. A single completion channel read in arrival
    // order makes the first-success decision; a same-tick tie lands in
    // spawn (roster) order.
    let (completions_tx, mut completions_rx) = mpsc::unbounded_channel::<ProviderCompletion>();
    for provider in &providers {
        tokio::spawn(run_provider(
            provider.clone(),
            request.clone(),
            sink.clone(),
            completions_tx.clone(),
        ));
    }
    drop(completions_tx);

    let mut primary: Option<String> = None;
    let mut alternatives: Vec<String> = Vec::new();
    let mut failed: Vec<String> = Vec::new();
    let mut errors: BTreeMap<String, String> = BTreeMap::new();
    let mut enrichment_tasks = Vec::new();

    while let Some(completion) = tokio::select! {
        _ = sink.cancel.cancelled() => None,
        completion = completions_rx.recv() => completion,
    } {
        match completion {
            ProviderCompletion::Succeeded { provider, tracks } => {
                metrics::PROVIDER_OUTCOMES
                    .with_label_values(&["succeeded"])
                    .inc();
                let event = if primary.is_none() {
                    primary = Some(provider.clone());
                    info!("Provider {} won the race with {} tracks", provider, tracks.len());
                    StreamEvent::PrimaryResult {
                        provider: provider.clone(),
                        tracks: tracks.clone(),
                    }
                } else {
                    alternatives.push(provider.clone());
                    StreamEvent::AlternativeResult {
                        provider: provider.clone(),
                        tracks: tracks.clone(),
                    }
                };
                if !sink.emit(event).await {
                    return;
                }
                enrichment_tasks.push(tokio::spawn(enrich_provider_tracks(
                    provider,
                    tracks,
                    resolver.clone(),
                    settings.clone(),
                    sink.clone(),
                )));
            }
            ProviderCompletion::Failed { provider, error } => {
                metrics::PROVIDER_OUTCOMES
                    .with_label_values(&["failed"])
                    .inc();
                warn!("Provider {} failed: {}", provider, error);
                failed.push(provider.clone());
                errors.insert(provider.clone(), error.clone());
                if !sink
                    .emit(StreamEvent::ProviderFailed { provider, error })
                    .await
                {
                    return;
                }
            }
        }
    }

    if sink.cancel.is_cancelled() {
        return;
    }

    // Enrichment may still be streaming after the last provider settles;
    // the terminal event waits for it.
    for task in enrichment_tasks {
        let _ = task.await;
    }

    match primary {
        Some(primary) => {
            metrics::GENERATIONS.with_label_values(&["completed"]).inc();
            sink.emit(StreamEvent::Complete {
                primary,
                alternatives,
                failed,
            })
            .await;
        }
        None => {
            metrics::GENERATIONS.with_label_values(&["all_failed"]).inc();
            sink.emit(StreamEvent::AllFailed { errors }).await;
        }
    }
}

async fn run_provider(
    provider: Arc<dyn TrackListProvider>,
    request: GenerationRequest,
    sink: EventSink,
    completions: mpsc::UnboundedSender<ProviderCompletion>,
) {
    let id = provider.id().to_string();
    if !sink
        .emit(StreamEvent::ProviderStarted {
            provider: id.clone(),
        })
        .await
    {
        return;
    }

    let outcome = tokio::select! {
        _ = sink.cancel.cancelled() => return,
        outcome = provider.generate(&request) => outcome,
    };

    let completion = match outcome {
        Ok(tracks) => ProviderCompletion::Succeeded {
            provider: id,
            tracks,
        },
        Err(e) => ProviderCompletion::Failed {
            provider: id,
            error: e.to_string(),
        },
    };
    let _ = completions.send(completion);
}

async fn enrich_provider_tracks(
    provider: String,
    tracks: Vec<TrackSkeleton>,
    resolver: Arc<ResolutionService>,
    settings: OrchestratorSettings,
    sink: EventSink,
) {
    let opts = ResolveOptions {
        require_playable: true,
        prefer_hd_artwork: settings.prefer_hd_artwork,
        // The paid tier is reserved for explicit export-time lookups.
        allow_paid: false,
    };
    let deadline = Instant::now() + settings.enrichment_timeout;
    let batch_size = settings.enrichment_batch_size.max(1);

    let mut pending = tracks.as_slice();
    while !pending.is_empty() {
        let (batch, rest) = pending.split_at(batch_size.min(pending.len()));
        let pairs: Vec<(String, String)> = batch
            .iter()
            .map(|t| (t.artist.clone(), t.title.clone()))
            .collect();

        let remaining = deadline.saturating_duration_since(Instant::now());
        let resolved = if remaining.is_zero() {
            None
        } else {
            tokio::select! {
                _ = sink.cancel.cancelled() => return,
                resolved = tokio::time::timeout(remaining, resolver.resolve_batch(&pairs, opts)) => {
                    resolved.ok()
                }
            }
        };

        match resolved {
            Some(references) => {
                for (track, media) in batch.iter().zip(references) {
                    if !sink
                        .emit(StreamEvent::TrackEnriched {
                            provider: provider.clone(),
                            index: track.index,
                            media,
                        })
                        .await
                    {
                        return;
                    }
                }
                pending = rest;
            }
            None => {
                // Deadline hit: everything left goes out unresolved so
                // consumers keyed on (provider, index) still converge.
                debug!(
                    "Enrichment deadline hit for {}, {} tracks left unresolved",
                    provider,
                    pending.len()
                );
                for track in pending {
                    if !sink
                        .emit(StreamEvent::TrackEnriched {
                            provider: provider.clone(),
                            index: track.index,
                            media: None,
                        })
                        .await
                    {
                        return;
                    }
                }
                return;
            }
        }
    }
}

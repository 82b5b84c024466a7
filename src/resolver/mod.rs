//! Tiered media resolution: cache → free mirrors → catalog art → paid API.
//!
//! The service holds optional capability handles for each tier; a missing
//! tier is simply skipped. Cost order is strict: the cache is always
//! consulted first, free services before metered ones, and the paid tier is
//! only reachable when the caller explicitly allows it.

pub mod catalog;
pub mod mirrors;
pub mod paid;

pub use catalog::{ArtCatalog, CatalogError, CatalogHit, ItunesCatalog};
pub use mirrors::{
    race_mirrors, InvidiousMirror, MirrorBackend, MirrorError, MirrorFamily, MirrorHit,
    PipedMirror,
};
pub use paid::{PaidApiError, PaidHit, PaidSearch, YoutubeDataApi};

use crate::media::{MediaCache, MediaReference, Provenance};
use crate::quota::{QuotaCategory, QuotaLedger};
use crate::server::metrics;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Per-call resolution policy knobs.
#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    /// When set, a result without a playable identifier is worthless and the
    /// catalog-only tier is skipped.
    pub require_playable: bool,
    /// Substitute high-resolution catalog artwork into mirror hits.
    pub prefer_hd_artwork: bool,
    /// Permit the quota-tracked paid tier. Never set during bulk
    /// pre-generation enrichment.
    pub allow_paid: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            require_playable: true,
            prefer_hd_artwork: false,
            allow_paid: false,
        }
    }
}

pub struct ResolutionService {
    cache: MediaCache,
    ledger: QuotaLedger,
    mirrors: Vec<Arc<dyn MirrorBackend>>,
    catalog: Option<Arc<dyn ArtCatalog>>,
    paid: Option<Arc<dyn PaidSearch>>,
    mirror_timeout: Duration,
    batch_concurrency: usize,
}

impl ResolutionService {
    pub fn new(
        cache: MediaCache,
        ledger: QuotaLedger,
        mirrors: Vec<Arc<dyn MirrorBackend>>,
        catalog: Option<Arc<dyn ArtCatalog>>,
        paid: Option<Arc<dyn PaidSearch>>,
        mirror_timeout: Duration,
        batch_concurrency: usize,
    ) -> Self {
        Self {
            cache,
            ledger,
            mirrors,
            catalog,
            paid,
            mirror_timeout,
            batch_concurrency: batch_concurrency.max(1),
        }
    }

    /// Resolve a single (artist, title) pair to playable media metadata.
    pub async fn resolve(
        &self,
        artist: &str,
        title: &str,
        opts: ResolveOptions,
    ) -> Option<MediaReference> {
        // Tier 1: cache.
        if let Some(mut hit) = self.cache.get(artist, title) {
            if hit.is_playable() || !opts.require_playable {
                metrics::CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                hit.provenance = Provenance::Cache;
                return Some(hit);
            }
        }
        metrics::CACHE_LOOKUPS.with_label_values(&["miss"]).inc();

        let resolved = self.resolve_uncached(artist, title, opts).await;
        if let Some(ref reference) = resolved {
            self.cache.put(artist, title, reference);
        }
        resolved
    }

    /// Tiers 2-4, without touching the cache. The caller writes back.
    async fn resolve_uncached(
        &self,
        artist: &str,
        title: &str,
        opts: ResolveOptions,
    ) -> Option<MediaReference> {
        let query = format!("{} {}", artist, title);

        // Spread load across mirror hosts; the race hits all of them anyway
        // but the fastest responder tends to be asked first next time DNS
        // caches are warm.
        let mut backends = self.mirrors.clone();
        backends.shuffle(&mut rand::rng());

        // Tier 2: mirror race, with a catalog lookup alongside when the
        // caller wants high-resolution artwork.
        let (mirror_hit, mut catalog_hit) = if opts.prefer_hd_artwork && self.catalog.is_some() {
            let (mirror, catalog) = tokio::join!(
                race_mirrors(&backends, &query, self.mirror_timeout),
                self.lookup_catalog(artist, title)
            );
            (mirror, catalog)
        } else {
            (
                race_mirrors(&backends, &query, self.mirror_timeout).await,
                None,
            )
        };

        if let Some(hit) = mirror_hit {
            let thumbnail_url = match catalog_hit {
                // Keep the mirror's playable id and duration, upgrade art.
                Some(ref art) => art.artwork_url.clone(),
                None => hit.thumbnail_url,
            };
            return Some(MediaReference {
                video_id: hit.video_id,
                thumbnail_url,
                duration_secs: hit.duration_secs,
                provenance: hit.family.provenance(),
            });
        }

        // Tier 3: catalog-only metadata, when playback is not required.
        if !opts.require_playable {
            if catalog_hit.is_none() {
                catalog_hit = self.lookup_catalog(artist, title).await;
            }
            if let Some(art) = catalog_hit {
                return Some(MediaReference {
                    video_id: String::new(),
                    thumbnail_url: art.artwork_url,
                    duration_secs: art.duration_secs,
                    provenance: Provenance::Catalog,
                });
            }
        }

        // Tier 4: paid API, behind explicit opt-in and the quota ledger.
        if opts.allow_paid {
            if let Some(paid) = &self.paid {
                let status = self.ledger.check(QuotaCategory::Search);
                if !status.available {
                    metrics::PAID_QUOTA_DENIED.inc();
                    debug!(
                        "Paid search skipped for {:?}: {} units remaining, {} needed",
                        query, status.remaining, status.cost
                    );
                    return None;
                }
                self.ledger.consume(QuotaCategory::Search);
                match paid.search(artist, title).await {
                    Ok(Some(hit)) => {
                        metrics::PAID_REQUESTS.with_label_values(&["hit"]).inc();
                        return Some(MediaReference {
                            video_id: hit.video_id,
                            thumbnail_url: hit.thumbnail_url,
                            // Search responses carry no duration.
                            duration_secs: 0,
                            provenance: Provenance::PaidApi,
                        });
                    }
                    Ok(None) => {
                        metrics::PAID_REQUESTS.with_label_values(&["empty"]).inc();
                    }
                    Err(e) => {
                        metrics::PAID_REQUESTS.with_label_values(&["error"]).inc();
                        debug!("Paid search failed for {:?}: {}", query, e);
                    }
                }
            }
        }

        None
    }

    async fn lookup_catalog(&self, artist: &str, title: &str) -> Option<CatalogHit> {
        let catalog = self.catalog.as_ref()?;
        match catalog.lookup(artist, title).await {
            Ok(Some(hit)) => {
                metrics::CATALOG_REQUESTS.with_label_values(&["hit"]).inc();
                Some(hit)
            }
            Ok(None) => {
                metrics::CATALOG_REQUESTS.with_label_values(&["empty"]).inc();
                None
            }
            Err(e) => {
                metrics::CATALOG_REQUESTS.with_label_values(&["error"]).inc();
                debug!("Catalog lookup failed for {} - {}: {}", artist, title, e);
                None
            }
        }
    }

    /// Resolve a batch of pairs, index-aligned with the input.
    ///
    /// One bulk cache lookup covers all keys, then misses resolve with
    /// bounded concurrency so a large set cannot swamp the free mirrors.
    /// Newly resolved entries are written back in one bulk operation.
    pub async fn resolve_batch(
        &self,
        pairs: &[(String, String)],
        opts: ResolveOptions,
    ) -> Vec<Option<MediaReference>> {
        let mut results: Vec<Option<MediaReference>> = self
            .cache
            .get_many(pairs)
            .into_iter()
            .map(|hit| {
                hit.and_then(|mut r| {
                    if r.is_playable() || !opts.require_playable {
                        metrics::CACHE_LOOKUPS.with_label_values(&["hit"]).inc();
                        r.provenance = Provenance::Cache;
                        Some(r)
                    } else {
                        None
                    }
                })
            })
            .collect();

        let misses: Vec<usize> = results
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.is_none().then_some(i))
            .collect();
        for _ in &misses {
            metrics::CACHE_LOOKUPS.with_label_values(&["miss"]).inc();
        }
        if misses.is_empty() {
            return results;
        }

        let resolved: Vec<(usize, Option<MediaReference>)> = stream::iter(misses)
            .map(|i| {
                let (artist, title) = pairs[i].clone();
                async move {
                    let reference = self.resolve_uncached(&artist, &title, opts).await;
                    (i, reference)
                }
            })
            .buffer_unordered(self.batch_concurrency)
            .collect()
            .await;

        let mut write_back: Vec<((String, String), MediaReference)> = Vec::new();
        for (i, reference) in resolved {
            if let Some(ref r) = reference {
                write_back.push((pairs[i].clone(), r.clone()));
            }
            results[i] = reference;
        }
        if !write_back.is_empty() {
            self.cache.put_many(&write_back);
        }

        results
    }
}

//! Prometheus metrics for the generation race and the resolution tiers.

use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};
use tracing::info;

lazy_static! {
    /// Generation races by lifecycle state (started, completed, all_failed).
    pub static ref GENERATIONS: IntCounterVec = register_int_counter_vec!(
        "setforge_generations_total",
        "Generation races by lifecycle state",
        &["state"]
    )
    .unwrap();

    /// Provider completions within races, by outcome.
    pub static ref PROVIDER_OUTCOMES: IntCounterVec = register_int_counter_vec!(
        "setforge_provider_outcomes_total",
        "Provider completions by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Media cache lookups, by hit/miss.
    pub static ref CACHE_LOOKUPS: IntCounterVec = register_int_counter_vec!(
        "setforge_cache_lookups_total",
        "Media cache lookups by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Free mirror calls, by family and outcome (hit, empty, error, timeout).
    pub static ref MIRROR_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "setforge_mirror_requests_total",
        "Free mirror search calls by family and outcome",
        &["family", "outcome"]
    )
    .unwrap();

    /// Catalog art lookups, by outcome.
    pub static ref CATALOG_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "setforge_catalog_requests_total",
        "Catalog art lookups by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Paid API searches, by outcome.
    pub static ref PAID_REQUESTS: IntCounterVec = register_int_counter_vec!(
        "setforge_paid_requests_total",
        "Paid API searches by outcome",
        &["outcome"]
    )
    .unwrap();

    /// Paid searches skipped because the daily quota would be exceeded.
    pub static ref PAID_QUOTA_DENIED: IntCounter = register_int_counter!(
        "setforge_paid_quota_denied_total",
        "Paid searches denied by the quota ledger"
    )
    .unwrap();
}

/// Touch every metric so they all appear in the first scrape.
pub fn init_metrics() {
    for state in ["started", "completed", "all_failed"] {
        GENERATIONS.with_label_values(&[state]).reset();
    }
    for outcome in ["succeeded", "failed"] {
        PROVIDER_OUTCOMES.with_label_values(&[outcome]).reset();
    }
    for outcome in ["hit", "miss"] {
        CACHE_LOOKUPS.with_label_values(&[outcome]).reset();
    }
    for outcome in ["hit", "empty", "error"] {
        CATALOG_REQUESTS.with_label_values(&[outcome]).reset();
        PAID_REQUESTS.with_label_values(&[outcome]).reset();
    }
    info!("Metrics registered");
}

/// Render the registry in the Prometheus text exposition format.
pub fn render_metrics() -> String {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

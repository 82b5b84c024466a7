//! Daily quota ledger for the paid search API.
//!
//! Counters are keyed by category and UTC day and expire 25 hours after the
//! last touch, so a day's counter disappears on its own shortly after the
//! UTC rollover. The ledger fails open: if the backing store is missing or
//! unreachable, quota is reported as available and consumption is skipped.

use crate::kv::KvHandle;
use chrono::Utc;
use serde::Serialize;
use std::time::Duration;
use tracing::warn;

/// Slightly longer than a day so a counter created late in the day still
/// covers the whole UTC day it belongs to.
const COUNTER_TTL: Duration = Duration::from_secs(25 * 60 * 60);

pub const DEFAULT_DAILY_LIMIT: i64 = 10_000;

/// Paid-API operation categories with fixed unit costs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaCategory {
    /// Full-text search, the expensive operation.
    Search,
    /// Direct lookup by identifier.
    Lookup,
}

impl QuotaCategory {
    pub fn cost(&self) -> i64 {
        match self {
            QuotaCategory::Search => 100,
            QuotaCategory::Lookup => 1,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            QuotaCategory::Search => "search",
            QuotaCategory::Lookup => "lookup",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "search" => Some(QuotaCategory::Search),
            "lookup" => Some(QuotaCategory::Lookup),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QuotaStatus {
    pub available: bool,
    pub remaining: i64,
    pub cost: i64,
}

#[derive(Clone)]
pub struct QuotaLedger {
    backend: KvHandle,
    daily_limit: i64,
}

impl QuotaLedger {
    pub fn new(backend: KvHandle, daily_limit: i64) -> Self {
        Self {
            backend,
            daily_limit,
        }
    }

    /// Ledger with no backend: everything is available, nothing is counted.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            daily_limit: DEFAULT_DAILY_LIMIT,
        }
    }

    /// Report whether one more operation of this category fits in today's
    /// budget.
    pub fn check(&self, category: QuotaCategory) -> QuotaStatus {
        let cost = category.cost();
        let used = match self.used_today(category) {
            Some(used) => used,
            None => {
                // Accounting being down never blocks a feature.
                return QuotaStatus {
                    available: true,
                    remaining: self.daily_limit,
                    cost,
                };
            }
        };
        let remaining = (self.daily_limit - used).max(0);
        QuotaStatus {
            available: used + cost <= self.daily_limit,
            remaining,
            cost,
        }
    }

    /// Record one operation of this category against today's counter.
    pub fn consume(&self, category: QuotaCategory) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let key = day_key(category);
        if let Err(e) = backend.incr(&key, category.cost(), COUNTER_TTL) {
            warn!(
                "Quota consume failed for {}, skipping accounting: {}",
                category.name(),
                e
            );
        }
    }

    fn used_today(&self, category: QuotaCategory) -> Option<i64> {
        let backend = self.backend.as_ref()?;
        match backend.get(&day_key(category)) {
            Ok(Some(raw)) => Some(raw.parse::<i64>().unwrap_or(0)),
            Ok(None) => Some(0),
            Err(e) => {
                warn!(
                    "Quota check failed for {}, failing open: {}",
                    category.name(),
                    e
                );
                None
            }
        }
    }
}

fn day_key(category: QuotaCategory) -> String {
    format!(
        "quota:{}:{}",
        category.name(),
        Utc::now().format("%Y%m%d")
    )
}

//! Key-value backend for the media cache and quota ledger.
//!
//! The backend is modeled as an explicit capability: components hold an
//! `Option<Arc<dyn KvBackend>>` and degrade to no-ops when it is absent or
//! failing. No feature depends on the backend being reachable.

mod sqlite_kv;

pub use sqlite_kv::SqliteKvBackend;

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// A durable key-value store with per-key expiry and atomic increment.
///
/// Implementations must be safe for concurrent use; `incr` in particular
/// must be atomic so counters never lose updates under parallel access.
pub trait KvBackend: Send + Sync {
    /// Get a value by key. Expired entries read as absent.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Set a value with an expiry relative to now.
    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Get many values in one round trip, aligned with the input keys.
    fn get_many(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// Set many values in one transaction, all with the same expiry.
    fn set_many(&self, entries: &[(String, String)], ttl: Duration) -> Result<()>;

    /// Atomically increment an integer value by `by`, setting/refreshing the
    /// expiry, and return the post-increment value. A missing or expired key
    /// counts from zero.
    fn incr(&self, key: &str, by: i64, ttl: Duration) -> Result<i64>;
}

/// Shared handle to an optional backend.
pub type KvHandle = Option<Arc<dyn KvBackend>>;

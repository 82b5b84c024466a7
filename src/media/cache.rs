//! Durable media-reference cache over the KV backend.
//!
//! Every operation fails open: with no backend configured, or a backend
//! error, gets report a miss and puts are dropped. The resolution pipeline
//! must keep working without a cache, just slower.

use super::{normalized_key, MediaReference};
use crate::kv::KvHandle;
use std::time::Duration;
use tracing::warn;

/// Entries live for 30 days; expiry is the only eviction mechanism.
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

const KEY_PREFIX: &str = "media:";

#[derive(Clone)]
pub struct MediaCache {
    backend: KvHandle,
}

impl MediaCache {
    pub fn new(backend: KvHandle) -> Self {
        Self { backend }
    }

    /// Cache with no backend: all gets miss, all puts are no-ops.
    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn get(&self, artist: &str, title: &str) -> Option<MediaReference> {
        let backend = self.backend.as_ref()?;
        let key = storage_key(artist, title);
        match backend.get(&key) {
            Ok(Some(raw)) => decode(&raw),
            Ok(None) => None,
            Err(e) => {
                warn!("Media cache get failed, treating as miss: {}", e);
                None
            }
        }
    }

    /// Write a resolved reference through to the cache.
    ///
    /// Never downgrades: a reference with an empty playable identifier does
    /// not overwrite an existing entry that has one.
    pub fn put(&self, artist: &str, title: &str, reference: &MediaReference) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        if !reference.is_playable() {
            if let Some(existing) = self.get(artist, title) {
                if existing.is_playable() {
                    return;
                }
            }
        }
        let key = storage_key(artist, title);
        let Some(raw) = encode(reference) else { return };
        if let Err(e) = backend.set(&key, &raw, CACHE_TTL) {
            warn!("Media cache put failed, dropping entry: {}", e);
        }
    }

    /// Bulk lookup, aligned with the input pairs.
    pub fn get_many(&self, pairs: &[(String, String)]) -> Vec<Option<MediaReference>> {
        let Some(backend) = self.backend.as_ref() else {
            return vec![None; pairs.len()];
        };
        let keys: Vec<String> = pairs
            .iter()
            .map(|(artist, title)| storage_key(artist, title))
            .collect();
        match backend.get_many(&keys) {
            Ok(values) => values
                .into_iter()
                .map(|v| v.as_deref().and_then(decode))
                .collect(),
            Err(e) => {
                warn!("Media cache bulk get failed, treating as misses: {}", e);
                vec![None; pairs.len()]
            }
        }
    }

    /// Bulk write of newly resolved references in one backend round trip.
    ///
    /// Non-playable entries go through the same never-downgrade check as
    /// single puts.
    pub fn put_many(&self, entries: &[((String, String), MediaReference)]) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let mut batch: Vec<(String, String)> = Vec::with_capacity(entries.len());
        for ((artist, title), reference) in entries {
            if !reference.is_playable() {
                if let Some(existing) = self.get(artist, title) {
                    if existing.is_playable() {
                        continue;
                    }
                }
            }
            if let Some(raw) = encode(reference) {
                batch.push((storage_key(artist, title), raw));
            }
        }
        if batch.is_empty() {
            return;
        }
        if let Err(e) = backend.set_many(&batch, CACHE_TTL) {
            warn!("Media cache bulk put failed, dropping {} entries: {}", batch.len(), e);
        }
    }
}

fn storage_key(artist: &str, title: &str) -> String {
    format!("{}{}", KEY_PREFIX, normalized_key(artist, title))
}

fn encode(reference: &MediaReference) -> Option<String> {
    match serde_json::to_string(reference) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!("Failed to encode media reference: {}", e);
            None
        }
    }
}

fn decode(raw: &str) -> Option<MediaReference> {
    match serde_json::from_str(raw) {
        Ok(reference) => Some(reference),
        Err(e) => {
            // Malformed payloads (e.g. from an older schema) read as misses.
            warn!("Malformed media cache entry, treating as miss: {}", e);
            None
        }
    }
}

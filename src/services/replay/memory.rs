use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use crate::services::replay::store::ReplayStore;

/// In-memory `jti` replay cache.
///
/// Separate from the nonce store: keys are `jti` (not `jkt`) and entries live
/// only as long as the proof freshness window. Expired entries are reclaimed
/// lazily on collision and in bulk by `purge_expired`.
#[derive(Debug, Default)]
pub struct InMemoryReplayStore {
    // key -> expires_at
    entries: DashMap<String, Instant>,
    // Optional key prefix to keep namespaces apart when shared
    prefix: String,
}

impl InMemoryReplayStore {
    pub fn new() -> Self {
        Self::with_prefix("dpop:jti")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            entries: DashMap::new(),
            prefix: prefix.into(),
        }
    }

    pub fn key(&self, raw: &str) -> String {
        format!("{}:{}", self.prefix, raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_and_store_now(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let expires_at = now + ttl;

        // The entry guard holds the shard lock: check and insert are one step.
        match self.entries.entry(self.key(key)) {
            Entry::Occupied(mut seen) => {
                if *seen.get() > now {
                    false
                } else {
                    seen.insert(expires_at);
                    true
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(expires_at);
                true
            }
        }
    }
}

#[async_trait]
impl ReplayStore for InMemoryReplayStore {
    async fn check_and_store(&self, key: &str, ttl_secs: u64) -> bool {
        // Clamp to at least 1 sec, a zero TTL would make every proof replayable.
        self.check_and_store_now(key, Duration::from_secs(ttl_secs.max(1)))
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0usize;
        self.entries.retain(|_, expires_at| {
            let live = *expires_at > now;
            if !live {
                removed += 1;
            }
            live
        });
        removed
    }
}

use std::time::{Duration, Instant};

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use dashmap::DashMap;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::services::nonce::store::{NonceError, NonceStore};

#[derive(Debug, Clone)]
struct NonceEntry {
    value: String,
    issued_at: Instant,
}

impl NonceEntry {
    fn is_live(&self, ttl: Duration) -> bool {
        self.issued_at.elapsed() < ttl
    }
}

/// In-memory nonce store keyed by `jkt`.
///
/// Backed by a sharded map: distinct thumbprints progress independently, and
/// every read-modify-write on one thumbprint runs under that shard's lock.
#[derive(Debug)]
pub struct InMemoryNonceStore {
    entries: DashMap<String, NonceEntry>,
    nonce_bytes: usize,
    ttl: Duration,
}

impl InMemoryNonceStore {
    pub fn new(nonce_bytes: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            nonce_bytes,
            ttl,
        }
    }

    /// Number of live (unexpired) nonces.
    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_live(self.ttl))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn generate(&self) -> Result<String, NonceError> {
        let mut bytes = vec![0u8; self.nonce_bytes];
        getrandom::fill(&mut bytes).map_err(|e| NonceError::Entropy(e.to_string()))?;
        Ok(URL_SAFE_NO_PAD.encode(bytes))
    }
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[async_trait]
impl NonceStore for InMemoryNonceStore {
    async fn request_nonce(&self, jkt: &str) -> Result<String, NonceError> {
        if jkt.trim().is_empty() {
            return Err(NonceError::MissingBinding);
        }

        let nonce = self.generate()?;
        let previous = self.entries.insert(
            jkt.to_string(),
            NonceEntry {
                value: nonce.clone(),
                issued_at: Instant::now(),
            },
        );

        debug!(
            jkt = %jkt,
            superseded = previous.is_some(),
            ttl_seconds = self.ttl.as_secs(),
            "issued nonce"
        );

        Ok(nonce)
    }

    async fn try_consume(&self, jkt: &str, presented: &str) -> Result<bool, NonceError> {
        if jkt.is_empty() || presented.is_empty() {
            return Ok(false);
        }

        let ttl = self.ttl;
        let consumed = self
            .entries
            .remove_if(jkt, |_, entry| {
                entry.is_live(ttl) && constant_time_eq(&entry.value, presented)
            })
            .is_some();

        if !consumed {
            // Expired entries are dead weight; a live one is left untouched.
            self.entries.remove_if(jkt, |_, entry| !entry.is_live(ttl));
        }

        Ok(consumed)
    }

    async fn purge_expired(&self) -> Result<usize, NonceError> {
        let ttl = self.ttl;
        let mut removed = 0usize;
        self.entries.retain(|_, entry| {
            let live = entry.is_live(ttl);
            if !live {
                removed += 1;
            }
            live
        });
        Ok(removed)
    }
}

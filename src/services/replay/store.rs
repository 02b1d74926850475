use async_trait::async_trait;

/// `jti` replay cache contract.
///
/// Under concurrent presentations of the same key, exactly one
/// `check_and_store` returns `true`.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    // Atomically check whether `key` was already seen and store it with TTL.
    // - true  => first time (stored)
    // - false => replay (already present and live)
    async fn check_and_store(&self, key: &str, ttl_secs: u64) -> bool;

    // Drop entries whose TTL has passed. Returns how many were removed.
    async fn purge_expired(&self) -> usize;
}

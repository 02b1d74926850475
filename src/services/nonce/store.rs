use async_trait::async_trait;

/// Nonce issuance/consumption contract.
///
/// Implementations must be safe to share across request tasks:
/// - `request_nonce` and `try_consume` on the same `jkt` never interleave
/// - under concurrent identical presentations, exactly one `try_consume` wins
#[async_trait]
pub trait NonceStore: Send + Sync {
    // Issue a fresh nonce for `jkt`, superseding any live one.
    async fn request_nonce(&self, jkt: &str) -> Result<String, NonceError>;

    // Returns:
    // - Ok(true)  => nonce was live, matched, and has been deleted
    // - Ok(false) => never issued / superseded / consumed / expired / mismatch
    // - Err(_)    => backend failure (caller must fail closed)
    async fn try_consume(&self, jkt: &str, presented: &str) -> Result<bool, NonceError>;

    // Drop expired entries. Returns how many were removed.
    async fn purge_expired(&self) -> Result<usize, NonceError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NonceError {
    #[error("missing key binding (jkt)")]
    MissingBinding,

    #[error("random source unavailable: {0}")]
    Entropy(String),
}

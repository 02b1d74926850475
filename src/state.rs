/*
 * Responsibility
 * - Shared context bound to the Router (AppState)
 * - Cheap to Clone (everything behind Arc)
 * - Stores are injected here; there is no process-wide singleton
 */
use std::sync::Arc;

use crate::services::{
    dpop::ProofVerifier, nonce::NonceStore, replay::ReplayStore, token::TokenIssuer,
};

#[derive(Clone)]
pub struct AppState {
    pub nonces: Arc<dyn NonceStore>,
    pub replay: Arc<dyn ReplayStore>,
    pub verifier: Arc<ProofVerifier>,
    pub issuer: Arc<TokenIssuer>,
    pub public_base_url: Option<Arc<str>>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("verifier", &self.verifier)
            .field("issuer", &self.issuer)
            .field("public_base_url", &self.public_base_url)
            .finish()
    }
}

impl AppState {
    pub fn new(
        nonces: Arc<dyn NonceStore>,
        replay: Arc<dyn ReplayStore>,
        verifier: Arc<ProofVerifier>,
        issuer: Arc<TokenIssuer>,
        public_base_url: Option<String>,
    ) -> Self {
        Self {
            nonces,
            replay,
            verifier,
            issuer,
            public_base_url: public_base_url.map(Arc::from),
        }
    }

    pub fn public_base_url(&self) -> Option<&str> {
        self.public_base_url.as_deref()
    }
}

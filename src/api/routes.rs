/*
 * Responsibility
 * - URL structure: /nonce, /token, /health
 * - Anything but POST on the handshake endpoints is a 405
 */
use axum::{
    Router,
    routing::{get, post},
};

use crate::api::handlers::{
    health::health, method_not_allowed, nonce::issue_nonce, token::issue_token,
};
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/nonce", post(issue_nonce).fallback(method_not_allowed))
        .route("/token", post(issue_token).fallback(method_not_allowed))
}

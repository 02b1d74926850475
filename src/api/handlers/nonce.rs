/*
 * Responsibility
 * - POST /nonce
 * - Issue a fresh single-use nonce bound to the client's key thumbprint
 */
use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::IntoResponse,
};

use crate::error::AppError;
use crate::state::AppState;

pub const JKT_HEADER: &str = "jkt";
pub const DPOP_NONCE_HEADER: HeaderName = HeaderName::from_static("dpop-nonce");

pub async fn issue_nonce(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let jkt = headers
        .get(JKT_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();

    if jkt.is_empty() {
        tracing::warn!(path = "/nonce", "missing jkt header");
        return Err(AppError::invalid_request(
            "No 'jkt' provided in request header",
        ));
    }

    let nonce = state.nonces.request_nonce(jkt).await?;
    let value = HeaderValue::from_str(&nonce).map_err(|e| {
        tracing::error!(error = %e, "nonce is not a valid header value");
        AppError::Internal
    })?;

    tracing::debug!(jkt = %jkt, "issued nonce");

    Ok((
        StatusCode::CREATED,
        [
            (DPOP_NONCE_HEADER, value),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
        ],
    ))
}

/*
 * Responsibility
 * - POST /token
 * - Verify the DPoP proof (signature, binding, freshness, replay, nonce)
 * - Issue an access token bound to the proof key's thumbprint
 */
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use crate::api::extractors::DpopRequest;
use crate::error::AppError;
use crate::state::AppState;

pub async fn issue_token(
    State(state): State<AppState>,
    req: DpopRequest,
) -> Result<Response, AppError> {
    let verified = state
        .verifier
        .verify_proof(&req.proof, req.method.as_str(), &req.htu)
        .await
        .map_err(|e| {
            tracing::warn!(
                kind = e.kind(),
                error = %e,
                path = %req.path,
                method = %req.method,
                "DPoP proof rejected"
            );
            AppError::from(e)
        })?;

    let body = state.issuer.issue_access_token(&verified.jkt)?;
    let json = serde_json::to_vec(&body).map_err(|e| {
        tracing::error!(error = %e, "failed to serialize token response");
        AppError::Internal
    })?;

    tracing::info!(jkt = %verified.jkt, jti = %verified.jti, "issued access token");

    Ok((
        StatusCode::OK,
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            ),
            (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
            (header::PRAGMA, HeaderValue::from_static("no-cache")),
        ],
        json,
    )
        .into_response())
}

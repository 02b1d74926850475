use axum::extract::FromRequestParts;
use axum::http::{Method, request::Parts};

use crate::error::AppError;
use crate::services::dpop::htu::expected_htu;
use crate::state::AppState;

pub const DPOP_HEADER: &str = "dpop";

/// Everything a handler needs to verify the DPoP proof on this request.
///
/// Exactly one `DPoP` header must be present; zero or several is a 401.
/// `htu` is what the proof must name, derived from PUBLIC_BASE_URL or the
/// request's forwarding headers.
#[derive(Debug, Clone)]
pub struct DpopRequest {
    pub proof: String,
    pub method: Method,
    pub path: String,
    pub htu: String,
}

impl FromRequestParts<AppState> for DpopRequest {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let path = parts.uri.path().to_string();
        let mut values = parts.headers.get_all(DPOP_HEADER).iter();

        let proof = match (values.next(), values.next()) {
            (Some(v), None) => v.to_str().map(str::trim).unwrap_or_default(),
            (None, _) => {
                tracing::warn!(path = %path, method = %parts.method, "missing DPoP header");
                return Err(AppError::Unauthorized);
            }
            (Some(_), Some(_)) => {
                tracing::warn!(path = %path, method = %parts.method, "multiple DPoP headers");
                return Err(AppError::Unauthorized);
            }
        };

        if proof.is_empty() {
            tracing::warn!(path = %path, method = %parts.method, "empty DPoP header");
            return Err(AppError::Unauthorized);
        }

        Ok(Self {
            proof: proof.to_string(),
            method: parts.method.clone(),
            htu: expected_htu(&parts.headers, &parts.uri, state.public_base_url()),
            path,
        })
    }
}

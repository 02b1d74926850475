use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::services::dpop::types::Confirmation;
use crate::services::token::{JwtIssuer, TokenError};

pub const TOKEN_TYPE_DPOP: &str = "DPoP";

/// Body of a successful `/token` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub access_token: String,
    /// Always "DPoP"
    pub token_type: String,
    /// Seconds until expiry.
    pub expires_in: u64,
    /// Present when the server returns a refresh token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    pub cnf: Confirmation,
}

/// Mints key-bound access tokens.
///
/// Callers must only reach this after the proof for `jkt` verified on the
/// current request. Nothing is persisted here.
#[derive(Clone, Debug)]
pub struct TokenIssuer {
    jwt: JwtIssuer,
    issue_refresh_token: bool,
}

impl TokenIssuer {
    pub fn new(jwt: JwtIssuer, issue_refresh_token: bool) -> Self {
        Self {
            jwt,
            issue_refresh_token,
        }
    }

    pub fn issue_access_token(&self, jkt: &str) -> Result<AccessTokenResponse, TokenError> {
        let now = chrono::Utc::now().timestamp();
        let expires_in = self.jwt.ttl_seconds();

        let claims = AccessTokenClaims {
            iss: self.jwt.issuer().to_string(),
            iat: now,
            exp: now + expires_in as i64,
            jti: Uuid::new_v4().to_string(),
            cnf: Confirmation {
                jkt: jkt.to_string(),
            },
        };

        let access_token = self.jwt.sign(&claims)?;

        let refresh_token = if self.issue_refresh_token {
            Some(generate_refresh_token()?)
        } else {
            None
        };

        debug!(
            jkt = %jkt,
            expires_in,
            refresh = refresh_token.is_some(),
            "issued DPoP-bound access token"
        );

        Ok(AccessTokenResponse {
            access_token,
            token_type: TOKEN_TYPE_DPOP.to_string(),
            expires_in,
            refresh_token,
        })
    }
}

fn generate_refresh_token() -> Result<String, TokenError> {
    // 32 bytes of entropy -> URL-safe base64 without padding.
    let mut bytes = [0u8; 32];
    getrandom::fill(&mut bytes).map_err(|e| TokenError::Entropy(e.to_string()))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

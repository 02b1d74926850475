use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use tracing::{error, warn};

use crate::services::dpop::KeyPair;
use crate::services::token::TokenError;

/// Signs access tokens with the server's ES256 key.
///
/// Debug omits the key.
#[derive(Clone)]
pub struct JwtIssuer {
    issuer: String,
    ttl_seconds: u64,
    encoding_key: EncodingKey,
}

impl std::fmt::Debug for JwtIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtIssuer")
            .field("issuer", &self.issuer)
            .field("ttl_seconds", &self.ttl_seconds)
            .finish()
    }
}

impl JwtIssuer {
    /// `private_key_pem` must be a P-256 private key in PKCS#8 PEM format.
    pub fn new(private_key_pem: &str, issuer: String, ttl_seconds: u64) -> Result<Self, TokenError> {
        let encoding_key = EncodingKey::from_ec_pem(private_key_pem.as_bytes()).map_err(|e| {
            warn!(error = %e, "failed to parse access JWT private key PEM (expected P-256 PKCS#8 PEM)");
            TokenError::Key(e.to_string())
        })?;

        Ok(Self {
            issuer,
            ttl_seconds,
            encoding_key,
        })
    }

    /// Issuer with a freshly generated key that lives as long as the process.
    pub fn ephemeral(issuer: String, ttl_seconds: u64) -> Result<Self, TokenError> {
        let pem = KeyPair::generate()
            .to_pkcs8_pem()
            .map_err(|e| TokenError::Key(e.to_string()))?;
        Self::new(&pem, issuer, ttl_seconds)
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn ttl_seconds(&self) -> u64 {
        self.ttl_seconds
    }

    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, TokenError> {
        let mut header = Header::new(Algorithm::ES256);
        header.typ = Some("at+jwt".to_string());
        jsonwebtoken::encode(&header, claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "failed to sign access token");
            TokenError::Signing(e.to_string())
        })
    }
}

//! Client-side DPoP proof construction.
//!
//! Builds the compact JWS `base64url(header).base64url(claims).base64url(sig)`
//! and signs it with ES256 (P-256 + SHA-256, fixed-size `r || s` signature).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::ecdsa::{Signature, signature::Signer};
use uuid::Uuid;

use crate::services::dpop::{
    htu::normalize_htu,
    jwk::PublicJwk,
    key::KeyPair,
    types::{Confirmation, DPOP_ALG, DPOP_TYP, DpopClaims, DpopHeader},
};

#[derive(Debug, thiserror::Error)]
pub enum ProofBuildError {
    #[error("signing failed: {0}")]
    Signing(&'static str),
    #[error("failed to encode proof: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// A signed, compact-serialized proof plus the values that went into it.
#[derive(Debug, Clone)]
pub struct ProofToken {
    pub compact: String,
    pub claims: DpopClaims,
}

impl ProofToken {
    pub fn as_str(&self) -> &str {
        &self.compact
    }
}

impl std::fmt::Display for ProofToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.compact)
    }
}

/// Build a proof with a fresh `jti` and the current time as `iat`.
///
/// `jwk` must describe `key`'s public half, otherwise `Signing` is returned.
pub fn build_proof(
    key: &KeyPair,
    jwk: &PublicJwk,
    nonce: &str,
    method: &str,
    target_uri: &str,
) -> Result<ProofToken, ProofBuildError> {
    ProofBuilder::new(key).build(jwk, nonce, method, target_uri)
}

/// Proof builder with optional `iat` / `jti` overrides (tooling and tests).
#[derive(Debug)]
pub struct ProofBuilder<'a> {
    key: &'a KeyPair,
    iat: Option<i64>,
    jti: Option<String>,
}

impl<'a> ProofBuilder<'a> {
    pub fn new(key: &'a KeyPair) -> Self {
        Self {
            key,
            iat: None,
            jti: None,
        }
    }

    pub fn with_iat(mut self, iat: i64) -> Self {
        self.iat = Some(iat);
        self
    }

    pub fn with_jti(mut self, jti: impl Into<String>) -> Self {
        self.jti = Some(jti.into());
        self
    }

    pub fn build(
        self,
        jwk: &PublicJwk,
        nonce: &str,
        method: &str,
        target_uri: &str,
    ) -> Result<ProofToken, ProofBuildError> {
        // The declared key must be the signing key, or the proof can never verify.
        if jwk != self.key.jwk() {
            return Err(ProofBuildError::Signing("jwk does not match the private key"));
        }

        let htu = normalize_htu(target_uri)
            .ok_or(ProofBuildError::Signing("target uri must be absolute"))?;

        let claims = DpopClaims {
            jti: self.jti.unwrap_or_else(|| Uuid::new_v4().to_string()),
            htm: method.trim().to_ascii_uppercase(),
            htu,
            iat: self.iat.unwrap_or_else(|| chrono::Utc::now().timestamp()),
            nonce: nonce.to_string(),
            cnf: Confirmation {
                jkt: self.key.thumbprint().to_string(),
            },
        };

        let header = DpopHeader {
            typ: DPOP_TYP,
            alg: DPOP_ALG,
            jwk,
        };

        let encoded_header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
        let encoded_claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
        let signing_input = format!("{}.{}", encoded_header, encoded_claims);

        let signature: Signature = self.key.signing_key().sign(signing_input.as_bytes());
        let encoded_sig = URL_SAFE_NO_PAD.encode(signature.to_bytes());

        Ok(ProofToken {
            compact: format!("{}.{}", signing_input, encoded_sig),
            claims,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_part(part: &str) -> serde_json::Value {
        serde_json::from_slice(&URL_SAFE_NO_PAD.decode(part).unwrap()).unwrap()
    }

    #[test]
    fn proof_has_three_unpadded_parts() {
        let key = KeyPair::generate();
        let proof = build_proof(&key, key.jwk(), "n-1", "post", "https://example.com/token").unwrap();

        let parts: Vec<&str> = proof.as_str().split('.').collect();
        assert_eq!(parts.len(), 3);
        assert!(parts.iter().all(|p| !p.contains('=')));
        // ES256 signature is r || s
        assert_eq!(URL_SAFE_NO_PAD.decode(parts[2]).unwrap().len(), 64);
    }

    #[test]
    fn header_and_claims_carry_binding_values() {
        let key = KeyPair::generate();
        let proof = build_proof(
            &key,
            key.jwk(),
            "nonce-abc",
            "get",
            "HTTP://Host:80/token?debug=1#top",
        )
        .unwrap();

        let parts: Vec<&str> = proof.as_str().split('.').collect();
        let header = decode_part(parts[0]);
        let claims = decode_part(parts[1]);

        assert_eq!(header["typ"], "dpop+jwt");
        assert_eq!(header["alg"], "ES256");
        assert_eq!(header["jwk"]["kty"], "EC");
        assert_eq!(header["jwk"]["crv"], "P-256");

        assert_eq!(claims["htm"], "GET");
        assert_eq!(claims["htu"], "http://host/token");
        assert_eq!(claims["nonce"], "nonce-abc");
        assert_eq!(claims["cnf"]["jkt"], key.thumbprint());
        assert!(claims["iat"].as_i64().unwrap() > 0);
    }

    #[test]
    fn jti_is_fresh_per_call() {
        let key = KeyPair::generate();
        let a = build_proof(&key, key.jwk(), "n", "POST", "http://h/token").unwrap();
        let b = build_proof(&key, key.jwk(), "n", "POST", "http://h/token").unwrap();
        assert_ne!(a.claims.jti, b.claims.jti);
    }

    #[test]
    fn overrides_are_applied() {
        let key = KeyPair::generate();
        let proof = ProofBuilder::new(&key)
            .with_iat(1_700_000_000)
            .with_jti("fixed")
            .build(key.jwk(), "n", "POST", "http://h/token")
            .unwrap();

        assert_eq!(proof.claims.iat, 1_700_000_000);
        assert_eq!(proof.claims.jti, "fixed");
    }

    #[test]
    fn mismatched_jwk_is_a_signing_error() {
        let key = KeyPair::generate();
        let other = KeyPair::generate();

        let err = build_proof(&key, other.jwk(), "n", "POST", "http://h/token").unwrap_err();
        assert!(matches!(err, ProofBuildError::Signing(_)));
    }

    #[test]
    fn relative_target_is_rejected() {
        let key = KeyPair::generate();
        let err = build_proof(&key, key.jwk(), "n", "POST", "/token").unwrap_err();
        assert!(matches!(err, ProofBuildError::Signing(_)));
    }
}

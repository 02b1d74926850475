//! DPoP proof verification (RFC 9449), server role.
//!
//! Checks run in a fixed order and stop at the first failure:
//! header -> signature/key binding -> htm/htu -> iat window -> jti replay -> nonce.
//! The nonce is consumed only when every earlier check passed.

use std::sync::Arc;

use jsonwebtoken::{Algorithm, DecodingKey, Validation, errors::ErrorKind};
use tracing::debug;

use crate::services::dpop::{
    htu::normalize_htu,
    jwk::PublicJwk,
    types::{DPOP_TYP, IncomingClaims, VerifiedProof},
};
use crate::services::{nonce::NonceStore, replay::ReplayStore};

/// Freshness knobs for the verifier.
///
/// Kept separate from `Config` so the verifier stays testable on its own.
#[derive(Debug, Clone, Copy)]
pub struct DpopPolicy {
    // Allowed iat drift (clock skew), seconds.
    pub iat_leeway_seconds: i64,
    // Maximum acceptable age of the proof (now - iat), seconds.
    pub max_age_seconds: i64,
}

impl Default for DpopPolicy {
    fn default() -> Self {
        Self {
            iat_leeway_seconds: 5,
            max_age_seconds: 60,
        }
    }
}

impl DpopPolicy {
    /// How long a `jti` must be remembered: the whole acceptance window.
    pub fn replay_ttl_seconds(&self) -> u64 {
        self.max_age_seconds
            .saturating_add(self.iat_leeway_seconds.saturating_mul(2))
            .max(1) as u64
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DpopError {
    #[error("unverifiable DPoP proof: {0}")]
    UnverifiableToken(&'static str),
    #[error("invalid DPoP proof signature or key binding")]
    InvalidSignature,
    #[error("DPoP proof does not match the request: {0}")]
    RequestMismatch(&'static str),
    #[error("DPoP proof iat outside the accepted window")]
    StaleProof,
    #[error("DPoP proof jti already used")]
    Replay,
    #[error("DPoP nonce invalid, consumed, or expired")]
    InvalidNonce,
}

impl DpopError {
    /// Stable short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DpopError::UnverifiableToken(_) => "unverifiable_token",
            DpopError::InvalidSignature => "invalid_signature",
            DpopError::RequestMismatch(_) => "request_mismatch",
            DpopError::StaleProof => "stale_proof",
            DpopError::Replay => "replay",
            DpopError::InvalidNonce => "invalid_nonce",
        }
    }

    /// Whether a client should fetch a fresh nonce and rebuild the proof.
    ///
    /// A bad signature will not get better by retrying with the same key.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DpopError::InvalidNonce | DpopError::StaleProof | DpopError::Replay
        )
    }
}

#[derive(Clone)]
pub struct ProofVerifier {
    policy: DpopPolicy,
    nonces: Arc<dyn NonceStore>,
    replay: Arc<dyn ReplayStore>,
}

impl std::fmt::Debug for ProofVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProofVerifier")
            .field("policy", &self.policy)
            .finish()
    }
}

impl ProofVerifier {
    pub fn new(
        policy: DpopPolicy,
        nonces: Arc<dyn NonceStore>,
        replay: Arc<dyn ReplayStore>,
    ) -> Self {
        Self {
            policy,
            nonces,
            replay,
        }
    }

    /// Verify `proof` against the inbound request and consume its nonce.
    ///
    /// - `method`: the request's HTTP method
    /// - `target_uri`: the absolute request target (normalized before comparison)
    ///
    /// Returns the verified `jkt` (and the proof's `jti`/`iat`).
    pub async fn verify_proof(
        &self,
        proof: &str,
        method: &str,
        target_uri: &str,
    ) -> Result<VerifiedProof, DpopError> {
        // 1) Header: typ, alg, embedded jwk.
        let header = jsonwebtoken::decode_header(proof).map_err(|e| {
            debug!(error = ?e.kind(), "undecodable DPoP header");
            DpopError::UnverifiableToken("header")
        })?;

        match header.typ.as_deref() {
            Some(typ) if typ.eq_ignore_ascii_case(DPOP_TYP) => {}
            _ => return Err(DpopError::UnverifiableToken("typ")),
        }

        if header.alg != Algorithm::ES256 {
            return Err(DpopError::UnverifiableToken("alg"));
        }

        let header_jwk = header
            .jwk
            .ok_or(DpopError::UnverifiableToken("missing jwk"))?;

        // 2) Thumbprint of the embedded key, then signature against that key.
        let jkt = PublicJwk::from_header_jwk(&header_jwk)
            .and_then(|jwk| jwk.thumbprint())
            .map_err(|e| {
                debug!(error = %e, "unusable DPoP jwk");
                DpopError::UnverifiableToken("jwk")
            })?;

        let decoding_key = DecodingKey::from_jwk(&header_jwk).map_err(|e| {
            debug!(error = ?e.kind(), "jwk rejected by verifier backend");
            DpopError::UnverifiableToken("jwk")
        })?;

        // A DPoP proof is not an access token: no exp/aud/iss, freshness is iat-based.
        let mut validation = Validation::new(Algorithm::ES256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let token_data = jsonwebtoken::decode::<IncomingClaims>(proof, &decoding_key, &validation)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature => DpopError::InvalidSignature,
                other => {
                    debug!(error = ?other, "DPoP proof failed to decode");
                    DpopError::UnverifiableToken("claims")
                }
            })?;
        let claims = token_data.claims;

        let jti = claims.jti.ok_or(DpopError::UnverifiableToken("jti"))?;
        let htm = claims.htm.ok_or(DpopError::UnverifiableToken("htm"))?;
        let htu = claims.htu.ok_or(DpopError::UnverifiableToken("htu"))?;
        let iat = claims.iat.ok_or(DpopError::UnverifiableToken("iat"))?;
        let cnf = claims.cnf.ok_or(DpopError::UnverifiableToken("cnf"))?;

        // sender-constrained: cnf.jkt must name the key that signed the proof
        if cnf.jkt != jkt {
            return Err(DpopError::InvalidSignature);
        }

        // 3) htm / htu
        if htm != method.trim().to_ascii_uppercase() {
            return Err(DpopError::RequestMismatch("htm"));
        }

        let expected = normalize_htu(target_uri);
        if expected.is_none() || normalize_htu(&htu) != expected {
            return Err(DpopError::RequestMismatch("htu"));
        }

        // 4) iat window
        let now = chrono::Utc::now().timestamp();
        let leeway = self.policy.iat_leeway_seconds;

        // iat is attacker-controlled: compare against saturated bounds, never subtract it.
        let latest = now.saturating_add(leeway);
        let earliest = now.saturating_sub(self.policy.max_age_seconds.saturating_add(leeway));

        // not too far in the future
        if iat > latest {
            return Err(DpopError::StaleProof);
        }
        // not too old
        if iat < earliest {
            return Err(DpopError::StaleProof);
        }

        // 5) jti replay
        let replay_key = format!("{}:{}", jkt, jti);
        let first_time = self
            .replay
            .check_and_store(&replay_key, self.policy.replay_ttl_seconds())
            .await;

        if !first_time {
            return Err(DpopError::Replay);
        }

        // 6) nonce, bound to the verified thumbprint
        let nonce = claims.nonce.unwrap_or_default();
        let consumed = self.nonces.try_consume(&jkt, &nonce).await.map_err(|e| {
            tracing::error!(error = %e, "nonce backend failure");
            DpopError::InvalidNonce
        })?;

        if !consumed {
            return Err(DpopError::InvalidNonce);
        }

        Ok(VerifiedProof { jkt, jti, iat })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};

    use super::*;
    use crate::services::dpop::{
        key::KeyPair,
        proof::{ProofBuilder, build_proof},
    };
    use crate::services::{nonce::InMemoryNonceStore, replay::InMemoryReplayStore};

    const TOKEN_URL: &str = "http://host/token";

    fn verifier() -> (ProofVerifier, Arc<InMemoryNonceStore>) {
        let nonces = Arc::new(InMemoryNonceStore::new(24, Duration::from_secs(300)));
        let replay = Arc::new(InMemoryReplayStore::new());
        let v = ProofVerifier::new(DpopPolicy::default(), nonces.clone(), replay);
        (v, nonces)
    }

    #[tokio::test]
    async fn valid_proof_returns_thumbprint_once() {
        let (v, nonces) = verifier();
        let key = KeyPair::generate();
        let nonce = nonces.request_nonce(key.thumbprint()).await.unwrap();

        let proof = build_proof(&key, key.jwk(), &nonce, "POST", TOKEN_URL).unwrap();
        let verified = v.verify_proof(proof.as_str(), "POST", TOKEN_URL).await.unwrap();
        assert_eq!(verified.jkt, key.thumbprint());

        // Same nonce, fresh jti: the nonce is gone.
        let again = build_proof(&key, key.jwk(), &nonce, "POST", TOKEN_URL).unwrap();
        assert_eq!(
            v.verify_proof(again.as_str(), "POST", TOKEN_URL).await,
            Err(DpopError::InvalidNonce)
        );
    }

    #[tokio::test]
    async fn nonce_issued_for_another_key_is_rejected() {
        let (v, nonces) = verifier();
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let nonce_for_b = nonces.request_nonce(b.thumbprint()).await.unwrap();

        let proof = build_proof(&a, a.jwk(), &nonce_for_b, "POST", TOKEN_URL).unwrap();
        assert_eq!(
            v.verify_proof(proof.as_str(), "POST", TOKEN_URL).await,
            Err(DpopError::InvalidNonce)
        );

        // B's nonce is still usable by B.
        let proof_b = build_proof(&b, b.jwk(), &nonce_for_b, "POST", TOKEN_URL).unwrap();
        assert!(v.verify_proof(proof_b.as_str(), "POST", TOKEN_URL).await.is_ok());
    }

    #[tokio::test]
    async fn forged_cnf_jkt_is_an_invalid_signature() {
        let (v, nonces) = verifier();
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let nonce_for_b = nonces.request_nonce(b.thumbprint()).await.unwrap();

        // Signed by A, but claims to be bound to B.
        let header = serde_json::json!({ "typ": "dpop+jwt", "alg": "ES256", "jwk": a.jwk() });
        let claims = serde_json::json!({
            "jti": "forged", "htm": "POST", "htu": TOKEN_URL,
            "iat": chrono::Utc::now().timestamp(), "nonce": nonce_for_b,
            "cnf": { "jkt": b.thumbprint() }
        });
        let proof = sign_raw(&a, &header, &claims);

        assert_eq!(
            v.verify_proof(&proof, "POST", TOKEN_URL).await,
            Err(DpopError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn tampered_claims_fail_signature_check() {
        let (v, nonces) = verifier();
        let key = KeyPair::generate();
        let nonce = nonces.request_nonce(key.thumbprint()).await.unwrap();
        let proof = build_proof(&key, key.jwk(), &nonce, "POST", TOKEN_URL).unwrap();

        let parts: Vec<&str> = proof.as_str().split('.').collect();
        let mut claims: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        claims["htu"] = "http://evil/token".into();
        let tampered = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap()),
            parts[2]
        );

        assert_eq!(
            v.verify_proof(&tampered, "POST", TOKEN_URL).await,
            Err(DpopError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn htu_and_htm_must_match_the_request() {
        let (v, nonces) = verifier();
        let key = KeyPair::generate();
        let nonce = nonces.request_nonce(key.thumbprint()).await.unwrap();

        let proof = build_proof(&key, key.jwk(), &nonce, "POST", "http://host/other").unwrap();
        assert_eq!(
            v.verify_proof(proof.as_str(), "POST", TOKEN_URL).await,
            Err(DpopError::RequestMismatch("htu"))
        );

        let proof = build_proof(&key, key.jwk(), &nonce, "GET", TOKEN_URL).unwrap();
        assert_eq!(
            v.verify_proof(proof.as_str(), "POST", TOKEN_URL).await,
            Err(DpopError::RequestMismatch("htm"))
        );

        // Query strings are not part of htu.
        let proof = build_proof(&key, key.jwk(), &nonce, "POST", TOKEN_URL).unwrap();
        assert!(
            v.verify_proof(proof.as_str(), "POST", "http://HOST:80/token?x=1")
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn stale_and_future_proofs_are_rejected() {
        let (v, nonces) = verifier();
        let key = KeyPair::generate();
        let nonce = nonces.request_nonce(key.thumbprint()).await.unwrap();
        let now = chrono::Utc::now().timestamp();

        let old = ProofBuilder::new(&key)
            .with_iat(now - 3600)
            .build(key.jwk(), &nonce, "POST", TOKEN_URL)
            .unwrap();
        assert_eq!(
            v.verify_proof(old.as_str(), "POST", TOKEN_URL).await,
            Err(DpopError::StaleProof)
        );

        let future = ProofBuilder::new(&key)
            .with_iat(now + 3600)
            .build(key.jwk(), &nonce, "POST", TOKEN_URL)
            .unwrap();
        assert_eq!(
            v.verify_proof(future.as_str(), "POST", TOKEN_URL).await,
            Err(DpopError::StaleProof)
        );

        // Failures before the nonce step leave the nonce live.
        let fresh = build_proof(&key, key.jwk(), &nonce, "POST", TOKEN_URL).unwrap();
        assert!(v.verify_proof(fresh.as_str(), "POST", TOKEN_URL).await.is_ok());
    }

    #[tokio::test]
    async fn extreme_iat_values_are_stale_not_a_panic() {
        let (v, nonces) = verifier();
        let key = KeyPair::generate();
        let nonce = nonces.request_nonce(key.thumbprint()).await.unwrap();

        for iat in [i64::MIN, i64::MAX] {
            let proof = ProofBuilder::new(&key)
                .with_iat(iat)
                .build(key.jwk(), &nonce, "POST", TOKEN_URL)
                .unwrap();
            assert_eq!(
                v.verify_proof(proof.as_str(), "POST", TOKEN_URL).await,
                Err(DpopError::StaleProof),
                "iat = {iat}"
            );
        }

        let fresh = build_proof(&key, key.jwk(), &nonce, "POST", TOKEN_URL).unwrap();
        assert!(v.verify_proof(fresh.as_str(), "POST", TOKEN_URL).await.is_ok());
    }

    #[tokio::test]
    async fn huge_policy_window_still_rejects_the_distant_past() {
        let nonces = Arc::new(InMemoryNonceStore::new(24, Duration::from_secs(300)));
        let policy = DpopPolicy {
            iat_leeway_seconds: i64::MAX,
            max_age_seconds: i64::MAX,
        };
        let v = ProofVerifier::new(policy, nonces.clone(), Arc::new(InMemoryReplayStore::new()));
        let key = KeyPair::generate();
        let nonce = nonces.request_nonce(key.thumbprint()).await.unwrap();

        let proof = ProofBuilder::new(&key)
            .with_iat(i64::MIN)
            .build(key.jwk(), &nonce, "POST", TOKEN_URL)
            .unwrap();
        assert_eq!(
            v.verify_proof(proof.as_str(), "POST", TOKEN_URL).await,
            Err(DpopError::StaleProof)
        );
    }

    #[tokio::test]
    async fn replayed_proof_is_rejected_before_nonce_check() {
        let (v, nonces) = verifier();
        let key = KeyPair::generate();
        let nonce = nonces.request_nonce(key.thumbprint()).await.unwrap();
        let proof = build_proof(&key, key.jwk(), &nonce, "POST", TOKEN_URL).unwrap();

        assert!(v.verify_proof(proof.as_str(), "POST", TOKEN_URL).await.is_ok());
        assert_eq!(
            v.verify_proof(proof.as_str(), "POST", TOKEN_URL).await,
            Err(DpopError::Replay)
        );
    }

    #[tokio::test]
    async fn missing_nonce_claim_is_an_invalid_nonce() {
        let (v, nonces) = verifier();
        let key = KeyPair::generate();
        nonces.request_nonce(key.thumbprint()).await.unwrap();

        let header = serde_json::json!({ "typ": "dpop+jwt", "alg": "ES256", "jwk": key.jwk() });
        let claims = serde_json::json!({
            "jti": "no-nonce", "htm": "POST", "htu": TOKEN_URL,
            "iat": chrono::Utc::now().timestamp(),
            "cnf": { "jkt": key.thumbprint() }
        });
        let proof = sign_raw(&key, &header, &claims);

        assert_eq!(
            v.verify_proof(&proof, "POST", TOKEN_URL).await,
            Err(DpopError::InvalidNonce)
        );
    }

    #[tokio::test]
    async fn malformed_or_foreign_headers_are_unverifiable() {
        let (v, _) = verifier();
        let key = KeyPair::generate();

        assert!(matches!(
            v.verify_proof("not-a-jwt", "POST", TOKEN_URL).await,
            Err(DpopError::UnverifiableToken(_))
        ));

        let claims = serde_json::json!({ "jti": "x" });

        let wrong_typ = serde_json::json!({ "typ": "JWT", "alg": "ES256", "jwk": key.jwk() });
        assert_eq!(
            v.verify_proof(&sign_raw(&key, &wrong_typ, &claims), "POST", TOKEN_URL)
                .await,
            Err(DpopError::UnverifiableToken("typ"))
        );

        let no_jwk = serde_json::json!({ "typ": "dpop+jwt", "alg": "ES256" });
        assert_eq!(
            v.verify_proof(&sign_raw(&key, &no_jwk, &claims), "POST", TOKEN_URL)
                .await,
            Err(DpopError::UnverifiableToken("missing jwk"))
        );

        let wrong_alg = serde_json::json!({ "typ": "dpop+jwt", "alg": "HS256", "jwk": key.jwk() });
        assert_eq!(
            v.verify_proof(&sign_raw(&key, &wrong_alg, &claims), "POST", TOKEN_URL)
                .await,
            Err(DpopError::UnverifiableToken("alg"))
        );
    }

    #[tokio::test]
    async fn missing_required_claim_is_unverifiable() {
        let (v, _) = verifier();
        let key = KeyPair::generate();
        let header = serde_json::json!({ "typ": "dpop+jwt", "alg": "ES256", "jwk": key.jwk() });
        let claims = serde_json::json!({
            "jti": "x", "htm": "POST", "htu": TOKEN_URL,
            "cnf": { "jkt": key.thumbprint() }
        });

        assert_eq!(
            v.verify_proof(&sign_raw(&key, &header, &claims), "POST", TOKEN_URL)
                .await,
            Err(DpopError::UnverifiableToken("iat"))
        );
    }

    #[test]
    fn retry_classification() {
        assert!(DpopError::InvalidNonce.is_retryable());
        assert!(DpopError::StaleProof.is_retryable());
        assert!(DpopError::Replay.is_retryable());
        assert!(!DpopError::InvalidSignature.is_retryable());
        assert_eq!(DpopError::RequestMismatch("htu").kind(), "request_mismatch");
    }

    #[test]
    fn replay_ttl_covers_the_whole_window() {
        let policy = DpopPolicy {
            iat_leeway_seconds: 5,
            max_age_seconds: 60,
        };
        assert_eq!(policy.replay_ttl_seconds(), 70);

        let unbounded = DpopPolicy {
            iat_leeway_seconds: i64::MAX,
            max_age_seconds: i64::MAX,
        };
        assert_eq!(unbounded.replay_ttl_seconds(), i64::MAX as u64);
    }

    fn sign_raw(key: &KeyPair, header: &serde_json::Value, claims: &serde_json::Value) -> String {
        use p256::ecdsa::{Signature, signature::Signer};

        let input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(header).unwrap()),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims).unwrap())
        );
        let sig: Signature = key.signing_key().sign(input.as_bytes());
        format!("{}.{}", input, URL_SAFE_NO_PAD.encode(sig.to_bytes()))
    }
}

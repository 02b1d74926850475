use p256::{
    ecdsa::SigningKey,
    pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding},
};
use rand::rngs::OsRng;

use crate::services::dpop::jwk::{JwkError, PublicJwk};

/// Client-held P-256 key pair.
///
/// Lives in memory only. Debug omits the private key.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    jwk: PublicJwk,
    thumbprint: String,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("thumbprint", &self.thumbprint)
            .finish()
    }
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng))
    }

    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let jwk = PublicJwk::from_verifying_key(signing_key.verifying_key());
        // A key we hold always encodes to a well-formed JWK.
        let thumbprint = jwk.thumbprint().unwrap_or_default();

        Self {
            signing_key,
            jwk,
            thumbprint,
        }
    }

    pub fn from_pkcs8_pem(pem: &str) -> Result<Self, JwkError> {
        let signing_key = SigningKey::from_pkcs8_pem(pem)
            .map_err(|_| JwkError::KeyEncoding("expected P-256 PKCS#8 PEM"))?;
        Ok(Self::from_signing_key(signing_key))
    }

    pub fn to_pkcs8_pem(&self) -> Result<String, JwkError> {
        self.signing_key
            .to_pkcs8_pem(LineEnding::LF)
            .map(|pem| pem.to_string())
            .map_err(|_| JwkError::KeyEncoding("pkcs8 encoding"))
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    pub fn jwk(&self) -> &PublicJwk {
        &self.jwk
    }

    /// `jkt` of the public half.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }
}

//! Public JWK representation and RFC 7638 thumbprints (P-256 only).

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::jwk::{AlgorithmParameters, EllipticCurve, Jwk};
use p256::{EncodedPoint, ecdsa::VerifyingKey};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// P-256 affine coordinates are 32 bytes each.
const P256_COORDINATE_LEN: usize = 32;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum JwkError {
    #[error("malformed key material: {0}")]
    KeyEncoding(&'static str),
}

/// EC public key in JWK form (`kty=EC`, `crv=P-256`).
///
/// Member order in the source JSON is irrelevant: the thumbprint is always
/// computed from the parsed members.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicJwk {
    pub kty: String,
    pub crv: String,
    pub x: String,
    pub y: String,
}

impl PublicJwk {
    /// Derive the JWK of a P-256 public key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        // An uncompressed, non-identity point always carries both coordinates.
        let x = point.x().map(|x| URL_SAFE_NO_PAD.encode(x)).unwrap_or_default();
        let y = point.y().map(|y| URL_SAFE_NO_PAD.encode(y)).unwrap_or_default();

        Self {
            kty: "EC".to_string(),
            crv: "P-256".to_string(),
            x,
            y,
        }
    }

    pub fn from_value(value: &serde_json::Value) -> Result<Self, JwkError> {
        serde_json::from_value(value.clone()).map_err(|_| JwkError::KeyEncoding("jwk json"))
    }

    /// Convert the `jwk` embedded in a JOSE header.
    pub fn from_header_jwk(jwk: &Jwk) -> Result<Self, JwkError> {
        match &jwk.algorithm {
            AlgorithmParameters::EllipticCurve(params) => match params.curve {
                EllipticCurve::P256 => Ok(Self {
                    kty: "EC".to_string(),
                    crv: "P-256".to_string(),
                    x: params.x.clone(),
                    y: params.y.clone(),
                }),
                _ => Err(JwkError::KeyEncoding("unsupported curve")),
            },
            _ => Err(JwkError::KeyEncoding("unsupported key type")),
        }
    }

    /// Rebuild the verifying key, validating every member on the way.
    pub fn to_verifying_key(&self) -> Result<VerifyingKey, JwkError> {
        if self.kty != "EC" {
            return Err(JwkError::KeyEncoding("kty must be EC"));
        }
        if self.crv != "P-256" {
            return Err(JwkError::KeyEncoding("crv must be P-256"));
        }

        let x = decode_coordinate(&self.x)?;
        let y = decode_coordinate(&self.y)?;

        let point = EncodedPoint::from_affine_coordinates(
            p256::FieldBytes::from_slice(&x),
            p256::FieldBytes::from_slice(&y),
            false,
        );

        VerifyingKey::from_encoded_point(&point)
            .map_err(|_| JwkError::KeyEncoding("point is not on the curve"))
    }

    /// RFC 7638 thumbprint (`jkt`).
    pub fn thumbprint(&self) -> Result<String, JwkError> {
        compute_thumbprint(self)
    }
}

fn decode_coordinate(value: &str) -> Result<Vec<u8>, JwkError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(value)
        .map_err(|_| JwkError::KeyEncoding("coordinate is not base64url"))?;

    if bytes.len() != P256_COORDINATE_LEN {
        return Err(JwkError::KeyEncoding("coordinate length"));
    }

    Ok(bytes)
}

/// Compute `base64url(SHA-256(canonical JWK))`.
///
/// Canonical form for EC keys is the required members in lexicographic order
/// with no whitespace: `{"crv":..,"kty":..,"x":..,"y":..}`. The key is fully
/// validated first so malformed material never yields a thumbprint.
pub fn compute_thumbprint(jwk: &PublicJwk) -> Result<String, JwkError> {
    jwk.to_verifying_key()?;

    let canonical = format!(
        r#"{{"crv":"{}","kty":"{}","x":"{}","y":"{}"}}"#,
        jwk.crv, jwk.kty, jwk.x, jwk.y
    );

    let digest = Sha256::digest(canonical.as_bytes());
    Ok(URL_SAFE_NO_PAD.encode(digest))
}

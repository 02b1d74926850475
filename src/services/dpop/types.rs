use serde::{Deserialize, Serialize};

use crate::services::dpop::jwk::PublicJwk;

pub const DPOP_TYP: &str = "dpop+jwt";
pub const DPOP_ALG: &str = "ES256";

/// DPoP proof JWT header (RFC 9449)
#[derive(Debug, Serialize)]
pub struct DpopHeader<'a> {
    pub typ: &'static str, // always "dpop+jwt"
    pub alg: &'static str, // always "ES256"
    pub jwk: &'a PublicJwk, // embedded public key
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmation {
    pub jkt: String,
}

/// DPoP proof JWT claims, as produced by the builder.
#[derive(Debug, Clone, Serialize)]
pub struct DpopClaims {
    pub jti: String,
    pub htm: String,
    pub htu: String,
    pub iat: i64,
    pub nonce: String,
    pub cnf: Confirmation,
}

/// Claims as received; every member is optional so absence maps to a typed error
/// instead of a generic decode failure.
#[derive(Debug, Deserialize)]
pub(crate) struct IncomingClaims {
    pub jti: Option<String>,
    pub htm: Option<String>,
    pub htu: Option<String>,
    pub iat: Option<i64>,
    pub nonce: Option<String>,
    pub cnf: Option<Confirmation>,
}

/// Result of a successful proof verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedProof {
    pub jkt: String,
    pub jti: String,
    pub iat: i64,
}

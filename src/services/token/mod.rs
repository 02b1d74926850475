pub mod issuer;
pub mod jwt;

pub use issuer::{AccessTokenResponse, TokenIssuer};
pub use jwt::JwtIssuer;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("invalid signing key: {0}")]
    Key(String),
    #[error("failed to sign token: {0}")]
    Signing(String),
    #[error("random source unavailable: {0}")]
    Entropy(String),
}

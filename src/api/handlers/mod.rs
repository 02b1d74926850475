pub mod health;
pub mod nonce;
pub mod token;

use axum::http::{Method, Uri};

use crate::error::AppError;

pub async fn method_not_allowed(method: Method, uri: Uri) -> AppError {
    tracing::warn!(path = %uri.path(), method = %method, "method not allowed");
    AppError::MethodNotAllowed
}

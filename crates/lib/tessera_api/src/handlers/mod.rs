//! Request handlers.

pub mod admin_auth;
pub mod health;
pub mod tenants;
pub mod user_auth;

use axum::body::Bytes;
use serde::de::DeserializeOwned;

use tessera_core::auth::AuthError;

use crate::error::{AppError, AppResult};
use crate::models::LoginRequest;

/// Parse a JSON body that may be absent. An empty body yields the default.
pub(crate) fn optional_json<T: DeserializeOwned + Default>(body: &Bytes) -> AppResult<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice(body)
        .map_err(|e| AppError::validation("VALIDATION_ERROR", format!("Invalid JSON body: {e}")))
}

/// Keep a token only if it has content.
pub(crate) fn non_empty(token: Option<String>) -> Option<String> {
    token.map(|t| t.trim().to_string()).filter(|t| !t.is_empty())
}

/// Parse a login body. Anything that is not a JSON object with the two
/// fields reads as missing credentials, whatever the content type.
pub(crate) fn login_body(body: &Bytes) -> AppResult<LoginRequest> {
    serde_json::from_slice(body).map_err(|_| AppError::from(AuthError::MissingCredentials))
}

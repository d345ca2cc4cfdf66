//! Authentication and authorization logic.
//!
//! Token codec, admin token ledger, credential store, lockout and throttle
//! guards, the login/refresh/logout orchestration and the role guards shared
//! by the HTTP layer.

pub mod access;
pub mod authenticator;
pub mod credentials;
pub mod guard;
pub mod jwt;
pub mod ledger;
pub mod password;
pub mod queries;

use thiserror::Error;

use crate::store::StoreError;
pub use jwt::TokenError;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email and password are required")]
    MissingCredentials,

    #[error("Invalid email address")]
    InvalidEmail,

    /// Deliberately identical for unknown email and wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked, retry in {retry_after_secs}s")]
    AccountLocked { retry_after_secs: i64 },

    #[error("Account inactive")]
    AccountInactive,

    #[error("Too many login attempts, retry in {retry_after_secs}s")]
    Throttled { retry_after_secs: u64 },

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Token refresh failed")]
    RefreshFailed,

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Lowercase and trim an email for lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Loose structural check: one `@`, non-empty local part, dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !email.chars().any(char::is_whitespace)
}

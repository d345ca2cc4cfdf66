//! Application error types and the JSON error envelope.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::{IntoResponse, Response},
};
use tessera_core::auth::access::AccessError;
use tessera_core::auth::{AuthError, TokenError};
use tessera_core::store::StoreError;
use tessera_core::tenant::TenantError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
///
/// Every variant renders as `{ error, message, code }`; `code` is stable.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("{message}")]
    Unauthorized { code: &'static str, message: String },

    #[error("{message}")]
    Forbidden { code: &'static str, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Account locked")]
    Locked { retry_after_secs: u64 },

    #[error("Too many requests")]
    TooManyRequests { retry_after_secs: u64 },

    /// The detail is logged, and echoed only by debug builds.
    #[error("Internal server error")]
    Internal { code: &'static str, detail: String },
}

impl AppError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn unauthorized(code: &'static str, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(code: &'static str, message: impl Into<String>) -> Self {
        Self::Forbidden {
            code,
            message: message.into(),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::Internal {
            code: "INTERNAL_ERROR",
            detail: detail.into(),
        }
    }

    /// Login failures keep their own codes; anything unexpected becomes
    /// `LOGIN_ERROR` rather than the generic internal code.
    pub fn login(e: AuthError) -> Self {
        match Self::from(e) {
            Self::Internal { detail, .. } => Self::Internal {
                code: "LOGIN_ERROR",
                detail,
            },
            other => other,
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { code, .. }
            | Self::Unauthorized { code, .. }
            | Self::Forbidden { code, .. }
            | Self::Internal { code, .. } => *code,
            Self::NotFound(_) => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Locked { .. } => "ACCOUNT_LOCKED",
            Self::TooManyRequests { .. } => "RATE_LIMITED",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Locked { .. } => StatusCode::LOCKED,
            Self::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short human title for the `error` field.
    fn title(&self) -> &'static str {
        match self.code() {
            "MISSING_CREDENTIALS" => "Missing credentials",
            "INVALID_EMAIL" => "Invalid email",
            "INVALID_CREDENTIALS" => "Invalid credentials",
            "ACCOUNT_LOCKED" => "Account locked",
            "ACCOUNT_INACTIVE" => "Account inactive",
            "RATE_LIMITED" => "Too many requests",
            "LOGIN_ERROR" => "Login failed",
            "REFRESH_FAILED" => "Token refresh failed",
            "MISSING_TOKEN" => "Authentication required",
            "INVALID_TOKEN" => "Invalid token",
            "TOKEN_EXPIRED" => "Token expired",
            "WRONG_TOKEN_TYPE" => "Wrong token type",
            "TOKEN_REVOKED" => "Token revoked",
            "INVALID_TENANT_ID" => "Invalid tenant",
            "NOT_FOUND" => "Not found",
            "CONFLICT" => "Conflict",
            _ => match self {
                Self::Validation { .. } => "Validation error",
                Self::Forbidden { .. } => "Forbidden",
                Self::Unauthorized { .. } => "Unauthorized",
                _ => "Internal server error",
            },
        }
    }

    fn retry_after(&self) -> Option<u64> {
        match self {
            Self::Locked { retry_after_secs } | Self::TooManyRequests { retry_after_secs } => {
                Some(*retry_after_secs)
            }
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let (message, detail) = match &self {
            Self::Internal { detail, .. } => {
                error!(code = self.code(), detail = %detail, "internal error");
                let exposed = cfg!(debug_assertions).then(|| detail.clone());
                ("An unexpected error occurred".to_string(), exposed)
            }
            Self::Locked { retry_after_secs } => (
                format!("Account is locked. Try again in {retry_after_secs} seconds."),
                None,
            ),
            Self::TooManyRequests { retry_after_secs } => (
                format!("Too many login attempts. Try again in {retry_after_secs} seconds."),
                None,
            ),
            other => (other.to_string(), None),
        };
        let body = Json(ErrorResponse {
            error: self.title().to_string(),
            message,
            code: self.code().to_string(),
            detail,
        });
        let mut response = (status, body).into_response();
        if let Some(secs) = self.retry_after() {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingCredentials => {
                Self::validation("MISSING_CREDENTIALS", "Email and password are required")
            }
            AuthError::InvalidEmail => Self::validation("INVALID_EMAIL", "Invalid email address"),
            AuthError::InvalidCredentials => {
                Self::unauthorized("INVALID_CREDENTIALS", "Invalid email or password")
            }
            AuthError::AccountLocked { retry_after_secs } => Self::Locked {
                retry_after_secs: retry_after_secs.max(1).unsigned_abs(),
            },
            AuthError::AccountInactive => {
                Self::forbidden("ACCOUNT_INACTIVE", "Account is inactive")
            }
            AuthError::Throttled { retry_after_secs } => Self::TooManyRequests { retry_after_secs },
            AuthError::Token(e) => Self::from(e),
            AuthError::TokenRevoked => Self::unauthorized("TOKEN_REVOKED", "Token has been revoked"),
            AuthError::RefreshFailed => Self::unauthorized("REFRESH_FAILED", "Token refresh failed"),
            AuthError::ValidationError(msg) => Self::validation("VALIDATION_ERROR", msg),
            AuthError::Store(e) => Self::from(e),
            AuthError::Internal(msg) => Self::internal(msg),
        }
    }
}

impl From<TokenError> for AppError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::InvalidToken(_) => Self::unauthorized("INVALID_TOKEN", "Invalid token"),
            TokenError::ExpiredToken => Self::unauthorized("TOKEN_EXPIRED", "Token has expired"),
            TokenError::WrongTokenType { expected, .. } => Self::unauthorized(
                "WRONG_TOKEN_TYPE",
                format!("Expected a {expected} token"),
            ),
            TokenError::Signing(msg) => Self::internal(msg),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::NotFound(msg) => Self::NotFound(msg),
            other => Self::internal(other.to_string()),
        }
    }
}

impl From<TenantError> for AppError {
    fn from(e: TenantError) -> Self {
        match e {
            TenantError::InvalidTenantId(_) => {
                Self::validation("INVALID_TENANT_ID", "Invalid tenant identifier")
            }
            TenantError::Store(e) => Self::from(e),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::validation("VALIDATION_ERROR", rejection.body_text())
    }
}

impl From<AccessError> for AppError {
    fn from(e: AccessError) -> Self {
        match e {
            AccessError::Unauthenticated => {
                Self::unauthorized("MISSING_TOKEN", "Authentication required")
            }
            AccessError::Forbidden(msg) => Self::forbidden("FORBIDDEN", msg),
            AccessError::TenantRequired => {
                Self::validation("TENANT_REQUIRED", "Tenant identifier required")
            }
            AccessError::Store(e) => Self::from(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(err: AppError) -> (StatusCode, serde_json::Value, Option<String>) {
        let response = err.into_response();
        let status = response.status();
        let retry = response
            .headers()
            .get(RETRY_AFTER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap(), retry)
    }

    #[tokio::test]
    async fn refresh_failure_envelope() {
        let (status, json, _) = body_json(AuthError::RefreshFailed.into()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["error"], "Token refresh failed");
        assert_eq!(json["code"], "REFRESH_FAILED");
        assert!(json["message"].is_string());
    }

    #[tokio::test]
    async fn lockout_carries_retry_after() {
        let (status, json, retry) =
            body_json(AuthError::AccountLocked { retry_after_secs: 42 }.into()).await;
        assert_eq!(status, StatusCode::LOCKED);
        assert_eq!(json["code"], "ACCOUNT_LOCKED");
        assert_eq!(retry.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn unexpected_login_errors_use_login_code() {
        let err = AppError::login(AuthError::Internal("boom".into()));
        let (status, json, _) = body_json(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["code"], "LOGIN_ERROR");
        assert_ne!(json["message"], "boom");
    }

    #[test]
    fn token_errors_stay_distinguishable() {
        assert_eq!(AppError::from(TokenError::ExpiredToken).code(), "TOKEN_EXPIRED");
        assert_eq!(
            AppError::from(TokenError::InvalidToken("sig".into())).code(),
            "INVALID_TOKEN"
        );
        assert_eq!(
            AppError::from(StoreError::Conflict("dup".into())).status(),
            StatusCode::CONFLICT
        );
    }
}

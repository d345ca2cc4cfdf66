//! Authentication middleware: bearer token extraction and verification.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, header::AUTHORIZATION},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use crate::AppState;
use crate::error::AppError;
use crate::services::cookies::ADMIN_ACCESS_COOKIE;

/// The verified access token behind the request's principal.
#[derive(Debug, Clone)]
pub struct AccessToken {
    pub jti: String,
}

/// Token from `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify the bearer access token and put the [`Principal`] and
/// [`AccessToken`] into the request extensions.
///
/// Admin tokens must also be live in the ledger, so a logged-out admin
/// token is rejected even before it expires. User tokens are not ledgered.
///
/// [`Principal`]: tessera_core::models::auth::Principal
pub async fn authenticate(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(request.headers())
        .ok_or_else(|| AppError::unauthorized("MISSING_TOKEN", "Missing bearer token"))?
        .to_string();

    let claims = state.auth.authenticate_access(&token).await.inspect_err(|e| {
        debug!(error = %e, "access token rejected");
    })?;

    let extensions = request.extensions_mut();
    extensions.insert(AccessToken { jti: claims.jti });
    extensions.insert(claims.principal);
    Ok(next.run(request).await)
}

/// Compatibility shim for older admin clients: lift the
/// `admin_access_token` cookie into the `Authorization` header when no
/// header was sent, then authenticate as usual.
pub async fn legacy_cookie_auth(
    state: State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if !request.headers().contains_key(AUTHORIZATION) {
        let jar = CookieJar::from_headers(request.headers());
        let lifted = jar
            .get(ADMIN_ACCESS_COOKIE)
            .map(|cookie| cookie.value())
            .filter(|v| !v.is_empty())
            .and_then(|v| HeaderValue::from_str(&format!("Bearer {v}")).ok());
        if let Some(value) = lifted {
            debug!("using legacy admin cookie");
            request.headers_mut().insert(AUTHORIZATION, value);
        }
    }
    authenticate(state, request, next).await
}

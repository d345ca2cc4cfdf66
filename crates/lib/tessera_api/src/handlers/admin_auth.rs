//! Admin authentication handlers.

use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::{Extension, Json};
use axum_extra::extract::WithRejection;
use axum_extra::extract::cookie::CookieJar;
use tessera_core::auth::AuthError;
use tessera_core::auth::access;
use tessera_core::auth::authenticator::{AdminLogout, TokenPair};
use tessera_core::models::auth::{AdminRole, Principal};

use super::{login_body, non_empty, optional_json};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::auth::{AccessToken, bearer_token};
use crate::middleware::client::ClientMeta;
use crate::models::{
    AdminLoginResponse, AdminMeResponse, AdminView, ChangePasswordRequest, CreateAdminRequest,
    LogoutRequest, RefreshRequest, SessionView, SuccessResponse,
};
use crate::services::cookies::{
    ADMIN_ACCESS_COOKIE, ADMIN_REFRESH_COOKIE, clear_admin_cookies, set_admin_cookies,
};

fn cookie_value(jar: &CookieJar, name: &str) -> Option<String> {
    non_empty(jar.get(name).map(|c| c.value().to_string()))
}

fn with_session_cookies(state: &AppState, jar: CookieJar, tokens: &TokenPair) -> CookieJar {
    let settings = state.auth.settings();
    set_admin_cookies(
        jar,
        &tokens.access_token,
        &tokens.refresh_token,
        settings.access_ttl.num_seconds(),
        settings.refresh_ttl.num_seconds(),
        state.config.production,
    )
}

/// `POST /auth/admin/login`
pub async fn login_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<AdminLoginResponse>)> {
    let body = login_body(&body)?;
    let session = state
        .auth
        .admin_login(&body.email, &body.password, &client)
        .await
        .map_err(AppError::login)?;
    let jar = with_session_cookies(&state, jar, &session.tokens);
    Ok((
        jar,
        Json(AdminLoginResponse {
            admin: AdminView::from(&session.admin),
            access_token: session.tokens.access_token,
            refresh_token: session.tokens.refresh_token,
            expires_in: session.tokens.expires_in,
        }),
    ))
}

/// `POST /auth/admin/refresh`
///
/// Refresh token from the body, else from the legacy cookie.
pub async fn refresh_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    jar: CookieJar,
    body: Bytes,
) -> AppResult<(CookieJar, Json<TokenPair>)> {
    let request: RefreshRequest = optional_json(&body)?;
    let token = non_empty(request.refresh_token)
        .or_else(|| cookie_value(&jar, ADMIN_REFRESH_COOKIE))
        .ok_or(AuthError::RefreshFailed)?;
    let session = state.auth.refresh_admin(&token, &client).await?;
    let jar = with_session_cookies(&state, jar, &session.tokens);
    Ok((jar, Json(session.tokens)))
}

/// `POST /auth/admin/logout`
///
/// Always 200.
pub async fn logout_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> (CookieJar, Json<SuccessResponse>) {
    let request: LogoutRequest = optional_json(&body).unwrap_or_default();
    let access_token = bearer_token(&headers)
        .map(str::to_string)
        .or_else(|| cookie_value(&jar, ADMIN_ACCESS_COOKIE));
    let refresh_token =
        non_empty(request.refresh_token).or_else(|| cookie_value(&jar, ADMIN_REFRESH_COOKIE));
    state
        .auth
        .logout_admin(AdminLogout {
            access_token,
            refresh_token,
            all_sessions: request.all_sessions,
        })
        .await;
    (
        clear_admin_cookies(jar, state.config.production),
        Json(SuccessResponse::ok()),
    )
}

/// `GET /auth/admin/me`
pub async fn me_handler(
    Extension(principal): Extension<Principal>,
) -> AppResult<Json<AdminMeResponse>> {
    let admin = access::require_admin(Some(&principal))?;
    Ok(Json(AdminMeResponse {
        admin: AdminView::from(admin),
        auth_user: admin.auth_user(),
    }))
}

/// `GET /auth/admin/sessions`
///
/// The caller's live ledger entries.
pub async fn sessions_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Extension(current): Extension<AccessToken>,
) -> AppResult<Json<Vec<SessionView>>> {
    let admin = access::require_admin(Some(&principal))?;
    let entries = state.auth.ledger().list_active(&admin.admin_id).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|entry| SessionView::new(entry, &current.jti))
            .collect(),
    ))
}

/// `POST /auth/admin/password`
///
/// Change password and end every session.
pub async fn change_password_handler(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    jar: CookieJar,
    WithRejection(Json(body), _): WithRejection<Json<ChangePasswordRequest>, AppError>,
) -> AppResult<(CookieJar, Json<SuccessResponse>)> {
    let admin = access::require_admin(Some(&principal))?;
    let revoked = state
        .auth
        .change_admin_password(&admin.admin_id, &body.current_password, &body.new_password)
        .await?;
    Ok((
        clear_admin_cookies(jar, state.config.production),
        Json(SuccessResponse {
            success: true,
            revoked_sessions: Some(revoked),
        }),
    ))
}

/// `POST /auth/admin/admins`
///
/// Super admins only.
pub async fn create_admin_handler(
    State(state): State<AppState>,
    WithRejection(Json(body), _): WithRejection<Json<CreateAdminRequest>, AppError>,
) -> AppResult<(StatusCode, Json<AdminView>)> {
    let role = match body.role.as_deref() {
        None => AdminRole::Admin,
        Some(raw) => {
            AdminRole::from_str(raw).map_err(|e| AppError::validation("VALIDATION_ERROR", e))?
        }
    };
    let admin = state.auth.create_admin(&body.email, &body.password, role).await?;
    Ok((StatusCode::CREATED, Json(AdminView::from(&admin))))
}

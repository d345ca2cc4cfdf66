//! End-user authentication handlers.
//!
//! User tokens are stateless: there is no ledger to consult, so logout is
//! client-side only and a user access token stays valid until it expires.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::{Extension, Json};
use axum_extra::extract::WithRejection;
use tessera_core::auth::AuthError;
use tessera_core::auth::access;
use tessera_core::auth::authenticator::{TokenPair, UserSession};
use tessera_core::models::auth::{Principal, UserRecord};
use tessera_core::tenant::TenantContext;
use tracing::debug;

use super::{login_body, non_empty, optional_json};
use crate::AppState;
use crate::error::{AppError, AppResult};
use crate::middleware::client::ClientMeta;
use crate::models::{
    RefreshRequest, RegisterRequest, SuccessResponse, UserLoginResponse, UserView,
};

fn login_response(session: UserSession) -> UserLoginResponse {
    UserLoginResponse {
        user: UserView::from(&session.user),
        access_token: session.tokens.access_token,
        refresh_token: session.tokens.refresh_token,
        expires_in: session.tokens.expires_in,
    }
}

/// `POST /auth/login`
pub async fn login_handler(
    State(state): State<AppState>,
    ClientMeta(client): ClientMeta,
    body: Bytes,
) -> AppResult<Json<UserLoginResponse>> {
    let body = login_body(&body)?;
    let session = state
        .auth
        .user_login(&body.email, &body.password, &client)
        .await
        .map_err(AppError::login)?;
    Ok(Json(login_response(session)))
}

/// `POST /auth/refresh`
pub async fn refresh_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<TokenPair>> {
    let request: RefreshRequest = optional_json(&body)?;
    let token = non_empty(request.refresh_token).ok_or(AuthError::RefreshFailed)?;
    let session = state.auth.refresh_user(&token).await?;
    Ok(Json(session.tokens))
}

/// `POST /auth/logout`
pub async fn logout_handler() -> Json<SuccessResponse> {
    debug!("user logout, nothing to revoke");
    Json(SuccessResponse::ok())
}

/// Create a user through the request's tenant handle and commit.
async fn create_in_partition(
    state: &AppState,
    tenant: &TenantContext,
    body: &RegisterRequest,
) -> AppResult<UserRecord> {
    let mut handle = tenant.handle().await;
    let user = state
        .auth
        .register_user(&mut **handle, &body.email, &body.password)
        .await?;
    handle.commit().await?;
    Ok(user)
}

/// `POST /auth/register`
///
/// Open self-registration into the global partition only.
pub async fn register_handler(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    WithRejection(Json(body), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> AppResult<(StatusCode, Json<UserLoginResponse>)> {
    if !tenant.scope().is_global() {
        return Err(AppError::forbidden("FORBIDDEN", "Tenant users are provisioned by an admin"));
    }
    let user = create_in_partition(&state, &tenant, &body).await?;
    let session = state.auth.issue_user_session(&user)?;
    Ok((StatusCode::CREATED, Json(login_response(session))))
}

/// `POST /tenants/{tenant_id}/auth/register`
///
/// Admin-only provisioning into the resolved tenant. No tokens are issued;
/// the new user logs in normally.
pub async fn provision_handler(
    State(state): State<AppState>,
    Extension(tenant): Extension<TenantContext>,
    WithRejection(Json(body), _): WithRejection<Json<RegisterRequest>, AppError>,
) -> AppResult<(StatusCode, Json<UserView>)> {
    let user = create_in_partition(&state, &tenant, &body).await?;
    Ok((StatusCode::CREATED, Json(UserView::from(&user))))
}

/// `GET /auth/me`
pub async fn me_handler(Extension(principal): Extension<Principal>) -> AppResult<Json<UserView>> {
    let user = access::require_user(Some(&principal))?;
    Ok(Json(UserView::from(user)))
}

//! Tenant-scoped user directory.
//!
//! Every read goes through the request's tenant handle, so only rows of the
//! resolved partition are visible.

use axum::extract::Path;
use axum::{Extension, Json};
use tessera_core::tenant::TenantContext;

use crate::error::{AppError, AppResult};
use crate::models::UserView;

/// `GET /tenants/{tenant_id}/users`
pub async fn list_users_handler(
    Extension(tenant): Extension<TenantContext>,
) -> AppResult<Json<Vec<UserView>>> {
    let users = tenant.handle().await.list_users().await?;
    Ok(Json(users.iter().map(UserView::from).collect()))
}

/// `GET /tenants/{tenant_id}/users/{user_id}`
pub async fn get_user_handler(
    Extension(tenant): Extension<TenantContext>,
    Path((_tenant_id, user_id)): Path<(String, String)>,
) -> AppResult<Json<UserView>> {
    let user = tenant
        .handle()
        .await
        .find_user(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))?;
    Ok(Json(UserView::from(&user)))
}

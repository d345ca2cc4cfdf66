//! Role and tenant guards as middleware.
//!
//! Each runs after [`authenticate`](super::auth::authenticate) and reads the
//! principal it stored.

use axum::{extract::Request, middleware::Next, response::Response};
use tessera_core::auth::access;
use tessera_core::models::auth::Principal;
use tessera_core::tenant::TenantContext;

use crate::error::AppError;

pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    access::require_admin(request.extensions().get::<Principal>())?;
    Ok(next.run(request).await)
}

pub async fn require_super_admin(request: Request, next: Next) -> Result<Response, AppError> {
    access::require_super_admin(request.extensions().get::<Principal>())?;
    Ok(next.run(request).await)
}

pub async fn require_user(request: Request, next: Next) -> Result<Response, AppError> {
    access::require_user(request.extensions().get::<Principal>())?;
    Ok(next.run(request).await)
}

/// Admit the principal into the resolved tenant. Needs the tenant resolver
/// to have run first.
pub async fn require_tenant_access(
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = request
        .extensions()
        .get::<TenantContext>()
        .cloned()
        .ok_or_else(|| AppError::internal("tenant context missing"))?;
    let principal = request.extensions().get::<Principal>().cloned();
    let granted = {
        let mut handle = context.handle().await;
        access::require_tenant_access(principal.as_ref(), &mut **handle).await?
    };
    request.extensions_mut().insert(granted);
    Ok(next.run(request).await)
}

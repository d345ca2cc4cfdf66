//! Tenant resolution middleware.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tessera_core::tenant::{TenantContext, TenantScope};
use tracing::{debug, warn};

use crate::AppState;
use crate::error::AppError;

/// Resolve the tenant from the request path and open this request's data
/// handle. The [`TenantContext`] lives in the request extensions only and
/// is dropped with the request, rolling back anything left uncommitted.
pub async fn resolve_tenant(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let scope = TenantScope::from_path(request.uri().path()).inspect_err(|e| {
        warn!(path = %request.uri().path(), error = %e, "tenant resolution rejected");
    })?;
    let handle = state.tenants.begin(scope).await?;
    let context = TenantContext::new(handle);
    debug!(tenant = %context.scope(), "tenant context bound");
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

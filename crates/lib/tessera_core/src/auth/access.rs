//! Role and tenant guards.
//!
//! Pure decisions over an already authenticated [`Principal`]. The HTTP
//! layer stacks them in order: admin, super admin, user, tenant access.

use thiserror::Error;

use crate::models::auth::{AdminPrincipal, AdminRole, Principal, UserPrincipal};
use crate::store::StoreError;
use crate::tenant::TenantHandle;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("{0}")]
    Forbidden(String),

    #[error("Tenant identifier required")]
    TenantRequired,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// How a principal was let into a tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantAccess {
    /// Admins may act on any tenant.
    AdminBypass,
    /// The user is visible in the tenant's partition.
    Member,
}

pub fn require_admin(principal: Option<&Principal>) -> Result<&AdminPrincipal, AccessError> {
    match principal {
        None => Err(AccessError::Unauthenticated),
        Some(Principal::Admin(admin)) => Ok(admin),
        Some(Principal::User(_)) => Err(AccessError::Forbidden("Admin access required".into())),
    }
}

pub fn require_super_admin(principal: Option<&Principal>) -> Result<&AdminPrincipal, AccessError> {
    let admin = require_admin(principal)?;
    if admin.role != AdminRole::SuperAdmin {
        return Err(AccessError::Forbidden("Super admin access required".into()));
    }
    Ok(admin)
}

pub fn require_user(principal: Option<&Principal>) -> Result<&UserPrincipal, AccessError> {
    match principal {
        None => Err(AccessError::Unauthenticated),
        Some(Principal::User(user)) if !user.user_id.is_empty() => Ok(user),
        Some(Principal::User(_)) => Err(AccessError::Unauthenticated),
        Some(Principal::Admin(_)) => Err(AccessError::Forbidden("User access required".into())),
    }
}

/// Admit `principal` into the tenant `handle` is bound to.
///
/// Users must carry no tenant claim or the same one, and must be found
/// through the handle itself, i.e. inside the tenant's partition.
pub async fn require_tenant_access(
    principal: Option<&Principal>,
    handle: &mut dyn TenantHandle,
) -> Result<TenantAccess, AccessError> {
    let principal = principal.ok_or(AccessError::Unauthenticated)?;
    let Some(tenant_id) = handle.scope().tenant_id().cloned() else {
        return Err(AccessError::TenantRequired);
    };
    let user = match principal {
        Principal::Admin(_) => return Ok(TenantAccess::AdminBypass),
        Principal::User(user) => user,
    };
    let denied = || AccessError::Forbidden("Not a member of this tenant".into());
    if user.tenant_id.as_ref().is_some_and(|claimed| *claimed != tenant_id) {
        return Err(denied());
    }
    if !handle.is_member(&user.user_id).await? {
        tracing::debug!(user_id = %user.user_id, tenant = %tenant_id, "tenant access denied");
        return Err(denied());
    }
    Ok(TenantAccess::Member)
}

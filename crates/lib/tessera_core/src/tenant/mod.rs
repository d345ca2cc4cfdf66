//! Tenant scoping.
//!
//! A request resolves a [`TenantScope`] from its path and opens exactly one
//! [`TenantHandle`] for it. Every data-access call for that request goes
//! through the handle, which constrains reads and writes to the resolved
//! partition. Nothing about the scope is kept on shared state.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::models::auth::{NewUser, UserRecord};
use crate::store::StoreError;

/// Path marker whose following segment names the tenant.
pub const TENANT_PATH_PREFIX: &str = "/tenants/";

/// Longest accepted slug-style tenant identifier.
const MAX_TENANT_ID_LEN: usize = 64;

/// Tenant resolution errors.
#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Invalid tenant identifier: {0:?}")]
    InvalidTenantId(String),

    #[error("Tenant store error: {0}")]
    Store(#[from] StoreError),
}

/// A well-formed tenant identifier: a UUID (normalised to lowercase
/// hyphenated form) or a slug of ASCII alphanumerics, `-` and `_` that
/// starts with an alphanumeric.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TenantId(String);

impl TenantId {
    pub fn parse(raw: &str) -> Result<Self, TenantError> {
        if let Ok(uuid) = uuid::Uuid::parse_str(raw) {
            return Ok(Self(uuid.hyphenated().to_string()));
        }
        let well_formed = !raw.is_empty()
            && raw.len() <= MAX_TENANT_ID_LEN
            && raw.starts_with(|c: char| c.is_ascii_alphanumeric())
            && raw
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if well_formed {
            Ok(Self(raw.to_string()))
        } else {
            Err(TenantError::InvalidTenantId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TenantId {
    type Err = TenantError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TenantId {
    type Error = TenantError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TenantId> for String {
    fn from(id: TenantId) -> Self {
        id.0
    }
}

/// The data partition a request operates against.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TenantScope {
    /// System scope: rows not owned by any tenant.
    Global,
    Tenant(TenantId),
}

impl TenantScope {
    /// Resolve the scope from a request path.
    ///
    /// The segment following `/tenants/` names the tenant; a path without
    /// that marker is global. A present but malformed (or empty) segment is
    /// rejected rather than silently treated as global.
    pub fn from_path(path: &str) -> Result<Self, TenantError> {
        let Some(start) = path.find(TENANT_PATH_PREFIX) else {
            return Ok(Self::Global);
        };
        let rest = &path[start + TENANT_PATH_PREFIX.len()..];
        let segment = rest.split('/').next().unwrap_or_default();
        TenantId::parse(segment).map(Self::Tenant)
    }

    pub fn tenant_id(&self) -> Option<&TenantId> {
        match self {
            Self::Global => None,
            Self::Tenant(id) => Some(id),
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }
}

impl fmt::Display for TenantScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => f.write_str("global"),
            Self::Tenant(id) => write!(f, "tenant:{id}"),
        }
    }
}

/// Opens request-scoped data-access handles.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Open a handle bound to `scope`. The handle owns its connection (or
    /// equivalent) for its whole lifetime; it is never shared with another
    /// request.
    async fn begin(&self, scope: TenantScope) -> Result<Box<dyn TenantHandle>, StoreError>;
}

/// Data access bound to one tenant partition.
///
/// Writes become visible to other handles only after [`commit`]; dropping
/// an uncommitted handle discards them.
///
/// [`commit`]: TenantHandle::commit
#[async_trait]
pub trait TenantHandle: Send {
    fn scope(&self) -> &TenantScope;

    async fn list_users(&mut self) -> Result<Vec<UserRecord>, StoreError>;

    async fn find_user(&mut self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;

    /// Insert a user into this handle's partition.
    async fn create_user(&mut self, user: NewUser) -> Result<UserRecord, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Whether `user_id` belongs to this handle's partition.
    async fn is_member(&mut self, user_id: &str) -> Result<bool, StoreError> {
        Ok(self.find_user(user_id).await?.is_some())
    }
}

/// The per-request binding of a scope to its handle.
///
/// Cloning shares the same handle, which lets the middleware chain and the
/// handler of one request work through one transaction.
#[derive(Clone)]
pub struct TenantContext {
    scope: TenantScope,
    handle: Arc<Mutex<Box<dyn TenantHandle>>>,
}

impl TenantContext {
    pub fn new(handle: Box<dyn TenantHandle>) -> Self {
        Self {
            scope: handle.scope().clone(),
            handle: Arc::new(Mutex::new(handle)),
        }
    }

    pub fn scope(&self) -> &TenantScope {
        &self.scope
    }

    /// Exclusive access to the request's handle.
    pub async fn handle(&self) -> MutexGuard<'_, Box<dyn TenantHandle>> {
        self.handle.lock().await
    }
}

impl fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantContext")
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

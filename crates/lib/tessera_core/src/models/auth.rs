//! Authentication domain models.
//!
//! These are internal domain models, distinct from the HTTP response types
//! in `tessera_api` (which never carry password hashes or ledger internals).

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::tenant::TenantId;

/// Role given to end users that have no explicit role.
pub const DEFAULT_USER_ROLE: &str = "user";

fn default_user_role() -> String {
    DEFAULT_USER_ROLE.to_string()
}

/// Intended use of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "access" => Ok(Self::Access),
            "refresh" => Ok(Self::Refresh),
            other => Err(format!("unknown token type {other:?}")),
        }
    }
}

/// Administrator trust level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdminRole {
    Admin,
    SuperAdmin,
}

impl AdminRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(format!("unknown admin role {other:?}")),
        }
    }
}

/// End-user identity as carried in a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPrincipal {
    pub user_id: String,
    pub email: String,
    #[serde(default = "default_user_role")]
    pub role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<TenantId>,
}

/// Administrator identity as carried in a token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPrincipal {
    pub admin_id: String,
    pub email: String,
    pub role: AdminRole,
}

/// The authenticated identity attached to a request.
///
/// Serialised with a `kind` discriminant (`"user"` | `"admin"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Principal {
    User(UserPrincipal),
    Admin(AdminPrincipal),
}

impl Principal {
    pub fn is_user(&self) -> bool {
        matches!(self, Self::User(_))
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin(_))
    }

    /// The stable id of whichever variant this is.
    pub fn subject(&self) -> &str {
        match self {
            Self::User(u) => &u.user_id,
            Self::Admin(a) => &a.admin_id,
        }
    }

    pub fn email(&self) -> &str {
        match self {
            Self::User(u) => &u.email,
            Self::Admin(a) => &a.email,
        }
    }

    pub fn as_admin(&self) -> Option<&AdminPrincipal> {
        match self {
            Self::Admin(a) => Some(a),
            Self::User(_) => None,
        }
    }

    pub fn as_user(&self) -> Option<&UserPrincipal> {
        match self {
            Self::User(u) => Some(u),
            Self::Admin(_) => None,
        }
    }
}

/// Backward-compatible generic view of an authenticated admin, for
/// consumers that only understand a flat `authUser`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthUserView {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl AdminPrincipal {
    pub fn auth_user(&self) -> AuthUserView {
        AuthUserView {
            id: self.admin_id.clone(),
            email: self.email.clone(),
            role: self.role.as_str().to_string(),
        }
    }
}

/// Stored administrator, including lockout state.
#[derive(Debug, Clone)]
pub struct AdminRecord {
    pub id: String,
    pub email: String,
    pub role: AdminRole,
    pub password_hash: String,
    pub active: bool,
    pub failed_attempts: i32,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AdminRecord {
    pub fn principal(&self) -> AdminPrincipal {
        AdminPrincipal {
            admin_id: self.id.clone(),
            email: self.email.clone(),
            role: self.role,
        }
    }
}

/// Fields required to create an administrator.
#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub email: String,
    pub password_hash: String,
    pub role: AdminRole,
}

/// Stored end user. `tenant_id` is `None` for users in the global partition.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub role: String,
    pub tenant_id: Option<TenantId>,
    pub password_hash: Option<String>,
    pub active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub last_login_ip: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn principal(&self) -> UserPrincipal {
        UserPrincipal {
            user_id: self.id.clone(),
            email: self.email.clone(),
            role: self.role.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }
}

/// Fields required to create a user. The tenant comes from the handle the
/// user is created through.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: Option<String>,
    pub role: String,
}

/// Ledger row for an issued admin token.
#[derive(Debug, Clone)]
pub struct LedgerEntry {
    pub jti: String,
    pub admin_id: String,
    pub token_type: TokenType,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Live means not revoked and not yet expired.
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && now < self.expires_at
    }
}

/// Fields recorded when an admin token is issued.
#[derive(Debug, Clone)]
pub struct NewLedgerEntry {
    pub jti: String,
    pub admin_id: String,
    pub token_type: TokenType,
    pub expires_at: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Where a request came from, for ledger rows, throttling and last-login
/// stamps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

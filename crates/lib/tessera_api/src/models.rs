//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tessera_core::models::auth::{
    AdminPrincipal, AdminRecord, AuthUserView, LedgerEntry, TokenType, UserPrincipal, UserRecord,
};

/// Error envelope shared by every failing response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Login body. Missing fields deserialize as empty so they surface as
/// `MISSING_CREDENTIALS` instead of a body rejection.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

pub type RegisterRequest = LoginRequest;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Also revoke every other session of the caller.
    #[serde(default)]
    pub all_sessions: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminView {
    pub id: String,
    pub email: String,
    pub role: String,
}

impl From<&AdminPrincipal> for AdminView {
    fn from(admin: &AdminPrincipal) -> Self {
        Self {
            id: admin.admin_id.clone(),
            email: admin.email.clone(),
            role: admin.role.as_str().to_string(),
        }
    }
}

impl From<&AdminRecord> for AdminView {
    fn from(admin: &AdminRecord) -> Self {
        Self::from(&admin.principal())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: String,
    pub email: String,
    pub role: String,
    pub tenant_id: Option<String>,
}

impl From<&UserPrincipal> for UserView {
    fn from(user: &UserPrincipal) -> Self {
        Self {
            id: user.user_id.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
            tenant_id: user.tenant_id.as_ref().map(|t| t.as_str().to_string()),
        }
    }
}

impl From<&UserRecord> for UserView {
    fn from(user: &UserRecord) -> Self {
        Self::from(&user.principal())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminLoginResponse {
    pub admin: AdminView,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLoginResponse {
    pub user: UserView,
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminMeResponse {
    pub admin: AdminView,
    /// Generic view kept for older clients.
    pub auth_user: AuthUserView,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub jti: String,
    pub token_type: TokenType,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub ip: Option<String>,
    pub user_agent: Option<String>,
    /// The access token this request was made with.
    pub current: bool,
}

impl SessionView {
    pub fn new(entry: LedgerEntry, current_jti: &str) -> Self {
        Self {
            current: entry.jti == current_jti,
            jti: entry.jti,
            token_type: entry.token_type,
            expires_at: entry.expires_at,
            created_at: entry.created_at,
            ip: entry.ip,
            user_agent: entry.user_agent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_sessions: Option<u64>,
}

impl SuccessResponse {
    pub fn ok() -> Self {
        Self {
            success: true,
            revoked_sessions: None,
        }
    }
}

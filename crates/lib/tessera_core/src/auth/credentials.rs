//! Credential store seam.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::guard::LockoutPolicy;
use crate::models::auth::{AdminRecord, NewAdmin, UserRecord};
use crate::store::StoreError;

/// Persisted admins and users with their hashed credentials.
///
/// Lookups here are system-scoped: authentication happens before (and
/// independently of) any tenant scoping.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<AdminRecord>, StoreError>;

    async fn find_admin_by_id(&self, admin_id: &str) -> Result<Option<AdminRecord>, StoreError>;

    /// Fails with [`StoreError::Conflict`] when the email is taken.
    async fn create_admin(&self, admin: NewAdmin) -> Result<AdminRecord, StoreError>;

    /// Count one failed login as a single atomic read-modify-write of the
    /// admin row, applying `policy`. Returns the updated record.
    async fn register_admin_failure(
        &self,
        admin_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<AdminRecord, StoreError>;

    /// Zero the failure counter, clear any lock and stamp the last login.
    async fn register_admin_success(
        &self,
        admin_id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn set_admin_password(&self, admin_id: &str, password_hash: &str)
    -> Result<(), StoreError>;

    async fn set_admin_active(&self, admin_id: &str, active: bool) -> Result<(), StoreError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError>;

    async fn record_user_login(
        &self,
        user_id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

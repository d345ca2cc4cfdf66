//! Postgres-backed store.
//!
//! Tenant handles own one transaction each. The tenant id is bound to that
//! transaction with a parameterised, transaction-local `set_config`, and
//! every handle query filters on `current_setting('app.tenant_id')`, so the
//! scope can neither leak to another pooled connection nor be injected.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::StoreError;
use crate::auth::credentials::CredentialStore;
use crate::auth::guard::LockoutPolicy;
use crate::auth::ledger::TokenLedger;
use crate::auth::queries::{self, USER_COLUMNS, UserRow, parse_id, user_from_row};
use crate::models::auth::{
    AdminRecord, LedgerEntry, NewAdmin, NewLedgerEntry, NewUser, TokenType, UserRecord,
};
use crate::tenant::{TenantHandle, TenantScope, TenantStore};

/// Session setting that carries the tenant id inside a handle's transaction.
const TENANT_SETTING: &str = "app.tenant_id";

/// Credential store, token ledger and tenant store over one pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl CredentialStore for PgStore {
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<AdminRecord>, StoreError> {
        queries::find_admin_by_email(&self.pool, email).await
    }

    async fn find_admin_by_id(&self, admin_id: &str) -> Result<Option<AdminRecord>, StoreError> {
        queries::find_admin_by_id(&self.pool, admin_id).await
    }

    async fn create_admin(&self, admin: NewAdmin) -> Result<AdminRecord, StoreError> {
        queries::create_admin(&self.pool, &admin).await
    }

    async fn register_admin_failure(
        &self,
        admin_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<AdminRecord, StoreError> {
        queries::register_admin_failure(&self.pool, admin_id, policy, now).await
    }

    async fn register_admin_success(
        &self,
        admin_id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        queries::register_admin_success(&self.pool, admin_id, ip, now).await
    }

    async fn set_admin_password(
        &self,
        admin_id: &str,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        queries::set_admin_password(&self.pool, admin_id, password_hash).await
    }

    async fn set_admin_active(&self, admin_id: &str, active: bool) -> Result<(), StoreError> {
        queries::set_admin_active(&self.pool, admin_id, active).await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        queries::find_user_by_email(&self.pool, email).await
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        queries::find_user_by_id(&self.pool, user_id).await
    }

    async fn record_user_login(
        &self,
        user_id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        queries::record_user_login(&self.pool, user_id, ip, now).await
    }
}

#[async_trait]
impl TokenLedger for PgStore {
    async fn record(&self, entry: NewLedgerEntry) -> Result<(), StoreError> {
        queries::insert_ledger_entry(&self.pool, &entry).await
    }

    async fn validate(&self, jti: &str, token_type: TokenType) -> Result<bool, StoreError> {
        queries::validate_ledger_entry(&self.pool, jti, token_type).await
    }

    async fn revoke(&self, jti: &str) -> Result<(), StoreError> {
        queries::revoke_ledger_entry(&self.pool, jti).await
    }

    async fn revoke_all(&self, admin_id: &str) -> Result<u64, StoreError> {
        queries::revoke_all_ledger_entries(&self.pool, admin_id).await
    }

    async fn rotate(
        &self,
        old_jti: &str,
        replacements: Vec<NewLedgerEntry>,
    ) -> Result<bool, StoreError> {
        queries::rotate_ledger_entry(&self.pool, old_jti, &replacements).await
    }

    async fn list_active(&self, admin_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        queries::list_active_ledger_entries(&self.pool, admin_id).await
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        queries::purge_expired_ledger_entries(&self.pool).await
    }
}

#[async_trait]
impl TenantStore for PgStore {
    async fn begin(&self, scope: TenantScope) -> Result<Box<dyn TenantHandle>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let bound = scope.tenant_id().map(|t| t.as_str()).unwrap_or_default();
        sqlx::query("SELECT set_config($1, $2, true)")
            .bind(TENANT_SETTING)
            .bind(bound)
            .execute(&mut *tx)
            .await?;
        debug!(tenant = %scope, "tenant transaction opened");
        Ok(Box::new(PgTenantHandle {
            tx: Some(tx),
            scope,
        }))
    }
}

/// A tenant-bound transaction. Dropping it uncommitted rolls back.
pub struct PgTenantHandle {
    tx: Option<Transaction<'static, Postgres>>,
    scope: TenantScope,
}

impl PgTenantHandle {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::HandleClosed)
    }
}

/// Partition filter shared by every handle query.
const PARTITION_FILTER: &str =
    "tenant_id IS NOT DISTINCT FROM NULLIF(current_setting('app.tenant_id', true), '')";

#[async_trait]
impl TenantHandle for PgTenantHandle {
    fn scope(&self) -> &TenantScope {
        &self.scope
    }

    async fn list_users(&mut self) -> Result<Vec<UserRecord>, StoreError> {
        let sql =
            format!("SELECT {USER_COLUMNS} FROM users WHERE {PARTITION_FILTER} ORDER BY created_at");
        let tx = self.tx()?;
        let rows = sqlx::query_as::<_, UserRow>(&sql)
            .fetch_all(&mut **tx)
            .await?;
        rows.into_iter().map(user_from_row).collect()
    }

    async fn find_user(&mut self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let Some(id) = parse_id(user_id) else {
            return Ok(None);
        };
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND {PARTITION_FILTER}");
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        row.map(user_from_row).transpose()
    }

    async fn create_user(&mut self, user: NewUser) -> Result<UserRecord, StoreError> {
        let sql = format!(
            "INSERT INTO users (email, password_hash, role, tenant_id) \
             VALUES ($1, $2, $3, NULLIF(current_setting('app.tenant_id', true), '')) \
             RETURNING {USER_COLUMNS}"
        );
        let tx = self.tx()?;
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.role)
            .fetch_one(&mut **tx)
            .await?;
        user_from_row(row)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::HandleClosed)?;
        tx.commit().await?;
        Ok(())
    }
}

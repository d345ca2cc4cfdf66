//! In-memory store.
//!
//! Implements the same seams as [`PgStore`](super::PgStore) behind a single
//! async mutex, which gives every operation the per-row atomicity the
//! Postgres backend gets from its transactions. Tenant handles buffer their
//! writes until commit.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::StoreError;
use crate::auth::credentials::CredentialStore;
use crate::auth::guard::LockoutPolicy;
use crate::auth::ledger::TokenLedger;
use crate::models::auth::{
    AdminRecord, LedgerEntry, NewAdmin, NewLedgerEntry, NewUser, TokenType, UserRecord,
};
use crate::tenant::{TenantHandle, TenantScope, TenantStore};
use crate::uuid::uuidv7;

#[derive(Debug, Default)]
struct State {
    admins: HashMap<String, AdminRecord>,
    users: HashMap<String, UserRecord>,
    ledger: HashMap<String, LedgerEntry>,
}

impl State {
    fn email_taken(&self, email: &str) -> bool {
        self.users.values().any(|u| u.email == email)
    }

    fn admin_active(&self, admin_id: &str) -> bool {
        self.admins.get(admin_id).is_some_and(|a| a.active)
    }

    fn admin_mut(&mut self, admin_id: &str) -> Result<&mut AdminRecord, StoreError> {
        self.admins
            .get_mut(admin_id)
            .ok_or_else(|| StoreError::NotFound(admin_id.to_string()))
    }

    fn insert_ledger(&mut self, entry: NewLedgerEntry, now: DateTime<Utc>) -> Result<(), StoreError> {
        if !self.admins.contains_key(&entry.admin_id) {
            return Err(StoreError::NotFound(entry.admin_id));
        }
        if self.ledger.contains_key(&entry.jti) {
            return Err(StoreError::Conflict(format!("jti {} already recorded", entry.jti)));
        }
        self.ledger.insert(
            entry.jti.clone(),
            LedgerEntry {
                jti: entry.jti,
                admin_id: entry.admin_id,
                token_type: entry.token_type,
                expires_at: entry.expires_at,
                revoked_at: None,
                ip: entry.ip,
                user_agent: entry.user_agent,
                created_at: now,
            },
        );
        Ok(())
    }
}

/// Shared in-memory backend. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect a ledger row.
    pub async fn ledger_entry(&self, jti: &str) -> Option<LedgerEntry> {
        self.state.lock().await.ledger.get(jti).cloned()
    }

    /// Number of committed users across all partitions.
    pub async fn user_count(&self) -> usize {
        self.state.lock().await.users.len()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_admin_by_email(&self, email: &str) -> Result<Option<AdminRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.admins.values().find(|a| a.email == email).cloned())
    }

    async fn find_admin_by_id(&self, admin_id: &str) -> Result<Option<AdminRecord>, StoreError> {
        Ok(self.state.lock().await.admins.get(admin_id).cloned())
    }

    async fn create_admin(&self, admin: NewAdmin) -> Result<AdminRecord, StoreError> {
        let mut state = self.state.lock().await;
        if state.admins.values().any(|a| a.email == admin.email) {
            return Err(StoreError::Conflict(format!(
                "admin {} already exists",
                admin.email
            )));
        }
        let record = AdminRecord {
            id: uuidv7().to_string(),
            email: admin.email,
            role: admin.role,
            password_hash: admin.password_hash,
            active: true,
            failed_attempts: 0,
            locked_until: None,
            last_login_at: None,
            last_login_ip: None,
            created_at: Utc::now(),
        };
        state.admins.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    async fn register_admin_failure(
        &self,
        admin_id: &str,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<AdminRecord, StoreError> {
        let mut state = self.state.lock().await;
        let admin = state.admin_mut(admin_id)?;
        let (attempts, locked_until) =
            policy.after_failure(admin.failed_attempts, admin.locked_until, now);
        admin.failed_attempts = attempts;
        admin.locked_until = locked_until;
        Ok(admin.clone())
    }

    async fn register_admin_success(
        &self,
        admin_id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let admin = state.admin_mut(admin_id)?;
        admin.failed_attempts = 0;
        admin.locked_until = None;
        admin.last_login_at = Some(now);
        admin.last_login_ip = ip.map(str::to_string);
        Ok(())
    }

    async fn set_admin_password(
        &self,
        admin_id: &str,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.admin_mut(admin_id)?.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn set_admin_active(&self, admin_id: &str, active: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        state.admin_mut(admin_id)?.active = active;
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn find_user_by_id(&self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.state.lock().await.users.get(user_id).cloned())
    }

    async fn record_user_login(
        &self,
        user_id: &str,
        ip: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let user = state
            .users
            .get_mut(user_id)
            .ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
        user.last_login_at = Some(now);
        user.last_login_ip = ip.map(str::to_string);
        Ok(())
    }
}

#[async_trait]
impl TokenLedger for MemoryStore {
    async fn record(&self, entry: NewLedgerEntry) -> Result<(), StoreError> {
        self.state.lock().await.insert_ledger(entry, Utc::now())
    }

    async fn validate(&self, jti: &str, token_type: TokenType) -> Result<bool, StoreError> {
        let state = self.state.lock().await;
        let now = Utc::now();
        Ok(state.ledger.get(jti).is_some_and(|entry| {
            entry.token_type == token_type
                && entry.is_live(now)
                && state.admin_active(&entry.admin_id)
        }))
    }

    async fn revoke(&self, jti: &str) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(entry) = state.ledger.get_mut(jti)
            && entry.revoked_at.is_none()
        {
            entry.revoked_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn revoke_all(&self, admin_id: &str) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let mut revoked = 0;
        for entry in state.ledger.values_mut() {
            if entry.admin_id == admin_id && entry.revoked_at.is_none() {
                entry.revoked_at = Some(now);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn rotate(
        &self,
        old_jti: &str,
        replacements: Vec<NewLedgerEntry>,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let live = state
            .ledger
            .get(old_jti)
            .is_some_and(|e| e.token_type == TokenType::Refresh && e.is_live(now));
        if !live {
            return Ok(false);
        }
        if replacements
            .iter()
            .any(|r| state.ledger.contains_key(&r.jti) || !state.admins.contains_key(&r.admin_id))
        {
            return Err(StoreError::Conflict("replacement jti cannot be recorded".into()));
        }
        if let Some(old) = state.ledger.get_mut(old_jti) {
            old.revoked_at = Some(now);
        }
        for entry in replacements {
            state.insert_ledger(entry, now)?;
        }
        Ok(true)
    }

    async fn list_active(&self, admin_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        let state = self.state.lock().await;
        let now = Utc::now();
        let mut entries: Vec<LedgerEntry> = state
            .ledger
            .values()
            .filter(|e| e.admin_id == admin_id && e.is_live(now))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn purge_expired(&self) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        let before = state.ledger.len();
        state.ledger.retain(|_, e| e.expires_at >= now);
        Ok((before - state.ledger.len()) as u64)
    }
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn begin(&self, scope: TenantScope) -> Result<Box<dyn TenantHandle>, StoreError> {
        Ok(Box::new(MemoryTenantHandle {
            state: Arc::clone(&self.state),
            scope,
            pending: Vec::new(),
        }))
    }
}

/// Partition-filtered view over the shared state with buffered writes.
pub struct MemoryTenantHandle {
    state: Arc<Mutex<State>>,
    scope: TenantScope,
    pending: Vec<UserRecord>,
}

impl MemoryTenantHandle {
    fn in_scope(&self, user: &UserRecord) -> bool {
        user.tenant_id.as_ref() == self.scope.tenant_id()
    }
}

#[async_trait]
impl TenantHandle for MemoryTenantHandle {
    fn scope(&self) -> &TenantScope {
        &self.scope
    }

    async fn list_users(&mut self) -> Result<Vec<UserRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut users: Vec<UserRecord> = state
            .users
            .values()
            .chain(self.pending.iter())
            .filter(|u| self.in_scope(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn find_user(&mut self, user_id: &str) -> Result<Option<UserRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .users
            .get(user_id)
            .or_else(|| self.pending.iter().find(|u| u.id == user_id))
            .filter(|u| self.in_scope(u))
            .cloned())
    }

    async fn create_user(&mut self, user: NewUser) -> Result<UserRecord, StoreError> {
        let state = self.state.lock().await;
        if state.email_taken(&user.email) || self.pending.iter().any(|u| u.email == user.email) {
            return Err(StoreError::Conflict(format!("user {} already exists", user.email)));
        }
        drop(state);
        let record = UserRecord {
            id: uuidv7().to_string(),
            email: user.email,
            role: user.role,
            tenant_id: self.scope.tenant_id().cloned(),
            password_hash: user.password_hash,
            active: true,
            last_login_at: None,
            last_login_ip: None,
            created_at: Utc::now(),
        };
        self.pending.push(record.clone());
        Ok(record)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(dup) = self.pending.iter().find(|u| state.email_taken(&u.email)) {
            return Err(StoreError::Conflict(format!("user {} already exists", dup.email)));
        }
        for user in self.pending.drain(..) {
            state.users.insert(user.id.clone(), user);
        }
        Ok(())
    }
}

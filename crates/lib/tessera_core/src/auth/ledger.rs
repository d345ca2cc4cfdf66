//! Admin token ledger.
//!
//! Admin access and refresh tokens are recorded by `jti` so they can be
//! revoked server-side. End-user tokens are never ledgered.

use async_trait::async_trait;

use crate::models::auth::{LedgerEntry, NewLedgerEntry, TokenType};
use crate::store::StoreError;

#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Append a freshly issued token.
    async fn record(&self, entry: NewLedgerEntry) -> Result<(), StoreError>;

    /// True iff the jti is recorded with this type, not revoked, not
    /// expired, and its admin is still active.
    async fn validate(&self, jti: &str, token_type: TokenType) -> Result<bool, StoreError>;

    /// Mark a jti revoked. Revoking an unknown or already revoked jti is a
    /// no-op.
    async fn revoke(&self, jti: &str) -> Result<(), StoreError>;

    /// Revoke every live token of an admin. Returns how many were revoked.
    async fn revoke_all(&self, admin_id: &str) -> Result<u64, StoreError>;

    /// Revoke the live refresh token `old_jti` and record `replacements`
    /// as one unit.
    ///
    /// Returns `false` without writing anything if `old_jti` is no longer a
    /// live refresh token, which is what the loser of two concurrent
    /// refreshes observes.
    async fn rotate(
        &self,
        old_jti: &str,
        replacements: Vec<NewLedgerEntry>,
    ) -> Result<bool, StoreError>;

    /// Live tokens of an admin, newest first.
    async fn list_active(&self, admin_id: &str) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Delete rows that have expired. Housekeeping only.
    async fn purge_expired(&self) -> Result<u64, StoreError>;
}

//! Persistence backends.
//!
//! Both backends implement the same seams: [`CredentialStore`],
//! [`TokenLedger`] and [`TenantStore`].
//!
//! [`CredentialStore`]: crate::auth::credentials::CredentialStore
//! [`TokenLedger`]: crate::auth::ledger::TokenLedger
//! [`TenantStore`]: crate::tenant::TenantStore

pub mod memory;
pub mod postgres;

use thiserror::Error;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Persistence errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid stored value: {0}")]
    Corrupt(String),

    #[error("Handle already committed")]
    HandleClosed,

    #[error("Database error: {0}")]
    Db(sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::RowNotFound => StoreError::NotFound("row not found".into()),
            other => StoreError::Db(other),
        }
    }
}

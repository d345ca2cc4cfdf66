//! Auth-related database queries (Postgres).

use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool};
use uuid::Uuid;

use super::guard::LockoutPolicy;
use crate::models::auth::{
    AdminRecord, LedgerEntry, NewAdmin, NewLedgerEntry, TokenType, UserRecord,
};
use crate::store::StoreError;
use crate::tenant::TenantId;

pub(crate) type AdminRow = (
    String,
    String,
    String,
    String,
    bool,
    i32,
    Option<DateTime<Utc>>,
    Option<DateTime<Utc>>,
    Option<String>,
    DateTime<Utc>,
);

pub(crate) type UserRow = (
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    bool,
    Option<DateTime<Utc>>,
    Option<String>,
    DateTime<Utc>,
);

type LedgerRow = (
    String,
    String,
    String,
    DateTime<Utc>,
    Option<DateTime<Utc>>,
    Option<String>,
    Option<String>,
    DateTime<Utc>,
);

const ADMIN_COLUMNS: &str = "id::text, email, role, password_hash, active, failed_attempts, \
     locked_until, last_login_at, last_login_ip, created_at";

pub(crate) const USER_COLUMNS: &str = "id::text, email, role, tenant_id, password_hash, active, \
     last_login_at, last_login_ip, created_at";

const LEDGER_COLUMNS: &str =
    "jti, admin_id::text, token_type, expires_at, revoked_at, ip, user_agent, created_at";

/// Ids are UUIDs in storage; anything else cannot match a row.
pub(crate) fn parse_id(id: &str) -> Option<Uuid> {
    Uuid::parse_str(id).ok()
}

fn admin_from_row(row: AdminRow) -> Result<AdminRecord, StoreError> {
    let (
        id,
        email,
        role,
        password_hash,
        active,
        failed_attempts,
        locked_until,
        last_login_at,
        last_login_ip,
        created_at,
    ) = row;
    Ok(AdminRecord {
        id,
        email,
        role: role.parse().map_err(StoreError::Corrupt)?,
        password_hash,
        active,
        failed_attempts,
        locked_until,
        last_login_at,
        last_login_ip,
        created_at,
    })
}

pub(crate) fn user_from_row(row: UserRow) -> Result<UserRecord, StoreError> {
    let (id, email, role, tenant_id, password_hash, active, last_login_at, last_login_ip, created_at) =
        row;
    let tenant_id = tenant_id
        .map(|t| TenantId::parse(&t).map_err(|e| StoreError::Corrupt(e.to_string())))
        .transpose()?;
    Ok(UserRecord {
        id,
        email,
        role,
        tenant_id,
        password_hash,
        active,
        last_login_at,
        last_login_ip,
        created_at,
    })
}

fn ledger_from_row(row: LedgerRow) -> Result<LedgerEntry, StoreError> {
    let (jti, admin_id, token_type, expires_at, revoked_at, ip, user_agent, created_at) = row;
    Ok(LedgerEntry {
        jti,
        admin_id,
        token_type: token_type.parse().map_err(StoreError::Corrupt)?,
        expires_at,
        revoked_at,
        ip,
        user_agent,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Admins
// ---------------------------------------------------------------------------

/// Fetch an admin by (normalised) email.
pub async fn find_admin_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<AdminRecord>, StoreError> {
    let sql = format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE email = $1");
    let row = sqlx::query_as::<_, AdminRow>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await?;
    row.map(admin_from_row).transpose()
}

/// Fetch an admin by id.
pub async fn find_admin_by_id(
    pool: &PgPool,
    admin_id: &str,
) -> Result<Option<AdminRecord>, StoreError> {
    let Some(id) = parse_id(admin_id) else {
        return Ok(None);
    };
    let sql = format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE id = $1");
    let row = sqlx::query_as::<_, AdminRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(admin_from_row).transpose()
}

/// Insert an admin, returning the stored row.
pub async fn create_admin(pool: &PgPool, admin: &NewAdmin) -> Result<AdminRecord, StoreError> {
    let sql = format!(
        "INSERT INTO admins (email, password_hash, role) VALUES ($1, $2, $3) \
         RETURNING {ADMIN_COLUMNS}"
    );
    let row = sqlx::query_as::<_, AdminRow>(&sql)
        .bind(&admin.email)
        .bind(&admin.password_hash)
        .bind(admin.role.as_str())
        .fetch_one(pool)
        .await?;
    admin_from_row(row)
}

/// Count a failed login under a row lock and apply the lockout policy.
pub async fn register_admin_failure(
    pool: &PgPool,
    admin_id: &str,
    policy: &LockoutPolicy,
    now: DateTime<Utc>,
) -> Result<AdminRecord, StoreError> {
    let id = parse_id(admin_id).ok_or_else(|| StoreError::NotFound(admin_id.to_string()))?;
    let mut tx = pool.begin().await?;

    let sql = format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE id = $1 FOR UPDATE");
    let row = sqlx::query_as::<_, AdminRow>(&sql)
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(admin_id.to_string()))?;
    let mut admin = admin_from_row(row)?;

    let (attempts, locked_until) =
        policy.after_failure(admin.failed_attempts, admin.locked_until, now);
    sqlx::query("UPDATE admins SET failed_attempts = $2, locked_until = $3 WHERE id = $1")
        .bind(id)
        .bind(attempts)
        .bind(locked_until)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    admin.failed_attempts = attempts;
    admin.locked_until = locked_until;
    Ok(admin)
}

/// Reset lockout state and stamp the last login.
pub async fn register_admin_success(
    pool: &PgPool,
    admin_id: &str,
    ip: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let id = parse_id(admin_id).ok_or_else(|| StoreError::NotFound(admin_id.to_string()))?;
    sqlx::query(
        "UPDATE admins SET failed_attempts = 0, locked_until = NULL, \
         last_login_at = $2, last_login_ip = $3 WHERE id = $1",
    )
    .bind(id)
    .bind(now)
    .bind(ip)
    .execute(pool)
    .await?;
    Ok(())
}

/// Replace an admin's password hash.
pub async fn set_admin_password(
    pool: &PgPool,
    admin_id: &str,
    password_hash: &str,
) -> Result<(), StoreError> {
    let id = parse_id(admin_id).ok_or_else(|| StoreError::NotFound(admin_id.to_string()))?;
    let result = sqlx::query("UPDATE admins SET password_hash = $2 WHERE id = $1")
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(admin_id.to_string()));
    }
    Ok(())
}

/// Activate or deactivate an admin.
pub async fn set_admin_active(pool: &PgPool, admin_id: &str, active: bool) -> Result<(), StoreError> {
    let id = parse_id(admin_id).ok_or_else(|| StoreError::NotFound(admin_id.to_string()))?;
    let result = sqlx::query("UPDATE admins SET active = $2 WHERE id = $1")
        .bind(id)
        .bind(active)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(admin_id.to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Users (system-scoped lookups)
// ---------------------------------------------------------------------------

/// Fetch a user by email across all partitions.
pub async fn find_user_by_email(
    pool: &PgPool,
    email: &str,
) -> Result<Option<UserRecord>, StoreError> {
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(email)
        .fetch_optional(pool)
        .await?;
    row.map(user_from_row).transpose()
}

/// Fetch a user by id across all partitions.
pub async fn find_user_by_id(
    pool: &PgPool,
    user_id: &str,
) -> Result<Option<UserRecord>, StoreError> {
    let Some(id) = parse_id(user_id) else {
        return Ok(None);
    };
    let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let row = sqlx::query_as::<_, UserRow>(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await?;
    row.map(user_from_row).transpose()
}

/// Stamp a user's last login.
pub async fn record_user_login(
    pool: &PgPool,
    user_id: &str,
    ip: Option<&str>,
    now: DateTime<Utc>,
) -> Result<(), StoreError> {
    let id = parse_id(user_id).ok_or_else(|| StoreError::NotFound(user_id.to_string()))?;
    sqlx::query("UPDATE users SET last_login_at = $2, last_login_ip = $3 WHERE id = $1")
        .bind(id)
        .bind(now)
        .bind(ip)
        .execute(pool)
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Admin token ledger
// ---------------------------------------------------------------------------

/// Insert a ledger row.
pub async fn insert_ledger_entry<'e, E: PgExecutor<'e>>(
    executor: E,
    entry: &NewLedgerEntry,
) -> Result<(), StoreError> {
    let admin_id =
        parse_id(&entry.admin_id).ok_or_else(|| StoreError::NotFound(entry.admin_id.clone()))?;
    sqlx::query(
        "INSERT INTO admin_tokens (jti, admin_id, token_type, expires_at, ip, user_agent) \
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(&entry.jti)
    .bind(admin_id)
    .bind(entry.token_type.as_str())
    .bind(entry.expires_at)
    .bind(&entry.ip)
    .bind(&entry.user_agent)
    .execute(executor)
    .await?;
    Ok(())
}

/// Whether a jti is a live token of the given type owned by an active admin.
pub async fn validate_ledger_entry(
    pool: &PgPool,
    jti: &str,
    token_type: TokenType,
) -> Result<bool, StoreError> {
    let valid = sqlx::query_scalar::<_, bool>(
        "SELECT EXISTS( \
           SELECT 1 FROM admin_tokens t \
           JOIN admins a ON a.id = t.admin_id \
           WHERE t.jti = $1 \
             AND t.token_type = $2 \
             AND t.revoked_at IS NULL \
             AND t.expires_at > now() \
             AND a.active)",
    )
    .bind(jti)
    .bind(token_type.as_str())
    .fetch_one(pool)
    .await?;
    Ok(valid)
}

/// Revoke one jti (no-op if already revoked or unknown).
pub async fn revoke_ledger_entry(pool: &PgPool, jti: &str) -> Result<(), StoreError> {
    sqlx::query("UPDATE admin_tokens SET revoked_at = now() WHERE jti = $1 AND revoked_at IS NULL")
        .bind(jti)
        .execute(pool)
        .await?;
    Ok(())
}

/// Revoke all live tokens for an admin.
pub async fn revoke_all_ledger_entries(pool: &PgPool, admin_id: &str) -> Result<u64, StoreError> {
    let Some(id) = parse_id(admin_id) else {
        return Ok(0);
    };
    let result = sqlx::query(
        "UPDATE admin_tokens SET revoked_at = now() \
         WHERE admin_id = $1 AND revoked_at IS NULL",
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Conditionally revoke a live refresh jti and record its replacements in
/// one transaction. The conditional update takes the row lock, so a
/// concurrent rotation of the same jti sees zero affected rows.
pub async fn rotate_ledger_entry(
    pool: &PgPool,
    old_jti: &str,
    replacements: &[NewLedgerEntry],
) -> Result<bool, StoreError> {
    let mut tx = pool.begin().await?;
    let revoked = sqlx::query(
        "UPDATE admin_tokens SET revoked_at = now() \
         WHERE jti = $1 AND token_type = 'refresh' \
           AND revoked_at IS NULL AND expires_at > now()",
    )
    .bind(old_jti)
    .execute(&mut *tx)
    .await?
    .rows_affected();

    if revoked != 1 {
        tx.rollback().await?;
        return Ok(false);
    }
    for entry in replacements {
        insert_ledger_entry(&mut *tx, entry).await?;
    }
    tx.commit().await?;
    Ok(true)
}

/// Live ledger rows for an admin, newest first.
pub async fn list_active_ledger_entries(
    pool: &PgPool,
    admin_id: &str,
) -> Result<Vec<LedgerEntry>, StoreError> {
    let Some(id) = parse_id(admin_id) else {
        return Ok(Vec::new());
    };
    let sql = format!(
        "SELECT {LEDGER_COLUMNS} FROM admin_tokens \
         WHERE admin_id = $1 AND revoked_at IS NULL AND expires_at > now() \
         ORDER BY created_at DESC"
    );
    let rows = sqlx::query_as::<_, LedgerRow>(&sql)
        .bind(id)
        .fetch_all(pool)
        .await?;
    rows.into_iter().map(ledger_from_row).collect()
}

/// Delete expired ledger rows.
pub async fn purge_expired_ledger_entries(pool: &PgPool) -> Result<u64, StoreError> {
    let result = sqlx::query("DELETE FROM admin_tokens WHERE expires_at < now()")
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

//! Login, refresh and logout orchestration for both audiences.
//!
//! Admin login runs throttle, lock check, credential verify, token issue and
//! ledger record in that order. Unknown emails and wrong passwords produce
//! the same error after the same floor delay.

use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::credentials::CredentialStore;
use super::guard::{
    DEFAULT_THROTTLE_MAX_ATTEMPTS, DEFAULT_THROTTLE_WINDOW, LockoutPolicy, LoginThrottle,
    ThrottleDecision,
};
use super::jwt::{TokenClaims, TokenCodec};
use super::ledger::TokenLedger;
use super::password::{
    burn_verification, check_password_strength, hash_password_async, verify_password_async,
};
use super::{AuthError, is_valid_email, normalize_email};
use crate::models::auth::{
    AdminPrincipal, AdminRecord, AdminRole, ClientInfo, NewAdmin, NewLedgerEntry, NewUser,
    Principal, TokenType, UserPrincipal, UserRecord,
};
use crate::tenant::TenantHandle;
use crate::uuid::new_jti;

/// Default access token lifetime: 15 minutes.
pub const DEFAULT_ACCESS_TTL_SECS: i64 = 15 * 60;

/// Default refresh token lifetime: 7 days.
pub const DEFAULT_REFRESH_TTL_SECS: i64 = 7 * 24 * 60 * 60;

/// Default minimum latency of a rejected login.
pub const DEFAULT_FAILURE_FLOOR: StdDuration = StdDuration::from_millis(100);

/// Tunables for the authenticator.
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub lockout: LockoutPolicy,
    pub failure_floor: StdDuration,
    pub throttle_max_attempts: u32,
    pub throttle_window: StdDuration,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            access_ttl: Duration::seconds(DEFAULT_ACCESS_TTL_SECS),
            refresh_ttl: Duration::seconds(DEFAULT_REFRESH_TTL_SECS),
            lockout: LockoutPolicy::default(),
            failure_floor: DEFAULT_FAILURE_FLOOR,
            throttle_max_attempts: DEFAULT_THROTTLE_MAX_ATTEMPTS,
            throttle_window: DEFAULT_THROTTLE_WINDOW,
        }
    }
}

/// Access and refresh token pair.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
}

/// Result of a successful admin login or refresh.
#[derive(Debug, Clone)]
pub struct AdminSession {
    pub admin: AdminPrincipal,
    pub tokens: TokenPair,
    pub access_jti: String,
    pub refresh_jti: String,
}

/// Result of a successful user login, refresh or registration.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user: UserPrincipal,
    pub tokens: TokenPair,
}

/// What an admin logout should revoke. Tokens are raw strings; anything
/// that does not decode is ignored.
#[derive(Debug, Clone, Default)]
pub struct AdminLogout {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub all_sessions: bool,
}

struct MintedPair {
    tokens: TokenPair,
    access_jti: String,
    refresh_jti: String,
    entries: Vec<NewLedgerEntry>,
}

pub struct Authenticator {
    credentials: Arc<dyn CredentialStore>,
    ledger: Arc<dyn TokenLedger>,
    codec: TokenCodec,
    settings: AuthSettings,
    throttle: LoginThrottle,
}

impl Authenticator {
    pub fn new(
        credentials: Arc<dyn CredentialStore>,
        ledger: Arc<dyn TokenLedger>,
        codec: TokenCodec,
        settings: AuthSettings,
    ) -> Self {
        let throttle = LoginThrottle::new(settings.throttle_max_attempts, settings.throttle_window);
        Self {
            credentials,
            ledger,
            codec,
            settings,
            throttle,
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    pub fn ledger(&self) -> &Arc<dyn TokenLedger> {
        &self.ledger
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.credentials
    }

    pub fn settings(&self) -> &AuthSettings {
        &self.settings
    }

    pub fn throttle(&self) -> &LoginThrottle {
        &self.throttle
    }

    // -----------------------------------------------------------------------
    // Admin audience
    // -----------------------------------------------------------------------

    pub async fn admin_login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<AdminSession, AuthError> {
        let started = Instant::now();
        let email = check_login_input(email, password)?;
        self.check_throttle(client, &email)?;

        let now = Utc::now();
        let Some(admin) = self.credentials.find_admin_by_email(&email).await? else {
            burn_verification(password).await;
            debug!(ip = ?client.ip, "admin login for unknown email");
            return Err(self.reject(started).await);
        };

        if let Some(remaining) = self.settings.lockout.remaining_lock(&admin, now) {
            warn!(admin_id = %admin.id, ip = ?client.ip, "login attempt on locked admin");
            return Err(AuthError::AccountLocked {
                retry_after_secs: remaining.num_seconds().max(1),
            });
        }

        if !verify_password_async(password, &admin.password_hash).await? {
            let updated = self
                .credentials
                .register_admin_failure(&admin.id, &self.settings.lockout, now)
                .await?;
            if updated.locked_until.is_some_and(|until| until > now) {
                warn!(
                    admin_id = %admin.id,
                    failed_attempts = updated.failed_attempts,
                    "admin locked after repeated failures"
                );
            } else {
                info!(admin_id = %admin.id, failed_attempts = updated.failed_attempts, "admin login failed");
            }
            return Err(self.reject(started).await);
        }

        if !admin.active {
            return Err(AuthError::AccountInactive);
        }

        // Counter reset goes first: a failure here must not leave live jtis.
        self.credentials
            .register_admin_success(&admin.id, client.ip.as_deref(), now)
            .await?;
        let session = self.open_admin_session(&admin, client, now).await?;
        self.throttle.clear_email(&email);
        info!(admin_id = %admin.id, "admin logged in");
        Ok(session)
    }

    /// Rotate an admin refresh token. Token, ledger and principal failures
    /// all collapse into [`AuthError::RefreshFailed`]; store outages
    /// propagate.
    pub async fn refresh_admin(
        &self,
        refresh_token: &str,
        client: &ClientInfo,
    ) -> Result<AdminSession, AuthError> {
        let claims = self
            .codec
            .verify(refresh_token, TokenType::Refresh)
            .map_err(|e| {
                debug!(error = %e, "admin refresh token rejected");
                AuthError::RefreshFailed
            })?;
        let Principal::Admin(claimed) = &claims.principal else {
            return Err(AuthError::RefreshFailed);
        };
        if !self.ledger.validate(&claims.jti, TokenType::Refresh).await? {
            warn!(admin_id = %claimed.admin_id, jti = %claims.jti, "refresh with dead jti rejected");
            return Err(AuthError::RefreshFailed);
        }
        let admin = self
            .credentials
            .find_admin_by_id(&claimed.admin_id)
            .await?
            .filter(|admin| admin.active)
            .ok_or(AuthError::RefreshFailed)?;

        let minted = self.mint_admin_pair(&admin.principal(), client, Utc::now())?;
        if !self.ledger.rotate(&claims.jti, minted.entries).await? {
            warn!(admin_id = %admin.id, jti = %claims.jti, "concurrent refresh lost rotation");
            return Err(AuthError::RefreshFailed);
        }
        debug!(admin_id = %admin.id, "admin refresh token rotated");
        Ok(AdminSession {
            admin: admin.principal(),
            tokens: minted.tokens,
            access_jti: minted.access_jti,
            refresh_jti: minted.refresh_jti,
        })
    }

    /// Revoke what the caller presented. Never fails on bad tokens; store
    /// errors are logged and swallowed.
    pub async fn logout_admin(&self, request: AdminLogout) {
        // Only a fully valid access token may end every session, so check
        // it before its own jti is revoked.
        let everywhere = match (&request.access_token, request.all_sessions) {
            (Some(token), true) => self
                .authenticate_access(token)
                .await
                .ok()
                .and_then(|claims| claims.principal.as_admin().map(|a| a.admin_id.clone())),
            _ => None,
        };

        let mut jtis = Vec::new();
        let mut owner = None;
        for token in [&request.access_token, &request.refresh_token]
            .into_iter()
            .flatten()
        {
            if let Ok(claims) = self.codec.decode_signed(token)
                && let Principal::Admin(admin) = &claims.principal
            {
                owner.get_or_insert_with(|| admin.admin_id.clone());
                jtis.push(claims.jti);
            }
        }
        for jti in &jtis {
            if let Err(e) = self.ledger.revoke(jti).await {
                warn!(error = %e, "failed to revoke token on logout");
            }
        }

        if let Some(admin_id) = everywhere {
            match self.ledger.revoke_all(&admin_id).await {
                Ok(count) => {
                    info!(admin_id = %admin_id, revoked = count, "admin logged out everywhere")
                }
                Err(e) => warn!(error = %e, "failed to revoke all sessions"),
            }
        } else if let Some(admin_id) = owner {
            info!(admin_id = %admin_id, revoked = jtis.len(), "admin logged out");
        }
    }

    pub async fn change_admin_password(
        &self,
        admin_id: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<u64, AuthError> {
        check_password_strength(new_password)?;
        let admin = self
            .credentials
            .find_admin_by_id(admin_id)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;
        if !verify_password_async(current_password, &admin.password_hash).await? {
            return Err(AuthError::InvalidCredentials);
        }
        let hash = hash_password_async(new_password).await?;
        self.credentials.set_admin_password(admin_id, &hash).await?;
        let revoked = self.ledger.revoke_all(admin_id).await?;
        info!(admin_id = %admin_id, revoked, "admin password changed, sessions revoked");
        Ok(revoked)
    }

    pub async fn create_admin(
        &self,
        email: &str,
        password: &str,
        role: AdminRole,
    ) -> Result<AdminRecord, AuthError> {
        let email = check_login_input(email, password)?;
        check_password_strength(password)?;
        let password_hash = hash_password_async(password).await?;
        let admin = self
            .credentials
            .create_admin(NewAdmin {
                email,
                password_hash,
                role,
            })
            .await?;
        info!(admin_id = %admin.id, role = %admin.role.as_str(), "admin created");
        Ok(admin)
    }

    // -----------------------------------------------------------------------
    // User audience
    // -----------------------------------------------------------------------

    pub async fn user_login(
        &self,
        email: &str,
        password: &str,
        client: &ClientInfo,
    ) -> Result<UserSession, AuthError> {
        let started = Instant::now();
        let email = check_login_input(email, password)?;
        self.check_throttle(client, &email)?;

        let user = self.credentials.find_user_by_email(&email).await?;
        let Some((user, hash)) =
            user.and_then(|u| u.password_hash.clone().map(|hash| (u, hash)))
        else {
            burn_verification(password).await;
            return Err(self.reject(started).await);
        };
        if !verify_password_async(password, &hash).await? {
            info!(user_id = %user.id, "user login failed");
            return Err(self.reject(started).await);
        }
        if !user.active {
            return Err(AuthError::AccountInactive);
        }

        let session = self.issue_user_session(&user)?;
        self.credentials
            .record_user_login(&user.id, client.ip.as_deref(), Utc::now())
            .await?;
        self.throttle.clear_email(&email);
        info!(user_id = %user.id, "user logged in");
        Ok(session)
    }

    /// Stateless: no ledger, so a user refresh token stays usable until it
    /// expires.
    pub async fn refresh_user(&self, refresh_token: &str) -> Result<UserSession, AuthError> {
        let claims = self
            .codec
            .verify(refresh_token, TokenType::Refresh)
            .map_err(|e| {
                debug!(error = %e, "user refresh token rejected");
                AuthError::RefreshFailed
            })?;
        let Principal::User(claimed) = &claims.principal else {
            return Err(AuthError::RefreshFailed);
        };
        let user = self
            .credentials
            .find_user_by_id(&claimed.user_id)
            .await?
            .filter(|user| user.active)
            .ok_or(AuthError::RefreshFailed)?;
        self.issue_user_session(&user)
    }

    /// Create a user in the handle's partition. The caller commits.
    pub async fn register_user(
        &self,
        handle: &mut dyn TenantHandle,
        email: &str,
        password: &str,
    ) -> Result<UserRecord, AuthError> {
        let email = check_login_input(email, password)?;
        check_password_strength(password)?;
        let password_hash = hash_password_async(password).await?;
        let user = handle
            .create_user(NewUser {
                email,
                password_hash: Some(password_hash),
                role: crate::models::auth::DEFAULT_USER_ROLE.to_string(),
            })
            .await?;
        info!(user_id = %user.id, tenant = %handle.scope(), "user registered");
        Ok(user)
    }

    pub fn issue_user_session(&self, user: &UserRecord) -> Result<UserSession, AuthError> {
        let principal = user.principal();
        let wrapped = Principal::User(principal.clone());
        let now = Utc::now();
        let access_token = self.codec.issue_at(
            &wrapped,
            TokenType::Access,
            self.settings.access_ttl,
            &new_jti(),
            now,
        )?;
        let refresh_token = self.codec.issue_at(
            &wrapped,
            TokenType::Refresh,
            self.settings.refresh_ttl,
            &new_jti(),
            now,
        )?;
        Ok(UserSession {
            user: principal,
            tokens: TokenPair {
                access_token,
                refresh_token,
                expires_in: self.settings.access_ttl.num_seconds(),
            },
        })
    }

    // -----------------------------------------------------------------------
    // Shared
    // -----------------------------------------------------------------------

    /// Verify a bearer access token. Admin tokens must also be live in the
    /// ledger; user tokens are trusted on signature and expiry alone.
    pub async fn authenticate_access(&self, token: &str) -> Result<TokenClaims, AuthError> {
        let claims = self.codec.verify(token, TokenType::Access)?;
        if claims.principal.is_admin()
            && !self.ledger.validate(&claims.jti, TokenType::Access).await?
        {
            return Err(AuthError::TokenRevoked);
        }
        Ok(claims)
    }

    async fn open_admin_session(
        &self,
        admin: &AdminRecord,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<AdminSession, AuthError> {
        let principal = admin.principal();
        let minted = self.mint_admin_pair(&principal, client, now)?;
        let mut recorded: Vec<String> = Vec::with_capacity(minted.entries.len());
        for entry in minted.entries {
            let jti = entry.jti.clone();
            if let Err(e) = self.ledger.record(entry).await {
                self.discard_entries(&recorded).await;
                return Err(e.into());
            }
            recorded.push(jti);
        }
        Ok(AdminSession {
            admin: principal,
            tokens: minted.tokens,
            access_jti: minted.access_jti,
            refresh_jti: minted.refresh_jti,
        })
    }

    /// Revoke ledger rows of a session that could not be fully opened.
    async fn discard_entries(&self, jtis: &[String]) {
        for jti in jtis {
            if let Err(e) = self.ledger.revoke(jti).await {
                warn!(jti = %jti, error = %e, "could not revoke partial session");
            }
        }
    }

    fn mint_admin_pair(
        &self,
        principal: &AdminPrincipal,
        client: &ClientInfo,
        now: DateTime<Utc>,
    ) -> Result<MintedPair, AuthError> {
        let wrapped = Principal::Admin(principal.clone());
        let access_jti = new_jti();
        let refresh_jti = new_jti();
        let access_token = self.codec.issue_at(
            &wrapped,
            TokenType::Access,
            self.settings.access_ttl,
            &access_jti,
            now,
        )?;
        let refresh_token = self.codec.issue_at(
            &wrapped,
            TokenType::Refresh,
            self.settings.refresh_ttl,
            &refresh_jti,
            now,
        )?;
        let entry = |jti: &str, token_type: TokenType, ttl: Duration| NewLedgerEntry {
            jti: jti.to_string(),
            admin_id: principal.admin_id.clone(),
            token_type,
            expires_at: now + ttl,
            ip: client.ip.clone(),
            user_agent: client.user_agent.clone(),
        };
        let entries = vec![
            entry(&access_jti, TokenType::Access, self.settings.access_ttl),
            entry(&refresh_jti, TokenType::Refresh, self.settings.refresh_ttl),
        ];
        Ok(MintedPair {
            tokens: TokenPair {
                access_token,
                refresh_token,
                expires_in: self.settings.access_ttl.num_seconds(),
            },
            access_jti,
            refresh_jti,
            entries,
        })
    }

    fn check_throttle(&self, client: &ClientInfo, email: &str) -> Result<(), AuthError> {
        match self.throttle.check_and_register(client.ip.as_deref(), email) {
            ThrottleDecision::Allowed => Ok(()),
            ThrottleDecision::Limited { retry_after } => {
                warn!(ip = ?client.ip, "login throttled");
                Err(AuthError::Throttled {
                    retry_after_secs: retry_after.as_secs().max(1),
                })
            }
        }
    }

    /// Hold a rejected login until the floor delay has passed.
    async fn reject(&self, started: Instant) -> AuthError {
        if let Some(remaining) = self.settings.failure_floor.checked_sub(started.elapsed()) {
            tokio::time::sleep(remaining).await;
        }
        AuthError::InvalidCredentials
    }
}

fn check_login_input(email: &str, password: &str) -> Result<String, AuthError> {
    if email.trim().is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }
    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(AuthError::InvalidEmail);
    }
    Ok(email)
}

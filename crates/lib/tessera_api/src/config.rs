//! API server configuration.

use std::fmt;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use tessera_core::auth::authenticator::AuthSettings;
use tessera_core::auth::guard::LockoutPolicy;
use tessera_core::auth::jwt::{Audience, TokenCodec, derive_audience_secret, resolve_jwt_secret};
use tracing::warn;

/// Configuration for the API server.
#[derive(Clone)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// Base secret the per-audience keys derive from.
    pub jwt_secret: String,
    /// Explicit admin-audience key; derived from `jwt_secret` when unset.
    pub admin_jwt_secret: Option<String>,
    /// Explicit user-audience key; derived from `jwt_secret` when unset.
    pub user_jwt_secret: Option<String>,
    pub access_token_ttl_secs: i64,
    pub refresh_token_ttl_secs: i64,
    pub lockout_threshold: i32,
    pub lockout_duration_secs: i64,
    pub login_failure_floor_ms: u64,
    pub login_throttle_max: u32,
    pub login_throttle_window_secs: u64,
    /// `APP_ENV=production`: auth cookies are marked `Secure`.
    pub production: bool,
    pub ledger_purge_interval_secs: u64,
}

impl ApiConfig {
    /// Defaults around an explicit base secret.
    pub fn new(jwt_secret: impl Into<String>) -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            pg_connection_url: "postgres://localhost:5432/tessera".into(),
            jwt_secret: jwt_secret.into(),
            admin_jwt_secret: None,
            user_jwt_secret: None,
            access_token_ttl_secs: 15 * 60,
            refresh_token_ttl_secs: 7 * 24 * 60 * 60,
            lockout_threshold: 5,
            lockout_duration_secs: 15 * 60,
            login_failure_floor_ms: 100,
            login_throttle_max: 20,
            login_throttle_window_secs: 15 * 60,
            production: false,
            ledger_purge_interval_secs: 60 * 60,
        }
    }

    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                       | Default                               |
    /// |--------------------------------|---------------------------------------|
    /// | `BIND_ADDR`                    | `127.0.0.1:3100`                      |
    /// | `DATABASE_URL`                 | `postgres://localhost:5432/tessera`   |
    /// | `JWT_SECRET` / `AUTH_SECRET`   | generated & persisted to file         |
    /// | `ADMIN_JWT_SECRET`             | derived from the base secret          |
    /// | `USER_JWT_SECRET`              | derived from the base secret          |
    /// | `ACCESS_TOKEN_TTL_SECS`        | `900`                                 |
    /// | `REFRESH_TOKEN_TTL_SECS`       | `604800`                              |
    /// | `LOCKOUT_THRESHOLD`            | `5`                                   |
    /// | `LOCKOUT_DURATION_SECS`        | `900`                                 |
    /// | `LOGIN_FAILURE_FLOOR_MS`       | `100`                                 |
    /// | `LOGIN_THROTTLE_MAX`           | `20`                                  |
    /// | `LOGIN_THROTTLE_WINDOW_SECS`   | `900`                                 |
    /// | `APP_ENV`                      | `development`                         |
    /// | `LEDGER_PURGE_INTERVAL_SECS`   | `3600`                                |
    pub fn from_env() -> Self {
        let defaults = Self::new(resolve_jwt_secret());
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            pg_connection_url: std::env::var("DATABASE_URL").unwrap_or(defaults.pg_connection_url),
            admin_jwt_secret: non_empty_var("ADMIN_JWT_SECRET"),
            user_jwt_secret: non_empty_var("USER_JWT_SECRET"),
            access_token_ttl_secs: env_or("ACCESS_TOKEN_TTL_SECS", defaults.access_token_ttl_secs),
            refresh_token_ttl_secs: env_or("REFRESH_TOKEN_TTL_SECS", defaults.refresh_token_ttl_secs),
            lockout_threshold: env_or("LOCKOUT_THRESHOLD", defaults.lockout_threshold),
            lockout_duration_secs: env_or("LOCKOUT_DURATION_SECS", defaults.lockout_duration_secs),
            login_failure_floor_ms: env_or("LOGIN_FAILURE_FLOOR_MS", defaults.login_failure_floor_ms),
            login_throttle_max: env_or("LOGIN_THROTTLE_MAX", defaults.login_throttle_max),
            login_throttle_window_secs: env_or(
                "LOGIN_THROTTLE_WINDOW_SECS",
                defaults.login_throttle_window_secs,
            ),
            production: std::env::var("APP_ENV").is_ok_and(|v| v.eq_ignore_ascii_case("production")),
            ledger_purge_interval_secs: env_or(
                "LEDGER_PURGE_INTERVAL_SECS",
                defaults.ledger_purge_interval_secs,
            ),
            jwt_secret: defaults.jwt_secret,
        }
    }

    /// Token codec with one key per audience.
    pub fn token_codec(&self) -> TokenCodec {
        let key = |explicit: &Option<String>, audience| match explicit {
            Some(secret) => secret.as_bytes().to_vec(),
            None => derive_audience_secret(&self.jwt_secret, audience),
        };
        TokenCodec::new(
            &key(&self.admin_jwt_secret, Audience::Admin),
            &key(&self.user_jwt_secret, Audience::User),
        )
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            access_ttl: chrono::Duration::seconds(self.access_token_ttl_secs),
            refresh_ttl: chrono::Duration::seconds(self.refresh_token_ttl_secs),
            lockout: LockoutPolicy {
                threshold: self.lockout_threshold,
                duration: chrono::Duration::seconds(self.lockout_duration_secs),
            },
            failure_floor: StdDuration::from_millis(self.login_failure_floor_ms),
            throttle_max_attempts: self.login_throttle_max,
            throttle_window: StdDuration::from_secs(self.login_throttle_window_secs),
        }
    }
}

impl fmt::Debug for ApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiConfig")
            .field("bind_addr", &self.bind_addr)
            .field("access_token_ttl_secs", &self.access_token_ttl_secs)
            .field("refresh_token_ttl_secs", &self.refresh_token_ttl_secs)
            .field("lockout_threshold", &self.lockout_threshold)
            .field("lockout_duration_secs", &self.lockout_duration_secs)
            .field("production", &self.production)
            .finish_non_exhaustive()
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "ignoring unparsable setting");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_core::auth::jwt::TokenError;
    use tessera_core::models::auth::{AdminPrincipal, AdminRole, Principal, TokenType};

    #[test]
    fn explicit_audience_key_overrides_derivation() {
        let derived = ApiConfig::new("base");
        let explicit = ApiConfig {
            admin_jwt_secret: Some("admin-only".into()),
            ..ApiConfig::new("base")
        };
        let principal = Principal::Admin(AdminPrincipal {
            admin_id: "a1".into(),
            email: "admin@example.com".into(),
            role: AdminRole::Admin,
        });
        let token = explicit
            .token_codec()
            .issue(&principal, TokenType::Access, chrono::Duration::minutes(5), "j1")
            .unwrap();
        assert!(explicit.token_codec().verify(&token, TokenType::Access).is_ok());
        assert!(matches!(
            derived.token_codec().verify(&token, TokenType::Access),
            Err(TokenError::InvalidToken(_))
        ));
    }

    #[test]
    fn settings_follow_config() {
        let config = ApiConfig {
            lockout_threshold: 3,
            login_failure_floor_ms: 5,
            ..ApiConfig::new("base")
        };
        let settings = config.auth_settings();
        assert_eq!(settings.lockout.threshold, 3);
        assert_eq!(settings.failure_floor, StdDuration::from_millis(5));
        assert_eq!(settings.access_ttl.num_seconds(), 900);
    }
}

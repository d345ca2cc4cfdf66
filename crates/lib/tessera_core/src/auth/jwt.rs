//! Token codec: JWT issue and verification for both audiences.
//!
//! Admin and user tokens are signed with different keys. The header `kid`
//! names the audience and selects the verification key, and the `aud` claim
//! is checked against it, so a token minted for one audience never verifies
//! as the other.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, decode_header, encode,
};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{info, warn};

use crate::models::auth::{Principal, TokenType};

/// `iss` claim on every token.
pub const ISSUER: &str = "tessera";

/// Token verification errors.
#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Wrong token type: expected {expected}, found {found}")]
    WrongTokenType {
        expected: TokenType,
        found: TokenType,
    },

    #[error("Token signing failed: {0}")]
    Signing(String),
}

/// Which principal population a token was minted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Admin,
    User,
}

impl Audience {
    pub fn of(principal: &Principal) -> Self {
        match principal {
            Principal::Admin(_) => Self::Admin,
            Principal::User(_) => Self::User,
        }
    }

    fn kid(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }

    fn from_kid(kid: &str) -> Option<Self> {
        match kid {
            "admin" => Some(Self::Admin),
            "user" => Some(Self::User),
            _ => None,
        }
    }

    pub fn claim(self) -> &'static str {
        match self {
            Self::Admin => "tessera-admin",
            Self::User => "tessera-user",
        }
    }
}

/// Signed token payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    #[serde(flatten)]
    pub principal: Principal,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub jti: String,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds). The token is expired once `now >= exp`.
    pub exp: i64,
    pub aud: String,
    pub iss: String,
}

impl TokenClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.exp, 0)
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// HS256 codec holding one key pair per audience. Stateless apart from keys.
pub struct TokenCodec {
    admin: KeyPair,
    user: KeyPair,
}

impl TokenCodec {
    pub fn new(admin_secret: &[u8], user_secret: &[u8]) -> Self {
        Self {
            admin: KeyPair::from_secret(admin_secret),
            user: KeyPair::from_secret(user_secret),
        }
    }

    /// Build a codec whose per-audience keys are derived from one base secret.
    pub fn from_base_secret(base: &str) -> Self {
        Self::new(
            &derive_audience_secret(base, Audience::Admin),
            &derive_audience_secret(base, Audience::User),
        )
    }

    fn keys(&self, audience: Audience) -> &KeyPair {
        match audience {
            Audience::Admin => &self.admin,
            Audience::User => &self.user,
        }
    }

    /// Sign a token for `principal` that expires `ttl` from now.
    pub fn issue(
        &self,
        principal: &Principal,
        token_type: TokenType,
        ttl: Duration,
        jti: &str,
    ) -> Result<String, TokenError> {
        self.issue_at(principal, token_type, ttl, jti, Utc::now())
    }

    /// Sign a token as if issued at `now`.
    pub fn issue_at(
        &self,
        principal: &Principal,
        token_type: TokenType,
        ttl: Duration,
        jti: &str,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        let audience = Audience::of(principal);
        let iat = now.timestamp();
        let claims = TokenClaims {
            principal: principal.clone(),
            token_type,
            jti: jti.to_string(),
            iat,
            exp: iat + ttl.num_seconds(),
            aud: audience.claim().to_string(),
            iss: ISSUER.to_string(),
        };
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(audience.kid().to_string());
        encode(&header, &claims, &self.keys(audience).encoding)
            .map_err(|e| TokenError::Signing(format!("jwt encode: {e}")))
    }

    /// Verify signature, expiry and type, returning the claims on success.
    ///
    /// Expiry is checked before type, so an expired token of the wrong type
    /// reports `ExpiredToken`.
    pub fn verify(&self, token: &str, expected: TokenType) -> Result<TokenClaims, TokenError> {
        let claims = self.decode_signed(token)?;
        if Utc::now().timestamp() >= claims.exp {
            return Err(TokenError::ExpiredToken);
        }
        if claims.token_type != expected {
            return Err(TokenError::WrongTokenType {
                expected,
                found: claims.token_type,
            });
        }
        Ok(claims)
    }

    /// Verify signature, audience and issuer only; expiry and type are not
    /// checked. Used where a token is being discarded (logout) and its `jti`
    /// is all that matters.
    pub fn decode_signed(&self, token: &str) -> Result<TokenClaims, TokenError> {
        let header =
            decode_header(token).map_err(|e| TokenError::InvalidToken(format!("header: {e}")))?;
        let audience = header
            .kid
            .as_deref()
            .and_then(Audience::from_kid)
            .ok_or_else(|| TokenError::InvalidToken("unknown key id".into()))?;

        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is compared strictly in `verify`; the library check is
        // inclusive and has leeway.
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "aud", "iss"]);
        validation.set_audience(&[audience.claim()]);
        validation.set_issuer(&[ISSUER]);

        let claims = decode::<TokenClaims>(token, &self.keys(audience).decoding, &validation)
            .map_err(|e| TokenError::InvalidToken(e.to_string()))?
            .claims;

        if Audience::of(&claims.principal) != audience {
            return Err(TokenError::InvalidToken(
                "principal does not match audience".into(),
            ));
        }
        Ok(claims)
    }
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

/// Derive a per-audience signing key from a base secret.
pub fn derive_audience_secret(base: &str, audience: Audience) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(base.as_bytes());
    hasher.update(b"\0");
    hasher.update(audience.claim().as_bytes());
    hasher.finalize().to_vec()
}

/// Resolve the base JWT secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    load_or_create_secret(&jwt_secret_path())
}

/// Read the secret persisted at `path`, generating and writing one when the
/// file is missing or blank.
pub fn load_or_create_secret(path: &Path) -> String {
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if let Err(e) = std::fs::write(path, &secret) {
        warn!(path = %path.display(), error = %e, "could not persist JWT secret");
    } else {
        info!(path = %path.display(), "generated new JWT secret");
    }
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tessera")
        .join("jwt-secret")
}

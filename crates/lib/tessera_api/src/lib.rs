//! # tessera_api
//!
//! HTTP API library for Tessera.

pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use std::any::Any;
use std::sync::Arc;

use axum::Router;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use sqlx::PgPool;
use tessera_core::auth::authenticator::Authenticator;
use tessera_core::auth::credentials::CredentialStore;
use tessera_core::auth::ledger::TokenLedger;
use tessera_core::store::{MemoryStore, PgStore};
use tessera_core::tenant::TenantStore;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any as AnyOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ApiConfig;
use crate::error::AppError;
use crate::handlers::{admin_auth, health, tenants, user_auth};
use crate::middleware::{auth, guards, tenant};

/// Shared application state passed to all handlers.
///
/// Holds nothing request-specific: tenant scope and principal travel in
/// request extensions.
#[derive(Clone)]
pub struct AppState {
    /// API configuration.
    pub config: ApiConfig,
    pub auth: Arc<Authenticator>,
    pub tenants: Arc<dyn TenantStore>,
}

impl AppState {
    pub fn new(
        config: ApiConfig,
        credentials: Arc<dyn CredentialStore>,
        ledger: Arc<dyn TokenLedger>,
        tenants: Arc<dyn TenantStore>,
    ) -> Self {
        let auth = Authenticator::new(
            credentials,
            ledger,
            config.token_codec(),
            config.auth_settings(),
        );
        Self {
            config,
            auth: Arc::new(auth),
            tenants,
        }
    }

    /// State over a Postgres pool.
    pub fn postgres(config: ApiConfig, pool: PgPool) -> Self {
        let store = Arc::new(PgStore::new(pool));
        Self::new(config, store.clone(), store.clone(), store)
    }

    /// State over an in-memory store.
    pub fn in_memory(config: ApiConfig, store: MemoryStore) -> Self {
        let store = Arc::new(store);
        Self::new(config, store.clone(), store.clone(), store)
    }
}

/// Run embedded database migrations.
///
/// Delegates to `tessera_core::migrate::migrate()` which owns the migration files.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    tessera_core::migrate::migrate(pool).await
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        (*s).to_string()
    } else {
        "handler panicked".to_string()
    };
    AppError::internal(detail).into_response()
}

/// Builds the Axum router with all routes and shared state.
///
/// Layer order on scoped routes, outermost first: tenant resolver,
/// authentication, guard. Later `route_layer` calls wrap earlier ones.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AnyOrigin)
        .allow_methods(AnyOrigin)
        .allow_headers(AnyOrigin);

    // Public routes (no auth required)
    let public = Router::new()
        .route(routes::GET_HEALTH, get(health::health))
        .route(routes::POST_AUTH_ADMIN_LOGIN, post(admin_auth::login_handler))
        .route(routes::POST_AUTH_ADMIN_REFRESH, post(admin_auth::refresh_handler))
        .route(routes::POST_AUTH_ADMIN_LOGOUT, post(admin_auth::logout_handler))
        .route(routes::POST_AUTH_LOGIN, post(user_auth::login_handler))
        .route(routes::POST_AUTH_REFRESH, post(user_auth::refresh_handler))
        .route(routes::POST_AUTH_LOGOUT, post(user_auth::logout_handler));

    // Admin routes; the legacy cookie is still accepted here.
    let admin = Router::new()
        .route(routes::GET_AUTH_ADMIN_ME, get(admin_auth::me_handler))
        .route(routes::GET_AUTH_ADMIN_SESSIONS, get(admin_auth::sessions_handler))
        .route(
            routes::POST_AUTH_ADMIN_PASSWORD,
            post(admin_auth::change_password_handler),
        )
        .route_layer(from_fn(guards::require_admin))
        .route_layer(from_fn_with_state(state.clone(), auth::legacy_cookie_auth));

    let super_admin = Router::new()
        .route(
            routes::POST_AUTH_ADMIN_ADMINS,
            post(admin_auth::create_admin_handler),
        )
        .route_layer(from_fn(guards::require_super_admin))
        .route_layer(from_fn_with_state(state.clone(), auth::legacy_cookie_auth));

    let user = Router::new()
        .route(routes::GET_AUTH_ME, get(user_auth::me_handler))
        .route_layer(from_fn(guards::require_user))
        .route_layer(from_fn_with_state(state.clone(), auth::authenticate));

    // Registration writes through the resolved tenant handle. Only the
    // global partition is open to self-registration.
    let registration = Router::new()
        .route(routes::POST_AUTH_REGISTER, post(user_auth::register_handler))
        .route_layer(from_fn_with_state(state.clone(), tenant::resolve_tenant));

    let provisioning = Router::new()
        .route(
            routes::POST_TENANT_AUTH_REGISTER,
            post(user_auth::provision_handler),
        )
        .route_layer(from_fn(guards::require_admin))
        .route_layer(from_fn_with_state(state.clone(), auth::authenticate))
        .route_layer(from_fn_with_state(state.clone(), tenant::resolve_tenant));

    let tenant_scoped = Router::new()
        .route(routes::GET_TENANT_USERS, get(tenants::list_users_handler))
        .route(routes::GET_TENANT_USER, get(tenants::get_user_handler))
        .route_layer(from_fn(guards::require_tenant_access))
        .route_layer(from_fn_with_state(state.clone(), auth::authenticate))
        .route_layer(from_fn_with_state(state.clone(), tenant::resolve_tenant));

    Router::new()
        .merge(public)
        .merge(admin)
        .merge(super_admin)
        .merge(user)
        .merge(registration)
        .merge(provisioning)
        .merge(tenant_scoped)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(CatchPanicLayer::custom(panic_response))
        .with_state(state)
}

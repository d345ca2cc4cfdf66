//! Shared helpers for router-level tests. Everything runs against the
//! in-memory store.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode, header};
use serde_json::Value;
use tessera_api::AppState;
use tessera_api::config::ApiConfig;
use tessera_core::auth::credentials::CredentialStore;
use tessera_core::auth::password::hash_password;
use tessera_core::models::auth::{AdminRecord, AdminRole, NewAdmin, NewUser, UserRecord};
use tessera_core::store::MemoryStore;
use tessera_core::tenant::{TenantId, TenantScope, TenantStore};
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "admin@example.com";
pub const ADMIN_PASSWORD: &str = "admin123";

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
}

pub fn test_config() -> ApiConfig {
    ApiConfig {
        login_failure_floor_ms: 1,
        ..ApiConfig::new("integration-test-secret")
    }
}

pub fn app_with(config: ApiConfig) -> TestApp {
    let store = MemoryStore::new();
    let router = tessera_api::router(AppState::in_memory(config, store.clone()));
    TestApp { router, store }
}

pub fn app() -> TestApp {
    app_with(test_config())
}

pub async fn seed_admin(store: &MemoryStore, email: &str, password: &str, role: AdminRole) -> AdminRecord {
    store
        .create_admin(NewAdmin {
            email: email.into(),
            password_hash: hash_password(password).unwrap(),
            role,
        })
        .await
        .unwrap()
}

pub async fn seed_user(
    store: &MemoryStore,
    tenant: Option<&str>,
    email: &str,
    password: &str,
) -> UserRecord {
    let scope = match tenant {
        Some(id) => TenantScope::Tenant(TenantId::parse(id).unwrap()),
        None => TenantScope::Global,
    };
    let mut handle = store.begin(scope).await.unwrap();
    let user = handle
        .create_user(NewUser {
            email: email.into(),
            password_hash: Some(hash_password(password).unwrap()),
            role: "user".into(),
        })
        .await
        .unwrap();
    handle.commit().await.unwrap();
    user
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
}

pub fn request(method: Method, uri: &str, body: Option<Value>, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", "198.51.100.7");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.expect("request");
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("parse JSON")
    };
    TestResponse {
        status,
        headers,
        json,
    }
}

pub async fn get(router: &Router, uri: &str, bearer: Option<&str>) -> TestResponse {
    send(router, request(Method::GET, uri, None, bearer)).await
}

pub async fn post(router: &Router, uri: &str, body: Value, bearer: Option<&str>) -> TestResponse {
    send(router, request(Method::POST, uri, Some(body), bearer)).await
}

/// Log in as an admin and return `(access_token, refresh_token)`.
pub async fn admin_tokens(router: &Router, email: &str, password: &str) -> (String, String) {
    let resp = post(
        router,
        "/auth/admin/login",
        serde_json::json!({ "email": email, "password": password }),
        None,
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK, "admin login failed: {}", resp.json);
    (
        resp.json["accessToken"].as_str().unwrap().to_string(),
        resp.json["refreshToken"].as_str().unwrap().to_string(),
    )
}

/// Log in as an end user and return the access token.
pub async fn user_token(router: &Router, email: &str, password: &str) -> String {
    let resp = post(
        router,
        "/auth/login",
        serde_json::json!({ "email": email, "password": password }),
        None,
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK, "user login failed: {}", resp.json);
    resp.json["accessToken"].as_str().unwrap().to_string()
}

pub fn is_jwt_shaped(token: &str) -> bool {
    let parts: Vec<&str> = token.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty())
}

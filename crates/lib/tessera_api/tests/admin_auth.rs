//! Admin authentication through the real router.

mod common;

use axum::http::{Method, StatusCode, header};
use serde_json::json;
use tessera_core::auth::credentials::CredentialStore;
use tessera_core::models::auth::AdminRole;

use common::*;

#[tokio::test]
async fn seeded_admin_logs_in() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;

    let resp = post(
        &app.router,
        "/auth/admin/login",
        json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        None,
    )
    .await;

    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["admin"]["email"], ADMIN_EMAIL);
    assert_eq!(resp.json["admin"]["role"], "admin");
    assert_eq!(resp.json["expiresIn"], 900);
    assert!(is_jwt_shaped(resp.json["accessToken"].as_str().unwrap()));
    assert!(is_jwt_shaped(resp.json["refreshToken"].as_str().unwrap()));

    let cookies: Vec<_> = resp
        .headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect();
    assert!(cookies.iter().any(|c| c.starts_with("admin_access_token=")));
    assert!(cookies.iter().any(|c| c.starts_with("admin_refresh_token=")));
    assert!(cookies.iter().all(|c| c.contains("HttpOnly")));
}

#[tokio::test]
async fn login_input_errors() {
    let app = app();

    let resp = post(&app.router, "/auth/admin/login", json!({ "email": ADMIN_EMAIL }), None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["code"], "MISSING_CREDENTIALS");

    let resp = post(
        &app.router,
        "/auth/admin/login",
        json!({ "email": "not-an-email", "password": "x" }),
        None,
    )
    .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["code"], "INVALID_EMAIL");
}

#[tokio::test]
async fn unreadable_login_bodies_get_the_envelope() {
    use axum::body::Body;
    use axum::http::Request;

    let app = app();

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/auth/admin/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let resp = send(&app.router, malformed).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["code"], "MISSING_CREDENTIALS");
    assert_eq!(resp.headers[header::CONTENT_TYPE], "application/json");

    let untyped = Request::builder()
        .method(Method::POST)
        .uri("/auth/login")
        .body(Body::from("email=a@example.com"))
        .unwrap();
    let resp = send(&app.router, untyped).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["code"], "MISSING_CREDENTIALS");
}

#[tokio::test]
async fn json_rejections_on_admin_routes_get_the_envelope() {
    use axum::body::Body;
    use axum::http::Request;

    let app = app();
    seed_admin(&app.store, "root@example.com", "root-password", AdminRole::SuperAdmin).await;
    let (root, _) = admin_tokens(&app.router, "root@example.com", "root-password").await;

    let untyped = Request::builder()
        .method(Method::POST)
        .uri("/auth/admin/admins")
        .header(header::AUTHORIZATION, format!("Bearer {root}"))
        .body(Body::from(r#"{"email":"x@example.com","password":"long-enough"}"#))
        .unwrap();
    let resp = send(&app.router, untyped).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["code"], "VALIDATION_ERROR");

    let resp = post(
        &app.router,
        "/auth/admin/password",
        json!({ "currentPassword": "root-password" }),
        Some(&root),
    )
    .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unknown_email_and_wrong_password_are_indistinguishable() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;

    let unknown = post(
        &app.router,
        "/auth/admin/login",
        json!({ "email": "ghost@example.com", "password": ADMIN_PASSWORD }),
        None,
    )
    .await;
    let wrong = post(
        &app.router,
        "/auth/admin/login",
        json!({ "email": ADMIN_EMAIL, "password": "not-the-password" }),
        None,
    )
    .await;

    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown.json, wrong.json);
    assert_eq!(wrong.json["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
async fn sixth_attempt_after_five_failures_is_locked() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;

    for _ in 0..5 {
        let resp = post(
            &app.router,
            "/auth/admin/login",
            json!({ "email": ADMIN_EMAIL, "password": "wrong-password" }),
            None,
        )
        .await;
        assert_eq!(resp.json["code"], "INVALID_CREDENTIALS");
    }

    let resp = post(
        &app.router,
        "/auth/admin/login",
        json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        None,
    )
    .await;
    assert_eq!(resp.status, StatusCode::LOCKED);
    assert_eq!(resp.json["code"], "ACCOUNT_LOCKED");
    assert!(resp.headers.contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn inactive_admin_is_forbidden() {
    let app = app();
    let admin = seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    app.store.set_admin_active(&admin.id, false).await.unwrap();

    let resp = post(
        &app.router,
        "/auth/admin/login",
        json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD }),
        None,
    )
    .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(resp.json["code"], "ACCOUNT_INACTIVE");
}

#[tokio::test]
async fn middleware_distinguishes_token_failures() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    seed_user(&app.store, None, "user@example.com", "user-password").await;
    let (access, refresh) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = get(&app.router, "/auth/admin/me", Some(&access)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["admin"]["email"], ADMIN_EMAIL);
    assert_eq!(resp.json["authUser"]["email"], ADMIN_EMAIL);

    let resp = get(&app.router, "/auth/admin/me", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json["code"], "MISSING_TOKEN");

    let resp = get(&app.router, "/auth/admin/me", Some("garbage")).await;
    assert_eq!(resp.json["code"], "INVALID_TOKEN");

    let resp = get(&app.router, "/auth/admin/me", Some(&refresh)).await;
    assert_eq!(resp.json["code"], "WRONG_TOKEN_TYPE");

    let user = user_token(&app.router, "user@example.com", "user-password").await;
    let resp = get(&app.router, "/auth/admin/me", Some(&user)).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn zero_ttl_tokens_are_expired_on_arrival() {
    let app = app_with(tessera_api::config::ApiConfig {
        access_token_ttl_secs: 0,
        ..test_config()
    });
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (access, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = get(&app.router, "/auth/admin/me", Some(&access)).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json["code"], "TOKEN_EXPIRED");
}

#[tokio::test]
async fn legacy_cookie_is_accepted_on_admin_routes() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (access, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let mut req = request(Method::GET, "/auth/admin/me", None, None);
    req.headers_mut().insert(
        header::COOKIE,
        format!("admin_access_token={access}").parse().unwrap(),
    );
    let resp = send(&app.router, req).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn refresh_rotates_and_rejects_reuse() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (_, refresh) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = post(
        &app.router,
        "/auth/admin/refresh",
        json!({ "refreshToken": refresh }),
        None,
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);
    let rotated = resp.json["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(rotated, refresh);

    let replay = post(
        &app.router,
        "/auth/admin/refresh",
        json!({ "refreshToken": refresh }),
        None,
    )
    .await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(replay.json["error"], "Token refresh failed");
    assert_eq!(replay.json["code"], "REFRESH_FAILED");

    // The rotated token also works from the legacy cookie, with no body.
    let mut req = request(Method::POST, "/auth/admin/refresh", None, None);
    req.headers_mut().insert(
        header::COOKIE,
        format!("admin_refresh_token={rotated}").parse().unwrap(),
    );
    assert_eq!(send(&app.router, req).await.status, StatusCode::OK);

    let missing = send(&app.router, request(Method::POST, "/auth/admin/refresh", None, None)).await;
    assert_eq!(missing.json["code"], "REFRESH_FAILED");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refresh_yields_one_success() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (_, refresh) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let calls = (0..2).map(|_| {
        let router = app.router.clone();
        let body = json!({ "refreshToken": refresh });
        tokio::spawn(async move { post(&router, "/auth/admin/refresh", body, None).await })
    });
    let statuses: Vec<StatusCode> = futures::future::join_all(calls)
        .await
        .into_iter()
        .map(|r| r.unwrap().status)
        .collect();

    assert_eq!(statuses.iter().filter(|s| **s == StatusCode::OK).count(), 1);
    assert_eq!(
        statuses.iter().filter(|s| **s == StatusCode::UNAUTHORIZED).count(),
        1
    );
}

#[tokio::test]
async fn logout_revokes_admin_access_token() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (access, refresh) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = post(
        &app.router,
        "/auth/admin/logout",
        json!({ "refreshToken": refresh }),
        Some(&access),
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["success"], true);

    // Signature and expiry are still fine; the ledger says no.
    let resp = get(&app.router, "/auth/admin/me", Some(&access)).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json["code"], "TOKEN_REVOKED");

    let resp = post(
        &app.router,
        "/auth/admin/refresh",
        json!({ "refreshToken": refresh }),
        None,
    )
    .await;
    assert_eq!(resp.json["code"], "REFRESH_FAILED");

    // Logging out again, or with nothing at all, still succeeds.
    let again = post(&app.router, "/auth/admin/logout", json!({}), Some(&access)).await;
    assert_eq!(again.status, StatusCode::OK);
    let empty = send(&app.router, request(Method::POST, "/auth/admin/logout", None, None)).await;
    assert_eq!(empty.status, StatusCode::OK);
}

#[tokio::test]
async fn logout_everywhere_and_session_listing() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (first, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    let (second, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = get(&app.router, "/auth/admin/sessions", Some(&second)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let sessions = resp.json.as_array().unwrap();
    assert_eq!(sessions.len(), 4);
    assert_eq!(sessions.iter().filter(|s| s["current"] == true).count(), 1);

    let resp = post(
        &app.router,
        "/auth/admin/logout",
        json!({ "allSessions": true }),
        Some(&second),
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);

    let resp = get(&app.router, "/auth/admin/me", Some(&first)).await;
    assert_eq!(resp.json["code"], "TOKEN_REVOKED");
}

#[tokio::test]
async fn password_change_ends_all_sessions() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (access, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = post(
        &app.router,
        "/auth/admin/password",
        json!({ "currentPassword": ADMIN_PASSWORD, "newPassword": "a-much-better-one" }),
        Some(&access),
    )
    .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["revokedSessions"], 2);

    let resp = get(&app.router, "/auth/admin/me", Some(&access)).await;
    assert_eq!(resp.json["code"], "TOKEN_REVOKED");
    admin_tokens(&app.router, ADMIN_EMAIL, "a-much-better-one").await;
}

#[tokio::test]
async fn only_super_admins_create_admins() {
    let app = app();
    seed_admin(&app.store, "root@example.com", "root-password", AdminRole::SuperAdmin).await;
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (root, _) = admin_tokens(&app.router, "root@example.com", "root-password").await;
    let (plain, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let body = json!({ "email": "new@example.com", "password": "new-admin-pass" });
    let resp = post(&app.router, "/auth/admin/admins", body.clone(), Some(&plain)).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);

    let resp = post(&app.router, "/auth/admin/admins", body.clone(), Some(&root)).await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.json["email"], "new@example.com");
    assert_eq!(resp.json["role"], "admin");

    let resp = post(&app.router, "/auth/admin/admins", body, Some(&root)).await;
    assert_eq!(resp.status, StatusCode::CONFLICT);
    assert_eq!(resp.json["code"], "CONFLICT");
}

#[tokio::test]
async fn health_is_public() {
    let app = app();
    let resp = get(&app.router, "/health", None).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json["status"], "ok");
}

//! Tenant resolution, partition visibility and membership checks.

mod common;

use axum::http::StatusCode;
use serde_json::json;
use tessera_core::models::auth::AdminRole;

use common::*;

const MEMBER_PASSWORD: &str = "member-password";

#[tokio::test]
async fn admin_bypasses_membership() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    seed_user(&app.store, Some("t1"), "a@t1.example", MEMBER_PASSWORD).await;
    seed_user(&app.store, Some("t2"), "b@t2.example", MEMBER_PASSWORD).await;
    let (access, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = get(&app.router, "/tenants/t1/users", Some(&access)).await;
    assert_eq!(resp.status, StatusCode::OK);
    let users = resp.json.as_array().unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0]["email"], "a@t1.example");
    assert_eq!(users[0]["tenantId"], "t1");
}

#[tokio::test]
async fn members_only_reach_their_own_tenant() {
    let app = app();
    seed_user(&app.store, Some("t1"), "a@t1.example", MEMBER_PASSWORD).await;
    seed_user(&app.store, Some("t2"), "b@t2.example", MEMBER_PASSWORD).await;
    let token = user_token(&app.router, "a@t1.example", MEMBER_PASSWORD).await;

    let own = get(&app.router, "/tenants/t1/users", Some(&token)).await;
    assert_eq!(own.status, StatusCode::OK);
    assert_eq!(own.json.as_array().unwrap().len(), 1);

    let other = get(&app.router, "/tenants/t2/users", Some(&token)).await;
    assert_eq!(other.status, StatusCode::FORBIDDEN);
    assert_eq!(other.json["code"], "FORBIDDEN");
}

#[tokio::test]
async fn global_user_is_not_a_member_of_any_tenant() {
    let app = app();
    seed_user(&app.store, None, "g@example.com", MEMBER_PASSWORD).await;
    let token = user_token(&app.router, "g@example.com", MEMBER_PASSWORD).await;

    let resp = get(&app.router, "/tenants/t1/users", Some(&token)).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_tenant_id_is_rejected_before_auth() {
    let app = app();
    let resp = get(&app.router, "/tenants/-bad/users", None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["code"], "INVALID_TENANT_ID");
}

#[tokio::test]
async fn tenant_routes_require_a_token() {
    let app = app();
    let resp = get(&app.router, "/tenants/t1/users", None).await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json["code"], "MISSING_TOKEN");
}

#[tokio::test]
async fn lookups_do_not_cross_partitions() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let user = seed_user(&app.store, Some("t1"), "a@t1.example", MEMBER_PASSWORD).await;
    let (access, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let found = get(
        &app.router,
        &format!("/tenants/t1/users/{}", user.id),
        Some(&access),
    )
    .await;
    assert_eq!(found.status, StatusCode::OK);
    assert_eq!(found.json["id"], user.id.as_str());

    let hidden = get(
        &app.router,
        &format!("/tenants/t2/users/{}", user.id),
        Some(&access),
    )
    .await;
    assert_eq!(hidden.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_provisions_into_the_resolved_partition() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (admin, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = post(
        &app.router,
        "/tenants/acme/auth/register",
        json!({ "email": "new@acme.example", "password": MEMBER_PASSWORD }),
        Some(&admin),
    )
    .await;
    assert_eq!(resp.status, StatusCode::CREATED);
    assert_eq!(resp.json["tenantId"], "acme");
    assert!(resp.json.get("accessToken").is_none());

    let token = user_token(&app.router, "new@acme.example", MEMBER_PASSWORD).await;
    assert_eq!(
        get(&app.router, "/tenants/acme/users", Some(&token)).await.status,
        StatusCode::OK
    );
    assert_eq!(
        get(&app.router, "/tenants/other/users", Some(&token)).await.status,
        StatusCode::FORBIDDEN
    );

    let global = post(
        &app.router,
        "/auth/register",
        json!({ "email": "solo@example.com", "password": MEMBER_PASSWORD }),
        None,
    )
    .await;
    assert_eq!(global.status, StatusCode::CREATED);
    assert!(global.json["user"]["tenantId"].is_null());

    let duplicate = post(
        &app.router,
        "/tenants/other/auth/register",
        json!({ "email": "new@acme.example", "password": MEMBER_PASSWORD }),
        Some(&admin),
    )
    .await;
    assert_eq!(duplicate.status, StatusCode::CONFLICT);
    assert_eq!(app.store.user_count().await, 2);
}

#[tokio::test]
async fn anonymous_caller_cannot_join_a_tenant() {
    let app = app();
    seed_user(&app.store, Some("victim"), "ceo@victim.example", MEMBER_PASSWORD).await;

    let resp = post(
        &app.router,
        "/tenants/victim/auth/register",
        json!({ "email": "attacker@evil.example", "password": MEMBER_PASSWORD }),
        None,
    )
    .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.json["code"], "MISSING_TOKEN");
    assert_eq!(app.store.user_count().await, 1);

    // A self-registered global user gets no way into the tenant either.
    let resp = post(
        &app.router,
        "/auth/register",
        json!({ "email": "attacker@evil.example", "password": MEMBER_PASSWORD }),
        None,
    )
    .await;
    let token = resp.json["accessToken"].as_str().unwrap().to_string();
    let resp = post(
        &app.router,
        "/tenants/victim/auth/register",
        json!({ "email": "second@evil.example", "password": MEMBER_PASSWORD }),
        Some(&token),
    )
    .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(
        get(&app.router, "/tenants/victim/users", Some(&token)).await.status,
        StatusCode::FORBIDDEN
    );
    assert_eq!(app.store.user_count().await, 2);
}

#[tokio::test]
async fn members_cannot_provision_users() {
    let app = app();
    seed_user(&app.store, Some("t1"), "a@t1.example", MEMBER_PASSWORD).await;
    let token = user_token(&app.router, "a@t1.example", MEMBER_PASSWORD).await;

    let resp = post(
        &app.router,
        "/tenants/t1/auth/register",
        json!({ "email": "friend@t1.example", "password": MEMBER_PASSWORD }),
        Some(&token),
    )
    .await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
    assert_eq!(app.store.user_count().await, 1);
}

#[tokio::test]
async fn failed_registration_writes_nothing() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (admin, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = post(
        &app.router,
        "/tenants/acme/auth/register",
        json!({ "email": "short@acme.example", "password": "x" }),
        Some(&admin),
    )
    .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["code"], "VALIDATION_ERROR");

    let resp = post(&app.router, "/auth/register", json!({ "email": 42 }), None).await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json["code"], "VALIDATION_ERROR");
    assert_eq!(app.store.user_count().await, 0);
}

#[tokio::test]
async fn user_logout_leaves_token_usable() {
    let app = app();
    seed_user(&app.store, Some("t1"), "a@t1.example", MEMBER_PASSWORD).await;
    let token = user_token(&app.router, "a@t1.example", MEMBER_PASSWORD).await;

    let resp = post(&app.router, "/auth/logout", json!({}), Some(&token)).await;
    assert_eq!(resp.status, StatusCode::OK);

    let me = get(&app.router, "/auth/me", Some(&token)).await;
    assert_eq!(me.status, StatusCode::OK);
    assert_eq!(me.json["email"], "a@t1.example");
}

#[tokio::test]
async fn admin_token_is_not_a_user_token() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let (access, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let resp = get(&app.router, "/auth/me", Some(&access)).await;
    assert_eq!(resp.status, StatusCode::FORBIDDEN);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_see_only_their_tenant() {
    let app = app();
    seed_admin(&app.store, ADMIN_EMAIL, ADMIN_PASSWORD, AdminRole::Admin).await;
    let tenants = ["t0", "t1", "t2", "t3"];
    for (i, tenant) in tenants.iter().enumerate() {
        for n in 0..=i {
            seed_user(
                &app.store,
                Some(tenant),
                &format!("u{n}@{tenant}.example"),
                MEMBER_PASSWORD,
            )
            .await;
        }
    }
    let (access, _) = admin_tokens(&app.router, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let calls = (0..32).map(|i| {
        let router = app.router.clone();
        let access = access.clone();
        let tenant = tenants[i % tenants.len()];
        tokio::spawn(async move {
            let resp = get(&router, &format!("/tenants/{tenant}/users"), Some(&access)).await;
            (tenant, resp)
        })
    });

    for joined in futures::future::join_all(calls).await {
        let (tenant, resp) = joined.unwrap();
        assert_eq!(resp.status, StatusCode::OK);
        let users = resp.json.as_array().unwrap();
        let expected = tenants.iter().position(|t| *t == tenant).unwrap() + 1;
        assert_eq!(users.len(), expected);
        assert!(users.iter().all(|u| u["tenantId"] == tenant));
    }
}

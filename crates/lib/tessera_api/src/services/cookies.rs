//! Legacy admin auth cookies.
//!
//! Header bearer tokens are the supported transport. These httpOnly cookies
//! are still set on admin login for older clients, and the legacy cookie
//! middleware accepts them.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use time::Duration;

/// Cookie name for the admin access token.
pub const ADMIN_ACCESS_COOKIE: &str = "admin_access_token";
/// Cookie name for the admin refresh token.
pub const ADMIN_REFRESH_COOKIE: &str = "admin_refresh_token";

/// The refresh cookie is only sent to the admin auth endpoints.
const REFRESH_COOKIE_PATH: &str = "/auth/admin";

fn build(
    name: &'static str,
    value: String,
    path: &'static str,
    max_age: Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Strict)
        .path(path)
        .max_age(max_age)
        .build()
}

/// Add both admin cookies to `jar`.
pub fn set_admin_cookies(
    jar: CookieJar,
    access_token: &str,
    refresh_token: &str,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    secure: bool,
) -> CookieJar {
    jar.add(build(
        ADMIN_ACCESS_COOKIE,
        access_token.to_string(),
        "/",
        Duration::seconds(access_ttl_secs),
        secure,
    ))
    .add(build(
        ADMIN_REFRESH_COOKIE,
        refresh_token.to_string(),
        REFRESH_COOKIE_PATH,
        Duration::seconds(refresh_ttl_secs),
        secure,
    ))
}

/// Expire both admin cookies.
pub fn clear_admin_cookies(jar: CookieJar, secure: bool) -> CookieJar {
    jar.add(build(ADMIN_ACCESS_COOKIE, String::new(), "/", Duration::ZERO, secure))
        .add(build(
            ADMIN_REFRESH_COOKIE,
            String::new(),
            REFRESH_COOKIE_PATH,
            Duration::ZERO,
            secure,
        ))
}

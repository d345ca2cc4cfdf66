//! Route paths.

pub const GET_HEALTH: &str = "/health";

pub const POST_AUTH_ADMIN_LOGIN: &str = "/auth/admin/login";
pub const POST_AUTH_ADMIN_REFRESH: &str = "/auth/admin/refresh";
pub const POST_AUTH_ADMIN_LOGOUT: &str = "/auth/admin/logout";
pub const GET_AUTH_ADMIN_ME: &str = "/auth/admin/me";
pub const GET_AUTH_ADMIN_SESSIONS: &str = "/auth/admin/sessions";
pub const POST_AUTH_ADMIN_PASSWORD: &str = "/auth/admin/password";
pub const POST_AUTH_ADMIN_ADMINS: &str = "/auth/admin/admins";

pub const POST_AUTH_LOGIN: &str = "/auth/login";
pub const POST_AUTH_REFRESH: &str = "/auth/refresh";
pub const POST_AUTH_LOGOUT: &str = "/auth/logout";
pub const POST_AUTH_REGISTER: &str = "/auth/register";
pub const GET_AUTH_ME: &str = "/auth/me";

pub const POST_TENANT_AUTH_REGISTER: &str = "/tenants/{tenant_id}/auth/register";
pub const GET_TENANT_USERS: &str = "/tenants/{tenant_id}/users";
pub const GET_TENANT_USER: &str = "/tenants/{tenant_id}/users/{user_id}";

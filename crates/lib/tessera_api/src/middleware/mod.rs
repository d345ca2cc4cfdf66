//! Request middleware.
//!
//! Applied in this order on scoped routes: tenant resolution, then
//! authentication, then the role and tenant guards.

pub mod auth;
pub mod client;
pub mod guards;
pub mod tenant;

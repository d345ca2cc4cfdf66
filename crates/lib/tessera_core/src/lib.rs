//! # tessera_core
//!
//! Core domain logic for Tessera: tenant scoping, the dual-audience token
//! codec, the admin token ledger and the authenticator.

pub mod auth;
pub mod migrate;
pub mod models;
pub mod store;
pub mod tenant;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

//! # Holiday API Shared Library
//!
//! Identity, access control and abuse throttling for the holiday API. The
//! HTTP server in `holidayapi-api` is a thin shell over the types here.
//!
//! ## Module Organization
//!
//! - `access`: login, registration, refresh and user administration
//! - `audit`: the audit trail recorder, query and retention sweep
//! - `auth`: password hashing, tokens, role checks and the request pipeline
//! - `db`: PostgreSQL pool and migrations
//! - `error`: the shared error taxonomy and its HTTP mapping
//! - `models`: users and audit records with their repositories
//! - `rate_limit`: per-client token buckets

pub mod access;
pub mod audit;
pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod rate_limit;

/// Current version of the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

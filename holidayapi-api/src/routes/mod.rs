/// API route handlers
///
/// - `health`: liveness and storage status
/// - `auth`: login, refresh and the caller's own account
/// - `users`: account administration
/// - `audit`: audit trail queries
/// - `admin`: legacy maintenance endpoints behind `X-API-Key`

pub mod admin;
pub mod audit;
pub mod auth;
pub mod health;
pub mod users;

/// Persistent records and their repositories
///
/// Each model ships a repository trait with a PostgreSQL implementation and
/// an in-memory one. The in-memory stores back tests and deployments that
/// run without `DATABASE_URL`.
///
/// - `user`: operator accounts and roles
/// - `audit`: append-only security events

pub mod audit;
pub mod user;

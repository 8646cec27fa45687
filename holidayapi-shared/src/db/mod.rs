/// Database layer for the holiday API
///
/// PostgreSQL is optional: without a `DATABASE_URL` the API runs on the
/// in-memory repositories in [`crate::models`]. When a URL is configured,
/// this module owns pool setup and schema migrations.
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with a startup health check
/// - `migrations`: embedded schema migrations for `users` and `audit_logs`
///
/// # Example
///
/// ```no_run
/// use holidayapi_shared::db::pool::{create_pool, DatabaseConfig};
/// use holidayapi_shared::db::migrations::run_migrations;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = DatabaseConfig {
///         url: std::env::var("DATABASE_URL")?,
///         ..Default::default()
///     };
///
///     let pool = create_pool(config).await?;
///     run_migrations(&pool).await?;
///     Ok(())
/// }
/// ```

pub mod migrations;
pub mod pool;

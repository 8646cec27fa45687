//! # Holiday API Server
//!
//! Starts the HTTP server, the rate-limit bucket sweeper and the audit
//! retention sweep, and stops all three on Ctrl-C or SIGTERM.
//!
//! ## Usage
//!
//! ```bash
//! JWT_SECRET=$(openssl rand -hex 32) ADMIN_API_KEY=... cargo run -p holidayapi-api
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::Context;
use holidayapi_api::{
    app::{build_router, AppState},
    config::Config,
};
use holidayapi_shared::db::{
    migrations::run_migrations,
    pool::{close_pool, create_pool, DatabaseConfig},
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "holidayapi_api=debug,holidayapi_shared=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Holiday API Server v{} starting", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let db = match &config.database {
        Some(database) => {
            let pool = create_pool(DatabaseConfig {
                url: database.url.clone(),
                max_connections: database.max_connections,
                ..Default::default()
            })
            .await
            .context("failed to connect to database")?;
            run_migrations(&pool).await.context("failed to run migrations")?;
            Some(pool)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory stores; data is lost on restart");
            None
        }
    };

    let state = AppState::new(config.clone(), db.clone()).context("invalid token configuration")?;

    if let Some(bootstrap) = &config.admin.bootstrap {
        match state
            .access
            .bootstrap_super_admin(&bootstrap.username, &bootstrap.email, &bootstrap.password)
            .await
        {
            Ok(Some(profile)) => tracing::info!(username = %profile.username, "Created bootstrap super admin"),
            Ok(None) => tracing::debug!(username = %bootstrap.username, "Bootstrap super admin already exists"),
            Err(e) => anyhow::bail!("failed to create bootstrap super admin: {}", e),
        }
    }

    let shutdown = CancellationToken::new();
    let sweeper = state.limiter.spawn_sweeper(
        Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
        shutdown.clone(),
    );
    let retention = state.audit.spawn_retention_sweep(
        Duration::from_secs(config.audit.sweep_interval_hours.max(1) * 3600),
        config.audit.retention_days,
        shutdown.clone(),
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;

    tracing::info!("Server listening on http://{}", config.bind_address());

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
    .await?;

    shutdown.cancel();
    let _ = tokio::join!(sweeper, retention);

    if let Some(pool) = db {
        close_pool(pool).await;
    }

    tracing::info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and cancels `shutdown`
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}

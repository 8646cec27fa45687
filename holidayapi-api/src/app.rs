/// Application state and router builder
///
/// # Example
///
/// ```no_run
/// use holidayapi_api::{app::{build_router, AppState}, config::Config};
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// let state = AppState::new(config, None)?;
/// let app = build_router(state);
/// # Ok(())
/// # }
/// ```

use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use chrono::Duration;
use holidayapi_shared::{
    access::AccessControlService,
    audit::AuditTrail,
    auth::{
        authorization::RoleSet,
        jwt::{JwtError, TokenService},
        middleware::{authorize, AuthorizationPipeline, TrustedProxies, API_KEY_HEADER},
        password::PasswordHasher,
    },
    models::{
        audit::{AuditRepository, InMemoryAuditRepository, PgAuditRepository},
        user::{InMemoryUserRepository, PgUserRepository, UserRepository},
    },
    rate_limit::RateLimiter,
};
use sqlx::PgPool;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::{config::Config, middleware::security::SecurityHeadersLayer, routes};

/// Shared application state
///
/// Cloned into every handler; all members are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub access: AccessControlService,

    pub audit: AuditTrail,

    /// The one request-throttle table for the process
    pub limiter: Arc<RateLimiter>,

    pub tokens: Arc<TokenService>,

    pub config: Arc<Config>,

    /// Present when running against PostgreSQL
    pub db: Option<PgPool>,
}

impl AppState {
    /// Builds state on PostgreSQL when a pool is given, otherwise on in-memory stores
    pub fn new(config: Config, db: Option<PgPool>) -> Result<Self, JwtError> {
        let (users, audit_store): (Arc<dyn UserRepository>, Arc<dyn AuditRepository>) = match &db {
            Some(pool) => (
                Arc::new(PgUserRepository::new(pool.clone())),
                Arc::new(PgAuditRepository::new(pool.clone())),
            ),
            None => (
                Arc::new(InMemoryUserRepository::new()),
                Arc::new(InMemoryAuditRepository::new()),
            ),
        };

        Self::with_stores(config, db, users, audit_store, PasswordHasher::new())
    }

    /// Builds state on explicit stores and hasher
    pub fn with_stores(
        config: Config,
        db: Option<PgPool>,
        users: Arc<dyn UserRepository>,
        audit_store: Arc<dyn AuditRepository>,
        hasher: PasswordHasher,
    ) -> Result<Self, JwtError> {
        let tokens = Arc::new(TokenService::new(
            &config.jwt.secret,
            Duration::minutes(config.jwt.access_token_ttl_minutes),
            Duration::hours(config.jwt.refresh_token_ttl_hours),
        )?);
        let limiter = Arc::new(RateLimiter::new(config.rate_limit.limiter_config()));
        let audit = AuditTrail::new(audit_store);
        let access = AccessControlService::new(users, tokens.clone(), hasher, audit.clone());

        Ok(Self {
            access,
            audit,
            limiter,
            tokens,
            config: Arc::new(config),
            db,
        })
    }

    fn trusted_proxies(&self) -> TrustedProxies {
        TrustedProxies::new(self.config.api.trusted_proxies.iter().copied())
    }

    /// Admission only
    pub fn public_pipeline(&self) -> AuthorizationPipeline {
        AuthorizationPipeline::public(self.limiter.clone()).with_trusted_proxies(self.trusted_proxies())
    }

    /// Bearer token restricted to `roles`
    pub fn bearer_pipeline(&self, roles: RoleSet) -> AuthorizationPipeline {
        AuthorizationPipeline::bearer(self.limiter.clone(), self.tokens.clone(), roles)
            .with_trusted_proxies(self.trusted_proxies())
    }

    /// Legacy `X-API-Key` surface
    pub fn api_key_pipeline(&self) -> AuthorizationPipeline {
        AuthorizationPipeline::api_key(self.limiter.clone(), self.config.admin.api_key.as_str())
            .with_trusted_proxies(self.trusted_proxies())
    }
}

/// Builds the complete router
///
/// # Architecture
///
/// ```text
/// /health                                   public, unthrottled
/// /api/v1/auth/
/// │   ├── POST   /login                     throttled
/// │   ├── POST   /refresh                   throttled
/// │   ├── GET    /profile                   bearer (admin, super_admin)
/// │   ├── POST   /change-password           bearer (admin, super_admin)
/// │   ├── POST   /logout                    bearer (admin, super_admin)
/// │   ├── GET    /audit-logs                bearer (admin, super_admin)
/// │   ├── GET    /users                     bearer (admin, super_admin)
/// │   ├── POST   /register                  bearer (super_admin)
/// │   ├── PUT    /users/:id                 bearer (super_admin)
/// │   └── DELETE /users/:id                 bearer (super_admin)
/// /api/v1/admin/
///     ├── GET    /audit-logs                bearer (admin, super_admin)
///     ├── GET    /audit-logs/user/:id       bearer (admin, super_admin)
///     └── DELETE /maintenance/audit-logs    X-API-Key
/// ```
///
/// Each group gets its own [`AuthorizationPipeline`] as a route layer, so
/// admission runs before credential checks and neither runs for unknown paths.
pub fn build_router(state: AppState) -> Router {
    let public = state.public_pipeline();
    let staff = state.bearer_pipeline(RoleSet::ADMIN_OR_SUPER_ADMIN);
    let super_admin = state.bearer_pipeline(RoleSet::SUPER_ADMIN_ONLY);
    let maintenance = state.api_key_pipeline();

    let health_routes = Router::new().route("/health", get(routes::health::health_check));

    let auth_public = Router::new()
        .route("/login", post(routes::auth::login))
        .route("/refresh", post(routes::auth::refresh))
        .route_layer(from_fn_with_state(public, authorize));

    let auth_staff = Router::new()
        .route("/profile", get(routes::auth::profile))
        .route("/change-password", post(routes::auth::change_password))
        .route("/logout", post(routes::auth::logout))
        .route("/audit-logs", get(routes::audit::my_audit_logs))
        .route("/users", get(routes::users::list_users))
        .route_layer(from_fn_with_state(staff.clone(), authorize));

    let auth_super_admin = Router::new()
        .route("/register", post(routes::users::register))
        .route(
            "/users/:id",
            put(routes::users::update_user).delete(routes::users::delete_user),
        )
        .route_layer(from_fn_with_state(super_admin, authorize));

    let admin_staff = Router::new()
        .route("/audit-logs", get(routes::audit::list_audit_logs))
        .route("/audit-logs/user/:id", get(routes::audit::user_audit_logs))
        .route_layer(from_fn_with_state(staff, authorize));

    let admin_maintenance = Router::new()
        .route(
            "/maintenance/audit-logs",
            delete(routes::admin::cleanup_audit_logs),
        )
        .route_layer(from_fn_with_state(maintenance, authorize));

    let v1_routes = Router::new()
        .nest(
            "/auth",
            auth_public.merge(auth_staff).merge(auth_super_admin),
        )
        .nest("/admin", admin_staff.merge(admin_maintenance));

    let cors = cors_layer(&state.config);
    let production = state.config.api.production;

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", v1_routes)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors)
        .layer(SecurityHeadersLayer::new(production))
        .with_state(state)
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.api.cors_origins.iter().any(|origin| origin == "*") {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = config
        .api
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(API_KEY_HEADER),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}

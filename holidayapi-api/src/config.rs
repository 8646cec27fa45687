/// Configuration management for the API server
///
/// Configuration comes from environment variables, with `.env` loaded first
/// when present.
///
/// # Environment Variables
///
/// - `API_HOST` / `API_PORT`: bind address (default `0.0.0.0:8080`)
/// - `API_CORS_ORIGINS`: comma-separated origins, `*` for permissive (default `*`)
/// - `API_PRODUCTION`: enables HSTS (default `false`)
/// - `API_TRUSTED_PROXIES`: comma-separated proxy addresses whose
///   `X-Forwarded-For` / `X-Real-IP` are believed (default none)
/// - `DATABASE_URL`: PostgreSQL URL; when unset the server uses in-memory stores
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default 10)
/// - `JWT_SECRET`: token signing secret (required, at least 32 characters)
/// - `JWT_ACCESS_TOKEN_TTL_MINUTES` (default 15) / `JWT_REFRESH_TOKEN_TTL_HOURS` (default 168)
/// - `RATE_LIMIT_RPM` (default 60) / `RATE_LIMIT_BURST` (default 10)
/// - `RATE_LIMIT_SWEEP_INTERVAL_SECS`: idle bucket eviction period (default 300)
/// - `ADMIN_API_KEY`: key for the legacy maintenance surface (required)
/// - `AUDIT_RETENTION_DAYS` (default 90) / `AUDIT_SWEEP_INTERVAL_HOURS` (default 24)
/// - `BOOTSTRAP_SUPER_ADMIN_USERNAME` / `_EMAIL` / `_PASSWORD`: optional first account
///
/// # Example
///
/// ```no_run
/// use holidayapi_api::config::Config;
///
/// # fn example() -> anyhow::Result<()> {
/// let config = Config::from_env()?;
/// println!("Server will listen on {}", config.bind_address());
/// # Ok(())
/// # }
/// ```

use std::env;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use holidayapi_shared::rate_limit::RateLimitConfig;

/// Complete application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api: ApiConfig,

    /// `None` runs the server on in-memory stores
    pub database: Option<DatabaseConfig>,

    pub jwt: JwtConfig,

    pub rate_limit: RateLimitSettings,

    pub admin: AdminConfig,

    pub audit: AuditConfig,
}

/// API server configuration
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,

    /// Allowed CORS origins; `*` means permissive
    pub cors_origins: Vec<String>,

    /// Enables HSTS
    pub production: bool,

    /// Peers allowed to set the client address through forwarding headers
    pub trusted_proxies: Vec<IpAddr>,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Token configuration
#[derive(Clone)]
pub struct JwtConfig {
    /// Signing secret; generate with `openssl rand -hex 32`
    pub secret: String,

    pub access_token_ttl_minutes: i64,

    pub refresh_token_ttl_hours: i64,
}

impl fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_ttl_minutes", &self.access_token_ttl_minutes)
            .field("refresh_token_ttl_hours", &self.refresh_token_ttl_hours)
            .finish()
    }
}

/// Request throttling configuration
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub requests_per_minute: u32,
    pub burst: u32,

    /// How often idle buckets are evicted
    pub sweep_interval_secs: u64,
}

impl RateLimitSettings {
    pub fn limiter_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            requests_per_minute: self.requests_per_minute,
            burst: self.burst,
        }
    }
}

/// Administrative credentials
#[derive(Clone)]
pub struct AdminConfig {
    /// Expected `X-API-Key` value for the maintenance surface
    pub api_key: String,

    /// Super admin created at startup if the username is free
    pub bootstrap: Option<BootstrapAdmin>,
}

impl fmt::Debug for AdminConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminConfig")
            .field("api_key", &"<redacted>")
            .field("bootstrap", &self.bootstrap.as_ref().map(|b| &b.username))
            .finish()
    }
}

#[derive(Clone)]
pub struct BootstrapAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Audit retention configuration
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub retention_days: i64,
    pub sweep_interval_hours: u64,
}

impl Config {
    /// Loads configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a value fails
    /// to parse.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Loads configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let jwt_secret = var("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET environment variable is required"))?;
        if jwt_secret.len() < 32 {
            anyhow::bail!("JWT_SECRET must be at least 32 characters long");
        }

        let api_key = var("ADMIN_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("ADMIN_API_KEY environment variable is required"))?;

        let database = match var("DATABASE_URL") {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse_or(&var, "DATABASE_MAX_CONNECTIONS", 10)?,
            }),
            None => None,
        };

        let bootstrap = match (
            var("BOOTSTRAP_SUPER_ADMIN_USERNAME"),
            var("BOOTSTRAP_SUPER_ADMIN_EMAIL"),
            var("BOOTSTRAP_SUPER_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(email), Some(password)) => Some(BootstrapAdmin {
                username,
                email,
                password,
            }),
            (None, None, None) => None,
            _ => anyhow::bail!(
                "BOOTSTRAP_SUPER_ADMIN_USERNAME, _EMAIL and _PASSWORD must be set together"
            ),
        };

        let cors_origins = var("API_CORS_ORIGINS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        let trusted_proxies = var("API_TRUSTED_PROXIES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|addr| !addr.is_empty())
            .map(|addr| {
                addr.parse::<IpAddr>().map_err(|e| {
                    anyhow::anyhow!("API_TRUSTED_PROXIES has an invalid address '{}': {}", addr, e)
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        Ok(Self {
            api: ApiConfig {
                host: var("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&var, "API_PORT", 8080)?,
                cors_origins,
                production: parse_or(&var, "API_PRODUCTION", false)?,
                trusted_proxies,
            },
            database,
            jwt: JwtConfig {
                secret: jwt_secret,
                access_token_ttl_minutes: parse_or(&var, "JWT_ACCESS_TOKEN_TTL_MINUTES", 15)?,
                refresh_token_ttl_hours: parse_or(&var, "JWT_REFRESH_TOKEN_TTL_HOURS", 168)?,
            },
            rate_limit: RateLimitSettings {
                requests_per_minute: parse_or(&var, "RATE_LIMIT_RPM", 60)?,
                burst: parse_or(&var, "RATE_LIMIT_BURST", 10)?,
                sweep_interval_secs: parse_or(&var, "RATE_LIMIT_SWEEP_INTERVAL_SECS", 300)?,
            },
            admin: AdminConfig { api_key, bootstrap },
            audit: AuditConfig {
                retention_days: parse_or(&var, "AUDIT_RETENTION_DAYS", 90)?,
                sweep_interval_hours: parse_or(&var, "AUDIT_SWEEP_INTERVAL_HOURS", 24)?,
            },
        })
    }

    /// Returns the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

fn parse_or<T, F>(var: &F, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn load(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("JWT_SECRET", SECRET), ("ADMIN_API_KEY", "maintenance-key")]).unwrap();

        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.api.cors_origins, vec!["*".to_string()]);
        assert!(!config.api.production);
        assert!(config.api.trusted_proxies.is_empty());
        assert!(config.database.is_none());
        assert_eq!(config.jwt.access_token_ttl_minutes, 15);
        assert_eq!(config.jwt.refresh_token_ttl_hours, 168);
        assert_eq!(config.rate_limit.requests_per_minute, 60);
        assert_eq!(config.rate_limit.burst, 10);
        assert_eq!(config.rate_limit.sweep_interval_secs, 300);
        assert_eq!(config.audit.retention_days, 90);
        assert_eq!(config.audit.sweep_interval_hours, 24);
        assert!(config.admin.bootstrap.is_none());
    }

    #[test]
    fn test_jwt_secret_required() {
        assert!(load(&[("ADMIN_API_KEY", "maintenance-key")]).is_err());
        assert!(load(&[("JWT_SECRET", "short"), ("ADMIN_API_KEY", "maintenance-key")]).is_err());
    }

    #[test]
    fn test_admin_api_key_required() {
        assert!(load(&[("JWT_SECRET", SECRET)]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("ADMIN_API_KEY", "maintenance-key"),
            ("API_HOST", "127.0.0.1"),
            ("API_PORT", "9000"),
            ("API_CORS_ORIGINS", "https://a.example, https://b.example"),
            ("DATABASE_URL", "postgresql://localhost/holidayapi"),
            ("DATABASE_MAX_CONNECTIONS", "4"),
            ("RATE_LIMIT_BURST", "3"),
        ])
        .unwrap();

        assert_eq!(config.bind_address(), "127.0.0.1:9000");
        assert_eq!(
            config.api.cors_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        let database = config.database.unwrap();
        assert_eq!(database.max_connections, 4);
        assert_eq!(config.rate_limit.limiter_config().burst, 3);
    }

    #[test]
    fn test_trusted_proxies() {
        let config = load(&[
            ("JWT_SECRET", SECRET),
            ("ADMIN_API_KEY", "maintenance-key"),
            ("API_TRUSTED_PROXIES", "10.0.0.1, ::1"),
        ])
        .unwrap();
        assert_eq!(
            config.api.trusted_proxies,
            vec!["10.0.0.1".parse::<IpAddr>().unwrap(), "::1".parse::<IpAddr>().unwrap()]
        );

        let invalid = load(&[
            ("JWT_SECRET", SECRET),
            ("ADMIN_API_KEY", "maintenance-key"),
            ("API_TRUSTED_PROXIES", "10.0.0.0/8"),
        ]);
        assert!(invalid.is_err());
    }

    #[test]
    fn test_invalid_number_is_rejected() {
        let result = load(&[
            ("JWT_SECRET", SECRET),
            ("ADMIN_API_KEY", "maintenance-key"),
            ("RATE_LIMIT_RPM", "lots"),
        ]);

        assert!(result.is_err());
    }

    #[test]
    fn test_bootstrap_needs_all_fields() {
        let partial = load(&[
            ("JWT_SECRET", SECRET),
            ("ADMIN_API_KEY", "maintenance-key"),
            ("BOOTSTRAP_SUPER_ADMIN_USERNAME", "root"),
        ]);
        assert!(partial.is_err());

        let full = load(&[
            ("JWT_SECRET", SECRET),
            ("ADMIN_API_KEY", "maintenance-key"),
            ("BOOTSTRAP_SUPER_ADMIN_USERNAME", "root"),
            ("BOOTSTRAP_SUPER_ADMIN_EMAIL", "root@example.com"),
            ("BOOTSTRAP_SUPER_ADMIN_PASSWORD", "Sup3r$ecret"),
        ])
        .unwrap();
        assert_eq!(full.admin.bootstrap.unwrap().username, "root");
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = load(&[("JWT_SECRET", SECRET), ("ADMIN_API_KEY", "maintenance-key")]).unwrap();
        let debug = format!("{:?}", config);

        assert!(!debug.contains(SECRET));
        assert!(!debug.contains("maintenance-key"));
    }
}

/// Authorization pipeline for Axum
///
/// Every guarded route group runs the same ordered chain:
///
/// 1. **Admission**: the client address must be admitted by the [`RateLimiter`].
///    The address is the socket peer unless that peer is a configured
///    [`TrustedProxies`] entry, in which case forwarding headers decide it
/// 2. **Credential**: either the legacy `X-API-Key` header or an
///    `Authorization: Bearer <token>` access token, never both on one route
/// 3. **Role**: the token's role must be in the route's [`RoleSet`]
///
/// The first failing step ends the chain; later steps and the handler never
/// run.
///
/// # Request Extensions
///
/// On success the middleware adds an [`AuthContext`] to the request.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use axum::{middleware, routing::get, Extension, Router};
/// use chrono::Duration;
/// use holidayapi_shared::auth::authorization::RoleSet;
/// use holidayapi_shared::auth::jwt::TokenService;
/// use holidayapi_shared::auth::middleware::{authorize, AuthContext, AuthorizationPipeline};
/// use holidayapi_shared::rate_limit::{RateLimitConfig, RateLimiter};
///
/// async fn handler(Extension(auth): Extension<AuthContext>) -> String {
///     format!("Hello from {}", auth.client.ip_address)
/// }
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default()));
/// let tokens = Arc::new(TokenService::new(
///     "test-secret-key-at-least-32-bytes-long",
///     Duration::minutes(15),
///     Duration::days(7),
/// )?);
///
/// let pipeline = AuthorizationPipeline::bearer(limiter, tokens, RoleSet::ADMIN_OR_SUPER_ADMIN);
///
/// let app: Router = Router::new()
///     .route("/protected", get(handler))
///     .layer(middleware::from_fn_with_state(pipeline, authorize));
/// # Ok(())
/// # }
/// ```

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use super::authorization::{api_key_matches, Actor, RoleSet};
use super::jwt::{TokenService, TokenType};
use crate::error::{AuthError, AuthResult};
use crate::rate_limit::RateLimiter;

/// Header carrying the legacy static admin key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Authentication method used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// No credential required
    Anonymous,

    /// Legacy static key
    ApiKey,

    /// JWT access token
    Bearer,
}

/// Where a request came from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    pub ip_address: String,
    pub user_agent: String,
}

impl ClientInfo {
    pub fn new(ip_address: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            user_agent: user_agent.into(),
        }
    }

    /// Resolves the client address and user agent
    ///
    /// Forwarding headers are believed only when the socket peer is one of
    /// `trusted`. Then the address is the nearest untrusted `X-Forwarded-For`
    /// hop, else `X-Real-IP`. Otherwise, or if a forwarded value does not
    /// parse, it is the socket peer, then `"unknown"`.
    pub fn from_parts(headers: &HeaderMap, peer: Option<SocketAddr>, trusted: &TrustedProxies) -> Self {
        let peer_ip = peer.map(|addr| addr.ip());

        let forwarded = match peer_ip {
            Some(ip) if trusted.contains(&ip) => forwarded_client(headers, trusted),
            _ => None,
        };

        let ip_address = forwarded
            .or(peer_ip)
            .map(|ip| ip.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();

        Self { ip_address, user_agent }
    }
}

/// Walks `X-Forwarded-For` from the right, skipping trusted proxies
fn forwarded_client(headers: &HeaderMap, trusted: &TrustedProxies) -> Option<IpAddr> {
    if let Some(chain) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        for hop in chain.split(',').rev() {
            match hop.trim().parse::<IpAddr>() {
                Ok(ip) if trusted.contains(&ip) => continue,
                Ok(ip) => return Some(ip),
                Err(_) => return None,
            }
        }
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Reverse proxies whose forwarding headers are believed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustedProxies(Arc<Vec<IpAddr>>);

impl TrustedProxies {
    pub fn new(addrs: impl IntoIterator<Item = IpAddr>) -> Self {
        Self(Arc::new(addrs.into_iter().collect()))
    }

    pub fn contains(&self, addr: &IpAddr) -> bool {
        self.0.contains(addr)
    }
}

/// Authentication context added to request extensions
///
/// Handlers extract it with `Extension<AuthContext>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    /// Token subject (only for bearer auth)
    pub actor: Option<Actor>,

    pub method: AuthMethod,

    pub client: ClientInfo,
}

impl AuthContext {
    /// The authenticated actor
    ///
    /// # Errors
    ///
    /// `AuthError::InvalidToken` when the route did not authenticate a user.
    pub fn actor(&self) -> AuthResult<&Actor> {
        self.actor.as_ref().ok_or(AuthError::InvalidToken)
    }
}

/// Credential scheme of a route group
#[derive(Clone)]
pub enum CredentialCheck {
    /// Public route; admission only
    None,

    /// Legacy `X-API-Key` exact match
    ApiKey(Arc<str>),

    /// Bearer access token plus role check
    Bearer {
        tokens: Arc<TokenService>,
        roles: RoleSet,
    },
}

/// Ordered admission, credential and role checks for one route group
#[derive(Clone)]
pub struct AuthorizationPipeline {
    limiter: Arc<RateLimiter>,
    credential: CredentialCheck,
    trusted_proxies: TrustedProxies,
}

impl AuthorizationPipeline {
    /// Admission only
    pub fn public(limiter: Arc<RateLimiter>) -> Self {
        Self {
            limiter,
            credential: CredentialCheck::None,
            trusted_proxies: TrustedProxies::default(),
        }
    }

    /// Admission plus the static admin key
    pub fn api_key(limiter: Arc<RateLimiter>, expected: impl Into<Arc<str>>) -> Self {
        Self {
            limiter,
            credential: CredentialCheck::ApiKey(expected.into()),
            trusted_proxies: TrustedProxies::default(),
        }
    }

    /// Admission plus bearer token plus role
    pub fn bearer(limiter: Arc<RateLimiter>, tokens: Arc<TokenService>, roles: RoleSet) -> Self {
        Self {
            limiter,
            credential: CredentialCheck::Bearer { tokens, roles },
            trusted_proxies: TrustedProxies::default(),
        }
    }

    /// Believe forwarding headers from these peers
    pub fn with_trusted_proxies(mut self, trusted_proxies: TrustedProxies) -> Self {
        self.trusted_proxies = trusted_proxies;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Runs the chain against request headers
    ///
    /// # Errors
    ///
    /// - `AuthError::RateLimited` if admission is denied
    /// - `AuthError::InvalidToken` for a missing or invalid credential
    /// - `AuthError::InsufficientPermissions` if the role is not accepted
    pub fn check(&self, headers: &HeaderMap, client: ClientInfo) -> AuthResult<AuthContext> {
        if !self.limiter.admit(&client.ip_address) {
            return Err(AuthError::RateLimited);
        }

        match &self.credential {
            CredentialCheck::None => Ok(AuthContext {
                actor: None,
                method: AuthMethod::Anonymous,
                client,
            }),
            CredentialCheck::ApiKey(expected) => {
                let provided = headers
                    .get(API_KEY_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();

                if !api_key_matches(provided, expected) {
                    tracing::warn!(ip = %client.ip_address, "Rejected admin API key");
                    return Err(AuthError::InvalidToken);
                }

                Ok(AuthContext {
                    actor: None,
                    method: AuthMethod::ApiKey,
                    client,
                })
            }
            CredentialCheck::Bearer { tokens, roles } => {
                let token = bearer_token(headers)?;
                let claims = tokens.validate(token, TokenType::Access)?;

                if let Err(e) = roles.require(claims.role) {
                    tracing::warn!(
                        user_id = %claims.sub,
                        role = %claims.role,
                        required = %roles,
                        "Role not permitted on route"
                    );
                    return Err(e);
                }

                Ok(AuthContext {
                    actor: Some(Actor::from_claims(&claims)),
                    method: AuthMethod::Bearer,
                    client,
                })
            }
        }
    }
}

/// Extracts the token from `Authorization: Bearer <token>`
///
/// A missing header, another scheme, or an empty token is `InvalidToken`.
pub fn bearer_token(headers: &HeaderMap) -> AuthResult<&str> {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or(AuthError::InvalidToken)?;

    let token = value.strip_prefix("Bearer ").ok_or(AuthError::InvalidToken)?.trim();

    if token.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(token)
}

/// Axum middleware running an [`AuthorizationPipeline`]
///
/// Use with `axum::middleware::from_fn_with_state(pipeline, authorize)`.
/// Rate-limit rejections carry a `Retry-After` header.
pub async fn authorize(
    State(pipeline): State<AuthorizationPipeline>,
    mut req: Request,
    next: Next,
) -> Response {
    let peer = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = ClientInfo::from_parts(req.headers(), peer, &pipeline.trusted_proxies);

    match pipeline.check(req.headers(), client) {
        Ok(context) => {
            req.extensions_mut().insert(context);
            next.run(req).await
        }
        Err(AuthError::RateLimited) => {
            let mut response = AuthError::RateLimited.into_response();
            let retry_after = pipeline.limiter.retry_after_secs();
            if let Ok(value) = HeaderValue::from_str(&retry_after.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
            response
        }
        Err(e) => e.into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::{InMemoryUserRepository, NewUser, Role, User, UserRepository};
    use crate::rate_limit::RateLimitConfig;
    use chrono::Duration;

    const SECRET: &str = "test-secret-key-at-least-32-bytes-long";

    fn limiter(burst: u32) -> Arc<RateLimiter> {
        Arc::new(RateLimiter::new(RateLimitConfig {
            requests_per_minute: 60,
            burst,
        }))
    }

    fn tokens() -> Arc<TokenService> {
        Arc::new(TokenService::new(SECRET, Duration::minutes(15), Duration::days(7)).unwrap())
    }

    async fn user(role: Role) -> User {
        InMemoryUserRepository::new()
            .create(NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password_hash: "$argon2id$placeholder".to_string(),
                role,
            })
            .await
            .unwrap()
    }

    fn headers(pairs: &[(&'static str, String)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    fn client() -> ClientInfo {
        ClientInfo::new("203.0.113.7", "test-agent")
    }

    #[test]
    fn test_client_info_without_trusted_proxies_uses_peer() {
        let peer: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let h = headers(&[
            ("x-forwarded-for", "198.51.100.2".to_string()),
            ("x-real-ip", "198.51.100.3".to_string()),
            ("user-agent", "curl/8.0".to_string()),
        ]);

        let info = ClientInfo::from_parts(&h, Some(peer), &TrustedProxies::default());
        assert_eq!(info.ip_address, "10.0.0.1");
        assert_eq!(info.user_agent, "curl/8.0");

        let none = TrustedProxies::default();
        assert_eq!(ClientInfo::from_parts(&h, None, &none).ip_address, "unknown");
    }

    #[test]
    fn test_client_info_behind_trusted_proxy() {
        let proxy: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        let trusted = TrustedProxies::new(["10.0.0.1".parse().unwrap(), "10.0.0.2".parse().unwrap()]);
        let resolve = |pairs: &[(&'static str, String)]| {
            ClientInfo::from_parts(&headers(pairs), Some(proxy), &trusted).ip_address
        };

        // A client-supplied prefix does not move the key
        assert_eq!(
            resolve(&[("x-forwarded-for", "6.6.6.6, 198.51.100.2, 10.0.0.2".to_string())]),
            "198.51.100.2"
        );
        assert_eq!(resolve(&[("x-real-ip", "198.51.100.3".to_string())]), "198.51.100.3");
        assert_eq!(
            resolve(&[
                ("x-forwarded-for", "10.0.0.2".to_string()),
                ("x-real-ip", "198.51.100.3".to_string()),
            ]),
            "198.51.100.3"
        );
        assert_eq!(resolve(&[("x-forwarded-for", "not-an-ip".to_string())]), "10.0.0.1");
        assert_eq!(resolve(&[]), "10.0.0.1");

        // Headers from an untrusted peer are ignored
        let stranger: SocketAddr = "203.0.113.9:5000".parse().unwrap();
        let h = headers(&[("x-forwarded-for", "198.51.100.2".to_string())]);
        assert_eq!(ClientInfo::from_parts(&h, Some(stranger), &trusted).ip_address, "203.0.113.9");
    }

    #[test]
    fn test_spoofed_forwarding_does_not_reset_budget() {
        let pipeline = AuthorizationPipeline::public(limiter(2));
        let peer: SocketAddr = "203.0.113.50:6000".parse().unwrap();

        let statuses: Vec<bool> = (0..4)
            .map(|i| {
                let h = headers(&[("x-forwarded-for", format!("198.51.100.{}", i))]);
                let client = ClientInfo::from_parts(&h, Some(peer), &pipeline.trusted_proxies);
                pipeline.check(&h, client).is_ok()
            })
            .collect();

        assert_eq!(statuses, vec![true, true, false, false]);
    }

    #[test]
    fn test_bearer_token_parsing() {
        let h = headers(&[("authorization", "Bearer abc.def.ghi".to_string())]);
        assert_eq!(bearer_token(&h).unwrap(), "abc.def.ghi");

        for bad in ["Basic abc", "Bearer ", "Bearer    ", "bearer abc"] {
            let h = headers(&[("authorization", bad.to_string())]);
            assert_eq!(bearer_token(&h), Err(AuthError::InvalidToken), "{:?}", bad);
        }

        assert_eq!(bearer_token(&HeaderMap::new()), Err(AuthError::InvalidToken));
    }

    #[tokio::test]
    async fn test_bearer_pipeline_roles() {
        let tokens = tokens();
        let admin = user(Role::Admin).await;
        let pair = tokens.issue_pair(&admin).unwrap();
        let h = headers(&[("authorization", format!("Bearer {}", pair.access_token))]);

        let open = AuthorizationPipeline::bearer(limiter(10), tokens.clone(), RoleSet::ADMIN_OR_SUPER_ADMIN);
        let context = open.check(&h, client()).unwrap();
        assert_eq!(context.method, AuthMethod::Bearer);
        assert_eq!(context.actor().unwrap().id, admin.id);

        let strict = AuthorizationPipeline::bearer(limiter(10), tokens.clone(), RoleSet::SUPER_ADMIN_ONLY);
        assert_eq!(strict.check(&h, client()), Err(AuthError::InsufficientPermissions));
    }

    #[tokio::test]
    async fn test_refresh_token_is_not_a_bearer_credential() {
        let tokens = tokens();
        let pair = tokens.issue_pair(&user(Role::SuperAdmin).await).unwrap();
        let h = headers(&[("authorization", format!("Bearer {}", pair.refresh_token))]);

        let pipeline = AuthorizationPipeline::bearer(limiter(10), tokens, RoleSet::ADMIN_OR_SUPER_ADMIN);
        assert_eq!(pipeline.check(&h, client()), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_admission_runs_before_credentials() {
        let pipeline = AuthorizationPipeline::bearer(limiter(1), tokens(), RoleSet::ADMIN_OR_SUPER_ADMIN);

        // First request spends the only token even though it is unauthenticated
        assert_eq!(pipeline.check(&HeaderMap::new(), client()), Err(AuthError::InvalidToken));
        assert_eq!(pipeline.check(&HeaderMap::new(), client()), Err(AuthError::RateLimited));
    }

    #[test]
    fn test_api_key_pipeline() {
        let pipeline = AuthorizationPipeline::api_key(limiter(10), "admin-key-123");

        let good = headers(&[("x-api-key", "admin-key-123".to_string())]);
        let context = pipeline.check(&good, client()).unwrap();
        assert_eq!(context.method, AuthMethod::ApiKey);
        assert!(context.actor().is_err());

        let bad = headers(&[("x-api-key", "admin-key-124".to_string())]);
        assert_eq!(pipeline.check(&bad, client()), Err(AuthError::InvalidToken));
        assert_eq!(pipeline.check(&HeaderMap::new(), client()), Err(AuthError::InvalidToken));
    }

    #[test]
    fn test_public_pipeline_only_throttles() {
        let pipeline = AuthorizationPipeline::public(limiter(2));

        assert!(pipeline.check(&HeaderMap::new(), client()).is_ok());
        assert!(pipeline.check(&HeaderMap::new(), client()).is_ok());
        assert_eq!(pipeline.check(&HeaderMap::new(), client()), Err(AuthError::RateLimited));

        // Another address has its own budget
        let other = ClientInfo::new("198.51.100.1", "");
        assert!(pipeline.check(&HeaderMap::new(), other).is_ok());
    }
}

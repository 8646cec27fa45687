#![allow(dead_code)]

/// Common test utilities for integration tests
///
/// Builds the full router on in-memory stores with a bootstrapped super
/// admin, and drives it through `tower::Service::call`. Requests carry a
/// `ConnectInfo` peer address so each test controls its own throttle bucket.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode};
use axum::Router;
use holidayapi_api::app::{build_router, AppState};
use holidayapi_api::config::Config;
use holidayapi_shared::auth::password::PasswordHasher;
use holidayapi_shared::models::audit::InMemoryAuditRepository;
use holidayapi_shared::models::user::{InMemoryUserRepository, UserProfile};
use serde_json::{json, Value};
use tower::Service as _;

pub const ROOT_USERNAME: &str = "root";
pub const ROOT_PASSWORD: &str = "Sup3r$ecret";
pub const ADMIN_API_KEY: &str = "maintenance-key-for-tests";

/// Test context containing the router and its stores
pub struct TestContext {
    pub app: Router,
    pub state: AppState,
    pub audit: Arc<InMemoryAuditRepository>,
    pub root: UserProfile,
}

impl TestContext {
    /// Router with the default throttle (60/min, burst 10)
    pub async fn new() -> Self {
        Self::with_burst(10).await
    }

    /// Router whose throttle admits `burst` requests per client before refilling at 60/min
    pub async fn with_burst(burst: u32) -> Self {
        Self::build(burst, None).await
    }

    /// Router that believes forwarding headers from `proxy`
    pub async fn behind_proxy(burst: u32, proxy: &str) -> Self {
        Self::build(burst, Some(proxy)).await
    }

    async fn build(burst: u32, proxy: Option<&str>) -> Self {
        let mut vars: HashMap<&str, String> = HashMap::from([
            ("JWT_SECRET", "integration-test-secret-0123456789abcdef".to_string()),
            ("ADMIN_API_KEY", ADMIN_API_KEY.to_string()),
            ("RATE_LIMIT_RPM", "60".to_string()),
            ("RATE_LIMIT_BURST", burst.to_string()),
        ]);
        if let Some(proxy) = proxy {
            vars.insert("API_TRUSTED_PROXIES", proxy.to_string());
        }
        let config = Config::from_lookup(|key| vars.get(key).cloned()).unwrap();

        let audit = Arc::new(InMemoryAuditRepository::new());
        let state = AppState::with_stores(
            config,
            None,
            Arc::new(InMemoryUserRepository::new()),
            audit.clone(),
            PasswordHasher::with_cost(1024, 1, 1).unwrap(),
        )
        .unwrap();

        let root = state
            .access
            .bootstrap_super_admin(ROOT_USERNAME, "root@example.com", ROOT_PASSWORD)
            .await
            .unwrap()
            .unwrap();

        TestContext {
            app: build_router(state.clone()),
            state,
            audit,
            root,
        }
    }

    /// Sends a request and returns status plus parsed JSON body (`Null` if empty)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().call(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    /// Logs in and returns the `data` object
    pub async fn login(&self, username: &str, password: &str, ip: &str) -> (StatusCode, Value) {
        self.send(json_request(
            "POST",
            "/api/v1/auth/login",
            ip,
            None,
            json!({ "username": username, "password": password }),
        ))
        .await
    }

    /// Access token for the bootstrapped super admin
    pub async fn root_token(&self) -> String {
        let (status, body) = self.login(ROOT_USERNAME, ROOT_PASSWORD, "10.0.0.1").await;
        assert_eq!(status, StatusCode::OK, "root login failed: {}", body);
        body["data"]["access_token"].as_str().unwrap().to_string()
    }

    /// Registers an admin through the API and returns its id
    pub async fn create_admin(&self, token: &str, username: &str) -> String {
        let (status, body) = self
            .send(json_request(
                "POST",
                "/api/v1/auth/register",
                "10.0.0.1",
                Some(token),
                json!({
                    "username": username,
                    "email": format!("{}@example.com", username),
                    "password": "Holiday#2024",
                    "role": "admin"
                }),
            ))
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body["data"]["id"].as_str().unwrap().to_string()
    }
}

/// Socket peer extension as `into_make_service_with_connect_info` would set it
pub fn peer(ip: &str) -> ConnectInfo<SocketAddr> {
    ConnectInfo(SocketAddr::new(ip.parse().unwrap(), 40000))
}

/// Builds a JSON request from `ip`, optionally with a bearer token
pub fn json_request(
    method: &str,
    uri: &str,
    ip: &str,
    token: Option<&str>,
    body: Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .extension(peer(ip))
        .header("user-agent", "integration-test");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Builds a body-less request from `ip`, optionally with a bearer token
pub fn empty_request(method: &str, uri: &str, ip: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .extension(peer(ip))
        .header("user-agent", "integration-test");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

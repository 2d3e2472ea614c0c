// Shared harness for the HTTP-level tests: an in-memory database, a fake
// container engine and the real router driven in-process.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{HeaderMap, Method, Request, StatusCode, header},
};
use chrono::TimeDelta;
use http_body_util::BodyExt;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

use dockwarden::db;
use dockwarden::db::enums::Role;
use dockwarden::db::services::{AuditStore, SqliteAuditStore, SqliteUserStore, UserStore};
use dockwarden::runtime::{
    ContainerDetails, ContainerRuntime, ContainerSummary, RawCounters, RawStatsSample,
    RestartPolicyView, RuntimeError,
};
use dockwarden::server::config::ServerConfig;
use dockwarden::server::dispatcher::GatewayDispatcher;
use dockwarden::services::audit_logger::AuditLogger;
use dockwarden::services::auth_service::{Authenticator, hash_password};
use dockwarden::services::host_service::UnconfiguredHostServices;
use dockwarden::services::rate_limiter::LoginRateLimiter;
use dockwarden::services::session_service::SessionKeys;
use dockwarden::web::create_axum_router;

pub const BCRYPT_COST: u32 = 4;
pub const DEFAULT_CLIENT: [u8; 4] = [10, 0, 0, 5];

pub const ADMIN: (&str, &str) = ("root", "root-pass");
pub const OPERATOR: (&str, &str) = ("ops", "ops-pass");
pub const VIEWER: (&str, &str) = ("viewer", "viewer-pass");

/// Container engine double. Tracks running state per container and counts
/// every call that reaches it.
#[derive(Default)]
pub struct FakeRuntime {
    running: Mutex<HashMap<String, bool>>,
    failure: Mutex<Option<RuntimeError>>,
    pub calls: AtomicUsize,
}

impl FakeRuntime {
    pub fn with_containers(containers: &[(&str, bool)]) -> Self {
        let runtime = Self::default();
        {
            let mut running = runtime.running.lock().unwrap();
            for (id, state) in containers {
                running.insert(id.to_string(), *state);
            }
        }
        runtime
    }

    pub fn is_running(&self, id: &str) -> Option<bool> {
        self.running.lock().unwrap().get(id).copied()
    }

    /// Every subsequent call fails with `err`.
    pub fn fail_with(&self, err: RuntimeError) {
        *self.failure.lock().unwrap() = Some(err);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self, id: &str) -> Result<bool, RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        self.is_running(id)
            .ok_or_else(|| RuntimeError::NotFound(id.to_string()))
    }

    fn set(&self, id: &str, running: bool) -> Result<(), RuntimeError> {
        self.enter(id)?;
        self.running.lock().unwrap().insert(id.to_string(), running);
        Ok(())
    }
}

fn status(running: bool) -> String {
    if running { "running" } else { "exited" }.to_string()
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn list(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().unwrap().clone() {
            return Err(err);
        }
        let running = self.running.lock().unwrap();
        let mut containers: Vec<ContainerSummary> = running
            .iter()
            .filter(|(_, r)| all || **r)
            .map(|(id, r)| ContainerSummary {
                id: id.clone(),
                name: id.clone(),
                status: status(*r),
                image: "nginx:latest".to_string(),
                host_port: r.then(|| "8080".to_string()),
                url: None,
            })
            .collect();
        containers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(containers)
    }

    async fn get(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        let running = self.enter(id)?;
        Ok(ContainerDetails {
            id: id.to_string(),
            name: id.to_string(),
            status: status(running),
            image: "nginx:latest".to_string(),
            created: Some("2024-01-01T00:00:00Z".to_string()),
            ports: BTreeMap::new(),
            labels: BTreeMap::new(),
            env: vec!["TZ=UTC".to_string()],
            command: vec!["nginx".to_string()],
            volumes: Vec::new(),
            networks: vec!["bridge".to_string()],
            restart_policy: RestartPolicyView {
                name: "unless-stopped".to_string(),
                maximum_retry_count: 0,
            },
        })
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        self.set(id, true)
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        self.set(id, false)
    }

    async fn restart(&self, id: &str) -> Result<(), RuntimeError> {
        self.set(id, true)
    }

    async fn raw_stats(&self, id: &str) -> Result<RawStatsSample, RuntimeError> {
        self.enter(id)?;
        Ok(RawStatsSample {
            previous: RawCounters {
                cpu_usage_total: 1_000_000_000,
                system_cpu_usage: 10_000_000_000,
                per_core_count: 4,
                ..Default::default()
            },
            current: RawCounters {
                cpu_usage_total: 1_200_000_000,
                system_cpu_usage: 11_000_000_000,
                per_core_count: 4,
                mem_usage: 512 * 1024 * 1024,
                mem_limit: 2048 * 1024 * 1024,
                per_interface_rx: vec![1_000, 2_000],
                per_interface_tx: vec![300],
            },
        })
    }

    async fn logs(&self, id: &str, tail: u32) -> Result<String, RuntimeError> {
        self.enter(id)?;
        Ok((0..tail.min(3))
            .map(|i| format!("2024-01-01T00:00:0{i}Z line {i}\n"))
            .collect())
    }
}

pub struct TestApp {
    pub router: Router,
    pub runtime: Arc<FakeRuntime>,
    pub audit: Arc<AuditLogger>,
    pub limiter: Arc<LoginRateLimiter>,
}

impl TestApp {
    pub async fn audit_count(&self) -> usize {
        self.audit.recent(1_000).await.unwrap().len()
    }
}

/// App with `web` running and `db` stopped, and one account per role.
pub async fn spawn_app() -> TestApp {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    let audit_store = Arc::new(SqliteAuditStore::new(pool.clone()));
    build_app(pool, audit_store).await
}

/// Same as [`spawn_app`] but with a custom audit store.
pub async fn spawn_app_with_audit_store(audit_store: Arc<dyn AuditStore>) -> TestApp {
    let pool = db::connect("sqlite::memory:").await.unwrap();
    build_app(pool, audit_store).await
}

async fn build_app(pool: sqlx::SqlitePool, audit_store: Arc<dyn AuditStore>) -> TestApp {
    let users = Arc::new(SqliteUserStore::new(pool));
    for ((username, password), role) in [
        (ADMIN, Role::Admin),
        (OPERATOR, Role::Operator),
        (VIEWER, Role::ReadOnly),
    ] {
        let hash = hash_password(password, BCRYPT_COST).await.unwrap();
        users.insert(username, &hash, role).await.unwrap();
    }

    let mut config = ServerConfig::with_secret("integration-secret").unwrap();
    config.bcrypt_cost = BCRYPT_COST;
    let config = Arc::new(config);

    let limiter = Arc::new(LoginRateLimiter::new(
        config.login_max_attempts,
        TimeDelta::seconds(config.login_window_secs),
    ));
    let authenticator = Arc::new(
        Authenticator::new(users, limiter.clone(), BCRYPT_COST)
            .await
            .unwrap(),
    );
    let runtime = Arc::new(FakeRuntime::with_containers(&[("web", true), ("db", false)]));
    let audit = Arc::new(AuditLogger::new(audit_store, Duration::from_secs(2)));
    let dispatcher = GatewayDispatcher::new(
        runtime.clone(),
        Arc::new(UnconfiguredHostServices),
        audit.clone(),
        Duration::from_secs(2),
    );
    let router = create_axum_router(
        dispatcher,
        authenticator,
        Arc::new(SessionKeys::new(&config.secret_key)),
        config,
    );

    TestApp {
        router,
        runtime,
        audit,
        limiter,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

/// Builds a request from `client` with an optional bearer token and JSON body.
pub fn request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
    client: [u8; 4],
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let mut req = builder.body(body).unwrap();
    req.extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((client, 40_000))));
    req
}

pub async fn send(router: &Router, req: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(router: &Router, uri: &str, token: Option<&str>) -> TestResponse {
    send(router, request(Method::GET, uri, token, None, DEFAULT_CLIENT)).await
}

pub async fn post(router: &Router, uri: &str, token: Option<&str>) -> TestResponse {
    send(router, request(Method::POST, uri, token, None, DEFAULT_CLIENT)).await
}

pub async fn try_login(
    router: &Router,
    (username, password): (&str, &str),
    client: [u8; 4],
) -> TestResponse {
    let body = serde_json::json!({ "username": username, "password": password });
    send(router, request(Method::POST, "/login", None, Some(body), client)).await
}

/// Logs in and returns the session token.
pub async fn login(router: &Router, credentials: (&str, &str)) -> String {
    let response = try_login(router, credentials, DEFAULT_CLIENT).await;
    assert_eq!(response.status, StatusCode::OK, "login failed: {}", response.body);
    response.body["token"].as_str().unwrap().to_string()
}

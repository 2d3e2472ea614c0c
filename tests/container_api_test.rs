// Container, host service and audit endpoints over HTTP.

use async_trait::async_trait;
use axum::http::{Method, StatusCode, header};
use chrono::{DateTime, Utc};
use std::sync::Arc;

use dockwarden::db::StoreError;
use dockwarden::db::models::AuditEntry;
use dockwarden::db::services::AuditStore;
use dockwarden::runtime::RuntimeError;

mod support;
use support::{
    ADMIN, DEFAULT_CLIENT, OPERATOR, VIEWER, get, login, post, request, send, spawn_app,
    spawn_app_with_audit_store,
};

struct UnwritableAuditStore;

#[async_trait]
impl AuditStore for UnwritableAuditStore {
    async fn append(
        &self,
        _user_id: i64,
        _action: &str,
        _container_id: &str,
        _timestamp: DateTime<Utc>,
    ) -> Result<AuditEntry, StoreError> {
        Err(StoreError::InvalidRecord("database is locked".to_string()))
    }

    async fn recent(&self, _limit: u32) -> Result<Vec<AuditEntry>, StoreError> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn anonymous_requests_never_reach_the_engine() {
    let app = spawn_app().await;

    for uri in ["/containers", "/containers/web", "/containers/web/logs", "/containers/web/stats"] {
        let response = get(&app.router, uri, None).await;
        assert_eq!(response.status, StatusCode::UNAUTHORIZED, "{uri}");
        assert_eq!(response.body["success"], false);
    }
    let response = post(&app.router, "/containers/web/stop", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.runtime.call_count(), 0);
    assert_eq!(app.audit_count().await, 0);
}

#[tokio::test]
async fn listing_includes_links_built_from_host_header() {
    let app = spawn_app().await;
    let token = login(&app.router, VIEWER).await;

    let mut req = request(Method::GET, "/containers", Some(&token), None, DEFAULT_CLIENT);
    req.headers_mut()
        .insert(header::HOST, "nas.local:5000".parse().unwrap());
    let response = send(&app.router, req).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    let containers = response.body["containers"].as_array().unwrap();
    assert_eq!(containers.len(), 2);

    let web = containers.iter().find(|c| c["id"] == "web").unwrap();
    assert_eq!(web["url"], "http://nas.local:8080");
    let db = containers.iter().find(|c| c["id"] == "db").unwrap();
    assert!(db["url"].is_null());
}

#[tokio::test]
async fn listing_running_only() {
    let app = spawn_app().await;
    let token = login(&app.router, VIEWER).await;

    let response = get(&app.router, "/containers?all=false", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["containers"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn inspect_returns_details() {
    let app = spawn_app().await;
    let token = login(&app.router, VIEWER).await;

    let response = get(&app.router, "/containers/web", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["info"]["restart_policy"]["name"], "unless-stopped");
    assert_eq!(response.body["info"]["networks"][0], "bridge");
}

#[tokio::test]
async fn read_only_stop_is_forbidden_and_changes_nothing() {
    let app = spawn_app().await;
    let token = login(&app.router, VIEWER).await;

    let response = post(&app.router, "/containers/web/stop", Some(&token)).await;

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["success"], false);
    assert_eq!(app.runtime.is_running("web"), Some(true));
    assert_eq!(app.runtime.call_count(), 0);
    assert_eq!(app.audit_count().await, 0);
}

#[tokio::test]
async fn operator_start_is_audited_exactly_once() {
    let app = spawn_app().await;
    let token = login(&app.router, OPERATOR).await;

    let response = post(&app.router, "/containers/db/start", Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["status"], "running");
    assert_eq!(response.body["audited"], true);
    assert_eq!(app.runtime.is_running("db"), Some(true));

    let entries = app.audit.recent(10).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, "start");
    assert_eq!(entries[0].container_id, "db");
}

#[tokio::test]
async fn each_mutation_adds_one_entry() {
    let app = spawn_app().await;
    let token = login(&app.router, ADMIN).await;

    for action in ["stop", "start", "restart"] {
        let response = post(&app.router, &format!("/containers/web/{action}"), Some(&token)).await;
        assert_eq!(response.status, StatusCode::OK, "{action}");
    }

    let entries = app.audit.recent(10).await.unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, ["restart", "start", "stop"]);
    assert!(entries.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
}

#[tokio::test]
async fn failed_engine_call_is_not_audited() {
    let app = spawn_app().await;
    let token = login(&app.router, OPERATOR).await;

    let response = post(&app.router, "/containers/missing/restart", Some(&token)).await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.body["success"], false);

    app.runtime
        .fail_with(RuntimeError::Unavailable("socket closed".to_string()));
    let response = post(&app.router, "/containers/web/stop", Some(&token)).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.body["error"], "Container engine unavailable");

    app.runtime
        .fail_with(RuntimeError::Engine("driver failed".to_string()));
    let response = post(&app.router, "/containers/web/stop", Some(&token)).await;
    assert_eq!(response.status, StatusCode::BAD_GATEWAY);

    assert_eq!(app.audit_count().await, 0);
}

#[tokio::test]
async fn audit_write_failure_reports_degraded_success() {
    let app = spawn_app_with_audit_store(Arc::new(UnwritableAuditStore)).await;
    let token = login(&app.router, OPERATOR).await;

    let response = post(&app.router, "/containers/web/stop", Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["success"], true);
    assert_eq!(response.body["status"], "stopped");
    assert_eq!(response.body["audited"], false);
    assert!(response.body["warning"].as_str().unwrap().contains("audit log"));
    assert_eq!(app.runtime.is_running("web"), Some(false));
}

#[tokio::test]
async fn unknown_action_is_rejected() {
    let app = spawn_app().await;
    let token = login(&app.router, ADMIN).await;

    let response = post(&app.router, "/containers/web/pause", Some(&token)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(app.runtime.call_count(), 0);
}

#[tokio::test]
async fn stats_are_derived_from_counters() {
    let app = spawn_app().await;
    let token = login(&app.router, VIEWER).await;

    let response = get(&app.router, "/containers/web/stats", Some(&token)).await;

    assert_eq!(response.status, StatusCode::OK);
    let stats = &response.body["stats"];
    assert_eq!(stats["cpu_percent"], 80.0);
    assert_eq!(stats["mem_percent"], 25.0);
    assert_eq!(stats["rx_bytes"], 3_000);
    assert_eq!(stats["tx_bytes"], 300);
}

#[tokio::test]
async fn logs_respect_tail() {
    let app = spawn_app().await;
    let token = login(&app.router, VIEWER).await;

    let response = get(&app.router, "/containers/web/logs?tail=2", Some(&token)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["logs"].as_str().unwrap().lines().count(), 2);

    let response = get(&app.router, "/containers/web/logs?tail=0", Some(&token)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let response = get(&app.router, "/containers/web/logs?tail=abc", Some(&token)).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["success"], false);
}

#[tokio::test]
async fn audit_trail_is_admin_only() {
    let app = spawn_app().await;
    let operator = login(&app.router, OPERATOR).await;
    let admin = login(&app.router, ADMIN).await;

    post(&app.router, "/containers/web/restart", Some(&operator)).await;

    let response = get(&app.router, "/audit", Some(&operator)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = get(&app.router, "/audit?limit=5", Some(&admin)).await;
    assert_eq!(response.status, StatusCode::OK);
    let entries = response.body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["action"], "restart");
    assert_eq!(entries[0]["container_id"], "web");
}

#[tokio::test]
async fn host_services_without_integration_are_unavailable() {
    let app = spawn_app().await;
    let viewer = login(&app.router, VIEWER).await;
    let admin = login(&app.router, ADMIN).await;

    let response = get(&app.router, "/services", Some(&viewer)).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);

    let response = post(&app.router, "/services/smbd/restart", Some(&viewer)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = post(&app.router, "/services/smbd/restart", Some(&admin)).await;
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(app.audit_count().await, 0);
}

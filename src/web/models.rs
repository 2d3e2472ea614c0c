use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::db::enums::Role;
use crate::server::dispatcher::GatewayReply;

#[derive(Deserialize, Debug)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub remember: bool,
}

#[derive(Serialize, Debug)]
pub struct UserInfo {
    pub id: i64,
    pub username: String,
    pub role: Role,
}

#[derive(Serialize, Debug)]
pub struct LoginResponse {
    pub success: bool,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserInfo,
}

#[derive(Deserialize, Debug, Default)]
pub struct ListContainersQuery {
    pub all: Option<bool>,
}

#[derive(Deserialize, Debug, Default)]
pub struct LogsQuery {
    pub tail: Option<u32>,
}

#[derive(Deserialize, Debug, Default)]
pub struct AuditQuery {
    pub limit: Option<u32>,
}

/// Wraps a dispatcher reply in the `{success, ...}` envelope.
pub fn envelope(reply: GatewayReply) -> Json<Value> {
    let body = match reply {
        GatewayReply::Containers(containers) => json!({ "success": true, "containers": containers }),
        GatewayReply::Info(info) => json!({ "success": true, "info": info }),
        GatewayReply::Logs(logs) => json!({ "success": true, "logs": logs }),
        GatewayReply::Stats(stats) => json!({ "success": true, "stats": stats }),
        GatewayReply::Control {
            status,
            audited: true,
            ..
        } => json!({ "success": true, "status": status, "audited": true }),
        GatewayReply::Control {
            status, warning, ..
        } => json!({
            "success": true,
            "status": status,
            "audited": false,
            "warning": warning,
        }),
        GatewayReply::Services(services) => json!({ "success": true, "services": services }),
        GatewayReply::AuditEntries(entries) => json!({ "success": true, "entries": entries }),
    };
    Json(body)
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::db::StoreError;
use crate::db::enums::ControlAction;
use crate::db::models::AuditEntry;
use crate::runtime::{ContainerDetails, ContainerRuntime, ContainerSummary, DEFAULT_LOG_TAIL, RuntimeError};
use crate::services::audit_logger::AuditLogger;
use crate::services::auth_service::Session;
use crate::services::authorizer::{AuthzError, Operation, authorize};
use crate::services::host_service::{HostService, HostServices};
use crate::services::stats_calculator::{ContainerStatsSnapshot, compute_stats};

pub const MAX_LOG_TAIL: u32 = 10_000;
pub const DEFAULT_AUDIT_LIMIT: u32 = 100;
pub const MAX_AUDIT_LIMIT: u32 = 1_000;

/// One logical gateway action. Each variant maps to exactly one [`Operation`].
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
    ListContainers {
        all: bool,
        /// Scheme and host the console was reached on, used to build links.
        public_base: Option<String>,
    },
    InspectContainer {
        id: String,
    },
    ContainerLogs {
        id: String,
        tail: Option<u32>,
    },
    ContainerStats {
        id: String,
    },
    ControlContainer {
        id: String,
        action: ControlAction,
    },
    ListHostServices,
    ControlHostService {
        name: String,
        action: ControlAction,
    },
    ReadAuditLog {
        limit: Option<u32>,
    },
}

impl GatewayRequest {
    pub fn operation(&self) -> Operation {
        match self {
            GatewayRequest::ListContainers { .. } => Operation::ListContainers,
            GatewayRequest::InspectContainer { .. } => Operation::InspectContainer,
            GatewayRequest::ContainerLogs { .. } => Operation::ReadContainerLogs,
            GatewayRequest::ContainerStats { .. } => Operation::ReadContainerStats,
            GatewayRequest::ControlContainer { action, .. } => match action {
                ControlAction::Start => Operation::StartContainer,
                ControlAction::Stop => Operation::StopContainer,
                ControlAction::Restart => Operation::RestartContainer,
            },
            GatewayRequest::ListHostServices => Operation::ListHostServices,
            GatewayRequest::ControlHostService { .. } => Operation::ControlHostService,
            GatewayRequest::ReadAuditLog { .. } => Operation::ReadAuditLog,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayReply {
    Containers(Vec<ContainerSummary>),
    Info(ContainerDetails),
    Logs(String),
    Stats(ContainerStatsSnapshot),
    /// Result of a mutation. `audited == false` means the action took effect
    /// but the audit trail is missing the entry.
    Control {
        status: String,
        audited: bool,
        warning: Option<String>,
    },
    Services(Vec<HostService>),
    AuditEntries(Vec<AuditEntry>),
}

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Authz(#[from] AuthzError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("{0}")]
    Validation(String),
}

#[derive(Clone)]
pub struct GatewayDispatcher {
    runtime: Arc<dyn ContainerRuntime>,
    host: Arc<dyn HostServices>,
    audit: Arc<AuditLogger>,
    host_timeout: Duration,
}

impl GatewayDispatcher {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        host: Arc<dyn HostServices>,
        audit: Arc<AuditLogger>,
        host_timeout: Duration,
    ) -> Self {
        Self {
            runtime,
            host,
            audit,
            host_timeout,
        }
    }

    /// Authorizes `request` for `session` and, only if permitted, carries it out.
    pub async fn dispatch(
        &self,
        session: Option<&Session>,
        request: GatewayRequest,
    ) -> Result<GatewayReply, GatewayError> {
        let operation = request.operation();
        authorize(session, operation).inspect_err(|e| {
            warn!(
                operation = %operation,
                user = session.map(|s| s.username.as_str()),
                error = %e,
                "Request denied."
            );
        })?;
        let session = session.ok_or(AuthzError::Unauthenticated)?;

        match request {
            GatewayRequest::ListContainers { all, public_base } => {
                let containers = self
                    .runtime
                    .list(all)
                    .await?
                    .into_iter()
                    .map(|c| c.with_external_url(public_base.as_deref()))
                    .collect();
                Ok(GatewayReply::Containers(containers))
            }
            GatewayRequest::InspectContainer { id } => {
                let id = validate_name("container id", &id)?;
                Ok(GatewayReply::Info(self.runtime.get(id).await?))
            }
            GatewayRequest::ContainerLogs { id, tail } => {
                let id = validate_name("container id", &id)?;
                let tail = tail.unwrap_or(DEFAULT_LOG_TAIL);
                if tail == 0 || tail > MAX_LOG_TAIL {
                    return Err(GatewayError::Validation(format!(
                        "tail must be between 1 and {MAX_LOG_TAIL}"
                    )));
                }
                Ok(GatewayReply::Logs(self.runtime.logs(id, tail).await?))
            }
            GatewayRequest::ContainerStats { id } => {
                let id = validate_name("container id", &id)?;
                let sample = self.runtime.raw_stats(id).await?;
                Ok(GatewayReply::Stats(compute_stats(&sample.previous, &sample.current)))
            }
            GatewayRequest::ControlContainer { id, action } => {
                let id = validate_name("container id", &id)?;
                match action {
                    ControlAction::Start => self.runtime.start(id).await?,
                    ControlAction::Stop => self.runtime.stop(id).await?,
                    ControlAction::Restart => self.runtime.restart(id).await?,
                }
                info!(user = %session.username, container_id = %id, action = %action, "Container action applied.");
                Ok(self.audited(session, action.as_str(), id, action).await)
            }
            GatewayRequest::ListHostServices => {
                let services = self.bounded_host(self.host.list()).await?;
                Ok(GatewayReply::Services(services))
            }
            GatewayRequest::ControlHostService { name, action } => {
                let name = validate_name("service name", &name)?;
                self.bounded_host(self.host.control(name, action)).await?;
                info!(user = %session.username, service = %name, action = %action, "Host service action applied.");
                let tag = format!("service:{action}");
                Ok(self.audited(session, &tag, name, action).await)
            }
            GatewayRequest::ReadAuditLog { limit } => {
                let limit = limit.unwrap_or(DEFAULT_AUDIT_LIMIT);
                if limit == 0 || limit > MAX_AUDIT_LIMIT {
                    return Err(GatewayError::Validation(format!(
                        "limit must be between 1 and {MAX_AUDIT_LIMIT}"
                    )));
                }
                Ok(GatewayReply::AuditEntries(self.audit.recent(limit).await?))
            }
        }
    }

    async fn audited(
        &self,
        session: &Session,
        tag: &str,
        target: &str,
        action: ControlAction,
    ) -> GatewayReply {
        let status = action.resulting_status().to_string();
        match self.audit.record(session.user_id, tag, target).await {
            Ok(entry) => {
                debug!(audit_id = entry.id, "Mutation audited.");
                GatewayReply::Control {
                    status,
                    audited: true,
                    warning: None,
                }
            }
            Err(failure) => {
                error!(
                    user_id = session.user_id,
                    action = tag,
                    target,
                    error = %failure,
                    "Action applied but not audited; reconcile manually."
                );
                GatewayReply::Control {
                    status,
                    audited: false,
                    warning: Some(format!(
                        "Action '{tag}' on '{target}' was applied but could not be recorded in the audit log: {failure}"
                    )),
                }
            }
        }
    }

    async fn bounded_host<T>(
        &self,
        call: impl Future<Output = Result<T, RuntimeError>>,
    ) -> Result<T, RuntimeError> {
        tokio::time::timeout(self.host_timeout, call)
            .await
            .map_err(|_| {
                RuntimeError::Unavailable(format!(
                    "host service manager did not respond within {:?}",
                    self.host_timeout
                ))
            })?
    }
}

/// Ids and service names are forwarded to external systems; only plain
/// identifier characters are accepted.
fn validate_name<'a>(what: &str, value: &'a str) -> Result<&'a str, GatewayError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(GatewayError::Validation(format!("{what} must not be empty")));
    }
    let valid = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '@'));
    if !valid {
        return Err(GatewayError::Validation(format!(
            "{what} contains invalid characters"
        )));
    }
    Ok(value)
}

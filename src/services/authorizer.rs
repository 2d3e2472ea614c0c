//! Declarative role gating.
//!
//! Every gateway operation names the exact set of roles allowed to perform
//! it. Roles are not ranked: an operation open to operators is not implicitly
//! open to anyone else unless listed.

use std::fmt;
use thiserror::Error;

use crate::db::enums::Role;
use crate::services::auth_service::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ListContainers,
    InspectContainer,
    ReadContainerLogs,
    ReadContainerStats,
    StartContainer,
    StopContainer,
    RestartContainer,
    ListHostServices,
    ControlHostService,
    ReadAuditLog,
}

const READERS: &[Role] = &[Role::ReadOnly, Role::Operator, Role::Admin];
const CONTROLLERS: &[Role] = &[Role::Operator, Role::Admin];
const ADMINS: &[Role] = &[Role::Admin];

impl Operation {
    pub const ALL: [Operation; 10] = [
        Operation::ListContainers,
        Operation::InspectContainer,
        Operation::ReadContainerLogs,
        Operation::ReadContainerStats,
        Operation::StartContainer,
        Operation::StopContainer,
        Operation::RestartContainer,
        Operation::ListHostServices,
        Operation::ControlHostService,
        Operation::ReadAuditLog,
    ];

    pub fn permitted_roles(&self) -> &'static [Role] {
        match self {
            Operation::ListContainers
            | Operation::InspectContainer
            | Operation::ReadContainerLogs
            | Operation::ReadContainerStats
            | Operation::ListHostServices => READERS,
            Operation::StartContainer | Operation::StopContainer | Operation::RestartContainer => {
                CONTROLLERS
            }
            Operation::ControlHostService | Operation::ReadAuditLog => ADMINS,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::ListContainers => "list_containers",
            Operation::InspectContainer => "inspect_container",
            Operation::ReadContainerLogs => "read_container_logs",
            Operation::ReadContainerStats => "read_container_stats",
            Operation::StartContainer => "start_container",
            Operation::StopContainer => "stop_container",
            Operation::RestartContainer => "restart_container",
            Operation::ListHostServices => "list_host_services",
            Operation::ControlHostService => "control_host_service",
            Operation::ReadAuditLog => "read_audit_log",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Role '{role}' may not perform {operation}")]
    Forbidden { role: Role, operation: Operation },
}

pub fn authorize(session: Option<&Session>, operation: Operation) -> Result<(), AuthzError> {
    let session = session.ok_or(AuthzError::Unauthenticated)?;
    if operation.permitted_roles().contains(&session.role) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden {
            role: session.role,
            operation,
        })
    }
}

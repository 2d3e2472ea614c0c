use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::db::enums::ControlAction;
use crate::runtime::RuntimeError;

/// A service managed by the host's init system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostService {
    pub name: String,
    pub state: String,
}

/// Narrow interface to the host's service manager. The gateway never runs
/// system tools itself; integrations live behind this trait and are called
/// under the same timeout as container engine calls.
#[async_trait]
pub trait HostServices: Send + Sync {
    async fn list(&self) -> Result<Vec<HostService>, RuntimeError>;

    async fn control(&self, name: &str, action: ControlAction) -> Result<(), RuntimeError>;
}

/// Used when no host integration is configured; every call reports the
/// integration as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredHostServices;

#[async_trait]
impl HostServices for UnconfiguredHostServices {
    async fn list(&self) -> Result<Vec<HostService>, RuntimeError> {
        Err(RuntimeError::Unavailable(
            "host service integration is not configured".to_string(),
        ))
    }

    async fn control(&self, _name: &str, _action: ControlAction) -> Result<(), RuntimeError> {
        Err(RuntimeError::Unavailable(
            "host service integration is not configured".to_string(),
        ))
    }
}

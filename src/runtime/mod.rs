//! Container engine access.
//!
//! The gateway only talks to the engine through [`ContainerRuntime`]; the
//! Docker implementation lives in [`docker`].

pub mod docker;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub const DEFAULT_LOG_TAIL: u32 = 100;
pub const UNKNOWN_IMAGE: &str = "unknown";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("No such container: {0}")]
    NotFound(String),
    #[error("Container engine unavailable: {0}")]
    Unavailable(String),
    #[error("Container engine error: {0}")]
    Engine(String),
}

/// Row of the container listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub name: String,
    pub status: String,
    pub image: String,
    pub host_port: Option<String>,
    pub url: Option<String>,
}

impl ContainerSummary {
    /// Fills `url` from the console's own host, e.g. `http://nas.local` plus
    /// the mapped host port.
    pub fn with_external_url(mut self, base: Option<&str>) -> Self {
        self.url = match (base, self.host_port.as_deref()) {
            (Some(base), Some(port)) => Some(format!("{base}:{port}")),
            _ => None,
        };
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortBindingView {
    pub host_ip: Option<String>,
    pub host_port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestartPolicyView {
    pub name: String,
    pub maximum_retry_count: i64,
}

/// Detailed descriptor of a single container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub id: String,
    pub name: String,
    pub status: String,
    pub image: String,
    pub created: Option<String>,
    pub ports: BTreeMap<String, Vec<PortBindingView>>,
    pub labels: BTreeMap<String, String>,
    pub env: Vec<String>,
    pub command: Vec<String>,
    pub volumes: Vec<String>,
    pub networks: Vec<String>,
    pub restart_policy: RestartPolicyView,
}

/// One reading of the engine's cumulative counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCounters {
    pub cpu_usage_total: u64,
    pub system_cpu_usage: u64,
    pub per_core_count: u32,
    pub mem_usage: u64,
    pub mem_limit: u64,
    pub per_interface_rx: Vec<u64>,
    pub per_interface_tx: Vec<u64>,
}

/// Two consecutive readings as reported by a single stats query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawStatsSample {
    pub previous: RawCounters,
    pub current: RawCounters,
}

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn list(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError>;

    async fn get(&self, id: &str) -> Result<ContainerDetails, RuntimeError>;

    /// Starting a running container succeeds without doing anything.
    async fn start(&self, id: &str) -> Result<(), RuntimeError>;

    /// Stopping a stopped container succeeds without doing anything.
    async fn stop(&self, id: &str) -> Result<(), RuntimeError>;

    async fn restart(&self, id: &str) -> Result<(), RuntimeError>;

    async fn raw_stats(&self, id: &str) -> Result<RawStatsSample, RuntimeError>;

    /// Last `tail` log lines, each prefixed with its timestamp.
    async fn logs(&self, id: &str, tail: u32) -> Result<String, RuntimeError>;
}

/// Parses a `major.minor` engine API version such as `1.41`.
pub fn parse_api_version(value: &str) -> Option<(usize, usize)> {
    let value = value.trim().trim_start_matches('v');
    let (major, minor) = value.split_once('.')?;
    Some((major.parse().ok()?, minor.parse().ok()?))
}

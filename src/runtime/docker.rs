use async_trait::async_trait;
use bollard::container::{
    InspectContainerOptions, ListContainersOptions, LogsOptions, RestartContainerOptions,
    StartContainerOptions, Stats, StatsOptions, StopContainerOptions,
};
use bollard::errors::Error as BollardError;
use bollard::models::{ContainerInspectResponse, ContainerSummary as EngineSummary};
use bollard::{API_DEFAULT_VERSION, ClientVersion, Docker};
use futures_util::StreamExt;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{
    ContainerDetails, ContainerRuntime, ContainerSummary, PortBindingView, RawCounters,
    RawStatsSample, RestartPolicyView, RuntimeError, UNKNOWN_IMAGE, parse_api_version,
};

const DEFAULT_SOCKET_PATH: &str = "/var/run/docker.sock";
const NOT_MODIFIED: u16 = 304;
const NOT_FOUND: u16 = 404;

/// [`ContainerRuntime`] backed by the Docker Engine API.
///
/// Every call is bounded by `timeout`; an elapsed timeout is reported as
/// [`RuntimeError::Unavailable`].
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
    timeout: Duration,
}

impl DockerRuntime {
    /// Connects to `endpoint` (`unix://`, `tcp://` or `http://`), or to the
    /// local engine when no endpoint is given.
    pub fn connect(
        endpoint: Option<&str>,
        api_version: Option<&str>,
        timeout: Duration,
    ) -> Result<Self, RuntimeError> {
        let version = match api_version {
            Some(raw) => {
                let (major_version, minor_version) = parse_api_version(raw).ok_or_else(|| {
                    RuntimeError::Engine(format!("invalid engine API version '{raw}'"))
                })?;
                ClientVersion {
                    major_version,
                    minor_version,
                }
            }
            None => ClientVersion {
                major_version: API_DEFAULT_VERSION.major_version,
                minor_version: API_DEFAULT_VERSION.minor_version,
            },
        };
        let timeout_secs = timeout.as_secs().max(1);

        let docker = match endpoint {
            Some(url) if url.starts_with("tcp://") || url.starts_with("http://") => {
                let addr = url.replacen("tcp://", "http://", 1);
                Docker::connect_with_http(&addr, timeout_secs, &version)
            }
            Some(url) => {
                let path = url.strip_prefix("unix://").unwrap_or(url);
                Docker::connect_with_socket(path, timeout_secs, &version)
            }
            None => Docker::connect_with_socket(DEFAULT_SOCKET_PATH, timeout_secs, &version),
        }
        .map_err(|e| RuntimeError::Unavailable(e.to_string()))?;

        info!(
            endpoint = endpoint.unwrap_or(DEFAULT_SOCKET_PATH),
            api_version = %format!("{}.{}", version.major_version, version.minor_version),
            "Container engine client configured."
        );
        Ok(Self { docker, timeout })
    }

    async fn bounded<T, F>(&self, id: &str, call: F) -> Result<T, RuntimeError>
    where
        F: Future<Output = Result<T, BollardError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result.map_err(|e| classify(e, id)),
            Err(_) => {
                warn!(container = %id, timeout = ?self.timeout, "Container engine call timed out.");
                Err(RuntimeError::Unavailable(format!(
                    "no response from container engine within {}s",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}

#[async_trait]
impl ContainerRuntime for DockerRuntime {
    async fn list(&self, all: bool) -> Result<Vec<ContainerSummary>, RuntimeError> {
        let options = ListContainersOptions::<String> {
            all,
            ..Default::default()
        };
        let items = self
            .bounded("*", self.docker.list_containers(Some(options)))
            .await?;
        Ok(items.into_iter().filter_map(summarize).collect())
    }

    async fn get(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        let response = self
            .bounded(
                id,
                self.docker
                    .inspect_container(id, None::<InspectContainerOptions>),
            )
            .await?;
        Ok(describe(response))
    }

    async fn start(&self, id: &str) -> Result<(), RuntimeError> {
        let call = async {
            match self
                .docker
                .start_container(id, None::<StartContainerOptions<String>>)
                .await
            {
                Err(BollardError::DockerResponseServerError {
                    status_code: NOT_MODIFIED,
                    ..
                }) => {
                    debug!(container = %id, "Container already running.");
                    Ok(())
                }
                other => other,
            }
        };
        self.bounded(id, call).await
    }

    async fn stop(&self, id: &str) -> Result<(), RuntimeError> {
        let call = async {
            match self
                .docker
                .stop_container(id, None::<StopContainerOptions>)
                .await
            {
                Err(BollardError::DockerResponseServerError {
                    status_code: NOT_MODIFIED,
                    ..
                }) => {
                    debug!(container = %id, "Container already stopped.");
                    Ok(())
                }
                other => other,
            }
        };
        self.bounded(id, call).await
    }

    async fn restart(&self, id: &str) -> Result<(), RuntimeError> {
        self.bounded(
            id,
            self.docker
                .restart_container(id, None::<RestartContainerOptions>),
        )
        .await
    }

    async fn raw_stats(&self, id: &str) -> Result<RawStatsSample, RuntimeError> {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
        };
        let call = async {
            let mut stream = Box::pin(self.docker.stats(id, Some(options)));
            stream.next().await.transpose()
        };
        match self.bounded(id, call).await? {
            Some(stats) => Ok(sample_from_stats(&stats)),
            None => Err(RuntimeError::Engine(format!(
                "engine returned no stats for container {id}"
            ))),
        }
    }

    async fn logs(&self, id: &str, tail: u32) -> Result<String, RuntimeError> {
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            timestamps: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        let call = async {
            let mut stream = Box::pin(self.docker.logs(id, Some(options)));
            let mut output = String::new();
            while let Some(chunk) = stream.next().await {
                output.push_str(&String::from_utf8_lossy(&chunk?.into_bytes()));
            }
            Ok::<_, BollardError>(output)
        };
        self.bounded(id, call).await
    }
}

fn classify(err: BollardError, id: &str) -> RuntimeError {
    match err {
        BollardError::DockerResponseServerError {
            status_code: NOT_FOUND,
            ..
        } => RuntimeError::NotFound(id.to_string()),
        BollardError::DockerResponseServerError {
            status_code,
            message,
        } => RuntimeError::Engine(format!("{message} (status {status_code})")),
        BollardError::RequestTimeoutError => {
            RuntimeError::Unavailable("request to container engine timed out".to_string())
        }
        e @ (BollardError::IOError { .. } | BollardError::HyperLegacyError { .. }) => {
            RuntimeError::Unavailable(e.to_string())
        }
        other => RuntimeError::Engine(other.to_string()),
    }
}

/// Projects a listing entry, degrading missing metadata instead of failing.
fn summarize(item: EngineSummary) -> Option<ContainerSummary> {
    let Some(id) = item.id.filter(|id| !id.is_empty()) else {
        warn!("Skipping container listing entry without an id.");
        return None;
    };

    let name = item
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|name| name.trim_start_matches('/').to_string())
        .unwrap_or_else(|| short_id(&id));

    let host_port = item
        .ports
        .as_ref()
        .and_then(|ports| ports.iter().find_map(|port| port.public_port))
        .map(|port| port.to_string());

    Some(ContainerSummary {
        name,
        status: item
            .state
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        image: item
            .image
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| UNKNOWN_IMAGE.to_string()),
        host_port,
        url: None,
        id,
    })
}

fn describe(response: ContainerInspectResponse) -> ContainerDetails {
    let id = response.id.unwrap_or_default();
    let config = response.config.unwrap_or_default();
    let host_config = response.host_config.unwrap_or_default();
    let network_settings = response.network_settings.unwrap_or_default();

    let ports = network_settings
        .ports
        .unwrap_or_default()
        .into_iter()
        .map(|(container_port, bindings)| {
            let bindings = bindings
                .unwrap_or_default()
                .into_iter()
                .map(|binding| PortBindingView {
                    host_ip: binding.host_ip,
                    host_port: binding.host_port,
                })
                .collect();
            (container_port, bindings)
        })
        .collect();

    let mut networks: Vec<String> = network_settings
        .networks
        .unwrap_or_default()
        .into_keys()
        .collect();
    networks.sort();

    let restart_policy = host_config.restart_policy.unwrap_or_default();

    ContainerDetails {
        name: response
            .name
            .map(|name| name.trim_start_matches('/').to_string())
            .unwrap_or_else(|| short_id(&id)),
        status: response
            .state
            .and_then(|state| state.status)
            .map(|status| status.to_string())
            .filter(|status| !status.is_empty())
            .unwrap_or_else(|| "unknown".to_string()),
        image: config
            .image
            .filter(|image| !image.is_empty())
            .unwrap_or_else(|| UNKNOWN_IMAGE.to_string()),
        created: response.created,
        ports,
        labels: config.labels.unwrap_or_default().into_iter().collect::<BTreeMap<_, _>>(),
        env: config.env.unwrap_or_default(),
        command: config.cmd.unwrap_or_default(),
        volumes: host_config.binds.unwrap_or_default(),
        networks,
        restart_policy: RestartPolicyView {
            name: restart_policy
                .name
                .map(|name| name.to_string())
                .filter(|name| !name.is_empty())
                .unwrap_or_else(|| "no".to_string()),
            maximum_retry_count: restart_policy.maximum_retry_count.unwrap_or(0),
        },
        id,
    }
}

fn sample_from_stats(stats: &Stats) -> RawStatsSample {
    let cores = core_count(
        stats.cpu_stats.cpu_usage.percpu_usage.as_deref(),
        stats.cpu_stats.online_cpus,
    );

    let (rx, tx): (Vec<u64>, Vec<u64>) = stats
        .networks
        .as_ref()
        .map(|networks| {
            networks
                .values()
                .map(|net| (net.rx_bytes, net.tx_bytes))
                .unzip()
        })
        .unwrap_or_default();

    let mem_usage = stats.memory_stats.usage.unwrap_or(0);
    let mem_limit = stats.memory_stats.limit.unwrap_or(0);

    RawStatsSample {
        previous: RawCounters {
            cpu_usage_total: stats.precpu_stats.cpu_usage.total_usage,
            system_cpu_usage: stats.precpu_stats.system_cpu_usage.unwrap_or(0),
            per_core_count: cores,
            mem_usage,
            mem_limit,
            per_interface_rx: Vec::new(),
            per_interface_tx: Vec::new(),
        },
        current: RawCounters {
            cpu_usage_total: stats.cpu_stats.cpu_usage.total_usage,
            system_cpu_usage: stats.cpu_stats.system_cpu_usage.unwrap_or(0),
            per_core_count: cores,
            mem_usage,
            mem_limit,
            per_interface_rx: rx,
            per_interface_tx: tx,
        },
    }
}

/// Per-CPU usage entries when the engine reports them (cgroup v1), otherwise
/// the online CPU count, otherwise one.
fn core_count(percpu_usage: Option<&[u64]>, online_cpus: Option<u64>) -> u32 {
    percpu_usage
        .map(<[u64]>::len)
        .filter(|n| *n > 0)
        .and_then(|n| u32::try_from(n).ok())
        .or_else(|| {
            online_cpus
                .filter(|n| *n > 0)
                .and_then(|n| u32::try_from(n).ok())
        })
        .unwrap_or(1)
}

fn short_id(id: &str) -> String {
    id.chars().take(12).collect()
}

use serde::{Deserialize, Serialize};

use crate::runtime::RawCounters;

/// Resource usage derived from two consecutive counter readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerStatsSnapshot {
    pub cpu_percent: f64,
    pub mem_usage: u64,
    pub mem_limit: u64,
    pub mem_percent: f64,
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

/// Derives CPU and memory percentages plus network totals.
///
/// CPU% is scaled by the core count and is not capped, so a busy container
/// on a 4-core host can report up to 400%. Memory% stays within 0..=100.
pub fn compute_stats(prev: &RawCounters, curr: &RawCounters) -> ContainerStatsSnapshot {
    let cpu_delta = i128::from(curr.cpu_usage_total) - i128::from(prev.cpu_usage_total);
    let system_delta = i128::from(curr.system_cpu_usage) - i128::from(prev.system_cpu_usage);

    let cpu_percent = if system_delta > 0 && cpu_delta > 0 {
        (cpu_delta as f64 / system_delta as f64) * f64::from(curr.per_core_count.max(1)) * 100.0
    } else {
        0.0
    };

    let mem_percent = if curr.mem_limit > 0 {
        ((curr.mem_usage as f64 / curr.mem_limit as f64) * 100.0).min(100.0)
    } else {
        0.0
    };

    ContainerStatsSnapshot {
        cpu_percent: round2(cpu_percent),
        mem_usage: curr.mem_usage,
        mem_limit: curr.mem_limit,
        mem_percent: round2(mem_percent),
        rx_bytes: curr.per_interface_rx.iter().sum(),
        tx_bytes: curr.per_interface_tx.iter().sum(),
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// Resource usage models

use serde::{Deserialize, Serialize};

/// Point-in-time reading of cumulative CPU counters. Only meaningful against a prior snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CounterSnapshot {
    pub cpu_total_usage: u64,
    pub cpu_system_usage: u64,
    pub online_cpus: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatSample {
    pub target: String,
    pub cpu_percent: f64,
    pub mem_used: u64,
    pub mem_limit: u64,
    /// Omitted when the container reports no memory limit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mem_percent: Option<f64>,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
}

// Delta-based resource figures from two cumulative counter snapshots.

use async_trait::async_trait;

use crate::models::{CounterSnapshot, StatSample};

/// Supplies one StatSample per running container.
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn sample(&self) -> anyhow::Result<Vec<StatSample>>;
}

/// CPU usage in percent of one CPU (so up to `online_cpus * 100`).
///
/// Zero when either delta is zero or negative (idle interval, counter reset); never negative.
pub fn cpu_percent(prev: &CounterSnapshot, curr: &CounterSnapshot) -> f64 {
    let (Some(delta), Some(system_delta)) = (
        curr.cpu_total_usage.checked_sub(prev.cpu_total_usage),
        curr.cpu_system_usage.checked_sub(prev.cpu_system_usage),
    ) else {
        return 0.0;
    };
    if delta == 0 || system_delta == 0 {
        return 0.0;
    }
    (delta as f64 / system_delta as f64) * curr.online_cpus as f64 * 100.0
}

/// `None` when there is no limit to compare against.
pub fn mem_percent(used: u64, limit: u64) -> Option<f64> {
    if limit == 0 {
        return None;
    }
    Some((used as f64 / limit as f64 * 100.0).min(100.0))
}

/// Sum of (rx, tx) byte counters over all interfaces.
pub fn network_totals(interfaces: impl IntoIterator<Item = (u64, u64)>) -> (u64, u64) {
    interfaces
        .into_iter()
        .fold((0u64, 0u64), |(rx, tx), (r, t)| {
            (rx.saturating_add(r), tx.saturating_add(t))
        })
}

/// Memory and network readings taken with the current snapshot.
#[derive(Debug, Clone, Copy, Default)]
pub struct UsageReading {
    pub mem_used: u64,
    pub mem_limit: u64,
    pub net_rx_bytes: u64,
    pub net_tx_bytes: u64,
}

pub fn sample(
    target: &str,
    prev: &CounterSnapshot,
    curr: &CounterSnapshot,
    usage: UsageReading,
) -> StatSample {
    StatSample {
        target: target.to_string(),
        cpu_percent: cpu_percent(prev, curr),
        mem_used: usage.mem_used,
        mem_limit: usage.mem_limit,
        mem_percent: mem_percent(usage.mem_used, usage.mem_limit),
        net_rx_bytes: usage.net_rx_bytes,
        net_tx_bytes: usage.net_tx_bytes,
    }
}

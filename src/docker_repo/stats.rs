// Turn a one-shot Docker stats response into a StatSample.

use bollard::models::{ContainerCpuStats, ContainerStatsResponse};

use crate::models::{CounterSnapshot, StatSample};
use crate::stats::{self, UsageReading};

/// `None` when the daemon did not report both CPU snapshots.
pub(crate) fn process_statistics(s: &ContainerStatsResponse, name: &str) -> Option<StatSample> {
    let curr = snapshot(s.cpu_stats.as_ref()?)?;
    let prev = snapshot(s.precpu_stats.as_ref()?)?;

    let memory = s.memory_stats.as_ref();
    let (net_rx_bytes, net_tx_bytes) = stats::network_totals(
        s.networks
            .iter()
            .flat_map(|n| n.values())
            .map(|v| (v.rx_bytes.unwrap_or(0), v.tx_bytes.unwrap_or(0))),
    );

    Some(stats::sample(
        name,
        &prev,
        &curr,
        UsageReading {
            mem_used: memory.and_then(|m| m.usage).unwrap_or(0),
            mem_limit: memory.and_then(|m| m.limit).unwrap_or(0),
            net_rx_bytes,
            net_tx_bytes,
        },
    ))
}

fn snapshot(cpu: &ContainerCpuStats) -> Option<CounterSnapshot> {
    let usage = cpu.cpu_usage.as_ref()?;
    let online_cpus = cpu
        .online_cpus
        .filter(|n| *n > 0)
        .or_else(|| {
            usage
                .percpu_usage
                .as_ref()
                .map(|p| p.len() as u32)
                .filter(|n| *n > 0)
        })
        .unwrap_or(1);
    Some(CounterSnapshot {
        cpu_total_usage: usage.total_usage.unwrap_or(0),
        cpu_system_usage: cpu.system_cpu_usage.unwrap_or(0),
        online_cpus,
    })
}

// Prometheus exposition for the status API: probe outcomes and container resource gauges.

use prometheus::core::Collector;
use prometheus::{Counter, CounterVec, Encoder, GaugeVec, Registry, TextEncoder, opts};
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::{Classification, ProbeResult, StatSample};

pub struct Metrics {
    registry: Registry,
    /// Serializes reset + set + encode so concurrent scrapes never see half a cycle.
    update: Mutex<()>,
    pub probe_up: GaugeVec,
    pub probe_degraded: GaugeVec,
    pub probe_latency_ms: GaugeVec,
    pub container_cpu_percent: GaugeVec,
    pub container_memory_used_bytes: GaugeVec,
    pub container_memory_limit_bytes: GaugeVec,
    pub container_memory_percent: GaugeVec,
    pub container_network_rx_bytes: GaugeVec,
    pub container_network_tx_bytes: GaugeVec,
    pub scrape_count_total: Counter,
    pub collect_errors_total: CounterVec,
}

impl Metrics {
    pub fn new() -> Result<Arc<Self>, prometheus::Error> {
        let registry = Registry::new();
        let probe_labels = &["target", "port"];
        let container_labels = &["container"];

        let probe_up = GaugeVec::new(
            opts!(
                "dockwatch_probe_up",
                "1 when the port answered 200 below the latency threshold"
            ),
            probe_labels,
        )?;
        let probe_degraded = GaugeVec::new(
            opts!(
                "dockwatch_probe_degraded",
                "1 when the port answered with a non-200 status or too slowly"
            ),
            probe_labels,
        )?;
        let probe_latency_ms = GaugeVec::new(
            opts!(
                "dockwatch_probe_latency_ms",
                "Time until the probe response or failure in milliseconds"
            ),
            probe_labels,
        )?;
        let container_cpu_percent = GaugeVec::new(
            opts!(
                "dockwatch_container_cpu_percent",
                "CPU usage in percent of one CPU"
            ),
            container_labels,
        )?;
        let container_memory_used_bytes = GaugeVec::new(
            opts!("dockwatch_container_memory_used_bytes", "Memory in use"),
            container_labels,
        )?;
        let container_memory_limit_bytes = GaugeVec::new(
            opts!("dockwatch_container_memory_limit_bytes", "Memory limit"),
            container_labels,
        )?;
        let container_memory_percent = GaugeVec::new(
            opts!(
                "dockwatch_container_memory_percent",
                "Memory in use relative to the limit; absent without a limit"
            ),
            container_labels,
        )?;
        let container_network_rx_bytes = GaugeVec::new(
            opts!(
                "dockwatch_container_network_rx_bytes",
                "Bytes received over all interfaces"
            ),
            container_labels,
        )?;
        let container_network_tx_bytes = GaugeVec::new(
            opts!(
                "dockwatch_container_network_tx_bytes",
                "Bytes sent over all interfaces"
            ),
            container_labels,
        )?;
        let scrape_count_total = Counter::with_opts(opts!(
            "dockwatch_scrape_count_total",
            "Number of /metrics requests served"
        ))?;
        let collect_errors_total = CounterVec::new(
            opts!(
                "dockwatch_collect_errors_total",
                "Failed collections by stage"
            ),
            &["stage"],
        )?;

        register(&registry, &probe_up)?;
        register(&registry, &probe_degraded)?;
        register(&registry, &probe_latency_ms)?;
        register(&registry, &container_cpu_percent)?;
        register(&registry, &container_memory_used_bytes)?;
        register(&registry, &container_memory_limit_bytes)?;
        register(&registry, &container_memory_percent)?;
        register(&registry, &container_network_rx_bytes)?;
        register(&registry, &container_network_tx_bytes)?;
        register(&registry, &scrape_count_total)?;
        register(&registry, &collect_errors_total)?;

        Ok(Arc::new(Self {
            registry,
            update: Mutex::new(()),
            probe_up,
            probe_degraded,
            probe_latency_ms,
            container_cpu_percent,
            container_memory_used_bytes,
            container_memory_limit_bytes,
            container_memory_percent,
            container_network_rx_bytes,
            container_network_tx_bytes,
            scrape_count_total,
            collect_errors_total,
        }))
    }

    pub fn inc_scrape_count(&self) {
        self.scrape_count_total.inc();
    }

    /// `stage` is "targets" or "stats".
    pub fn inc_collect_error(&self, stage: &str) {
        self.collect_errors_total.with_label_values(&[stage]).inc();
    }

    /// Replace the gauges with one cycle's figures and encode the registry.
    ///
    /// Series of targets and containers that are gone are dropped, not left stale.
    pub fn record(
        &self,
        probes: &[ProbeResult],
        stats: &[StatSample],
    ) -> Result<Vec<u8>, prometheus::Error> {
        let _update = self.update.lock().unwrap_or_else(PoisonError::into_inner);
        self.set_probes(probes);
        self.set_stats(stats);
        self.encode_metrics()
    }

    fn set_probes(&self, probes: &[ProbeResult]) {
        self.probe_up.reset();
        self.probe_degraded.reset();
        self.probe_latency_ms.reset();
        for r in probes {
            let port = r.port.to_string();
            let labels = [r.target.as_str(), port.as_str()];
            let (up, degraded) = match r.classification {
                Classification::Available => (1.0, 0.0),
                Classification::Degraded(_) => (0.0, 1.0),
                Classification::Unreachable => (0.0, 0.0),
            };
            self.probe_up.with_label_values(&labels).set(up);
            self.probe_degraded.with_label_values(&labels).set(degraded);
            self.probe_latency_ms
                .with_label_values(&labels)
                .set(r.latency.as_millis() as f64);
        }
    }

    fn set_stats(&self, stats: &[StatSample]) {
        self.container_cpu_percent.reset();
        self.container_memory_used_bytes.reset();
        self.container_memory_limit_bytes.reset();
        self.container_memory_percent.reset();
        self.container_network_rx_bytes.reset();
        self.container_network_tx_bytes.reset();
        for s in stats {
            let labels = [s.target.as_str()];
            self.container_cpu_percent
                .with_label_values(&labels)
                .set(s.cpu_percent);
            self.container_memory_used_bytes
                .with_label_values(&labels)
                .set(s.mem_used as f64);
            self.container_memory_limit_bytes
                .with_label_values(&labels)
                .set(s.mem_limit as f64);
            if let Some(p) = s.mem_percent {
                self.container_memory_percent.with_label_values(&labels).set(p);
            }
            self.container_network_rx_bytes
                .with_label_values(&labels)
                .set(s.net_rx_bytes as f64);
            self.container_network_tx_bytes
                .with_label_values(&labels)
                .set(s.net_tx_bytes as f64);
        }
    }

    pub fn encode_metrics(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buf = Vec::new();
        let encoder = TextEncoder::new();
        let mf = self.registry.gather();
        encoder.encode(&mf, &mut buf)?;
        Ok(buf)
    }
}

fn register<T: Collector + Clone + 'static>(
    registry: &Registry,
    collector: &T,
) -> Result<(), prometheus::Error> {
    registry.register(Box::new(collector.clone()))
}

// Concurrent HTTP probes over every published TCP port of a target snapshot.

use reqwest::StatusCode;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;

use crate::alert::AlertDispatcher;
use crate::config::{MAX_PROBE_TIMEOUT_MS, ProbeConfig};
use crate::models::{Classification, ProbeResult, Target};

/// Hard upper bound for one probe, independent of the degradation threshold.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(MAX_PROBE_TIMEOUT_MS);

pub struct Prober {
    client: reqwest::Client,
    host: String,
    timeout: Duration,
    alerts: Option<Arc<AlertDispatcher>>,
}

impl Prober {
    pub fn new(client: reqwest::Client, host: impl Into<String>) -> Self {
        Self {
            client,
            host: host.into(),
            timeout: PROBE_TIMEOUT,
            alerts: None,
        }
    }

    pub fn from_config(client: reqwest::Client, config: &ProbeConfig) -> Self {
        Self::new(client, config.host.clone()).with_timeout(config.timeout())
    }

    /// Per-probe timeout, capped at [`PROBE_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.min(PROBE_TIMEOUT);
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn with_alerts(mut self, alerts: Arc<AlertDispatcher>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Probe every (target, TCP host port) pair concurrently and wait for all of them.
    ///
    /// Results come back in completion order. Non-available results are handed to the
    /// attached dispatcher once every probe has finished.
    pub async fn probe_all(&self, targets: &[Target], threshold: Duration) -> Vec<ProbeResult> {
        let results = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = JoinSet::new();

        for target in targets {
            for port in target.probe_ports() {
                let client = self.client.clone();
                let url = format!("http://{}:{}", self.host, port);
                let name = target.name.clone();
                let timeout = self.timeout;
                let results = results.clone();
                tasks.spawn(async move {
                    let result = probe_one(&client, &url, name, port, timeout, threshold).await;
                    tracing::debug!(
                        container = %result.target,
                        port = result.port,
                        status = result.classification.label(),
                        latency_ms = result.latency.as_millis() as u64,
                        "probe finished"
                    );
                    push_result(&results, result);
                });
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "probe task failed");
            }
        }

        let results = match Arc::try_unwrap(results) {
            Ok(m) => m.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared.lock().unwrap_or_else(PoisonError::into_inner).clone(),
        };

        if let Some(alerts) = &self.alerts {
            let sent = alerts.dispatch(&results);
            if sent > 0 {
                tracing::info!(alerts = sent, "dispatched alerts");
            }
        }
        results
    }
}

/// The only point where probe tasks meet. A task that panicked mid-push poisons the lock but
/// leaves the vector intact, so later results are still kept.
fn push_result(results: &Mutex<Vec<ProbeResult>>, result: ProbeResult) {
    results
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .push(result);
}

async fn probe_one(
    client: &reqwest::Client,
    url: &str,
    target: String,
    port: u16,
    timeout: Duration,
    threshold: Duration,
) -> ProbeResult {
    let started = Instant::now();
    let response = client.get(url).timeout(timeout).send().await;
    let latency = started.elapsed();
    let classification = classify(response.map(|r| r.status()).ok(), latency, threshold);
    ProbeResult {
        target,
        port,
        classification,
        latency,
    }
}

/// `None` status means the request itself failed (refused, reset, timed out).
pub fn classify(status: Option<StatusCode>, elapsed: Duration, threshold: Duration) -> Classification {
    match status {
        None => Classification::Unreachable,
        Some(code) if code != StatusCode::OK => Classification::Degraded(format!("HTTP {}", code.as_u16())),
        Some(code) if elapsed >= threshold => {
            Classification::Degraded(format!("{} ({}ms)", code, elapsed.as_millis()))
        }
        Some(_) => Classification::Available,
    }
}

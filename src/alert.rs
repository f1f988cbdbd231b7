// Alert dispatch for non-available probe results.

use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinSet;

use crate::models::{AlertEvent, Classification, ProbeResult};

/// When a still-unhealthy port is reported again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AlertPolicy {
    /// Every non-available result of every cycle.
    #[default]
    EveryCycle,
    /// Only when a (target, port) enters a new non-available classification.
    OnTransition,
}

/// Fire-and-forget notification. Implementations must not block the caller.
pub trait AlertSink: Send + Sync {
    fn notify(&self, event: AlertEvent);
}

/// Posts each event as JSON to a webhook URL.
///
/// Deliveries run on spawned tasks. One-shot callers can [`flush`](Self::flush) before exiting
/// so pending posts are not dropped with the runtime.
pub struct WebhookAlerter {
    client: reqwest::Client,
    url: String,
    pending: Mutex<JoinSet<()>>,
}

impl WebhookAlerter {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            pending: Mutex::new(JoinSet::new()),
        }
    }

    /// Wait up to `timeout` for deliveries still in flight.
    pub async fn flush(&self, timeout: Duration) {
        let mut pending = match self.pending.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        let drained = tokio::time::timeout(timeout, async {
            while pending.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            tracing::debug!(pending = pending.len(), "alert deliveries abandoned");
        }
    }
}

impl AlertSink for WebhookAlerter {
    fn notify(&self, event: AlertEvent) {
        let client = self.client.clone();
        let url = self.url.clone();
        let delivery = async move {
            let result = client
                .post(&url)
                .json(&event)
                .send()
                .await
                .and_then(|r| r.error_for_status());
            if let Err(e) = result {
                tracing::debug!(
                    container = %event.target,
                    port = event.port,
                    error = %e,
                    "alert webhook failed"
                );
            }
        };
        match self.pending.lock() {
            Ok(mut pending) => {
                while pending.try_join_next().is_some() {}
                pending.spawn(delivery);
            }
            Err(_) => {
                tokio::spawn(delivery);
            }
        }
    }
}

type ProbeKey = (String, u16);

pub struct AlertDispatcher {
    sink: Arc<dyn AlertSink>,
    policy: AlertPolicy,
    previous: Mutex<HashMap<ProbeKey, Classification>>,
}

impl AlertDispatcher {
    pub fn new(sink: Arc<dyn AlertSink>, policy: AlertPolicy) -> Self {
        Self {
            sink,
            policy,
            previous: Mutex::new(HashMap::new()),
        }
    }

    /// Hand one cycle's non-available results to the sink. Returns how many were sent.
    pub fn dispatch(&self, results: &[ProbeResult]) -> usize {
        let events: Vec<AlertEvent> = match self.policy {
            AlertPolicy::EveryCycle => results.iter().filter_map(ProbeResult::alert_event).collect(),
            AlertPolicy::OnTransition => self.transitions(results),
        };
        let sent = events.len();
        for event in events {
            self.sink.notify(event);
        }
        sent
    }

    fn transitions(&self, results: &[ProbeResult]) -> Vec<AlertEvent> {
        let current: HashMap<ProbeKey, Classification> = results
            .iter()
            .map(|r| ((r.target.clone(), r.port), r.classification.clone()))
            .collect();
        let mut previous = match self.previous.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let events = results
            .iter()
            .filter(|r| previous.get(&(r.target.clone(), r.port)) != Some(&r.classification))
            .filter_map(ProbeResult::alert_event)
            .collect();
        // Targets missing from this cycle are forgotten.
        *previous = current;
        events
    }
}

// Probe outcomes and alert events

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tri-state outcome of one HTTP probe. Not an error: consumed by presentation and alerting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum Classification {
    Available,
    Degraded(String),
    Unreachable,
}

impl Classification {
    pub fn is_available(&self) -> bool {
        matches!(self, Classification::Available)
    }

    /// Short label used by the text renderer ("available", "HTTP 500", "unreachable").
    pub fn label(&self) -> &str {
        match self {
            Classification::Available => "available",
            Classification::Degraded(detail) => detail,
            Classification::Unreachable => "unreachable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeResult {
    pub target: String,
    pub port: u16,
    pub classification: Classification,
    #[serde(rename = "latencyMs", with = "duration_ms")]
    pub latency: Duration,
}

impl ProbeResult {
    pub fn alert_event(&self) -> Option<AlertEvent> {
        if self.classification.is_available() {
            return None;
        }
        Some(AlertEvent {
            target: self.target.clone(),
            port: self.port,
            classification: self.classification.clone(),
        })
    }
}

/// Payload posted to the alert webhook for a non-available probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub target: String,
    pub port: u16,
    pub classification: Classification,
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

// Target source: list running containers and their published ports through a Transport.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::instrument;

use crate::models::{PortMapping, Protocol, Target};
use crate::transport::{StatusQuery, Transport, TransportError, TransportErrorKind};

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("cannot decode docker inspect output: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Supplies the current target list; called once at the start of every cycle.
#[async_trait]
pub trait TargetSource: Send + Sync {
    async fn list_targets(&self) -> Result<Vec<Target>, SourceError>;
}

#[async_trait]
impl<S: TargetSource + ?Sized> TargetSource for std::sync::Arc<S> {
    async fn list_targets(&self) -> Result<Vec<Target>, SourceError> {
        (**self).list_targets().await
    }
}

/// Runs `docker ps -q` then `docker inspect` over any transport.
pub struct DockerCliSource<T> {
    transport: T,
    filters: Vec<String>,
}

impl<T: Transport> DockerCliSource<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            filters: Vec::new(),
        }
    }

    /// `docker ps --filter` expressions, e.g. "name=nginx" or "label=env=prod".
    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }
}

#[async_trait]
impl<T: Transport> TargetSource for DockerCliSource<T> {
    #[instrument(skip(self), fields(source = "docker_cli"))]
    async fn list_targets(&self) -> Result<Vec<Target>, SourceError> {
        let raw_ids = self
            .transport
            .execute(&StatusQuery::running_ids(&self.filters))
            .await?;
        let ids: Vec<String> = String::from_utf8_lossy(&raw_ids)
            .split_whitespace()
            .map(str::to_string)
            .collect();
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let targets = match self.transport.execute(&StatusQuery::inspect(&ids)).await {
            Ok(raw) => decode_inspect(&raw)?,
            Err(e) if container_gone(&e) => {
                tracing::debug!(error = %e, "container vanished before inspect, retrying per id");
                self.inspect_each(&ids).await?
            }
            Err(e) => return Err(e.into()),
        };
        tracing::debug!(
            targets = targets.len(),
            transport = %self.transport.describe(),
            "listed targets"
        );
        Ok(targets)
    }
}

impl<T: Transport> DockerCliSource<T> {
    /// One inspect per id, concurrently. Containers removed since `ps` are skipped.
    async fn inspect_each(&self, ids: &[String]) -> Result<Vec<Target>, SourceError> {
        let inspections = ids.iter().map(|id| async move {
            match self
                .transport
                .execute(&StatusQuery::inspect(std::slice::from_ref(id)))
                .await
            {
                Ok(raw) => decode_inspect(&raw).map_err(SourceError::from),
                Err(e) if container_gone(&e) => {
                    tracing::debug!(container = %id, "skipping container removed since listing");
                    Ok(Vec::new())
                }
                Err(e) => Err(SourceError::from(e)),
            }
        });
        let targets = futures_util::future::try_join_all(inspections).await?;
        Ok(targets.into_iter().flatten().collect())
    }
}

/// docker reports an id that no longer exists; the daemon itself answered.
fn container_gone(e: &TransportError) -> bool {
    matches!(
        e.kind,
        TransportErrorKind::ProcessFailure | TransportErrorKind::SessionFailure
    ) && (e.detail.contains("No such object") || e.detail.contains("No such container"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedContainer {
    name: String,
    #[serde(default)]
    state: Option<InspectedState>,
    #[serde(default)]
    network_settings: Option<InspectedNetwork>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedState {
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InspectedNetwork {
    #[serde(default)]
    ports: Option<HashMap<String, Option<Vec<HostBinding>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct HostBinding {
    #[serde(default)]
    host_port: Option<String>,
}

/// Decode the JSON array printed by `docker inspect`.
pub fn decode_inspect(raw: &[u8]) -> Result<Vec<Target>, serde_json::Error> {
    let containers: Vec<InspectedContainer> = serde_json::from_slice(raw)?;
    Ok(containers
        .into_iter()
        .map(|c| Target {
            name: c.name.trim_start_matches('/').to_string(),
            ports: c
                .network_settings
                .and_then(|n| n.ports)
                .map(|p| port_mappings(&p))
                .unwrap_or_default(),
            raw_state: c.state.map(|s| s.status).unwrap_or_default(),
        })
        .collect())
}

/// "8000/tcp" → bindings. Bindings repeated per host IP collapse into one mapping.
fn port_mappings(ports: &HashMap<String, Option<Vec<HostBinding>>>) -> Vec<PortMapping> {
    let mut out = BTreeSet::new();
    for (key, bindings) in ports {
        let Some((port, proto)) = key.split_once('/') else {
            tracing::debug!(key = %key, "skipping port key without protocol");
            continue;
        };
        let (Ok(container_port), Some(protocol)) = (port.parse::<u16>(), Protocol::parse(proto))
        else {
            tracing::debug!(key = %key, "skipping unparseable port key");
            continue;
        };
        let host_ports: Vec<Option<u16>> = bindings
            .iter()
            .flatten()
            .map(|b| b.host_port.as_deref().and_then(|p| p.parse().ok()))
            .collect();
        if host_ports.is_empty() {
            out.insert(PortMapping {
                container_port,
                protocol,
                host_port: None,
            });
        }
        for host_port in host_ports {
            out.insert(PortMapping {
                container_port,
                protocol,
                host_port,
            });
        }
    }
    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const INSPECT: &str = r#"[
      {
        "Id": "3f1c",
        "Name": "/web1",
        "State": { "Status": "running", "Running": true },
        "NetworkSettings": {
          "Ports": {
            "8000/tcp": [
              { "HostIp": "0.0.0.0", "HostPort": "8000" },
              { "HostIp": "::", "HostPort": "8000" }
            ],
            "9000/tcp": null,
            "443/tcp": [ { "HostIp": "127.0.0.1", "HostPort": "8443" } ]
          }
        }
      },
      {
        "Id": "9a2b",
        "Name": "/db",
        "State": { "Status": "running" },
        "NetworkSettings": {
          "Ports": { "5432/udp": [ { "HostIp": "0.0.0.0", "HostPort": "5432" } ] }
        }
      },
      { "Id": "77aa", "Name": "/worker", "State": { "Status": "restarting" }, "NetworkSettings": { "Ports": {} } }
    ]"#;

    #[test]
    fn decodes_names_states_and_ports() {
        let targets = decode_inspect(INSPECT.as_bytes()).unwrap();
        assert_eq!(targets.len(), 3);

        let web = &targets[0];
        assert_eq!(web.name, "web1");
        assert_eq!(web.raw_state, "running");
        assert_eq!(
            web.ports,
            vec![
                PortMapping::tcp(443, 8443),
                PortMapping::tcp(8000, 8000),
                PortMapping {
                    container_port: 9000,
                    protocol: Protocol::Tcp,
                    host_port: None,
                },
            ]
        );
        assert_eq!(web.probe_ports().collect::<Vec<_>>(), vec![8443, 8000]);

        assert_eq!(targets[1].probe_ports().count(), 0);
        assert!(targets[2].ports.is_empty());
        assert_eq!(targets[2].raw_state, "restarting");
    }

    #[test]
    fn vanished_container_errors_are_recognised() {
        let gone = TransportError::new(
            TransportErrorKind::ProcessFailure,
            "docker inspect exited with exit status: 1: Error: No such object: bbb",
        );
        assert!(container_gone(&gone));
        let remote_gone = TransportError::new(
            TransportErrorKind::SessionFailure,
            "Error response from daemon: No such container: bbb",
        );
        assert!(container_gone(&remote_gone));
        let dial = TransportError::new(
            TransportErrorKind::DialFailure,
            "No such object in banner",
        );
        assert!(!container_gone(&dial));
        let denied = TransportError::new(
            TransportErrorKind::ProcessFailure,
            "permission denied while trying to connect to the docker daemon socket",
        );
        assert!(!container_gone(&denied));
    }

    #[test]
    fn rejects_non_json_output() {
        assert!(decode_inspect(b"Error: No such object: abc").is_err());
    }
}

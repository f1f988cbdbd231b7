// Probe targets: containers with their published ports

use serde::{Deserialize, Serialize};
use std::fmt;

/// Container state; serializes to lowercase JSON (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Running,
    Exited,
    Paused,
    Restarting,
    Created,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    /// Parse from a Docker state word ("running", "exited") or a `docker ps` status line
    /// ("Up 3 hours", "Exited (0) 2 minutes ago", "Up 5 minutes (Paused)").
    pub fn from_docker(s: &str) -> Self {
        let s = s.trim().to_lowercase();
        if s.starts_with("up") {
            return if s.contains("(paused)") {
                ContainerState::Paused
            } else {
                ContainerState::Running
            };
        }
        match s.split_whitespace().next().unwrap_or_default() {
            "running" => ContainerState::Running,
            "exited" => ContainerState::Exited,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "created" => ContainerState::Created,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Running => "running",
            ContainerState::Exited => "exited",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Created => "created",
            ContainerState::Dead => "dead",
            ContainerState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ContainerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Tcp,
    Udp,
    Sctp,
}

impl Protocol {
    /// Parse the protocol suffix of a Docker port key ("tcp" in "8000/tcp").
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Some(Protocol::Tcp),
            "udp" => Some(Protocol::Udp),
            "sctp" => Some(Protocol::Sctp),
            _ => None,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Sctp => "sctp",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    pub container_port: u16,
    pub protocol: Protocol,
    /// `None` when the port is exposed but not published on the host.
    pub host_port: Option<u16>,
}

impl PortMapping {
    pub fn tcp(container_port: u16, host_port: u16) -> Self {
        Self {
            container_port,
            protocol: Protocol::Tcp,
            host_port: Some(host_port),
        }
    }

    /// Host port to probe over HTTP, if this mapping is probeable at all.
    pub fn probe_port(&self) -> Option<u16> {
        match self.protocol {
            Protocol::Tcp => self.host_port.filter(|p| *p > 0),
            _ => None,
        }
    }
}

/// One running workload as seen at the start of a poll cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub name: String,
    pub ports: Vec<PortMapping>,
    pub raw_state: String,
}

impl Target {
    pub fn state(&self) -> ContainerState {
        ContainerState::from_docker(&self.raw_state)
    }

    /// Host ports of TCP mappings, in mapping order.
    pub fn probe_ports(&self) -> impl Iterator<Item = u16> + '_ {
        self.ports.iter().filter_map(PortMapping::probe_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_from_docker_words_and_status_lines() {
        assert_eq!(ContainerState::from_docker("running"), ContainerState::Running);
        assert_eq!(ContainerState::from_docker("Up 3 hours"), ContainerState::Running);
        assert_eq!(
            ContainerState::from_docker("Up 5 minutes (Paused)"),
            ContainerState::Paused
        );
        assert_eq!(
            ContainerState::from_docker("Exited (0) 2 minutes ago"),
            ContainerState::Exited
        );
        assert_eq!(
            ContainerState::from_docker("Restarting (1) 3 seconds ago"),
            ContainerState::Restarting
        );
        assert_eq!(ContainerState::from_docker(""), ContainerState::Unknown);
        assert_eq!(ContainerState::from_docker("removing"), ContainerState::Unknown);
    }

    #[test]
    fn only_published_tcp_ports_are_probed() {
        let t = Target {
            name: "mixed".into(),
            ports: vec![
                PortMapping::tcp(80, 8080),
                PortMapping {
                    container_port: 53,
                    protocol: Protocol::Udp,
                    host_port: Some(5353),
                },
                PortMapping {
                    container_port: 9000,
                    protocol: Protocol::Tcp,
                    host_port: None,
                },
            ],
            raw_state: "running".into(),
        };
        assert_eq!(t.probe_ports().collect::<Vec<_>>(), vec![8080]);
    }
}

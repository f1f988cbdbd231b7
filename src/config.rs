use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::alert::AlertPolicy;

const DEFAULT_CONFIG_FILE: &str = "dockwatch.toml";

/// Upper bound for a single HTTP probe, whatever the configuration says.
pub const MAX_PROBE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub docker: DockerConfig,
    pub probe: ProbeConfig,
    pub alert: AlertConfig,
    pub watch: WatchConfig,
    pub ssh: SshConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    pub binary: String,
    /// Daemon socket path; when unset the docker CLI's own resolution (DOCKER_HOST, context) applies.
    pub socket: Option<String>,
    pub command_timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            binary: "docker".into(),
            socket: None,
            command_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Latency at or above which a 200 response is reported as degraded.
    pub threshold_ms: u64,
    pub timeout_ms: u64,
    /// Host probed for local targets. Remote runs probe the resolved SSH hostname instead.
    pub host: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            threshold_ms: 200,
            timeout_ms: MAX_PROBE_TIMEOUT_MS,
            host: "localhost".into(),
        }
    }
}

impl ProbeConfig {
    pub fn threshold(&self) -> Duration {
        Duration::from_millis(self.threshold_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    pub webhook_url: Option<String>,
    pub policy: AlertPolicy,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    pub interval_secs: u64,
    /// End watch mode on the first failed cycle instead of retrying on the next tick.
    pub stop_on_error: bool,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            stop_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyMode {
    #[default]
    Strict,
    AcceptAny,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub binary: String,
    pub config_path: String,
    pub host_key_policy: HostKeyMode,
    pub known_hosts: Option<String>,
    pub connect_timeout_secs: u64,
    /// docker binary name on the remote host.
    pub remote_docker: String,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            binary: "ssh".into(),
            config_path: "~/.ssh/config".into(),
            host_key_policy: HostKeyMode::Strict,
            known_hosts: None,
            connect_timeout_secs: 10,
            remote_docker: "docker".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 9090,
        }
    }
}

impl AppConfig {
    /// Load from `CONFIG_FILE`, else `dockwatch.toml`. Only the implicit default file may be absent.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("CONFIG_FILE") {
            Ok(path) => Self::load_from_path(&path),
            Err(_) if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load_from_path(DEFAULT_CONFIG_FILE)
            }
            Err(_) => Ok(Self::default()),
        }
    }

    pub fn load_from_path(path: &str) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config {}: {}", path, e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.docker.binary.is_empty(),
            "docker.binary must be non-empty"
        );
        anyhow::ensure!(
            self.docker.command_timeout_secs > 0,
            "docker.command_timeout_secs must be > 0, got {}",
            self.docker.command_timeout_secs
        );
        anyhow::ensure!(
            self.probe.threshold_ms > 0,
            "probe.threshold_ms must be > 0, got {}",
            self.probe.threshold_ms
        );
        anyhow::ensure!(
            (1..=MAX_PROBE_TIMEOUT_MS).contains(&self.probe.timeout_ms),
            "probe.timeout_ms must be between 1 and {}, got {}",
            MAX_PROBE_TIMEOUT_MS,
            self.probe.timeout_ms
        );
        anyhow::ensure!(!self.probe.host.is_empty(), "probe.host must be non-empty");
        if let Some(url) = &self.alert.webhook_url {
            anyhow::ensure!(
                url.starts_with("http://") || url.starts_with("https://"),
                "alert.webhook_url must be an http(s) URL, got {}",
                url
            );
        }
        anyhow::ensure!(
            self.watch.interval_secs > 0,
            "watch.interval_secs must be > 0, got {}",
            self.watch.interval_secs
        );
        anyhow::ensure!(!self.ssh.binary.is_empty(), "ssh.binary must be non-empty");
        anyhow::ensure!(
            !self.ssh.remote_docker.is_empty(),
            "ssh.remote_docker must be non-empty"
        );
        anyhow::ensure!(
            self.ssh.connect_timeout_secs > 0,
            "ssh.connect_timeout_secs must be > 0, got {}",
            self.ssh.connect_timeout_secs
        );
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        Ok(())
    }
}

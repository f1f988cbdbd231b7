// Command-line surface

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::time::Duration;

use crate::config::{AppConfig, HostKeyMode};

#[derive(Parser, Debug)]
#[command(name = "dockwatch")]
#[command(version, about = "Container state, HTTP health and resource usage, locally or over SSH")]
pub struct Cli {
    /// Print JSON instead of tables.
    #[arg(long)]
    pub json: bool,
    /// Configuration file (default: $CONFIG_FILE, then ./dockwatch.toml).
    #[arg(long)]
    pub config: Option<String>,
    /// docker ps filter, e.g. name=nginx or label=env=prod. Repeatable.
    #[arg(long = "filter", value_name = "FILTER")]
    pub filters: Vec<String>,
    /// Host alias from the ssh client configuration.
    #[arg(long, value_name = "ALIAS", conflicts_with = "remote")]
    pub host: Option<String>,
    /// Explicit remote destination; requires -i.
    #[arg(long, value_name = "USER@HOST", requires = "identity")]
    pub remote: Option<String>,
    /// Private key for --remote.
    #[arg(short = 'i', long = "identity", value_name = "KEY", requires = "remote")]
    pub identity: Option<String>,
    /// Accept any remote host key without checking known_hosts.
    #[arg(long)]
    pub insecure_accept_host_key: bool,
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Container names and states.
    State,
    /// HTTP probe of every published TCP port.
    Service(ProbeArgs),
    /// CPU, memory and network per running container (local daemon).
    Stats,
    /// Refresh one view until Ctrl-C.
    Watch(WatchArgs),
    /// Stream docker daemon events (local daemon).
    Events,
    /// Print a container's logs (local daemon).
    Logs(LogsArgs),
    /// HTTP status API.
    Serve {
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProbeArgs {
    /// Latency at or above which a 200 response counts as degraded (e.g. 200ms).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub threshold: Option<Duration>,
    /// Webhook URL receiving a JSON event per unhealthy port.
    #[arg(long, value_name = "URL")]
    pub alert: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Time between refreshes (e.g. 2s).
    #[arg(long, value_parser = humantime::parse_duration)]
    pub interval: Option<Duration>,
    #[arg(long, value_enum, default_value_t = View::State)]
    pub view: View,
    #[command(flatten)]
    pub probe: ProbeArgs,
}

#[derive(Args, Debug, Clone)]
pub struct LogsArgs {
    /// Container name or id.
    pub container: String,
    /// Number of lines to show from the end.
    #[arg(long, default_value_t = 100)]
    pub tail: u64,
    /// Keep streaming new lines until Ctrl-C.
    #[arg(short, long)]
    pub follow: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    State,
    Service,
    Stats,
}

impl Cli {
    pub fn subcommand(&self) -> Command {
        self.command.clone().unwrap_or(Command::State)
    }

    /// Fold command-line overrides into the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if self.insecure_accept_host_key {
            config.ssh.host_key_policy = HostKeyMode::AcceptAny;
        }
        let probe = match &self.command {
            Some(Command::Service(p)) => Some(p),
            Some(Command::Watch(w)) => Some(&w.probe),
            Some(Command::Serve { port: Some(port) }) => {
                config.server.port = *port;
                None
            }
            _ => None,
        };
        if let Some(p) = probe {
            if let Some(threshold) = p.threshold {
                config.probe.threshold_ms = threshold.as_millis() as u64;
            }
            if let Some(url) = &p.alert {
                config.alert.webhook_url = Some(url.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn state_is_the_default_command() {
        let cli = Cli::try_parse_from(["dockwatch"]).unwrap();
        assert!(matches!(cli.subcommand(), Command::State));
        assert!(!cli.json);
    }

    #[test]
    fn service_overrides_threshold_and_alert() {
        let cli = Cli::try_parse_from([
            "dockwatch",
            "--json",
            "service",
            "--threshold",
            "350ms",
            "--alert",
            "http://hooks.local/alert",
        ])
        .unwrap();
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.probe.threshold_ms, 350);
        assert_eq!(
            config.alert.webhook_url.as_deref(),
            Some("http://hooks.local/alert")
        );
    }

    #[test]
    fn watch_parses_interval_and_view() {
        let cli = Cli::try_parse_from([
            "dockwatch", "watch", "--interval", "5s", "--view", "service",
        ])
        .unwrap();
        let Command::Watch(w) = cli.subcommand() else {
            panic!("expected watch");
        };
        assert_eq!(w.interval, Some(Duration::from_secs(5)));
        assert_eq!(w.view, View::Service);
    }

    #[test]
    fn logs_defaults_to_last_hundred_lines() {
        let cli = Cli::try_parse_from(["dockwatch", "logs", "web1"]).unwrap();
        let Command::Logs(l) = cli.subcommand() else {
            panic!("expected logs");
        };
        assert_eq!(l.container, "web1");
        assert_eq!(l.tail, 100);
        assert!(!l.follow);

        let cli = Cli::try_parse_from(["dockwatch", "logs", "-f", "--tail", "20", "api"]).unwrap();
        let Command::Logs(l) = cli.subcommand() else {
            panic!("expected logs");
        };
        assert_eq!(l.container, "api");
        assert_eq!(l.tail, 20);
        assert!(l.follow);

        assert!(Cli::try_parse_from(["dockwatch", "logs"]).is_err());
    }

    #[test]
    fn remote_requires_identity() {
        assert!(Cli::try_parse_from(["dockwatch", "--remote", "root@10.0.0.5"]).is_err());
        assert!(
            Cli::try_parse_from(["dockwatch", "--remote", "root@10.0.0.5", "-i", "~/.ssh/id"])
                .is_ok()
        );
        assert!(
            Cli::try_parse_from([
                "dockwatch", "--host", "prod", "--remote", "root@h", "-i", "k"
            ])
            .is_err()
        );
    }

    #[test]
    fn insecure_flag_switches_host_key_policy() {
        let cli = Cli::try_parse_from(["dockwatch", "--insecure-accept-host-key"]).unwrap();
        let mut config = AppConfig::default();
        cli.apply(&mut config);
        assert_eq!(config.ssh.host_key_policy, HostKeyMode::AcceptAny);
    }
}

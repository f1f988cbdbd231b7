// Remote transport: one ssh client process per query.
//
// The ssh process owns the TCP connection and the single session channel; it exits once the
// command's output is captured, so nothing outlives `execute`. Connection sharing is disabled
// explicitly so a user's ControlMaster setup cannot turn this into a pooled connection.

use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{StatusQuery, Transport, TransportError, TransportErrorKind};
use crate::config::SshConfig;

/// Exit status the OpenSSH client reserves for its own errors.
const SSH_CLIENT_ERROR: i32 = 255;

const AUTH_MARKERS: &[&str] = &[
    "permission denied",
    "host key verification failed",
    "remote host identification has changed",
    "too many authentication failures",
    "load key",
    "no more authentication methods",
];

/// Resolved connection parameters for one remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshEndpoint {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub identity_file: PathBuf,
}

impl fmt::Display for SshEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

/// How the remote host key is verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyPolicy {
    /// Host must already be in known_hosts (the given file, or ssh's default ones).
    Strict { known_hosts: Option<PathBuf> },
    /// Any host key is accepted and nothing is recorded. Explicit opt-in only.
    AcceptAny,
}

impl HostKeyPolicy {
    fn ssh_options(&self) -> Vec<String> {
        match self {
            HostKeyPolicy::Strict { known_hosts } => {
                let mut opts = vec!["StrictHostKeyChecking=yes".to_string()];
                if let Some(path) = known_hosts {
                    opts.push(format!("UserKnownHostsFile={}", path.display()));
                }
                opts
            }
            HostKeyPolicy::AcceptAny => vec![
                "StrictHostKeyChecking=no".to_string(),
                "UserKnownHostsFile=/dev/null".to_string(),
            ],
        }
    }
}

pub struct RemoteTransport {
    endpoint: SshEndpoint,
    policy: HostKeyPolicy,
    ssh_binary: String,
    remote_docker: String,
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl RemoteTransport {
    pub fn new(
        endpoint: SshEndpoint,
        policy: HostKeyPolicy,
        ssh: &SshConfig,
        command_timeout: Duration,
    ) -> Self {
        if policy == HostKeyPolicy::AcceptAny {
            tracing::warn!(
                host = %endpoint.host,
                "host key verification disabled; any key presented by the remote host is accepted"
            );
        }
        Self {
            endpoint,
            policy,
            ssh_binary: ssh.binary.clone(),
            remote_docker: ssh.remote_docker.clone(),
            connect_timeout: Duration::from_secs(ssh.connect_timeout_secs),
            command_timeout,
        }
    }

    /// Argument vector passed to the ssh client for one query.
    pub fn ssh_args(&self, query: &StatusQuery) -> Vec<String> {
        let mut options = vec![
            "BatchMode=yes".to_string(),
            "IdentitiesOnly=yes".to_string(),
            "ControlMaster=no".to_string(),
            "ControlPath=none".to_string(),
            "LogLevel=ERROR".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs()),
        ];
        options.extend(self.policy.ssh_options());

        let mut args = vec!["-F".to_string(), "none".to_string()];
        for opt in options {
            args.push("-o".into());
            args.push(opt);
        }
        args.extend([
            "-i".to_string(),
            self.endpoint.identity_file.display().to_string(),
            "-p".to_string(),
            self.endpoint.port.to_string(),
            "-l".to_string(),
            self.endpoint.user.clone(),
            self.endpoint.host.clone(),
            query.to_command_line(&self.remote_docker),
        ]);
        args
    }
}

/// Map an ssh client exit to the phase that failed.
pub fn classify_ssh_failure(exit_code: Option<i32>, stderr: &str) -> TransportErrorKind {
    match exit_code {
        Some(code) if code != SSH_CLIENT_ERROR => TransportErrorKind::SessionFailure,
        _ => {
            let lower = stderr.to_lowercase();
            if AUTH_MARKERS.iter().any(|m| lower.contains(m)) {
                TransportErrorKind::AuthFailure
            } else {
                TransportErrorKind::DialFailure
            }
        }
    }
}

#[async_trait]
impl Transport for RemoteTransport {
    async fn execute(&self, query: &StatusQuery) -> Result<Vec<u8>, TransportError> {
        if let Err(e) = tokio::fs::metadata(&self.endpoint.identity_file).await {
            return Err(TransportError::new(
                TransportErrorKind::AuthFailure,
                format!(
                    "cannot read key at {}: {}",
                    self.endpoint.identity_file.display(),
                    e
                ),
            ));
        }

        let mut cmd = Command::new(&self.ssh_binary);
        cmd.args(self.ssh_args(query))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let deadline = self.connect_timeout + self.command_timeout;
        let output = match tokio::time::timeout(deadline, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(TransportError::new(
                    TransportErrorKind::DialFailure,
                    format!("cannot start {}: {}", self.ssh_binary, e),
                ));
            }
            Err(_) => {
                return Err(TransportError::new(
                    TransportErrorKind::SessionFailure,
                    format!(
                        "{} timed out after {}s on {}",
                        query.args().first().map(String::as_str).unwrap_or_default(),
                        deadline.as_secs(),
                        self.endpoint
                    ),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let kind = classify_ssh_failure(output.status.code(), &stderr);
            return Err(TransportError::new(
                kind,
                format!("{} ({}): {}", self.endpoint, output.status, stderr.trim()),
            ));
        }
        tracing::debug!(
            operation = "remote_execute",
            endpoint = %self.endpoint,
            bytes = output.stdout.len(),
            "remote docker query finished"
        );
        Ok(output.stdout)
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

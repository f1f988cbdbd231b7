// Local transport: invoke the docker CLI as a child process.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::{StatusQuery, Transport, TransportError, TransportErrorKind};
use crate::config::DockerConfig;

pub struct LocalTransport {
    binary: String,
    socket: Option<String>,
    timeout: Duration,
}

impl LocalTransport {
    pub fn new(config: &DockerConfig) -> Self {
        Self {
            binary: config.binary.clone(),
            socket: config.socket.clone(),
            timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }

    fn command(&self, query: &StatusQuery) -> Command {
        let mut cmd = Command::new(&self.binary);
        if let Some(socket) = &self.socket {
            cmd.arg("-H").arg(format!("unix://{}", socket));
        }
        cmd.args(query.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn execute(&self, query: &StatusQuery) -> Result<Vec<u8>, TransportError> {
        let failure = |detail: String| TransportError::new(TransportErrorKind::ProcessFailure, detail);

        let output = match tokio::time::timeout(self.timeout, self.command(query).output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(failure(format!("cannot run {}: {}", self.binary, e))),
            Err(_) => {
                return Err(failure(format!(
                    "{} {} timed out after {}s",
                    self.binary,
                    query.args().join(" "),
                    self.timeout.as_secs()
                )));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(format!(
                "{} {} exited with {}: {}",
                self.binary,
                query.args().first().map(String::as_str).unwrap_or_default(),
                output.status,
                stderr.trim()
            )));
        }
        tracing::debug!(
            operation = "local_execute",
            bytes = output.stdout.len(),
            "docker query finished"
        );
        Ok(output.stdout)
    }

    fn describe(&self) -> String {
        match &self.socket {
            Some(socket) => format!("local ({})", socket),
            None => "local".into(),
        }
    }
}

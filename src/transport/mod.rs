// Transport: run a docker status query locally or on a remote host over SSH.
// Both variants return the raw stdout bytes; decoding belongs to the target source.

mod local;
mod remote;
pub mod ssh_config;

pub use local::LocalTransport;
pub use remote::{HostKeyPolicy, RemoteTransport, SshEndpoint, classify_ssh_failure};

use async_trait::async_trait;
use std::fmt;

/// Which phase of a query failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Remote host could not be reached (or the ssh client could not be started).
    DialFailure,
    /// Remote host rejected our key, or its host key did not verify.
    AuthFailure,
    /// Local docker process failed to start, timed out or exited non-zero.
    ProcessFailure,
    /// Connected and authenticated, but the remote command failed.
    SessionFailure,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::DialFailure => "dial failure",
            TransportErrorKind::AuthFailure => "auth failure",
            TransportErrorKind::ProcessFailure => "process failure",
            TransportErrorKind::SessionFailure => "session failure",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub detail: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

/// Arguments of one docker CLI invocation, without the program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQuery {
    args: Vec<String>,
}

impl StatusQuery {
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `docker ps -q --no-trunc [--filter f]...`
    pub fn running_ids(filters: &[String]) -> Self {
        let mut args = vec!["ps".to_string(), "-q".to_string(), "--no-trunc".to_string()];
        for f in filters {
            args.push("--filter".into());
            args.push(f.clone());
        }
        Self { args }
    }

    /// `docker inspect <id>...` (prints a JSON array)
    pub fn inspect(ids: &[String]) -> Self {
        let mut args = Vec::with_capacity(ids.len() + 1);
        args.push("inspect".to_string());
        args.extend(ids.iter().cloned());
        Self { args }
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Single shell command string for a remote session, every word quoted.
    pub fn to_command_line(&self, program: &str) -> String {
        std::iter::once(program)
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn shell_quote(word: &str) -> String {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:,@+%".contains(c));
    if safe {
        word.to_string()
    } else {
        format!("'{}'", word.replace('\'', r"'\''"))
    }
}

/// Uniform "run this status query" capability.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, query: &StatusQuery) -> Result<Vec<u8>, TransportError>;

    /// Human-readable destination for log lines ("local", "deploy@10.0.0.5:22").
    fn describe(&self) -> String;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn execute(&self, query: &StatusQuery) -> Result<Vec<u8>, TransportError> {
        (**self).execute(query).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Box<T> {
    async fn execute(&self, query: &StatusQuery) -> Result<Vec<u8>, TransportError> {
        (**self).execute(query).await
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn running_ids_query_carries_filters() {
        let q = StatusQuery::running_ids(&["name=nginx".into(), "label=env=prod".into()]);
        assert_eq!(
            q.args(),
            ["ps", "-q", "--no-trunc", "--filter", "name=nginx", "--filter", "label=env=prod"]
        );
    }

    #[test]
    fn command_line_quotes_unsafe_words() {
        let q = StatusQuery::new(["ps", "--filter", "name=my app", "--format", "{{json .}}"]);
        assert_eq!(
            q.to_command_line("docker"),
            "docker ps --filter 'name=my app' --format '{{json .}}'"
        );
        let q = StatusQuery::new(["inspect", "it's"]);
        assert_eq!(q.to_command_line("docker"), r"docker inspect 'it'\''s'");
    }

    #[test]
    fn error_display_names_the_phase() {
        let e = TransportError::new(TransportErrorKind::AuthFailure, "Permission denied");
        assert_eq!(e.to_string(), "auth failure: Permission denied");
    }
}

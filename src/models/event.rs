// Docker daemon events

use serde::{Deserialize, Serialize};

/// One entry of the daemon's event stream, reduced to what the CLI prints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaemonEvent {
    /// Unix seconds.
    pub time: i64,
    /// "container", "network", "image"...
    pub kind: String,
    pub action: String,
    /// Actor name when the daemon provides one, else its id.
    pub actor: String,
}

/// Which output stream of the container a log line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    pub container: String,
    pub stream: LogStream,
    /// Raw text as the daemon sent it, trailing newline included.
    pub message: String,
}

// Docker daemon access via bollard: resource sampling, container logs and the event stream.

mod stats;

use crate::models::{DaemonEvent, LogLine, LogStream, StatSample};
use crate::stats::StatsSource;
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::query_parameters::{EventsOptions, ListContainersOptions, LogsOptions, StatsOptions};
use bollard::models::EventMessage;
use futures_util::{Stream, StreamExt};
use std::collections::HashMap;
use tracing::{instrument, warn};

const SOCKET_TIMEOUT_SECS: u64 = 120;

pub struct DockerRepo {
    docker: Docker,
    filters: Vec<String>,
}

impl DockerRepo {
    /// Connect to the daemon at `socket`, or to the platform default when unset.
    pub fn connect(socket: Option<&str>) -> anyhow::Result<Self> {
        let docker = match socket {
            Some(path) => {
                Docker::connect_with_unix(path, SOCKET_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_unix_defaults()?,
        };
        Ok(Self {
            docker,
            filters: Vec::new(),
        })
    }

    /// Restrict sampling to containers matching these `docker ps --filter` expressions.
    pub fn with_filters(mut self, filters: Vec<String>) -> Self {
        self.filters = filters;
        self
    }

    /// One StatSample per running container, fetched concurrently.
    ///
    /// Each container's sample comes from a single non-streaming stats response, which carries
    /// both the current and the previous CPU counters. Containers that stop between listing
    /// and sampling are skipped.
    #[instrument(skip(self), fields(operation = "sample_stats"))]
    pub async fn sample_stats(&self) -> anyhow::Result<Vec<StatSample>> {
        let mut filter_map = parse_filters(&self.filters);
        filter_map
            .entry("status".to_string())
            .or_default()
            .push("running".to_string());

        let options = ListContainersOptions {
            all: false,
            filters: Some(filter_map),
            ..Default::default()
        };
        let containers = self.docker.list_containers(Some(options)).await?;

        let fetches = containers.iter().map(|c| {
            let id = c.id.clone().unwrap_or_default();
            let name = c
                .names
                .as_ref()
                .and_then(|n| n.first())
                .cloned()
                .unwrap_or_else(|| id.clone());
            let name = name.trim_start_matches('/').to_string();
            async move { self.sample_one(&id, &name).await }
        });
        let samples: Vec<StatSample> = futures_util::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect();
        tracing::debug!(samples = samples.len(), "sampled container stats");
        Ok(samples)
    }

    async fn sample_one(&self, id: &str, name: &str) -> Option<StatSample> {
        let options = StatsOptions {
            stream: false,
            one_shot: false,
            ..Default::default()
        };
        match self.docker.stats(id, Some(options)).next().await {
            Some(Ok(s)) => {
                let sample = stats::process_statistics(&s, name);
                if sample.is_none() {
                    warn!(container = %name, "stats response without cpu counters");
                }
                sample
            }
            Some(Err(e)) => {
                warn!(container = %name, error = %e, "stats request failed");
                None
            }
            None => None,
        }
    }

    /// The last `tail` lines of a container's stdout and stderr, then new ones when `follow`.
    pub fn stream_logs<'a>(
        &'a self,
        container: &'a str,
        tail: u64,
        follow: bool,
    ) -> impl Stream<Item = Result<LogLine, bollard::errors::Error>> + 'a {
        let options = LogsOptions {
            follow,
            stdout: true,
            stderr: true,
            tail: tail.to_string(),
            ..Default::default()
        };
        self.docker
            .logs(container, Some(options))
            .filter_map(move |r| async move {
                match r {
                    Ok(output) => log_line(container, output).map(Ok),
                    Err(e) => Some(Err(e)),
                }
            })
    }

    /// Daemon events as they happen, until the stream ends or the caller drops it.
    pub fn stream_events(
        &self,
    ) -> impl Stream<Item = Result<DaemonEvent, bollard::errors::Error>> + '_ {
        self.docker
            .events(Some(EventsOptions::default()))
            .map(|r| r.map(daemon_event))
    }
}

#[async_trait]
impl StatsSource for DockerRepo {
    async fn sample(&self) -> anyhow::Result<Vec<StatSample>> {
        self.sample_stats().await
    }
}

/// Stdin echoes carry no container output and are dropped.
fn log_line(container: &str, output: LogOutput) -> Option<LogLine> {
    let (stream, message) = match output {
        LogOutput::StdOut { message } | LogOutput::Console { message } => (LogStream::Stdout, message),
        LogOutput::StdErr { message } => (LogStream::Stderr, message),
        LogOutput::StdIn { .. } => return None,
    };
    Some(LogLine {
        container: container.to_string(),
        stream,
        message: String::from_utf8_lossy(&message).into_owned(),
    })
}

fn daemon_event(m: EventMessage) -> DaemonEvent {
    let actor = m.actor.unwrap_or_default();
    let actor_name = actor
        .attributes
        .as_ref()
        .and_then(|a| a.get("name"))
        .cloned()
        .or(actor.id)
        .unwrap_or_default();
    DaemonEvent {
        time: m.time.unwrap_or(0),
        kind: m.typ.map(|t| t.to_string()).unwrap_or_default(),
        action: m.action.unwrap_or_default(),
        actor: actor_name,
    }
}

/// "key=value" expressions, as given to `docker ps --filter`, grouped by key.
pub fn parse_filters(filters: &[String]) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for f in filters {
        match f.split_once('=') {
            Some((key, value)) => out.entry(key.to_string()).or_default().push(value.to_string()),
            None => warn!(filter = %f, "ignoring filter without '='"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{EventActor, EventMessageTypeEnum};

    #[test]
    fn filters_group_by_key_and_keep_nested_equals() {
        let f = parse_filters(&[
            "name=nginx".into(),
            "label=env=prod".into(),
            "name=api".into(),
            "bogus".into(),
        ]);
        assert_eq!(f["name"], vec!["nginx", "api"]);
        assert_eq!(f["label"], vec!["env=prod"]);
        assert_eq!(f.len(), 2);
    }

    #[test]
    fn log_output_maps_to_streams() {
        let out = log_line("web1", LogOutput::StdOut { message: "GET / 200\n".into() }).unwrap();
        assert_eq!(out.container, "web1");
        assert_eq!(out.stream, LogStream::Stdout);
        assert_eq!(out.message, "GET / 200\n");

        let err = log_line("web1", LogOutput::StdErr { message: "panic: boom\n".into() }).unwrap();
        assert_eq!(err.stream, LogStream::Stderr);

        let tty = log_line("web1", LogOutput::Console { message: "ready\r\n".into() }).unwrap();
        assert_eq!(tty.stream, LogStream::Stdout);

        assert!(log_line("web1", LogOutput::StdIn { message: "ls\n".into() }).is_none());
    }

    #[test]
    fn event_prefers_actor_name() {
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), "web1".to_string());
        let e = daemon_event(EventMessage {
            typ: Some(EventMessageTypeEnum::CONTAINER),
            action: Some("start".into()),
            actor: Some(EventActor {
                id: Some("3f1c".into()),
                attributes: Some(attributes),
            }),
            time: Some(1_700_000_000),
            ..Default::default()
        });
        assert_eq!(e.kind, "container");
        assert_eq!(e.action, "start");
        assert_eq!(e.actor, "web1");
        assert_eq!(e.time, 1_700_000_000);
    }
}

// Shared test helpers
#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use dockwatch::alert::AlertSink;
use dockwatch::models::{AlertEvent, PortMapping, StatSample, Target};
use dockwatch::source::{SourceError, TargetSource};
use dockwatch::stats::StatsSource;
use dockwatch::transport::{TransportError, TransportErrorKind};
use std::net::SocketAddr;
use std::sync::Mutex;

/// Serve `app` on an ephemeral loopback port for the rest of the test.
pub async fn spawn_backend(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

/// A loopback port with nothing listening on it.
pub async fn closed_port() -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

pub fn web_target(name: &str, host_port: u16) -> Target {
    Target {
        name: name.to_string(),
        ports: vec![PortMapping::tcp(8000, host_port)],
        raw_state: "running".to_string(),
    }
}

pub struct StaticSource(pub Vec<Target>);

#[async_trait]
impl TargetSource for StaticSource {
    async fn list_targets(&self) -> Result<Vec<Target>, SourceError> {
        Ok(self.0.clone())
    }
}

pub struct FailingSource;

#[async_trait]
impl TargetSource for FailingSource {
    async fn list_targets(&self) -> Result<Vec<Target>, SourceError> {
        Err(TransportError::new(
            TransportErrorKind::DialFailure,
            "ssh: connect to host 10.0.0.5 port 22: Connection refused",
        )
        .into())
    }
}

/// Fixed samples, or a daemon error when `None`.
pub struct StaticStats(pub Option<Vec<StatSample>>);

#[async_trait]
impl StatsSource for StaticStats {
    async fn sample(&self) -> anyhow::Result<Vec<StatSample>> {
        match &self.0 {
            Some(samples) => Ok(samples.clone()),
            None => anyhow::bail!("docker daemon did not answer"),
        }
    }
}

#[derive(Default)]
pub struct CountingSink(pub Mutex<Vec<AlertEvent>>);

impl CountingSink {
    pub fn events(&self) -> Vec<AlertEvent> {
        self.0.lock().unwrap().clone()
    }
}

impl AlertSink for CountingSink {
    fn notify(&self, event: AlertEvent) {
        self.0.lock().unwrap().push(event);
    }
}

// Probe orchestrator against local HTTP backends

mod common;

use axum::{Json, Router, extract::State, http::StatusCode, routing::get, routing::post};
use common::{CountingSink, closed_port, spawn_backend, web_target};
use dockwatch::alert::{AlertDispatcher, AlertPolicy, WebhookAlerter};
use dockwatch::models::{Classification, PortMapping, Protocol, Target};
use dockwatch::probe::Prober;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

const THRESHOLD: Duration = Duration::from_millis(200);

fn prober() -> Prober {
    Prober::new(reqwest::Client::new(), "127.0.0.1")
}

fn delayed_ok(delay: Duration) -> Router {
    Router::new().route(
        "/",
        get(move || async move {
            tokio::time::sleep(delay).await;
            "ok"
        }),
    )
}

#[tokio::test]
async fn test_fast_200_is_available() {
    let addr = spawn_backend(delayed_ok(Duration::from_millis(10))).await;
    let results = prober()
        .probe_all(&[web_target("web1", addr.port())], THRESHOLD)
        .await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].target, "web1");
    assert_eq!(results[0].port, addr.port());
    assert_eq!(results[0].classification, Classification::Available);
    assert!(results[0].latency >= Duration::from_millis(10));
}

#[tokio::test]
async fn test_no_listener_is_unreachable_and_alerts_once() {
    let port = closed_port().await;
    let sink = Arc::new(CountingSink::default());
    let dispatcher = Arc::new(AlertDispatcher::new(sink.clone(), AlertPolicy::EveryCycle));
    let results = prober()
        .with_alerts(dispatcher)
        .probe_all(&[web_target("web1", port)], THRESHOLD)
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].classification, Classification::Unreachable);
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].target, "web1");
    assert_eq!(events[0].port, port);
    assert_eq!(events[0].classification, Classification::Unreachable);
}

#[tokio::test]
async fn test_non_200_is_degraded() {
    let app = Router::new().route(
        "/",
        get(|| async { (StatusCode::SERVICE_UNAVAILABLE, "down for maintenance") }),
    );
    let addr = spawn_backend(app).await;
    let results = prober()
        .probe_all(&[web_target("api", addr.port())], THRESHOLD)
        .await;
    assert_eq!(
        results[0].classification,
        Classification::Degraded("HTTP 503".into())
    );
}

#[tokio::test]
async fn test_slow_200_is_degraded_with_latency() {
    let addr = spawn_backend(delayed_ok(Duration::from_millis(300))).await;
    let results = prober()
        .probe_all(&[web_target("slow", addr.port())], Duration::from_millis(100))
        .await;
    match &results[0].classification {
        Classification::Degraded(detail) => {
            assert!(detail.starts_with("200 OK ("), "detail was {detail}");
            assert!(detail.ends_with("ms)"), "detail was {detail}");
        }
        other => panic!("expected degraded, got {other:?}"),
    }
}

#[tokio::test]
async fn test_probe_timeout_is_unreachable() {
    let addr = spawn_backend(delayed_ok(Duration::from_secs(3))).await;
    let started = Instant::now();
    let results = prober()
        .with_timeout(Duration::from_millis(200))
        .probe_all(&[web_target("stuck", addr.port())], THRESHOLD)
        .await;
    assert_eq!(results[0].classification, Classification::Unreachable);
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[tokio::test]
async fn test_probes_run_concurrently() {
    let addr = spawn_backend(delayed_ok(Duration::from_millis(300))).await;
    let targets: Vec<Target> = (0..6)
        .map(|i| web_target(&format!("web{i}"), addr.port()))
        .collect();
    let started = Instant::now();
    let results = prober().probe_all(&targets, Duration::from_secs(2)).await;
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 6);
    assert!(
        results
            .iter()
            .all(|r| r.classification == Classification::Available)
    );
    // Six sequential probes would take at least 1.8s.
    assert!(elapsed < Duration::from_millis(1200), "took {elapsed:?}");
}

#[tokio::test]
async fn test_one_result_per_target_port_pair() {
    let addr = spawn_backend(delayed_ok(Duration::ZERO)).await;
    let down = closed_port().await;
    let targets = vec![
        Target {
            name: "web1".into(),
            ports: vec![PortMapping::tcp(80, addr.port()), PortMapping::tcp(81, down)],
            raw_state: "running".into(),
        },
        web_target("web2", addr.port()),
    ];
    let mut results = prober().probe_all(&targets, Duration::from_secs(2)).await;
    results.sort_by(|a, b| a.target.cmp(&b.target).then(a.port.cmp(&b.port)));

    let pairs: Vec<(&str, u16)> = results.iter().map(|r| (r.target.as_str(), r.port)).collect();
    let mut expected = vec![("web1", addr.port()), ("web1", down), ("web2", addr.port())];
    expected.sort();
    assert_eq!(pairs, expected);
}

#[tokio::test]
async fn test_udp_only_target_yields_no_result() {
    let db = Target {
        name: "db".into(),
        ports: vec![PortMapping {
            container_port: 5432,
            protocol: Protocol::Udp,
            host_port: Some(5432),
        }],
        raw_state: "running".into(),
    };
    let sink = Arc::new(CountingSink::default());
    let results = prober()
        .with_alerts(Arc::new(AlertDispatcher::new(
            sink.clone(),
            AlertPolicy::EveryCycle,
        )))
        .probe_all(&[db], THRESHOLD)
        .await;
    assert!(results.is_empty());
    assert!(sink.events().is_empty());
}

#[tokio::test]
async fn test_webhook_receives_alert_json() {
    let received: Arc<Mutex<Vec<serde_json::Value>>> = Arc::default();
    let hook = Router::new()
        .route(
            "/hook",
            post(
                |State(store): State<Arc<Mutex<Vec<serde_json::Value>>>>,
                 Json(body): Json<serde_json::Value>| async move {
                    store.lock().unwrap().push(body);
                    StatusCode::NO_CONTENT
                },
            ),
        )
        .with_state(received.clone());
    let hook_addr = spawn_backend(hook).await;

    let client = reqwest::Client::new();
    let webhook = Arc::new(WebhookAlerter::new(
        client.clone(),
        format!("http://{hook_addr}/hook"),
    ));
    let dispatcher = AlertDispatcher::new(webhook.clone(), AlertPolicy::EveryCycle);
    let port = closed_port().await;
    Prober::new(client, "127.0.0.1")
        .with_alerts(Arc::new(dispatcher))
        .probe_all(&[web_target("web1", port)], THRESHOLD)
        .await;
    webhook.flush(Duration::from_secs(5)).await;

    let bodies = received.lock().unwrap().clone();
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["target"], "web1");
    assert_eq!(bodies[0]["port"], port);
    assert_eq!(bodies[0]["classification"]["status"], "unreachable");
}

#[tokio::test]
async fn test_webhook_failure_is_swallowed() {
    let dead = closed_port().await;
    let webhook = Arc::new(WebhookAlerter::new(
        reqwest::Client::new(),
        format!("http://127.0.0.1:{dead}/hook"),
    ));
    let dispatcher = AlertDispatcher::new(webhook.clone(), AlertPolicy::EveryCycle);
    let port = closed_port().await;
    let results = prober()
        .with_alerts(Arc::new(dispatcher))
        .probe_all(&[web_target("web1", port)], THRESHOLD)
        .await;
    webhook.flush(Duration::from_secs(5)).await;
    assert_eq!(results.len(), 1);
}

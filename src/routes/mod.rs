// HTTP status API

mod http;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};

use crate::metrics::Metrics;
use crate::probe::Prober;
use crate::source::TargetSource;
use crate::stats::StatsSource;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) source: Arc<dyn TargetSource>,
    pub(crate) prober: Arc<Prober>,
    pub(crate) threshold: Duration,
    pub(crate) metrics: Arc<Metrics>,
    /// Absent when the daemon is only reachable through a remote transport.
    pub(crate) stats: Option<Arc<dyn StatsSource>>,
}

pub fn app(
    source: Arc<dyn TargetSource>,
    prober: Arc<Prober>,
    threshold: Duration,
    metrics: Arc<Metrics>,
    stats: Option<Arc<dyn StatsSource>>,
) -> Router {
    let state = AppState {
        source,
        prober,
        threshold,
        metrics,
        stats,
    };
    Router::new()
        .route("/", get(|| async { crate::version::banner() })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/targets", get(http::targets_handler)) // GET /api/targets
        .route("/api/services", get(http::services_handler)) // GET /api/services
        .route("/metrics", get(http::metrics_handler)) // GET /metrics
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}

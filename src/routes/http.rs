// GET handlers: version, targets, services, metrics

use axum::{
    body::Body,
    extract::{Query, State},
    http::{HeaderValue, StatusCode, header::CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::time::Duration;

use super::AppState;
use crate::source::SourceError;
use crate::stats::StatsSource;
use crate::version::{NAME, VERSION};

/// GET /version: service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/targets: running containers and their published ports.
pub(super) async fn targets_handler(State(state): State<AppState>) -> Response {
    match state.source.list_targets().await {
        Ok(targets) => axum::Json(targets).into_response(),
        Err(e) => source_failure(e),
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ServicesQuery {
    threshold_ms: Option<u64>,
}

/// GET /api/services: one probe cycle over the current targets.
pub(super) async fn services_handler(
    State(state): State<AppState>,
    Query(query): Query<ServicesQuery>,
) -> Response {
    let threshold = query
        .threshold_ms
        .map(Duration::from_millis)
        .unwrap_or(state.threshold);
    match state.source.list_targets().await {
        Ok(targets) => axum::Json(state.prober.probe_all(&targets, threshold).await).into_response(),
        Err(e) => source_failure(e),
    }
}

/// GET /metrics: runs one probe cycle (and a stats sample when local) and exposes the gauges.
///
/// Collection failures are counted in `dockwatch_collect_errors_total` instead of failing the
/// scrape, so the scraper keeps seeing the error counters.
pub(super) async fn metrics_handler(State(state): State<AppState>) -> Response {
    state.metrics.inc_scrape_count();

    let probes = match state.source.list_targets().await {
        Ok(targets) => state.prober.probe_all(&targets, state.threshold).await,
        Err(e) => {
            tracing::warn!(error = %e, "target source failed during scrape");
            state.metrics.inc_collect_error("targets");
            Vec::new()
        }
    };
    let samples = match &state.stats {
        Some(stats) => stats.sample().await.unwrap_or_else(|e| {
            tracing::warn!(error = %format!("{e:#}"), "stats sample failed during scrape");
            state.metrics.inc_collect_error("stats");
            Vec::new()
        }),
        None => Vec::new(),
    };

    match state.metrics.record(&probes, &samples) {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("cannot encode metrics: {err}"),
        )
            .into_response(),
    }
}

fn source_failure(e: SourceError) -> Response {
    tracing::warn!(error = %e, "target source failed");
    (
        StatusCode::BAD_GATEWAY,
        axum::Json(serde_json::json!({ "error": e.to_string() })),
    )
        .into_response()
}

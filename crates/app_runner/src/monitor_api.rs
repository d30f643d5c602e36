//! Read-only monitoring surface plus the operator stop control. Every
//! endpoint reads the copy-on-read summary slot; nothing here touches the
//! round loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::summary::SummarySlot;

#[derive(Clone)]
pub struct MonitorState {
    pub slot: Arc<SummarySlot>,
    pub stop: Arc<AtomicBool>,
    pub prometheus: PrometheusHandle,
}

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
    state: String,
}

pub fn build_router(state: MonitorState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/status", get(status))
        .route("/inventory", get(inventory))
        .route("/history", get(history))
        .route("/control/stop", post(stop))
        .with_state(state)
}

async fn health(State(state): State<MonitorState>) -> Json<HealthResp> {
    Json(HealthResp {
        status: "ok",
        state: state.slot.snapshot().state.clone(),
    })
}

async fn metrics(State(state): State<MonitorState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

async fn status(State(state): State<MonitorState>) -> impl IntoResponse {
    Json(state.slot.snapshot().as_ref().clone())
}

async fn inventory(State(state): State<MonitorState>) -> impl IntoResponse {
    let snapshot = state.slot.snapshot();
    Json(serde_json::json!({ "by_airport": snapshot.inventory }))
}

async fn history(
    State(state): State<MonitorState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let limit = params
        .get("limit")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(20);
    Json(state.slot.recent_rounds(limit))
}

async fn stop(State(state): State<MonitorState>) -> impl IntoResponse {
    state.stop.store(true, Ordering::Relaxed);
    Json(serde_json::json!({"ok": true, "stopping": true}))
}

//! HTTP API: prediction, versions, monitoring reports, health checks and Prometheus metrics

use crate::error::{ApiError, Result};
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use risk_lib::{
    health::ComponentStatus,
    observability::{ServiceMetrics, StructuredLogger},
    reports::ReportKind,
    schema::records_from_json,
    MonitoringQuery, PredictionResponse, Rejection, ServiceContext, ServiceError, VersionInfo,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ServiceContext>,
    pub metrics: ServiceMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        service: Arc<ServiceContext>,
        metrics: ServiceMetrics,
        logger: StructuredLogger,
    ) -> Self {
        Self {
            service,
            metrics,
            logger,
        }
    }

    fn reject(&self, reason: Rejection, details: &str) {
        self.metrics.inc_rejected(reason.as_str());
        self.logger.log_rejection(reason.as_str(), details);
    }
}

/// Body is a single subject or an array of subjects
async fn predict(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResponse>> {
    let Json(body) = payload.map_err(|rejection| {
        state.reject(Rejection::Validation, &rejection.body_text());
        ApiError::BadRequest(rejection.body_text())
    })?;
    let records = records_from_json(&body).map_err(|e| {
        state.reject(Rejection::Validation, &e.to_string());
        ApiError::from(ServiceError::from(e))
    })?;

    match state.service.predict(&records) {
        Ok(outcome) => {
            state
                .metrics
                .observe_transform_latency(outcome.transform_time.as_secs_f64());
            state
                .metrics
                .observe_prediction_latency(outcome.inference_time.as_secs_f64());
            state.metrics.inc_predictions(outcome.labels.len() as u64);

            let latency = outcome.transform_time + outcome.inference_time;
            state.logger.log_prediction(
                records.len(),
                &outcome.labels,
                latency.as_secs_f64() * 1000.0,
            );
            Ok(Json(PredictionResponse {
                predictions: outcome.labels,
            }))
        }
        Err(e) => {
            match e.rejection() {
                Some(reason) => state.reject(reason, &e.to_string()),
                None => state.metrics.inc_prediction_errors(),
            }
            Err(e.into())
        }
    }
}

async fn version(State(state): State<Arc<AppState>>) -> Json<VersionInfo> {
    Json(state.service.versions())
}

/// Build one report kind on the blocking pool and return its JSON
async fn monitor(
    state: Arc<AppState>,
    kind: ReportKind,
    query: std::result::Result<Query<MonitoringQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>> {
    let Query(query) = query.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;

    let service = state.service.clone();
    let report = tokio::task::spawn_blocking(move || service.report_json(kind, query))
        .await
        .map_err(|e| ApiError::Internal(format!("report task failed: {}", e)))??;

    state.metrics.inc_reports_built(kind.as_str());
    let path = state.service.settings().reports.path_for(kind);
    state
        .logger
        .log_report(kind.as_str(), query.window_size, &path.display().to_string());
    Ok(Json(report))
}

async fn monitor_model(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<MonitoringQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>> {
    monitor(state, ReportKind::ModelPerformance, query).await
}

async fn monitor_target(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<MonitoringQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>> {
    monitor(state, ReportKind::TargetDrift, query).await
}

async fn monitor_data(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<MonitoringQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>> {
    monitor(state, ReportKind::DataDrift, query).await
}

async fn monitor_data_quality(
    State(state): State<Arc<AppState>>,
    query: std::result::Result<Query<MonitoringQuery>, QueryRejection>,
) -> Result<Json<serde_json::Value>> {
    monitor(state, ReportKind::DataQuality, query).await
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.service.health();

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // monitoring only
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.service.health().readiness();

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Result<impl IntoResponse> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| ApiError::Internal(format!("failed to encode metrics: {}", e)))?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/version", get(version))
        .route("/monitor-model", get(monitor_model))
        .route("/monitor-target", get(monitor_target))
        .route("/monitor-data", get(monitor_data))
        .route("/monitor-data-quality", get(monitor_data_quality))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

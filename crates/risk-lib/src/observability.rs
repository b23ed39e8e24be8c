//! Observability for the prediction service
//!
//! Provides:
//! - Prometheus metrics (transform and inference latency, prediction and rejection counts, reports, model version)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    GaugeVec, Histogram, IntCounter, IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServiceMetricsInner> = OnceLock::new();

struct ServiceMetricsInner {
    transform_latency_seconds: Histogram,
    prediction_latency_seconds: Histogram,
    predictions_served: IntCounter,
    requests_rejected: IntCounterVec,
    prediction_errors: IntCounter,
    reports_built: IntCounterVec,
    model_version_info: GaugeVec,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        Self {
            transform_latency_seconds: register_histogram!(
                "risk_service_transform_latency_seconds",
                "Time spent replaying the feature pipeline",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register transform_latency_seconds"),

            prediction_latency_seconds: register_histogram!(
                "risk_service_prediction_latency_seconds",
                "Time spent running model inference",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_served: register_int_counter!(
                "risk_service_predictions_total",
                "Total number of records classified"
            )
            .expect("Failed to register predictions_total"),

            requests_rejected: register_int_counter_vec!(
                "risk_service_rejected_requests_total",
                "Requests rejected because of their input",
                &["reason"]
            )
            .expect("Failed to register rejected_requests_total"),

            prediction_errors: register_int_counter!(
                "risk_service_prediction_errors_total",
                "Predictions that failed for reasons other than the input"
            )
            .expect("Failed to register prediction_errors_total"),

            reports_built: register_int_counter_vec!(
                "risk_service_reports_built_total",
                "Monitoring reports built",
                &["report"]
            )
            .expect("Failed to register reports_built_total"),

            model_version_info: register_gauge_vec!(
                "risk_service_model_version_info",
                "Information about the currently loaded model",
                &["version", "flavor", "pipeline"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Handle to the process-wide service metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct ServiceMetrics {
    _private: (),
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServiceMetricsInner {
        GLOBAL_METRICS.get_or_init(ServiceMetricsInner::new)
    }

    pub fn observe_transform_latency(&self, duration_secs: f64) {
        self.inner().transform_latency_seconds.observe(duration_secs);
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self, records: u64) {
        self.inner().predictions_served.inc_by(records);
    }

    /// Count a rejected request; `reason` is `validation` or `encoding`
    pub fn inc_rejected(&self, reason: &str) {
        self.inner()
            .requests_rejected
            .with_label_values(&[reason])
            .inc();
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    pub fn inc_reports_built(&self, report: &str) {
        self.inner().reports_built.with_label_values(&[report]).inc();
    }

    pub fn set_model_version(&self, version: &str, flavor: &str, pipeline: &str) {
        self.inner().model_version_info.reset();
        self.inner()
            .model_version_info
            .with_label_values(&[version, flavor, pipeline])
            .set(1.0);
    }
}

/// Structured logger for service events
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn log_startup(&self, code_version: &str, model_version: &str, monitoring: bool) {
        info!(
            event = "service_started",
            instance = %self.instance,
            code_version = %code_version,
            model_version = %model_version,
            monitoring = monitoring,
            "Prediction service started"
        );
    }

    pub fn log_model_loaded(&self, model_name: &str, flavor: &str, version: &str) {
        info!(
            event = "model_loaded",
            instance = %self.instance,
            model_name = %model_name,
            flavor = %flavor,
            model_version = %version,
            "Model loaded"
        );
    }

    pub fn log_prediction(&self, records: usize, labels: &[String], latency_ms: f64) {
        info!(
            event = "prediction_served",
            instance = %self.instance,
            records = records,
            labels = ?labels,
            latency_ms = latency_ms,
            "Served prediction"
        );
    }

    pub fn log_rejection(&self, reason: &str, details: &str) {
        warn!(
            event = "prediction_rejected",
            instance = %self.instance,
            reason = %reason,
            details = %details,
            "Rejected prediction request"
        );
    }

    pub fn log_report(&self, report: &str, window_size: usize, path: &str) {
        info!(
            event = "report_built",
            instance = %self.instance,
            report = %report,
            window_size = window_size,
            path = %path,
            "Monitoring report built"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Prediction service shutting down"
        );
    }
}

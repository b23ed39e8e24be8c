//! Integration tests for the prediction service API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use risk_lib::{
    inference::LocalRegistry,
    observability::{ServiceMetrics, StructuredLogger},
    ServiceContext, Settings,
};
use risk_server::api::{create_router, AppState};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const TREE_MODEL: &str = r#"{
    "num_class": 4,
    "trees": [
        {"class": 0, "nodes": [
            {"feature": 0, "threshold": -1.5, "left": 1, "right": 2},
            {"leaf": 3.0}, {"leaf": 0.0}
        ]},
        {"class": 1, "nodes": [
            {"feature": 0, "threshold": 0.4, "left": 1, "right": 2},
            {"leaf": 2.0}, {"leaf": -1.0}
        ]},
        {"class": 2, "nodes": [
            {"feature": 0, "threshold": 0.4, "left": 1, "right": 2},
            {"leaf": 0.0},
            {"feature": 0, "threshold": 1.5, "left": 3, "right": 4},
            {"leaf": 2.0}, {"leaf": 0.0}
        ]},
        {"class": 3, "nodes": [
            {"feature": 0, "threshold": 1.5, "left": 1, "right": 2},
            {"leaf": 0.0}, {"leaf": 3.0}
        ]}
    ]
}"#;

const DATASET: &str = "\
Age,Height,Weight,FCVC,FAF,TUE,Gender,CAEC,CALC,MTRANS,SMOKE,SCC,NObeyesdad
19,1.70,45,2,1,0,Male,Sometimes,no,Walking,False,no,Insufficient_Weight
21,1.62,64,2,0,1,Female,Sometimes,no,Public_Transportation,False,no,Normal_Weight
25,1.80,90,2,1,0.5,Male,Sometimes,Sometimes,Public_Transportation,False,no,Overweight_Level_I
35,1.60,95,2,0,0,Female,Always,Frequently,Automobile,True,no,Obesity_Type_I
";

/// Valid per schema, but age 70 lies past the last fitted bin edge
const CURRENT_OUTSIDE_BINS: &str = "\
Age,Height,Weight,FCVC,FAF,TUE,Gender,CAEC,CALC,MTRANS,SMOKE,SCC,NObeyesdad
21,1.62,64,2,0,1,Female,Sometimes,no,Public_Transportation,False,no,Normal_Weight
70,1.65,70,2,0,0,Male,Sometimes,no,Automobile,False,no,Overweight_Level_I
";

/// Writes artifacts, model and VERSION; `current` enables monitoring
fn write_deployment(root: &Path, current: Option<&str>) -> Settings {
    let artifacts = root.join("artifacts");
    fs::create_dir_all(&artifacts).unwrap();
    fs::write(artifacts.join("qcut_bins.json"), "[14.0, 20.0, 22.8, 26.0, 61.0]").unwrap();
    fs::write(
        artifacts.join("features_sc.json"),
        r#"{
            "FCVC": {"mean": 0.9, "std": 0.3},
            "FAF": {"mean": 0.6, "std": 0.4},
            "TUE": {"mean": 0.5, "std": 0.3},
            "BMI": {"mean": 3.2, "std": 0.2},
            "BMR": {"mean": 7.3, "std": 0.15}
        }"#,
    )
    .unwrap();
    fs::write(
        artifacts.join("features_ohe.json"),
        r#"{
            "Age": ["q1", "q2", "q3", "q4"],
            "Gender": ["Female", "Male"],
            "CAEC": ["Always", "Frequently", "Sometimes", "no"],
            "CALC": ["Always", "Frequently", "Sometimes", "no"],
            "MTRANS": ["Automobile", "Bike", "Motorbike", "Public_Transportation", "Walking"],
            "SMOKE": ["False", "True"],
            "SCC": ["no", "yes"],
            "IS": ["0", "1"]
        }"#,
    )
    .unwrap();
    fs::write(
        artifacts.join("label_ohe.json"),
        r#"["Insufficient_Weight", "Normal_Weight", "Overweight_Level_I", "Obesity_Type_I"]"#,
    )
    .unwrap();

    let model_dir = root.join("models").join("latest").join("obesity_classifier");
    fs::create_dir_all(&model_dir).unwrap();
    fs::write(model_dir.join("model.json"), TREE_MODEL).unwrap();
    fs::write(root.join("VERSION"), "0.4.0\n").unwrap();

    let data = root.join("data");
    fs::create_dir_all(&data).unwrap();
    if let Some(current) = current {
        fs::write(data.join("reference.csv"), DATASET).unwrap();
        fs::write(data.join("current.csv"), current).unwrap();
    }

    serde_json::from_value(serde_json::json!({
        "general": {
            "data_path": data,
            "artifacts_path": artifacts,
            "version_file": root.join("VERSION"),
        },
        "model": {
            "registry_path": root.join("models"),
            "features": ["BMI", "BMR", "FAF", "Age_q2", "Gender_Female", "IS_1", "MTRANS_Walking"],
        },
        "reports": {
            "reports_path": root.join("reports"),
        },
    }))
    .unwrap()
}

struct TestApp {
    router: Router,
    _dir: TempDir,
}

async fn start(dir: TempDir, settings: Settings) -> TestApp {
    let registry = Arc::new(LocalRegistry::new(&settings.model.registry_path));
    let service = ServiceContext::initialize(settings, registry).await.unwrap();

    let state = Arc::new(AppState::new(
        Arc::new(service),
        ServiceMetrics::new(),
        StructuredLogger::new("test"),
    ));
    TestApp {
        router: create_router(state),
        _dir: dir,
    }
}

async fn setup_test_app(current: Option<&str>) -> TestApp {
    let dir = TempDir::new().unwrap();
    let settings = write_deployment(dir.path(), current);
    start(dir, settings).await
}

/// A deployment whose settings name no model features
async fn setup_featureless_app() -> TestApp {
    let dir = TempDir::new().unwrap();
    let mut settings = write_deployment(dir.path(), None);
    settings.model.features.clear();
    let model = r#"{"num_class": 4, "trees": [{"class": 1, "nodes": [{"leaf": 1.0}]}]}"#;
    fs::write(
        dir.path()
            .join("models")
            .join("latest")
            .join("obesity_classifier")
            .join("model.json"),
        model,
    )
    .unwrap();
    start(dir, settings).await
}

fn example_body() -> serde_json::Value {
    serde_json::json!({
        "Age": 21,
        "Height": 1.62,
        "Weight": 64,
        "FCVC": 2,
        "FAF": 0,
        "TUE": 1,
        "Gender": "Female",
        "CAEC": "Sometimes",
        "CALC": "no",
        "MTRANS": "Public_Transportation",
        "SMOKE": "False",
        "SCC": "no"
    })
}

async fn get(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn post_json(router: Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

fn json(body: &[u8]) -> serde_json::Value {
    serde_json::from_slice(body).unwrap()
}

#[tokio::test]
async fn test_predict_single_record() {
    let app = setup_test_app(None).await;

    let (status, body) = post_json(app.router, "/predict", example_body().to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!({"predictions": ["Normal_Weight"]}));
}

#[tokio::test]
async fn test_predict_batch_keeps_row_count() {
    let app = setup_test_app(None).await;

    let mut heavy = example_body();
    heavy["Weight"] = serde_json::json!(110);
    let batch = serde_json::json!([example_body(), heavy, example_body()]);

    let (status, body) = post_json(app.router, "/predict", batch.to_string()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["predictions"],
        serde_json::json!(["Normal_Weight", "Obesity_Type_I", "Normal_Weight"])
    );
}

#[tokio::test]
async fn test_predict_rejects_zero_age() {
    let app = setup_test_app(None).await;

    let mut record = example_body();
    record["Age"] = serde_json::json!(0);
    let (status, body) = post_json(app.router, "/predict", record.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("Age"));
}

#[tokio::test]
async fn test_predict_rejects_unseen_category() {
    let app = setup_test_app(None).await;

    let mut record = example_body();
    record["SMOKE"] = serde_json::json!("Sometimes");
    let (status, body) = post_json(app.router, "/predict", record.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "encoding_error");
}

#[tokio::test]
async fn test_predict_names_missing_field() {
    let app = setup_test_app(None).await;

    let mut record = example_body();
    record.as_object_mut().unwrap().remove("Gender");
    let (status, body) = post_json(app.router, "/predict", record.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["message"], "invalid value for 'Gender': is required");
}

#[tokio::test]
async fn test_predict_names_wrongly_typed_field() {
    let app = setup_test_app(None).await;

    let mut heavy = example_body();
    heavy["Age"] = serde_json::json!("abc");
    let batch = serde_json::json!([example_body(), heavy]);
    let (status, body) = post_json(app.router, "/predict", batch.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert_eq!(body["message"], "invalid value for 'Age': must be a number");
}

#[tokio::test]
async fn test_predict_age_outside_fitted_bins_is_validation_error() {
    let app = setup_test_app(None).await;

    let mut record = example_body();
    record["Age"] = serde_json::json!(70);
    let (status, body) = post_json(app.router, "/predict", record.to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "validation_error");
    assert!(body["message"].as_str().unwrap().contains("'Age'"));
}

#[tokio::test]
async fn test_predict_rejects_malformed_body() {
    let app = setup_test_app(None).await;

    let (status, body) = post_json(app.router, "/predict", "{\"Age\": 21".to_string()).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "bad_request");
}

#[tokio::test]
async fn test_version() {
    let app = setup_test_app(None).await;

    let (status, body) = get(app.router, "/version").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json(&body),
        serde_json::json!({"code_version": "0.4.0", "model_version": "1"})
    );
}

#[tokio::test]
async fn test_monitoring_unavailable_without_datasets() {
    let app = setup_test_app(None).await;

    let (status, body) = get(app.router, "/monitor-data").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json(&body)["error"], "monitoring_unavailable");
}

#[tokio::test]
async fn test_monitor_model_respects_window_size() {
    let app = setup_test_app(Some(DATASET)).await;

    let (status, body) = get(app.router, "/monitor-model?window_size=2").await;
    assert_eq!(status, StatusCode::OK);
    let report = json(&body);
    assert_eq!(report["report"], "model_performance");
    assert_eq!(report["current_rows"], 2);
    assert_eq!(report["reference_rows"], 4);
}

#[tokio::test]
async fn test_every_monitoring_route_returns_a_report() {
    let app = setup_test_app(Some(DATASET)).await;

    for (uri, kind) in [
        ("/monitor-model", "model_performance"),
        ("/monitor-target", "target_drift"),
        ("/monitor-data", "data_drift"),
        ("/monitor-data-quality", "data_quality"),
    ] {
        let (status, body) = get(app.router.clone(), uri).await;
        assert_eq!(status, StatusCode::OK, "{}", uri);
        assert_eq!(json(&body)["report"], kind);
    }
}

#[tokio::test]
async fn test_monitoring_rejects_zero_window() {
    let app = setup_test_app(Some(DATASET)).await;

    let (status, body) = get(app.router, "/monitor-target?window_size=0").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json(&body)["error"], "validation_error");
}

#[tokio::test]
async fn test_unscorable_current_data_is_a_server_error() {
    let app = setup_test_app(Some(CURRENT_OUTSIDE_BINS)).await;

    let (status, body) = get(app.router.clone(), "/monitor-data?window_size=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["current_rows"], 1);

    let (status, body) = get(app.router, "/monitor-data?window_size=2").await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = json(&body);
    assert_eq!(body["error"], "internal_error");
    assert_eq!(body["message"], "An internal error occurred");
}

#[tokio::test]
async fn test_monitoring_rejects_non_numeric_window() {
    let app = setup_test_app(Some(DATASET)).await;

    let (status, body) = get(app.router, "/monitor-data?window_size=many").await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json(&body)["error"], "bad_request");
}

#[tokio::test]
async fn test_healthz_degraded_without_monitoring_data() {
    let app = setup_test_app(None).await;

    let (status, body) = get(app.router, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    let health = json(&body);
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["model"]["status"], "healthy");
    assert_eq!(health["components"]["reference_data"]["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_healthy_with_monitoring_data() {
    let app = setup_test_app(Some(DATASET)).await;

    let (status, body) = get(app.router, "/healthz").await;
    assert_eq!(status, StatusCode::OK);
    let health = json(&body);
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["reference_data"]["message"]
        .as_str()
        .unwrap()
        .contains("4 reference rows"));
}

#[tokio::test]
async fn test_readyz_ok_once_model_is_loaded() {
    let app = setup_test_app(None).await;

    let (status, body) = get(app.router, "/readyz").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json(&body)["ready"], true);
}

#[tokio::test]
async fn test_no_model_features_is_unhealthy_and_not_ready() {
    let app = setup_featureless_app().await;

    let (status, body) = get(app.router.clone(), "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let health = json(&body);
    assert_eq!(health["status"], "unhealthy");
    assert_eq!(health["components"]["pipeline"]["status"], "unhealthy");

    let (status, body) = get(app.router, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness = json(&body);
    assert_eq!(readiness["ready"], false);
    assert!(readiness["reason"].as_str().unwrap().starts_with("pipeline:"));
}

#[tokio::test]
async fn test_metrics_exposes_service_metrics() {
    let app = setup_test_app(None).await;

    let (status, _) = post_json(app.router.clone(), "/predict", example_body().to_string()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = get(app.router, "/metrics").await;
    assert_eq!(status, StatusCode::OK);
    let text = String::from_utf8(body).unwrap();
    assert!(text.contains("risk_service_predictions_total"));
    assert!(text.contains("risk_service_prediction_latency_seconds"));
}

//! Monitoring report CLI commands

use anyhow::{Context, Result};
use clap::ValueEnum;
use colored::Colorize;
use serde_json::Value;
use tabled::Tabled;

use crate::client::{ApiClient, Report};
use crate::output::{
    color_drift, format_percent, format_score, print_heading, print_json, print_success,
    print_table, print_warning, OutputFormat,
};

/// Which monitoring report to request
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportKind {
    /// Model performance on reference and current data
    Model,
    /// Drift of the target and the predictions
    Target,
    /// Per-feature data drift
    Data,
    /// Data quality summaries
    DataQuality,
}

impl ReportKind {
    pub fn endpoint(&self) -> &'static str {
        match self {
            ReportKind::Model => "monitor-model",
            ReportKind::Target => "monitor-target",
            ReportKind::Data => "monitor-data",
            ReportKind::DataQuality => "monitor-data-quality",
        }
    }
}

#[derive(Tabled)]
struct QualityRow {
    #[tabled(rename = "Window")]
    window: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Weighted F1")]
    weighted_f1: String,
}

#[derive(Tabled)]
struct ClassRow {
    #[tabled(rename = "Class")]
    label: String,
    #[tabled(rename = "Precision")]
    precision: String,
    #[tabled(rename = "Recall")]
    recall: String,
    #[tabled(rename = "F1")]
    f1: String,
    #[tabled(rename = "Support")]
    support: u64,
}

#[derive(Tabled)]
struct LabelDriftRow {
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "JS Distance")]
    distance: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct FeatureDriftRow {
    #[tabled(rename = "Feature")]
    column: String,
    #[tabled(rename = "Test")]
    test: String,
    #[tabled(rename = "Statistic")]
    statistic: String,
    #[tabled(rename = "Threshold")]
    threshold: String,
    #[tabled(rename = "Status")]
    status: String,
}

#[derive(Tabled)]
struct ColumnRow {
    #[tabled(rename = "Column")]
    column: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Count")]
    count: u64,
    #[tabled(rename = "Missing")]
    missing: u64,
    #[tabled(rename = "Mean / Most common")]
    center: String,
}

/// Request a report over the first `window_size` current rows
pub async fn monitor(
    client: &ApiClient,
    kind: ReportKind,
    window_size: Option<usize>,
    output: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let path = match window_size {
        Some(n) => format!("{}?window_size={}", kind.endpoint(), n),
        None => kind.endpoint().to_string(),
    };
    let body: Value = client.get(&path).await?;

    if let Some(file) = output {
        std::fs::write(&file, serde_json::to_string_pretty(&body)?)
            .with_context(|| format!("Failed to write {}", file))?;
        print_success(&format!("Report written to {}", file));
    }

    match format {
        OutputFormat::Json => print_json(&body)?,
        OutputFormat::Table => {
            let report: Report =
                serde_json::from_value(body).context("Unexpected report format")?;
            print_report(kind, &report);
        }
    }

    Ok(())
}

fn print_report(kind: ReportKind, report: &Report) {
    print_heading(report_title(kind), 60);
    println!("Generated:      {}", report.generated_at);
    println!("Reference rows: {}", report.reference_rows);
    println!("Current rows:   {}", report.current_rows);
    println!();

    let metrics = &report.metrics;
    match kind {
        ReportKind::Model => print_model_performance(metrics),
        ReportKind::Target => print_target_drift(metrics),
        ReportKind::Data => print_data_drift(metrics),
        ReportKind::DataQuality => print_data_quality(metrics),
    }
}

fn report_title(kind: ReportKind) -> &'static str {
    match kind {
        ReportKind::Model => "Model Performance",
        ReportKind::Target => "Target Drift",
        ReportKind::Data => "Data Drift",
        ReportKind::DataQuality => "Data Quality",
    }
}

fn print_model_performance(metrics: &Value) {
    let rows = ["reference", "current"]
        .iter()
        .map(|window| QualityRow {
            window: window.to_string(),
            accuracy: format_score(metrics[window]["quality"]["accuracy"].as_f64()),
            weighted_f1: format_score(metrics[window]["quality"]["weighted_f1"].as_f64()),
        })
        .collect();
    print_table(rows);

    if let Some(delta) = metrics["weighted_f1_delta"].as_f64() {
        let formatted = format!("{:+.3}", delta);
        let colored = if delta < 0.0 {
            formatted.red()
        } else {
            formatted.green()
        };
        println!("Weighted F1 change: {}", colored);
    }

    println!();
    println!("{}", "Current window by class".bold());
    let classes = metrics["current"]["quality"]["classes"]
        .as_array()
        .map(|classes| {
            classes
                .iter()
                .map(|c| ClassRow {
                    label: c["label"].as_str().unwrap_or_default().to_string(),
                    precision: format_score(c["precision"].as_f64()),
                    recall: format_score(c["recall"].as_f64()),
                    f1: format_score(c["f1"].as_f64()),
                    support: c["support"].as_u64().unwrap_or_default(),
                })
                .collect()
        })
        .unwrap_or_default();
    print_table(classes);
}

fn label_drift_row(drift: &Value) -> Option<LabelDriftRow> {
    Some(LabelDriftRow {
        column: drift["column"].as_str()?.to_string(),
        distance: format_score(drift["jensen_shannon_distance"].as_f64()),
        status: color_drift(drift["drift_detected"].as_bool().unwrap_or_default()),
    })
}

fn print_target_drift(metrics: &Value) {
    if metrics["target"].is_null() {
        print_warning("Target is not available, showing prediction drift only");
    }
    let rows = [&metrics["target"], &metrics["prediction"]]
        .into_iter()
        .filter_map(label_drift_row)
        .collect();
    print_table(rows);
}

fn print_data_drift(metrics: &Value) {
    let rows = metrics["features"]
        .as_array()
        .map(|features| {
            features
                .iter()
                .map(|f| FeatureDriftRow {
                    column: f["column"].as_str().unwrap_or_default().to_string(),
                    test: f["test"].as_str().unwrap_or_default().to_string(),
                    statistic: format_score(f["statistic"].as_f64()),
                    threshold: format_score(f["threshold"].as_f64()),
                    status: color_drift(f["drift_detected"].as_bool().unwrap_or_default()),
                })
                .collect()
        })
        .unwrap_or_default();
    print_table(rows);

    let share = metrics["share_of_drifted_features"].as_f64().unwrap_or_default();
    let dataset_drift = metrics["dataset_drift"].as_bool().unwrap_or_default();
    println!(
        "Drifted features: {} ({})  Dataset: {}",
        metrics["drifted_features"].as_u64().unwrap_or_default(),
        format_percent(share),
        color_drift(dataset_drift)
    );
}

fn print_data_quality(metrics: &Value) {
    let rows = metrics["current"]
        .as_object()
        .map(|columns| {
            columns
                .iter()
                .map(|(name, summary)| ColumnRow {
                    column: name.clone(),
                    kind: summary["type"].as_str().unwrap_or_default().to_string(),
                    count: summary["count"].as_u64().unwrap_or_default(),
                    missing: summary["missing"].as_u64().unwrap_or_default(),
                    center: match summary["most_common"].as_str() {
                        Some(value) => value.to_string(),
                        None => format_score(summary["mean"].as_f64()),
                    },
                })
                .collect()
        })
        .unwrap_or_default();
    print_table(rows);
}

//! Service status CLI commands

use anyhow::Result;
use chrono::{TimeZone, Utc};
use colored::Colorize;
use tabled::Tabled;

use crate::client::{ApiClient, HealthResponse, ReadinessResponse, VersionInfo};
use crate::output::{color_status, print_heading, print_json, print_table, print_warning, OutputFormat};

/// Row for component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Last Check")]
    last_check: String,
}

/// Show code and model versions
pub async fn show_version(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let versions: VersionInfo = client.get("version").await?;

    match format {
        OutputFormat::Json => print_json(&versions)?,
        OutputFormat::Table => {
            print_heading("Service Versions", 40);
            println!("Code version:  {}", versions.code_version.cyan());
            println!("Model version: {}", versions.model_version.cyan());
        }
    }

    Ok(())
}

/// Show component health and readiness
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let (_, health): (_, HealthResponse) = client.get_with_status("healthz").await?;
    let (_, readiness): (_, ReadinessResponse) = client.get_with_status("readyz").await?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "health": health,
            "readiness": readiness,
        }))?,
        OutputFormat::Table => {
            print_heading("Service Health", 50);
            println!("Status: {}", color_status(&health.status));
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!("Ready:  {}", color_status(ready));
            if let Some(reason) = &readiness.reason {
                print_warning(reason);
            }
            println!();

            let mut rows: Vec<ComponentRow> = health
                .components
                .iter()
                .map(|(name, component)| ComponentRow {
                    name: name.clone(),
                    status: color_status(&component.status),
                    message: component.message.clone().unwrap_or_default(),
                    last_check: format_timestamp(component.last_check_timestamp),
                })
                .collect();
            rows.sort_by(|a, b| a.name.cmp(&b.name));
            print_table(rows);
        }
    }

    Ok(())
}

fn format_timestamp(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

//! Prediction CLI commands

use anyhow::{bail, Context, Result};
use serde_json::{Map, Number, Value};
use std::io::Read;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, PredictionResponse};
use crate::output::{color_label, print_info, print_json, print_table, OutputFormat};

/// Row for predictions table
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Prediction")]
    label: String,
}

/// Read records from a JSON file (object or array), a CSV file, or stdin (`-`, JSON)
pub fn read_records(input: &str) -> Result<Vec<Value>> {
    if input == "-" {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("Failed to read stdin")?;
        return parse_json_records(&content);
    }

    let path = Path::new(input);
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));

    if is_csv {
        let reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        parse_csv_records(reader)
    } else {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_json_records(&content)
    }
}

fn parse_json_records(content: &str) -> Result<Vec<Value>> {
    match serde_json::from_str(content).context("Input is not valid JSON")? {
        Value::Array(records) => Ok(records),
        record @ Value::Object(_) => Ok(vec![record]),
        _ => bail!("Expected a JSON object or an array of objects"),
    }
}

/// CSV rows as JSON objects; numeric cells become numbers, empty cells are omitted
fn parse_csv_records<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<Value>> {
    let headers = reader.headers().context("Failed to read CSV header")?.clone();
    let mut records = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Failed to read CSV row {}", row + 1))?;
        let mut object = Map::new();
        for (name, cell) in headers.iter().zip(record.iter()) {
            let cell = cell.trim();
            if cell.is_empty() {
                continue;
            }
            let value = match cell.parse::<f64>().ok().and_then(Number::from_f64) {
                Some(number) => Value::Number(number),
                None => Value::String(cell.to_string()),
            };
            object.insert(name.to_string(), value);
        }
        records.push(Value::Object(object));
    }

    Ok(records)
}

/// Classify the records in `input`
pub async fn predict(client: &ApiClient, input: &str, format: OutputFormat) -> Result<()> {
    let records = read_records(input)?;
    if records.is_empty() {
        bail!("No records found in {}", input);
    }

    let result: PredictionResponse = client.post("predict", &records).await?;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            let rows = result
                .predictions
                .iter()
                .enumerate()
                .map(|(index, label)| PredictionRow {
                    index: index + 1,
                    label: color_label(label),
                })
                .collect();
            print_table(rows);
            print_info(&format!("Total: {} predictions", result.predictions.len()));
        }
    }

    Ok(())
}

//! Raw input schema and boundary validation
//!
//! A [`RawRecord`] is one subject's measurements as received from a caller or
//! read from a dataset row. Field names on the wire match the dataset headers.
//! Validation is declarative: numeric fields carry inclusive bounds plus an
//! optional "reject exactly zero" rule, categorical fields carry a fixed
//! enumeration. The first violation fails the whole record.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// Field-level validation failure
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid value for '{field}': {constraint}")]
pub struct ValidationError {
    pub field: String,
    pub constraint: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, constraint: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            constraint: constraint.into(),
        }
    }
}

/// Inclusive numeric bounds for one field
#[derive(Debug, Clone, Copy)]
pub struct NumericRule {
    pub field: &'static str,
    pub min: f64,
    pub max: f64,
    /// Zero lies inside the bounds but is still rejected
    pub reject_zero: bool,
}

/// Fixed category enumeration for one field
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub field: &'static str,
    pub allowed: &'static [&'static str],
}

const FREQUENCY: &[&str] = &["Frequently", "Sometimes", "Always", "no"];

pub const NUMERIC_RULES: &[NumericRule] = &[
    NumericRule { field: "Age", min: 0.0, max: 100.0, reject_zero: true },
    NumericRule { field: "Height", min: 0.0, max: 2.5, reject_zero: true },
    NumericRule { field: "Weight", min: 0.0, max: 400.0, reject_zero: true },
    NumericRule { field: "FCVC", min: 0.0, max: 5.0, reject_zero: true },
    NumericRule { field: "NCP", min: 0.0, max: 5.0, reject_zero: false },
    NumericRule { field: "CH2O", min: 0.0, max: 5.0, reject_zero: false },
    NumericRule { field: "FAF", min: 0.0, max: 5.0, reject_zero: false },
    NumericRule { field: "TUE", min: 0.0, max: 2.0, reject_zero: false },
];

pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule { field: "Gender", allowed: &["Male", "Female"] },
    CategoryRule { field: "CAEC", allowed: FREQUENCY },
    CategoryRule { field: "CALC", allowed: FREQUENCY },
    CategoryRule {
        field: "MTRANS",
        allowed: &["Public_Transportation", "Automobile", "Walking", "Motorbike", "Bike"],
    },
];

/// Yes/no style fields whose vocabulary is owned by the fitted encoders
pub const FLAG_FIELDS: &[&str] = &["SMOKE", "SCC", "family_history_with_overweight", "FAVC"];

/// Fields the public prediction schema may omit
pub const OPTIONAL_FIELDS: &[&str] = &["NCP", "CH2O", "family_history_with_overweight", "FAVC"];

/// A single subject's raw measurements
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    #[serde(rename = "Age")]
    pub age: f64,
    /// Height in meters
    #[serde(rename = "Height")]
    pub height: f64,
    /// Weight in kilograms
    #[serde(rename = "Weight")]
    pub weight: f64,
    #[serde(rename = "FCVC")]
    pub fcvc: f64,
    #[serde(rename = "NCP", default, skip_serializing_if = "Option::is_none")]
    pub ncp: Option<f64>,
    #[serde(rename = "CH2O", default, skip_serializing_if = "Option::is_none")]
    pub ch2o: Option<f64>,
    #[serde(rename = "FAF")]
    pub faf: f64,
    #[serde(rename = "TUE")]
    pub tue: f64,
    #[serde(rename = "Gender")]
    pub gender: String,
    #[serde(rename = "CAEC")]
    pub caec: String,
    #[serde(rename = "CALC")]
    pub calc: String,
    #[serde(rename = "MTRANS")]
    pub mtrans: String,
    #[serde(rename = "SMOKE")]
    pub smoke: String,
    #[serde(rename = "SCC")]
    pub scc: String,
    #[serde(
        rename = "family_history_with_overweight",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub family_history: Option<String>,
    #[serde(rename = "FAVC", default, skip_serializing_if = "Option::is_none")]
    pub favc: Option<String>,
}

impl RawRecord {
    /// Numeric field by its wire name
    pub fn numeric(&self, field: &str) -> Option<f64> {
        match field {
            "Age" => Some(self.age),
            "Height" => Some(self.height),
            "Weight" => Some(self.weight),
            "FCVC" => Some(self.fcvc),
            "NCP" => self.ncp,
            "CH2O" => self.ch2o,
            "FAF" => Some(self.faf),
            "TUE" => Some(self.tue),
            _ => None,
        }
    }

    /// Categorical field by its wire name
    pub fn categorical(&self, field: &str) -> Option<&str> {
        match field {
            "Gender" => Some(&self.gender),
            "CAEC" => Some(&self.caec),
            "CALC" => Some(&self.calc),
            "MTRANS" => Some(&self.mtrans),
            "SMOKE" => Some(&self.smoke),
            "SCC" => Some(&self.scc),
            "family_history_with_overweight" => self.family_history.as_deref(),
            "FAVC" => self.favc.as_deref(),
            _ => None,
        }
    }

    /// Check every declared constraint, failing on the first violation
    pub fn validate(&self) -> Result<(), ValidationError> {
        for rule in NUMERIC_RULES {
            let Some(value) = self.numeric(rule.field) else {
                continue;
            };
            if !value.is_finite() {
                return Err(ValidationError::new(rule.field, "must be a finite number"));
            }
            if value < rule.min || value > rule.max {
                return Err(ValidationError::new(
                    rule.field,
                    format!("must be between {} and {}", rule.min, rule.max),
                ));
            }
            if rule.reject_zero && value == 0.0 {
                return Err(ValidationError::new(rule.field, "must not be 0"));
            }
        }

        for rule in CATEGORY_RULES {
            let Some(value) = self.categorical(rule.field) else {
                continue;
            };
            if !rule.allowed.contains(&value) {
                return Err(ValidationError::new(
                    rule.field,
                    format!("must be one of {:?}", rule.allowed),
                ));
            }
        }

        for field in FLAG_FIELDS {
            if let Some(value) = self.categorical(field) {
                if value.trim().is_empty() {
                    return Err(ValidationError::new(*field, "must not be empty"));
                }
            }
        }

        Ok(())
    }
}

impl RawRecord {
    /// Parse one record from a JSON object, naming the first missing or
    /// wrongly typed field
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::new("record", "must be a JSON object"))?;

        for rule in NUMERIC_RULES {
            check_field(object, rule.field, Value::is_number, "must be a number")?;
        }
        let text_fields = CATEGORY_RULES.iter().map(|rule| rule.field);
        for field in text_fields.chain(FLAG_FIELDS.iter().copied()) {
            check_field(object, field, Value::is_string, "must be a string")?;
        }

        serde_json::from_value(value.clone())
            .map_err(|e| ValidationError::new("record", e.to_string()))
    }
}

fn check_field(
    object: &Map<String, Value>,
    field: &str,
    is_valid: fn(&Value) -> bool,
    constraint: &str,
) -> Result<(), ValidationError> {
    match object.get(field) {
        None | Some(Value::Null) if OPTIONAL_FIELDS.contains(&field) => Ok(()),
        None | Some(Value::Null) => Err(ValidationError::new(field, "is required")),
        Some(value) if is_valid(value) => Ok(()),
        Some(_) => Err(ValidationError::new(field, constraint)),
    }
}

/// Records of a prediction body: a single object or an array of objects
pub fn records_from_json(body: &Value) -> Result<Vec<RawRecord>, ValidationError> {
    match body {
        Value::Array(items) => items.iter().map(RawRecord::from_json).collect(),
        single => Ok(vec![RawRecord::from_json(single)?]),
    }
}

/// Query parameters of the monitoring entry points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringQuery {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_window_size() -> usize {
    300
}

impl Default for MonitoringQuery {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
        }
    }
}

impl MonitoringQuery {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.window_size == 0 {
            return Err(ValidationError::new("window_size", "must not be 0"));
        }
        Ok(())
    }
}

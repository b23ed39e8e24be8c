//! Obesity risk classification library
//!
//! This crate provides the core functionality for:
//! - Input validation and the feature engineering pipeline
//! - Fitted transformation artifacts and model loading
//! - Inference and label decoding
//! - Monitoring reports over reference and current data
//! - Health checks and observability

pub mod artifacts;
pub mod dataset;
pub mod evaluation;
pub mod health;
pub mod inference;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod reports;
pub mod schema;
pub mod service;
pub mod settings;

pub use health::{ComponentHealth, ComponentStatus, HealthResponse, ReadinessResponse};
pub use models::*;
pub use observability::{ServiceMetrics, StructuredLogger};
pub use schema::{MonitoringQuery, RawRecord, ValidationError};
pub use service::{PredictionOutcome, Rejection, ServiceContext, ServiceError};
pub use settings::Settings;

//! Service health
//!
//! Health is computed on demand from what the service actually holds, not
//! stored: see [`crate::ServiceContext::health`]. The overall status is the
//! worst component status, and the service is ready unless a component is
//! unhealthy. Missing monitoring data only degrades it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status of one component, ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Serving predictions, but a secondary feature is off
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn checked(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy(message: impl Into<String>) -> Self {
        Self::checked(ComponentStatus::Healthy, Some(message.into()))
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::checked(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::checked(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Component names reported by `/healthz`
pub mod components {
    pub const PIPELINE: &str = "pipeline";
    pub const MODEL: &str = "model";
    pub const REFERENCE_DATA: &str = "reference_data";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: BTreeMap<String, ComponentHealth>,
}

impl HealthResponse {
    pub fn from_components<'a>(
        components: impl IntoIterator<Item = (&'a str, ComponentHealth)>,
    ) -> Self {
        let components: BTreeMap<String, ComponentHealth> = components
            .into_iter()
            .map(|(name, health)| (name.to_string(), health))
            .collect();
        let status = components
            .values()
            .map(|health| health.status)
            .max()
            .unwrap_or(ComponentStatus::Healthy);
        Self { status, components }
    }

    pub fn readiness(&self) -> ReadinessResponse {
        let failing: Vec<String> = self
            .components
            .iter()
            .filter(|(_, health)| health.status == ComponentStatus::Unhealthy)
            .map(|(name, health)| match &health.message {
                Some(message) => format!("{}: {}", name, message),
                None => name.clone(),
            })
            .collect();

        ReadinessResponse {
            ready: failing.is_empty(),
            reason: (!failing.is_empty()).then(|| failing.join("; ")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_component_wins() {
        let health = HealthResponse::from_components([
            (components::PIPELINE, ComponentHealth::healthy("v1")),
            (components::REFERENCE_DATA, ComponentHealth::degraded("no data")),
        ]);
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(health.readiness().ready);

        let health = HealthResponse::from_components([
            (components::REFERENCE_DATA, ComponentHealth::degraded("no data")),
            (components::MODEL, ComponentHealth::unhealthy("model is not loaded")),
        ]);
        assert_eq!(health.status, ComponentStatus::Unhealthy);
    }

    #[test]
    fn test_unhealthy_component_named_in_readiness() {
        let health = HealthResponse::from_components([
            (components::MODEL, ComponentHealth::unhealthy("model is not loaded")),
            (components::PIPELINE, ComponentHealth::healthy("v1")),
        ]);
        let readiness = health.readiness();
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("model: model is not loaded"));
    }

    #[test]
    fn test_no_components_is_healthy() {
        let health = HealthResponse::from_components(Vec::<(&str, ComponentHealth)>::new());
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert!(health.readiness().reason.is_none());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&ComponentStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }
}

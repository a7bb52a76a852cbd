use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Body of `GET /health`; `checks` is keyed by component name.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct HealthCheckResponse {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub checks: HashMap<String, ComponentHealth>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ComponentHealth {
    pub status: HealthStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ComponentHealth {
    fn with_status(status: HealthStatus, error: Option<String>) -> Self {
        Self {
            status,
            detail: None,
            error,
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(HealthStatus::Healthy, None)
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Degraded, Some(reason.into()))
    }

    pub fn unhealthy(reason: impl Into<String>) -> Self {
        Self::with_status(HealthStatus::Unhealthy, Some(reason.into()))
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

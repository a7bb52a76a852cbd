use std::{collections::HashMap, sync::Arc};

use chrono::Utc;
use tracing::{debug, warn};

use crate::{
    dispatcher::Dispatcher,
    models::health::{ComponentHealth, HealthCheckResponse, HealthStatus},
};

pub struct HealthChecker {
    dispatcher: Arc<Dispatcher>,
}

impl HealthChecker {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn check_all(&self) -> HealthCheckResponse {
        let mut checks = HashMap::new();

        checks.insert("message_broker".to_string(), self.check_queue());
        checks.insert("providers".to_string(), self.check_providers().await);

        let status = Self::determine_overall_status(&checks);

        HealthCheckResponse {
            status,
            timestamp: Utc::now(),
            checks,
        }
    }

    fn check_queue(&self) -> ComponentHealth {
        if self.dispatcher.queue().is_connected() {
            debug!("Message broker health check passed");
            ComponentHealth::healthy()
        } else {
            warn!("Message broker connection is down");
            ComponentHealth::unhealthy("Connection closed")
        }
    }

    async fn check_providers(&self) -> ComponentHealth {
        match self.dispatcher.list_available_providers().await {
            Ok(available) if available.is_empty() => {
                ComponentHealth::degraded("No provider is configured")
            }
            Ok(available) => {
                let names = available
                    .iter()
                    .map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join(",");
                ComponentHealth::healthy().with_detail(names)
            }
            Err(e) => {
                warn!(error = %e, "Provider health check failed");
                ComponentHealth::unhealthy(e.to_string())
            }
        }
    }

    fn determine_overall_status(checks: &HashMap<String, ComponentHealth>) -> HealthStatus {
        let broker_down = checks
            .get("message_broker")
            .is_some_and(|h| h.status == HealthStatus::Unhealthy);

        if broker_down {
            HealthStatus::Unhealthy
        } else if checks.values().any(|h| h.status != HealthStatus::Healthy) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        }
    }
}

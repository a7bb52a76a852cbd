use std::time::Duration;

use anyhow::{Error, Result, anyhow};
use dotenvy::dotenv;
use serde::Deserialize;

use crate::models::{notification::ProviderType, retry::RetryConfig, schedule::DelayTiers};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_rabbitmq_url")]
    pub rabbitmq_url: String,
    #[serde(default = "default_queue_name")]
    pub queue_name: String,
    #[serde(default = "default_prefetch_count")]
    pub prefetch_count: u16,
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    #[serde(default = "default_server_port")]
    pub server_port: u16,

    #[serde(default = "default_dispatch_strategy")]
    pub dispatch_strategy: String,
    pub email_providers: Option<String>,
    pub sms_providers: Option<String>,
    pub whatsapp_providers: Option<String>,
    #[serde(default = "default_attempt_timeout_ms")]
    pub provider_attempt_timeout_ms: u64,

    #[serde(default = "default_defer_mode")]
    pub defer_mode: String,
    #[serde(default = "default_defer_tiers_ms")]
    pub defer_tiers_ms: String,

    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_initial_retry_delay_ms")]
    pub initial_retry_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
    #[serde(default = "default_retry_backoff_multiplier")]
    pub retry_backoff_multiplier: u64,

    pub resend_endpoint: Option<String>,
    pub resend_api_key: Option<String>,
    pub resend_from: Option<String>,

    pub sendgrid_endpoint: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_from: Option<String>,

    pub mailersend_endpoint: Option<String>,
    pub mailersend_api_key: Option<String>,
    pub mailersend_from: Option<String>,

    pub twilio_sms_endpoint: Option<String>,
    pub twilio_whatsapp_endpoint: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub twilio_whatsapp_number: Option<String>,
}

fn default_rabbitmq_url() -> String {
    "amqp://localhost:5672/%2f".to_string()
}

fn default_queue_name() -> String {
    "notifications".to_string()
}

fn default_prefetch_count() -> u16 {
    10
}

fn default_worker_concurrency() -> usize {
    10
}

fn default_server_port() -> u16 {
    3000
}

fn default_dispatch_strategy() -> String {
    "failover".to_string()
}

fn default_attempt_timeout_ms() -> u64 {
    30_000
}

fn default_defer_mode() -> String {
    "delay_queue".to_string()
}

fn default_defer_tiers_ms() -> String {
    "100,1000,10000,60000".to_string()
}

fn default_max_retry_attempts() -> u32 {
    5
}

fn default_initial_retry_delay_ms() -> u64 {
    500
}

fn default_max_retry_delay_ms() -> u64 {
    10_000
}

fn default_retry_backoff_multiplier() -> u64 {
    2
}

impl Config {
    pub fn load() -> Result<Self, Error> {
        dotenv().ok();

        let config = envy::from_env::<Self>()
            .map_err(|e| anyhow!("Invalid or missing environmental variable: {}", e))?;
        Ok(config)
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_retry_attempts,
            initial_delay_ms: self.initial_retry_delay_ms,
            max_delay_ms: self.max_retry_delay_ms,
            backoff_multiplier: self.retry_backoff_multiplier,
        }
    }

    /// `None` when attempts may run unbounded.
    pub fn attempt_timeout(&self) -> Option<Duration> {
        (self.provider_attempt_timeout_ms > 0)
            .then(|| Duration::from_millis(self.provider_attempt_timeout_ms))
    }

    /// Parses the comma-separated delay tiers, in milliseconds.
    pub fn defer_tiers(&self) -> Result<DelayTiers, Error> {
        let values = self
            .defer_tiers_ms
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| {
                v.parse::<u64>()
                    .map_err(|e| anyhow!("Invalid delay tier '{}': {}", v, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        DelayTiers::from_millis(&values)
            .ok_or_else(|| anyhow!("DEFER_TIERS_MS needs at least one non-zero tier"))
    }

    pub fn delay_queue_name(&self, tier: Duration) -> String {
        format!("{}.delayed.{}ms", self.queue_name, tier.as_millis())
    }

    /// Parses the ranked provider override for one channel, if configured.
    pub fn ranked_providers(value: &Option<String>) -> Result<Option<Vec<ProviderType>>, Error> {
        match value.as_deref() {
            None => Ok(None),
            Some(list) => {
                let ranked = ProviderType::parse_list(list).map_err(|e| anyhow!("{}", e))?;
                Ok((!ranked.is_empty()).then_some(ranked))
            }
        }
    }
}

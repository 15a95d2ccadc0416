use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::core::errors::{Result, SentinelError};

/// Scoring oracle client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Base URL of the scoring oracle.
    #[serde(default = "ScoringConfig::default_base_url")]
    pub base_url: String,

    /// Timeout for a single-transaction scoring call (seconds).
    #[serde(default = "ScoringConfig::default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Timeout for a batch scoring call (seconds).
    #[serde(default = "ScoringConfig::default_batch_timeout")]
    pub batch_timeout_secs: u64,

    /// Retry attempts after the initial call on transient failure.
    #[serde(default = "ScoringConfig::default_max_retries")]
    pub max_retries: u32,

    /// Exponential backoff base (seconds), doubled per attempt.
    #[serde(default = "ScoringConfig::default_backoff_base")]
    pub backoff_base_secs: u64,

    /// Maximum transactions accepted in one batch call.
    #[serde(default = "ScoringConfig::default_max_batch_size")]
    pub max_batch_size: usize,
}

impl ScoringConfig {
    fn default_base_url() -> String { "http://127.0.0.1:8001".to_string() }
    fn default_request_timeout() -> u64 { 30 }
    fn default_batch_timeout() -> u64 { 60 }
    fn default_max_retries() -> u32 { 3 }
    fn default_backoff_base() -> u64 { 2 }
    fn default_max_batch_size() -> usize { 100 }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            request_timeout_secs: Self::default_request_timeout(),
            batch_timeout_secs: Self::default_batch_timeout(),
            max_retries: Self::default_max_retries(),
            backoff_base_secs: Self::default_backoff_base(),
            max_batch_size: Self::default_max_batch_size(),
        }
    }
}

/// Alert manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfig {
    /// Minimum confidence for a fraud verdict to open an alert.
    /// Independent from the severity tier boundaries.
    #[serde(default = "AlertConfig::default_creation_threshold")]
    pub creation_threshold: f64,

    /// Amount above which the large-amount risk factor fires.
    #[serde(default = "AlertConfig::default_large_amount_threshold")]
    pub large_amount_threshold: f64,

    /// Per-model sub-score above which a model risk factor fires.
    #[serde(default = "AlertConfig::default_model_score_threshold")]
    pub model_score_threshold: f64,

    /// Address historical risk above which an address risk factor fires.
    #[serde(default = "AlertConfig::default_address_risk_threshold")]
    pub address_risk_threshold: f64,
}

impl AlertConfig {
    fn default_creation_threshold() -> f64 { 0.7 }
    fn default_large_amount_threshold() -> f64 { 10_000.0 }
    fn default_model_score_threshold() -> f64 { 0.8 }
    fn default_address_risk_threshold() -> f64 { 0.7 }
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            creation_threshold: Self::default_creation_threshold(),
            large_amount_threshold: Self::default_large_amount_threshold(),
            model_score_threshold: Self::default_model_score_threshold(),
            address_risk_threshold: Self::default_address_risk_threshold(),
        }
    }
}

/// Policy applied when the admission counter store is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Admit on counter failure, preserving availability.
    Open,
    /// Deny on counter failure, preserving protection.
    Closed,
}

/// Admission control configuration. Each route class gets an independent
/// budget of `permits` per `window_secs`, keyed by client identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteBudget {
    pub permits: u32,
    pub window_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    #[serde(default = "AdmissionConfig::default_general")]
    pub general: RouteBudget,
    #[serde(default = "AdmissionConfig::default_scoring")]
    pub scoring: RouteBudget,
    #[serde(default = "AdmissionConfig::default_admin")]
    pub admin: RouteBudget,
    /// Behavior when the shared counter store fails.
    #[serde(default = "AdmissionConfig::default_failure_policy")]
    pub failure_policy: FailurePolicy,
    /// Maximum distinct client keys tracked per route class.
    #[serde(default = "AdmissionConfig::default_max_tracked_keys")]
    pub max_tracked_keys: usize,
}

impl AdmissionConfig {
    fn default_general() -> RouteBudget { RouteBudget { permits: 100, window_secs: 60 } }
    fn default_scoring() -> RouteBudget { RouteBudget { permits: 30, window_secs: 60 } }
    fn default_admin() -> RouteBudget { RouteBudget { permits: 20, window_secs: 60 } }
    fn default_failure_policy() -> FailurePolicy { FailurePolicy::Open }
    fn default_max_tracked_keys() -> usize { 5000 }
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            general: Self::default_general(),
            scoring: Self::default_scoring(),
            admin: Self::default_admin(),
            failure_policy: Self::default_failure_policy(),
            max_tracked_keys: Self::default_max_tracked_keys(),
        }
    }
}

/// One outbound notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Channel kind: "webhook" or "email".
    pub kind: String,
    /// Destination: webhook URL or mailbox relay endpoint.
    pub endpoint: String,
    /// Logical recipient recorded in delivery outcomes.
    pub recipient: String,
    /// Per-dispatch timeout (seconds).
    #[serde(default = "ChannelConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ChannelConfig {
    fn default_timeout() -> u64 { 10 }
}

/// Notification fanout configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Channels in dispatch order; outcomes preserve this order.
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,
}

/// Broadcast hub configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// Per-topic broadcast buffer; lagged subscribers drop, never block.
    #[serde(default = "HubConfig::default_buffer_size")]
    pub buffer_size: usize,
    /// Interval between analytics snapshots (seconds).
    #[serde(default = "HubConfig::default_analytics_interval")]
    pub analytics_interval_secs: u64,
}

impl HubConfig {
    fn default_buffer_size() -> usize { 256 }
    fn default_analytics_interval() -> u64 { 30 }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            buffer_size: Self::default_buffer_size(),
            analytics_interval_secs: Self::default_analytics_interval(),
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub alerts: AlertConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub hub: HubConfig,
}

impl SentinelConfig {
    /// Load from a TOML file, then apply env overrides.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| SentinelError::Configuration(format!("read {}: {}", path.display(), e)))?;
        let mut config: SentinelConfig = toml::from_str(&raw)
            .map_err(|e| SentinelError::Configuration(format!("parse {}: {}", path.display(), e)))?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Default configuration with env overrides applied.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("SENTINEL_ORACLE_URL") {
            self.scoring.base_url = url;
        }
        if let Ok(threshold) = std::env::var("SENTINEL_ALERT_THRESHOLD") {
            if let Ok(v) = threshold.parse::<f64>() {
                self.alerts.creation_threshold = v;
            }
        }
    }

    /// Reject configurations the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.alerts.creation_threshold) {
            return Err(SentinelError::Configuration(format!(
                "alert creation threshold must be within [0, 1], got {}",
                self.alerts.creation_threshold
            )));
        }
        if self.scoring.max_batch_size == 0 {
            return Err(SentinelError::Configuration(
                "scoring.max_batch_size must be positive".to_string(),
            ));
        }
        for budget in [&self.admission.general, &self.admission.scoring, &self.admission.admin] {
            if budget.permits == 0 || budget.window_secs == 0 {
                return Err(SentinelError::Configuration(
                    "admission budgets require positive permits and window".to_string(),
                ));
            }
        }
        for channel in &self.notify.channels {
            if !matches!(channel.kind.as_str(), "webhook" | "email") {
                return Err(SentinelError::Configuration(format!(
                    "unknown notification channel kind: {}",
                    channel.kind
                )));
            }
        }
        Ok(())
    }
}

//! Domain types for the fraud alert pipeline
//!
//! Tagged-variant types are validated at the boundary (see
//! [`crate::core::validation`]) so nothing malformed enters the pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Supported blockchain networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Hathor,
    Ethereum,
    Bitcoin,
    Polygon,
}

impl std::fmt::Display for Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Network::Hathor => "hathor",
            Network::Ethereum => "ethereum",
            Network::Bitcoin => "bitcoin",
            Network::Polygon => "polygon",
        };
        write!(f, "{}", s)
    }
}

/// Transaction lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    /// Ingested, not yet scored.
    Pending,
    /// Scored, no alert opened.
    Confirmed,
    /// Scored, alert opened.
    Flagged,
}

/// An ingested blockchain transaction.
///
/// The optional context fields feed the scoring oracle's feature set and
/// default to zero when the ingesting client does not supply them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub tx_hash: String,
    pub amount: f64,
    pub sender: String,
    pub receiver: String,
    pub network: Network,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,

    /// Historical risk score of the sender address, 0.0..=1.0.
    #[serde(default)]
    pub sender_risk: f64,
    /// Historical risk score of the receiver address, 0.0..=1.0.
    #[serde(default)]
    pub receiver_risk: f64,
    /// Sender transactions observed in the last hour.
    #[serde(default)]
    pub tx_count_1h: u32,
    /// Sender transactions observed in the last 24 hours.
    #[serde(default)]
    pub tx_count_24h: u32,
    /// Average transfer amount over the last 24 hours.
    #[serde(default)]
    pub avg_amount_24h: f64,
    /// Network congestion level at ingestion time, 0.0..=1.0.
    #[serde(default)]
    pub network_congestion: f64,
}

/// Output of one model inside the scoring ensemble. Opaque to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPrediction {
    pub prediction: bool,
    #[serde(default)]
    pub probability: Option<f64>,
    #[serde(default)]
    pub score: Option<f64>,
}

/// Normalized scoring-oracle output for one transaction.
///
/// Ephemeral: embedded in the transaction decision and the alert it spawns,
/// never persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    pub tx_hash: String,
    pub is_fraud: bool,
    /// Prediction confidence, 0.0..=1.0.
    pub confidence: f64,
    /// Overall risk score, 0.0..=1.0.
    pub risk_score: f64,
    /// Per-model sub-scores keyed by model name.
    pub model_predictions: HashMap<String, ModelPrediction>,
    /// Oracle-side timestamp, carried through verbatim.
    pub timestamp: String,
}

/// Alert severity tier, monotonic with confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Derive the tier from prediction confidence.
    ///
    /// Thresholds are non-overlapping: >0.9 critical, >0.8 high,
    /// >0.6 medium, else low. The alert creation threshold is a separate
    /// config knob and does not move these boundaries.
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.9 {
            Severity::Critical
        } else if confidence > 0.8 {
            Severity::High
        } else if confidence > 0.6 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// Alert lifecycle status. `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Active,
    Acknowledged,
    Resolved,
    FalsePositive,
}

impl AlertStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AlertStatus::Active)
    }
}

impl std::fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertStatus::Active => "active",
            AlertStatus::Acknowledged => "acknowledged",
            AlertStatus::Resolved => "resolved",
            AlertStatus::FalsePositive => "false_positive",
        };
        write!(f, "{}", s)
    }
}

/// Delivery outcome status for one notification channel attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Sent,
    Failed,
}

/// One notification delivery attempt, appended to the alert history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryOutcome {
    pub channel: String,
    pub recipient: String,
    pub timestamp: DateTime<Utc>,
    pub status: DeliveryStatus,
    /// Failure detail when status is `Failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Operator action recorded on an alert status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertTransition {
    pub actor: String,
    pub from: AlertStatus,
    pub to: AlertStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A stateful record tracking response to a flagged transaction.
///
/// Never deleted, only transitioned. At most one alert per transaction
/// hash may be `Active` at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: Uuid,
    pub tx_hash: String,
    pub severity: Severity,
    pub status: AlertStatus,
    pub confidence: f64,
    pub risk_score: f64,
    /// Ordered risk-factor descriptions, appended on repeat verdicts.
    pub risk_factors: Vec<String>,
    /// Ordered delivery history, appended once per dispatch attempt.
    pub notifications: Vec<DeliveryOutcome>,
    pub transitions: Vec<AlertTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Alert {
    /// Open a new alert for a verdict. Initial state is always `Active`.
    pub fn open(verdict: &Verdict, risk_factors: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tx_hash: verdict.tx_hash.clone(),
            severity: Severity::from_confidence(verdict.confidence),
            status: AlertStatus::Active,
            confidence: verdict.confidence,
            risk_score: verdict.risk_score,
            risk_factors,
            notifications: Vec::new(),
            transitions: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Age of the alert, derived at read time, never stored.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.created_at
    }

    /// Whether the alert demands immediate attention.
    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical && self.status == AlertStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_tiers() {
        assert_eq!(Severity::from_confidence(0.95), Severity::Critical);
        assert_eq!(Severity::from_confidence(0.85), Severity::High);
        assert_eq!(Severity::from_confidence(0.7), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.5), Severity::Low);
        // boundaries are exclusive
        assert_eq!(Severity::from_confidence(0.9), Severity::High);
        assert_eq!(Severity::from_confidence(0.8), Severity::Medium);
        assert_eq!(Severity::from_confidence(0.6), Severity::Low);
    }

    #[test]
    fn test_severity_is_monotonic() {
        let mut last = Severity::Low;
        for i in 0..=100 {
            let tier = Severity::from_confidence(i as f64 / 100.0);
            assert!(tier >= last, "severity regressed at confidence {}", i);
            last = tier;
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!AlertStatus::Active.is_terminal());
        assert!(AlertStatus::Acknowledged.is_terminal());
        assert!(AlertStatus::Resolved.is_terminal());
        assert!(AlertStatus::FalsePositive.is_terminal());
    }

    #[test]
    fn test_network_serde_lowercase() {
        assert_eq!(serde_json::to_string(&Network::Hathor).unwrap(), "\"hathor\"");
        let n: Network = serde_json::from_str("\"polygon\"").unwrap();
        assert_eq!(n, Network::Polygon);
    }

    #[test]
    fn test_alert_status_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&AlertStatus::FalsePositive).unwrap(),
            "\"false_positive\""
        );
    }

    #[test]
    fn test_alert_open_is_active() {
        let verdict = Verdict {
            tx_hash: "abc123".to_string(),
            is_fraud: true,
            confidence: 0.92,
            risk_score: 0.88,
            model_predictions: HashMap::new(),
            timestamp: Utc::now().to_rfc3339(),
        };
        let alert = Alert::open(&verdict, vec!["very_high_confidence".to_string()]);
        assert_eq!(alert.status, AlertStatus::Active);
        assert_eq!(alert.severity, Severity::Critical);
        assert!(alert.is_critical());
        assert!(alert.transitions.is_empty());
    }
}

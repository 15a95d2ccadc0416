//! API request/response types
//!
//! Wire DTOs for the HTTP surface plus the error envelope. Alerts are
//! serialized through `AlertView`, which derives the age and criticality
//! fields at read time instead of storing them.

use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::domain::{Alert, Network, Transaction, TxStatus};
use crate::core::errors::SentinelError;
use crate::gateway::{AnalysisOutcome, BatchOutcome};

/// Error envelope returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Map a pipeline error to its HTTP shape.
pub fn error_response(err: SentinelError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match &err {
        SentinelError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        SentinelError::NotFound(_) => StatusCode::NOT_FOUND,
        SentinelError::InvalidTransition { .. } => StatusCode::CONFLICT,
        SentinelError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
        SentinelError::Unavailable(_) | SentinelError::InvalidResponse(_) => StatusCode::BAD_GATEWAY,
        SentinelError::Storage(_) | SentinelError::Configuration(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let retry_after_secs = match &err {
        SentinelError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
        _ => None,
    };
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            code: err.code().to_string(),
            retry_after_secs,
        }),
    )
}

/// One transaction as submitted for analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub tx_hash: String,
    pub amount: f64,
    pub sender: String,
    pub receiver: String,
    pub network: Network,
    /// Defaults to submission time when absent.
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sender_risk: f64,
    #[serde(default)]
    pub receiver_risk: f64,
    #[serde(default)]
    pub tx_count_1h: u32,
    #[serde(default)]
    pub tx_count_24h: u32,
    #[serde(default)]
    pub avg_amount_24h: f64,
    #[serde(default)]
    pub network_congestion: f64,
}

impl AnalyzeRequest {
    pub fn into_transaction(self) -> Transaction {
        Transaction {
            tx_hash: self.tx_hash,
            amount: self.amount,
            sender: self.sender,
            receiver: self.receiver,
            network: self.network,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            status: TxStatus::Pending,
            sender_risk: self.sender_risk,
            receiver_risk: self.receiver_risk,
            tx_count_1h: self.tx_count_1h,
            tx_count_24h: self.tx_count_24h,
            avg_amount_24h: self.avg_amount_24h,
            network_congestion: self.network_congestion,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub tx_hash: String,
    pub is_fraud: bool,
    pub confidence: f64,
    pub risk_score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<Uuid>,
    pub alert_created: bool,
}

impl From<AnalysisOutcome> for AnalyzeResponse {
    fn from(outcome: AnalysisOutcome) -> Self {
        Self {
            tx_hash: outcome.tx_hash,
            is_fraud: outcome.verdict.is_fraud,
            confidence: outcome.verdict.confidence,
            risk_score: outcome.verdict.risk_score,
            severity: outcome.alert.as_ref().map(|a| a.severity.to_string()),
            alert_id: outcome.alert.as_ref().map(|a| a.id),
            alert_created: outcome.alert_created,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchAnalyzeRequest {
    pub transactions: Vec<AnalyzeRequest>,
}

/// Positional batch result: exactly one entry per submitted transaction.
#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Ok(AnalyzeResponse),
    Err(ErrorResponse),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchAnalyzeResponse {
    pub total_transactions: usize,
    pub processed: usize,
    pub fraud_detected: usize,
    pub alerts_created: usize,
    pub results: Vec<BatchItem>,
}

impl From<BatchOutcome> for BatchAnalyzeResponse {
    fn from(outcome: BatchOutcome) -> Self {
        let total_transactions = outcome.results.len();
        let results = outcome
            .results
            .into_iter()
            .map(|r| match r {
                Ok(item) => BatchItem::Ok(item.into()),
                Err(err) => BatchItem::Err(ErrorResponse {
                    error: err.to_string(),
                    code: err.code().to_string(),
                    retry_after_secs: None,
                }),
            })
            .collect();
        Self {
            total_transactions,
            processed: outcome.processed,
            fraud_detected: outcome.fraud_detected,
            alerts_created: outcome.alerts_created,
            results,
        }
    }
}

/// Operator action payload for alert transitions.
#[derive(Debug, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub actor: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Alert as exposed over the API: stored record plus fields derived at
/// read time, so they are never stale.
#[derive(Debug, Serialize)]
pub struct AlertView {
    #[serde(flatten)]
    pub alert: Alert,
    pub age_seconds: i64,
    pub is_critical: bool,
}

impl From<Alert> for AlertView {
    fn from(alert: Alert) -> Self {
        let age_seconds = alert.age().num_seconds();
        let is_critical = alert.is_critical();
        Self { alert, age_seconds, is_critical }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListAlertsQuery {
    pub status: Option<String>,
    pub limit: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::Verdict;
    use std::collections::HashMap;

    #[test]
    fn test_error_response_status_mapping() {
        let (status, body) = error_response(SentinelError::InvalidInput("bad".to_string()));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.code, "INVALID_INPUT");

        let (status, _) = error_response(SentinelError::NotFound("alert x".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = error_response(SentinelError::InvalidTransition {
            state: "resolved".to_string(),
            action: "acknowledge".to_string(),
        });
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = error_response(SentinelError::RateLimited { retry_after_secs: 7 });
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body.retry_after_secs, Some(7));

        let (status, _) = error_response(SentinelError::Unavailable("oracle down".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_alert_view_derives_fields() {
        let verdict = Verdict {
            tx_hash: "tx1".to_string(),
            is_fraud: true,
            confidence: 0.95,
            risk_score: 0.95,
            model_predictions: HashMap::new(),
            timestamp: String::new(),
        };
        let view = AlertView::from(Alert::open(&verdict, vec![]));
        assert!(view.is_critical);
        assert!(view.age_seconds >= 0);
    }

    #[test]
    fn test_analyze_request_defaults_context_fields() {
        let json = r#"{
            "tx_hash": "abc123",
            "amount": 10.5,
            "sender": "s1",
            "receiver": "r1",
            "network": "hathor"
        }"#;
        let request: AnalyzeRequest = serde_json::from_str(json).unwrap();
        let tx = request.into_transaction();
        assert_eq!(tx.network, Network::Hathor);
        assert_eq!(tx.sender_risk, 0.0);
        assert_eq!(tx.tx_count_24h, 0);
        assert_eq!(tx.status, TxStatus::Pending);
    }
}

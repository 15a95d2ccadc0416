//! Scoring oracle wire format
//!
//! Mirrors the oracle's `/predict` and `/batch-predict` JSON contract.
//! These types never leave this module boundary; responses are normalized
//! into [`crate::core::domain::Verdict`] before the pipeline sees them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::domain::{ModelPrediction, Transaction, Verdict};
use crate::core::errors::{Result, SentinelError};

/// Request body for `/predict`, one entry of `/batch-predict`.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreRequest {
    pub tx_hash: String,
    pub amount: f64,
    pub sender: String,
    pub receiver: String,
    pub network: String,
    /// Epoch seconds, the oracle's preferred timestamp form.
    pub timestamp: f64,
    pub sender_risk: f64,
    pub receiver_risk: f64,
    pub tx_count_1h: u32,
    pub tx_count_24h: u32,
    pub avg_amount_24h: f64,
    pub network_congestion: f64,
}

impl From<&Transaction> for ScoreRequest {
    fn from(tx: &Transaction) -> Self {
        Self {
            tx_hash: tx.tx_hash.clone(),
            amount: tx.amount,
            sender: tx.sender.clone(),
            receiver: tx.receiver.clone(),
            network: tx.network.to_string(),
            timestamp: tx.timestamp.timestamp() as f64,
            sender_risk: tx.sender_risk,
            receiver_risk: tx.receiver_risk,
            tx_count_1h: tx.tx_count_1h,
            tx_count_24h: tx.tx_count_24h,
            avg_amount_24h: tx.avg_amount_24h,
            network_congestion: tx.network_congestion,
        }
    }
}

/// Response body of `/predict`, one entry of a batch response.
#[derive(Debug, Clone, Deserialize)]
pub struct PredictionResponse {
    pub tx_hash: String,
    pub is_fraud: bool,
    pub confidence: f64,
    pub risk_score: f64,
    #[serde(default)]
    pub model_predictions: HashMap<String, ModelPrediction>,
    #[serde(default)]
    pub timestamp: String,
}

impl PredictionResponse {
    /// Normalize into a pipeline verdict, rejecting out-of-range scores.
    pub fn into_verdict(self) -> Result<Verdict> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(SentinelError::InvalidResponse(format!(
                "confidence out of range: {}",
                self.confidence
            )));
        }
        if !(0.0..=1.0).contains(&self.risk_score) {
            return Err(SentinelError::InvalidResponse(format!(
                "risk_score out of range: {}",
                self.risk_score
            )));
        }
        Ok(Verdict {
            tx_hash: self.tx_hash,
            is_fraud: self.is_fraud,
            confidence: self.confidence,
            risk_score: self.risk_score,
            model_predictions: self.model_predictions,
            timestamp: self.timestamp,
        })
    }
}

/// Response body of `/batch-predict`.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchPredictionResponse {
    pub batch_id: String,
    pub total_transactions: usize,
    #[serde(default)]
    pub fraud_detected: usize,
    pub results: Vec<PredictionResponse>,
}

/// Response body of `/model/retrain`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrainResponse {
    pub message: String,
    pub status: String,
}

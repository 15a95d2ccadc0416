//! Risk-factor extraction
//!
//! Deterministic given a transaction and its verdict. Order is stable:
//! amount first, then per-model flags (model names sorted), then address
//! flags, then the very-high-confidence flag.

use crate::core::config::AlertConfig;
use crate::core::domain::{Transaction, Verdict};

const VERY_HIGH_CONFIDENCE: f64 = 0.9;

/// Extract the ordered risk-factor list for a verdict.
pub fn extract_risk_factors(tx: &Transaction, verdict: &Verdict, config: &AlertConfig) -> Vec<String> {
    let mut factors = Vec::new();

    if tx.amount > config.large_amount_threshold {
        factors.push(format!(
            "large_amount({:.2} > {:.0})",
            tx.amount, config.large_amount_threshold
        ));
    }

    // Sorted model names keep the order stable across map iterations.
    let mut model_names: Vec<&String> = verdict.model_predictions.keys().collect();
    model_names.sort();
    for name in model_names {
        let prediction = &verdict.model_predictions[name];
        let score = prediction.score.or(prediction.probability).unwrap_or(0.0);
        if score > config.model_score_threshold {
            factors.push(format!("model_flag({}={:.2})", name, score));
        }
    }

    if tx.sender_risk > config.address_risk_threshold {
        factors.push(format!("high_sender_risk({:.2})", tx.sender_risk));
    }
    if tx.receiver_risk > config.address_risk_threshold {
        factors.push(format!("high_receiver_risk({:.2})", tx.receiver_risk));
    }

    if verdict.confidence > VERY_HIGH_CONFIDENCE {
        factors.push(format!("very_high_confidence({:.2})", verdict.confidence));
    }

    factors
}

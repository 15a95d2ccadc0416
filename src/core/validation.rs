//! Boundary validation
//!
//! Every transaction is validated here before it enters the pipeline.
//! Validation errors are never retried and never reach the oracle.

use crate::core::domain::Transaction;
use crate::core::errors::{Result, SentinelError};

const MAX_HASH_LEN: usize = 128;
const MAX_ADDRESS_LEN: usize = 128;

/// Validate an ingested transaction.
pub fn validate_transaction(tx: &Transaction) -> Result<()> {
    validate_tx_hash(&tx.tx_hash)?;
    validate_amount(tx.amount)?;
    validate_address(&tx.sender, "sender")?;
    validate_address(&tx.receiver, "receiver")?;
    validate_unit_score(tx.sender_risk, "sender_risk")?;
    validate_unit_score(tx.receiver_risk, "receiver_risk")?;
    validate_unit_score(tx.network_congestion, "network_congestion")?;
    Ok(())
}

pub fn validate_tx_hash(hash: &str) -> Result<()> {
    if hash.is_empty() {
        return Err(SentinelError::InvalidInput("tx_hash is empty".to_string()));
    }
    if hash.len() > MAX_HASH_LEN {
        return Err(SentinelError::InvalidInput(format!(
            "tx_hash exceeds {} characters",
            MAX_HASH_LEN
        )));
    }
    if !hash.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(SentinelError::InvalidInput(
            "tx_hash must be alphanumeric".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() {
        return Err(SentinelError::InvalidInput("amount must be finite".to_string()));
    }
    if amount < 0.0 {
        return Err(SentinelError::InvalidInput("amount must be non-negative".to_string()));
    }
    Ok(())
}

pub fn validate_address(address: &str, field: &str) -> Result<()> {
    if address.is_empty() {
        return Err(SentinelError::InvalidInput(format!("{} address is empty", field)));
    }
    if address.len() > MAX_ADDRESS_LEN {
        return Err(SentinelError::InvalidInput(format!(
            "{} address exceeds {} characters",
            field, MAX_ADDRESS_LEN
        )));
    }
    if address.chars().any(char::is_whitespace) {
        return Err(SentinelError::InvalidInput(format!(
            "{} address contains whitespace",
            field
        )));
    }
    Ok(())
}

fn validate_unit_score(value: f64, field: &str) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(SentinelError::InvalidInput(format!(
            "{} must be within [0, 1], got {}",
            field, value
        )));
    }
    Ok(())
}

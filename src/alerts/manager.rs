//! Alert lifecycle manager
//!
//! Owns the alert state machine: `active` is the only non-terminal state,
//! and for any transaction hash at most one alert is active at a time.
//! Every check-then-write step (create/append, transitions, notification
//! recording) is serialized per hash through a per-key lock registry.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::alerts::factors::extract_risk_factors;
use crate::core::config::AlertConfig;
use crate::core::domain::{
    Alert, AlertStatus, AlertTransition, DeliveryOutcome, Transaction, Verdict,
};
use crate::core::errors::{Result, SentinelError};
use crate::storage::StorageBackend;

/// Outcome of running the creation rule for one verdict.
#[derive(Debug, Clone)]
pub enum AlertDecision {
    /// New alert opened.
    Created(Alert),
    /// Repeat verdict folded into the existing active alert.
    Updated(Alert),
    /// Verdict below the creation rule; no alert.
    None,
}

impl AlertDecision {
    pub fn alert(&self) -> Option<&Alert> {
        match self {
            AlertDecision::Created(a) | AlertDecision::Updated(a) => Some(a),
            AlertDecision::None => None,
        }
    }
}

pub struct AlertManager {
    storage: Arc<dyn StorageBackend>,
    config: AlertConfig,
    /// Per-tx-hash locks serializing every read-modify-write on the
    /// hash's alert records.
    tx_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

const MAX_TRACKED_LOCKS: usize = 10_000;

impl AlertManager {
    pub fn new(storage: Arc<dyn StorageBackend>, config: AlertConfig) -> Self {
        Self {
            storage,
            config,
            tx_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, tx_hash: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.tx_locks.lock();
        if locks.len() >= MAX_TRACKED_LOCKS {
            // Drop locks nobody is holding; held ones must survive.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(tx_hash.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Apply the creation rule to a verdict.
    ///
    /// Opens an alert iff `is_fraud && confidence > creation_threshold`.
    /// A repeat qualifying verdict while an alert is already active appends
    /// any new risk factors instead of opening a second alert.
    pub async fn decide(&self, tx: &Transaction, verdict: &Verdict) -> Result<AlertDecision> {
        if !verdict.is_fraud || verdict.confidence <= self.config.creation_threshold {
            return Ok(AlertDecision::None);
        }

        let key_lock = self.lock_for(&tx.tx_hash);
        let _guard = key_lock.lock().await;

        let factors = extract_risk_factors(tx, verdict, &self.config);

        if let Some(mut existing) = self.storage.find_active_alert(&tx.tx_hash)? {
            let mut appended = 0;
            for factor in factors {
                if !existing.risk_factors.contains(&factor) {
                    existing.risk_factors.push(factor);
                    appended += 1;
                }
            }
            existing.updated_at = chrono::Utc::now();
            self.storage.save_alert(existing.clone())?;
            info!(
                tx_hash = %tx.tx_hash,
                alert_id = %existing.id,
                appended,
                "repeat verdict folded into active alert"
            );
            return Ok(AlertDecision::Updated(existing));
        }

        let alert = Alert::open(verdict, factors);
        self.storage.save_alert(alert.clone())?;
        warn!(
            tx_hash = %tx.tx_hash,
            alert_id = %alert.id,
            severity = %alert.severity,
            confidence = verdict.confidence,
            "fraud alert opened"
        );
        Ok(AlertDecision::Created(alert))
    }

    /// Operator acknowledges an active alert.
    pub async fn acknowledge(&self, id: &Uuid, actor: &str, notes: Option<String>) -> Result<Alert> {
        self.transition(id, AlertStatus::Acknowledged, "acknowledge", actor, notes).await
    }

    /// Operator resolves an active alert. Terminal.
    pub async fn resolve(&self, id: &Uuid, actor: &str, notes: Option<String>) -> Result<Alert> {
        self.transition(id, AlertStatus::Resolved, "resolve", actor, notes).await
    }

    /// Operator dismisses an active alert as a false positive. Terminal.
    pub async fn mark_false_positive(&self, id: &Uuid, actor: &str, notes: Option<String>) -> Result<Alert> {
        self.transition(id, AlertStatus::FalsePositive, "mark_false_positive", actor, notes).await
    }

    async fn transition(
        &self,
        id: &Uuid,
        to: AlertStatus,
        action: &str,
        actor: &str,
        notes: Option<String>,
    ) -> Result<Alert> {
        if actor.trim().is_empty() {
            return Err(SentinelError::InvalidInput("actor id is required".to_string()));
        }

        // First read only locates the hash; the state check happens again
        // under the per-key lock so two racing transitions cannot both
        // observe `active`.
        let located = self
            .storage
            .get_alert(id)?
            .ok_or_else(|| SentinelError::NotFound(format!("alert {}", id)))?;
        let key_lock = self.lock_for(&located.tx_hash);
        let _guard = key_lock.lock().await;

        let mut alert = self
            .storage
            .get_alert(id)?
            .ok_or_else(|| SentinelError::NotFound(format!("alert {}", id)))?;

        if alert.status != AlertStatus::Active {
            return Err(SentinelError::InvalidTransition {
                state: alert.status.to_string(),
                action: action.to_string(),
            });
        }

        let now = chrono::Utc::now();
        alert.transitions.push(AlertTransition {
            actor: actor.to_string(),
            from: alert.status,
            to,
            notes,
            timestamp: now,
        });
        alert.status = to;
        alert.updated_at = now;
        self.storage.save_alert(alert.clone())?;
        info!(alert_id = %id, actor, to = %to, "alert transitioned");
        Ok(alert)
    }

    /// Append delivery outcomes to an alert's notification history.
    /// Called once per fanout dispatch. Takes the per-key lock so the save
    /// cannot clobber a transition that landed while fanout was in flight.
    pub async fn record_notifications(&self, id: &Uuid, outcomes: &[DeliveryOutcome]) -> Result<Alert> {
        let located = self
            .storage
            .get_alert(id)?
            .ok_or_else(|| SentinelError::NotFound(format!("alert {}", id)))?;
        let key_lock = self.lock_for(&located.tx_hash);
        let _guard = key_lock.lock().await;

        let mut alert = self
            .storage
            .get_alert(id)?
            .ok_or_else(|| SentinelError::NotFound(format!("alert {}", id)))?;
        alert.notifications.extend_from_slice(outcomes);
        alert.updated_at = chrono::Utc::now();
        self.storage.save_alert(alert.clone())?;
        Ok(alert)
    }

    pub fn config(&self) -> &AlertConfig {
        &self.config
    }
}

//! Storage abstraction
//!
//! The external document store sits behind this trait; the pipeline only
//! needs CRUD keyed by transaction hash and alert id plus the status/time
//! scans the API exposes. `MemoryStorage` is the bundled backend.

use parking_lot::RwLock;
use std::collections::HashMap;
use uuid::Uuid;

use crate::core::domain::{Alert, AlertStatus, Transaction};
use crate::core::errors::{Result, SentinelError};

/// Aggregate counters used by analytics snapshots and the stats endpoint.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct StoreStats {
    pub transactions: usize,
    pub flagged: usize,
    pub alerts_total: usize,
    pub alerts_active: usize,
}

/// Storage backend for transactions and alerts.
pub trait StorageBackend: Send + Sync {
    fn save_transaction(&self, tx: Transaction) -> Result<()>;
    fn get_transaction(&self, tx_hash: &str) -> Result<Option<Transaction>>;

    fn save_alert(&self, alert: Alert) -> Result<()>;
    fn get_alert(&self, id: &Uuid) -> Result<Option<Alert>>;

    /// The at-most-one-active-per-hash invariant makes this lookup
    /// unambiguous.
    fn find_active_alert(&self, tx_hash: &str) -> Result<Option<Alert>>;

    /// Alerts newest-first, optionally filtered by status.
    fn list_alerts(&self, status: Option<AlertStatus>, limit: usize) -> Result<Vec<Alert>>;

    fn stats(&self) -> Result<StoreStats>;
}

/// In-memory backend with bounded capacity and oldest-first eviction of
/// transactions. Alerts are never evicted (they are never deleted).
pub struct MemoryStorage {
    transactions: RwLock<HashMap<String, Transaction>>,
    alerts: RwLock<HashMap<Uuid, Alert>>,
    max_transactions: usize,
}

impl MemoryStorage {
    pub fn new(max_transactions: usize) -> Self {
        Self {
            transactions: RwLock::new(HashMap::new()),
            alerts: RwLock::new(HashMap::new()),
            max_transactions,
        }
    }

    fn evict_oldest(&self, txs: &mut HashMap<String, Transaction>) {
        if txs.len() < self.max_transactions {
            return;
        }
        if let Some(oldest) = txs
            .iter()
            .min_by_key(|(_, tx)| tx.timestamp)
            .map(|(hash, _)| hash.clone())
        {
            txs.remove(&oldest);
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl StorageBackend for MemoryStorage {
    fn save_transaction(&self, tx: Transaction) -> Result<()> {
        let mut txs = self.transactions.write();
        if !txs.contains_key(&tx.tx_hash) {
            self.evict_oldest(&mut txs);
        }
        txs.insert(tx.tx_hash.clone(), tx);
        Ok(())
    }

    fn get_transaction(&self, tx_hash: &str) -> Result<Option<Transaction>> {
        Ok(self.transactions.read().get(tx_hash).cloned())
    }

    fn save_alert(&self, alert: Alert) -> Result<()> {
        self.alerts.write().insert(alert.id, alert);
        Ok(())
    }

    fn get_alert(&self, id: &Uuid) -> Result<Option<Alert>> {
        Ok(self.alerts.read().get(id).cloned())
    }

    fn find_active_alert(&self, tx_hash: &str) -> Result<Option<Alert>> {
        let alerts = self.alerts.read();
        let mut active = alerts
            .values()
            .filter(|a| a.tx_hash == tx_hash && a.status == AlertStatus::Active);
        let found = active.next().cloned();
        if active.next().is_some() {
            return Err(SentinelError::Storage(format!(
                "multiple active alerts for tx {}",
                tx_hash
            )));
        }
        Ok(found)
    }

    fn list_alerts(&self, status: Option<AlertStatus>, limit: usize) -> Result<Vec<Alert>> {
        let alerts = self.alerts.read();
        let mut matching: Vec<Alert> = alerts
            .values()
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    fn stats(&self) -> Result<StoreStats> {
        let txs = self.transactions.read();
        let alerts = self.alerts.read();
        Ok(StoreStats {
            transactions: txs.len(),
            flagged: txs
                .values()
                .filter(|t| t.status == crate::core::domain::TxStatus::Flagged)
                .count(),
            alerts_total: alerts.len(),
            alerts_active: alerts
                .values()
                .filter(|a| a.status == AlertStatus::Active)
                .count(),
        })
    }
}

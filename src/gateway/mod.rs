//! Ingestion gateway
//!
//! Front door of the pipeline. Each submitted transaction is validated,
//! persisted, scored, run through the alert creation rule, and re-persisted
//! with its final status. Notification fanout and hub publication happen
//! off the request path.

use std::sync::Arc;
use tracing::{debug, error, info};

use crate::alerts::{AlertDecision, AlertManager};
use crate::core::config::ScoringConfig;
use crate::core::domain::{Alert, Transaction, TxStatus, Verdict};
use crate::core::errors::{Result, SentinelError};
use crate::core::validation::validate_transaction;
use crate::hub::{BroadcastHub, Topic};
use crate::notify::{AlertMessage, Fanout};
use crate::scoring::ScoringOracle;
use crate::storage::StorageBackend;

/// Result of analyzing one transaction.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub tx_hash: String,
    pub verdict: Verdict,
    /// Present when the creation rule opened or updated an alert.
    pub alert: Option<Alert>,
    pub alert_created: bool,
}

/// Aggregate result of a batch submission. `results` is positional: slot i
/// corresponds to input transaction i, valid or not.
#[derive(Debug)]
pub struct BatchOutcome {
    pub results: Vec<Result<AnalysisOutcome>>,
    pub processed: usize,
    pub fraud_detected: usize,
    pub alerts_created: usize,
}

pub struct IngestionGateway {
    storage: Arc<dyn StorageBackend>,
    oracle: Arc<dyn ScoringOracle>,
    alerts: Arc<AlertManager>,
    fanout: Arc<Fanout>,
    hub: Arc<BroadcastHub>,
    max_batch_size: usize,
}

impl IngestionGateway {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        oracle: Arc<dyn ScoringOracle>,
        alerts: Arc<AlertManager>,
        fanout: Arc<Fanout>,
        hub: Arc<BroadcastHub>,
        scoring_config: &ScoringConfig,
    ) -> Self {
        Self {
            storage,
            oracle,
            alerts,
            fanout,
            hub,
            max_batch_size: scoring_config.max_batch_size,
        }
    }

    /// Analyze one transaction end to end.
    ///
    /// An oracle failure after retries surfaces as an error; it is never
    /// downgraded to a clean verdict.
    pub async fn analyze(&self, mut tx: Transaction) -> Result<AnalysisOutcome> {
        validate_transaction(&tx)?;

        tx.status = TxStatus::Pending;
        self.storage.save_transaction(tx.clone())?;

        let verdict = self.oracle.score(&tx).await?;
        self.settle(tx, verdict).await
    }

    /// Analyze up to `max_batch_size` transactions with one oracle call.
    ///
    /// Invalid items fail in place without sinking the batch; the oracle
    /// only ever sees the valid subset, and output order matches input
    /// order.
    pub async fn analyze_batch(&self, txs: Vec<Transaction>) -> Result<BatchOutcome> {
        if txs.len() > self.max_batch_size {
            return Err(SentinelError::InvalidInput(format!(
                "batch size {} exceeds maximum {}",
                txs.len(),
                self.max_batch_size
            )));
        }

        let mut slots: Vec<Option<Result<AnalysisOutcome>>> = Vec::with_capacity(txs.len());
        let mut valid: Vec<(usize, Transaction)> = Vec::new();
        for (i, mut tx) in txs.into_iter().enumerate() {
            match validate_transaction(&tx) {
                Ok(()) => {
                    tx.status = TxStatus::Pending;
                    self.storage.save_transaction(tx.clone())?;
                    slots.push(None);
                    valid.push((i, tx));
                }
                Err(err) => slots.push(Some(Err(err))),
            }
        }

        if !valid.is_empty() {
            let batch: Vec<Transaction> = valid.iter().map(|(_, tx)| tx.clone()).collect();
            let verdicts = self.oracle.score_batch(&batch).await?;
            for ((slot, tx), verdict) in valid.into_iter().zip(verdicts) {
                slots[slot] = Some(self.settle(tx, verdict).await);
            }
        }

        let results: Vec<Result<AnalysisOutcome>> =
            slots.into_iter().map(|s| s.expect("every slot settled")).collect();
        let processed = results.iter().filter(|r| r.is_ok()).count();
        let fraud_detected = results
            .iter()
            .filter(|r| r.as_ref().map_or(false, |o| o.verdict.is_fraud))
            .count();
        let alerts_created = results
            .iter()
            .filter(|r| r.as_ref().map_or(false, |o| o.alert_created))
            .count();
        info!(processed, fraud_detected, alerts_created, "batch analyzed");

        Ok(BatchOutcome { results, processed, fraud_detected, alerts_created })
    }

    /// Post-scoring path shared by single and batch analysis: run the
    /// creation rule, persist the final transaction status, and kick off
    /// hub publication and channel fanout for opened or updated alerts.
    async fn settle(&self, mut tx: Transaction, verdict: Verdict) -> Result<AnalysisOutcome> {
        let decision = self.alerts.decide(&tx, &verdict).await?;

        tx.status = if decision.alert().is_some() {
            TxStatus::Flagged
        } else {
            TxStatus::Confirmed
        };
        self.storage.save_transaction(tx.clone())?;

        let (alert, created) = match &decision {
            AlertDecision::Created(a) => (Some(a.clone()), true),
            AlertDecision::Updated(a) => (Some(a.clone()), false),
            AlertDecision::None => (None, false),
        };

        if let Some(alert) = &alert {
            let event_type = if created { "alert_created" } else { "alert_updated" };
            self.hub.publish(
                Topic::FraudAlerts,
                event_type,
                serde_json::to_value(alert).unwrap_or_default(),
            );
            self.spawn_fanout(alert.clone(), tx.clone());
        } else {
            debug!(tx_hash = %tx.tx_hash, "transaction clean");
        }

        Ok(AnalysisOutcome {
            tx_hash: tx.tx_hash,
            verdict,
            alert,
            alert_created: created,
        })
    }

    /// Fire-and-forget fanout dispatch; outcomes land on the alert record.
    fn spawn_fanout(&self, alert: Alert, tx: Transaction) {
        if self.fanout.is_empty() {
            return;
        }
        let fanout = self.fanout.clone();
        let alerts = self.alerts.clone();
        tokio::spawn(async move {
            let message = AlertMessage::from_alert(&alert, &tx);
            let outcomes = fanout.dispatch(&message).await;
            if let Err(err) = alerts.record_notifications(&alert.id, &outcomes).await {
                error!(alert_id = %alert.id, error = %err, "failed to record delivery outcomes");
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::AlertConfig;
    use crate::core::domain::Network;
    use crate::notify::WebhookChannel;
    use crate::scoring::HttpScoringClient;
    use crate::storage::MemoryStorage;
    use chrono::Utc;
    use httpmock::prelude::*;
    use std::time::Duration;

    fn sample_tx(hash: &str, amount: f64) -> Transaction {
        Transaction {
            tx_hash: hash.to_string(),
            amount,
            sender: "senderA".to_string(),
            receiver: "receiverB".to_string(),
            network: Network::Ethereum,
            timestamp: Utc::now(),
            status: TxStatus::Pending,
            sender_risk: 0.1,
            receiver_risk: 0.1,
            tx_count_1h: 1,
            tx_count_24h: 5,
            avg_amount_24h: 50.0,
            network_congestion: 0.3,
        }
    }

    fn invalid_tx(hash: &str) -> Transaction {
        let mut tx = sample_tx(hash, 10.0);
        tx.amount = -5.0;
        tx
    }

    fn prediction_json(hash: &str, is_fraud: bool, confidence: f64) -> serde_json::Value {
        serde_json::json!({
            "tx_hash": hash,
            "is_fraud": is_fraud,
            "confidence": confidence,
            "risk_score": confidence,
            "model_predictions": {},
            "timestamp": "2024-01-01T00:00:00Z"
        })
    }

    fn gateway_for(server: &MockServer) -> (IngestionGateway, Arc<MemoryStorage>, Arc<BroadcastHub>) {
        let storage = Arc::new(MemoryStorage::default());
        let scoring_config = ScoringConfig {
            base_url: server.base_url(),
            ..ScoringConfig::default()
        };
        let oracle = Arc::new(
            HttpScoringClient::new(scoring_config.clone())
                .with_backoff_base(Duration::from_millis(10)),
        );
        let alerts = Arc::new(AlertManager::new(storage.clone(), AlertConfig::default()));
        let hub = Arc::new(BroadcastHub::new(16));
        let gateway = IngestionGateway::new(
            storage.clone(),
            oracle,
            alerts,
            Arc::new(Fanout::new(Vec::new())),
            hub.clone(),
            &scoring_config,
        );
        (gateway, storage, hub)
    }

    #[tokio::test]
    async fn test_clean_transaction_confirmed_without_alert() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/predict");
            then.status(200).json_body(prediction_json("tx1", false, 0.1));
        });

        let (gateway, storage, _) = gateway_for(&server);
        let outcome = gateway.analyze(sample_tx("tx1", 10.0)).await.unwrap();
        assert!(outcome.alert.is_none());
        assert!(!outcome.alert_created);

        let stored = storage.get_transaction("tx1").unwrap().unwrap();
        assert_eq!(stored.status, TxStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_fraud_verdict_flags_and_opens_alert() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/predict");
            then.status(200).json_body(prediction_json("tx1", true, 0.92));
        });

        let (gateway, storage, hub) = gateway_for(&server);
        let mut events = hub.subscribe(Topic::FraudAlerts);

        let outcome = gateway.analyze(sample_tx("tx1", 20_000.0)).await.unwrap();
        assert!(outcome.alert_created);
        let alert = outcome.alert.unwrap();
        assert_eq!(alert.tx_hash, "tx1");

        let stored = storage.get_transaction("tx1").unwrap().unwrap();
        assert_eq!(stored.status, TxStatus::Flagged);

        let event = events.recv().await.unwrap();
        assert_eq!(event.event_type, "alert_created");
        assert_eq!(event.payload["tx_hash"], "tx1");
    }

    #[tokio::test]
    async fn test_updated_alert_dispatches_fanout_again() {
        let oracle = MockServer::start();
        oracle.mock(|when, then| {
            when.method(POST).path("/predict");
            then.status(200).json_body(prediction_json("tx1", true, 0.92));
        });
        let hooks = MockServer::start();
        let hook = hooks.mock(|when, then| {
            when.method(POST).path("/notify");
            then.status(200);
        });

        let storage = Arc::new(MemoryStorage::default());
        let scoring_config = ScoringConfig {
            base_url: oracle.base_url(),
            ..ScoringConfig::default()
        };
        let alerts = Arc::new(AlertManager::new(storage.clone(), AlertConfig::default()));
        let channel = Arc::new(WebhookChannel::new(hooks.url("/notify"), "ops".to_string()));
        let fanout = Fanout::new(vec![(
            channel as Arc<dyn crate::notify::NotificationChannel>,
            Duration::from_secs(1),
        )]);
        let gateway = IngestionGateway::new(
            storage.clone(),
            Arc::new(HttpScoringClient::new(scoring_config.clone())),
            alerts,
            Arc::new(fanout),
            Arc::new(BroadcastHub::new(16)),
            &scoring_config,
        );

        let first = gateway.analyze(sample_tx("tx1", 20_000.0)).await.unwrap();
        assert!(first.alert_created);
        let second = gateway.analyze(sample_tx("tx1", 20_000.0)).await.unwrap();
        assert!(!second.alert_created);
        let alert_id = second.alert.unwrap().id;

        // fanout runs off the request path; wait for both dispatches
        for _ in 0..100 {
            if hook.hits() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        hook.assert_hits(2);
        for _ in 0..100 {
            if storage.get_alert(&alert_id).unwrap().unwrap().notifications.len() >= 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let stored = storage.get_alert(&alert_id).unwrap().unwrap();
        assert_eq!(stored.notifications.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_transaction_never_reaches_oracle() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/predict");
            then.status(200).json_body(prediction_json("tx1", false, 0.1));
        });

        let (gateway, _, _) = gateway_for(&server);
        let err = gateway.analyze(invalid_tx("tx1")).await.unwrap_err();
        assert!(matches!(err, SentinelError::InvalidInput(_)));
        mock.assert_hits(0);
    }

    #[tokio::test]
    async fn test_oracle_outage_is_an_error_not_a_clean_verdict() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/predict");
            then.status(500);
        });

        let (gateway, _, _) = gateway_for(&server);
        let err = gateway.analyze(sample_tx("tx1", 10.0)).await.unwrap_err();
        assert!(matches!(err, SentinelError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_batch_partial_success_preserves_positions() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/batch-predict");
            then.status(200).json_body(serde_json::json!({
                "batch_id": "batch_1",
                "total_transactions": 2,
                "fraud_detected": 1,
                "results": [
                    prediction_json("tx0", true, 0.9),
                    prediction_json("tx2", false, 0.1),
                ]
            }));
        });

        let (gateway, _, _) = gateway_for(&server);
        // slot 1 is malformed; slots 0 and 2 go to the oracle
        let batch = vec![sample_tx("tx0", 15_000.0), invalid_tx("tx1"), sample_tx("tx2", 10.0)];
        let outcome = gateway.analyze_batch(batch).await.unwrap();

        assert_eq!(outcome.results.len(), 3);
        assert_eq!(outcome.results[0].as_ref().unwrap().tx_hash, "tx0");
        assert!(outcome.results[0].as_ref().unwrap().alert_created);
        assert!(matches!(
            outcome.results[1],
            Err(SentinelError::InvalidInput(_))
        ));
        assert_eq!(outcome.results[2].as_ref().unwrap().tx_hash, "tx2");
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.fraud_detected, 1);
        assert_eq!(outcome.alerts_created, 1);
    }

    #[tokio::test]
    async fn test_oversize_batch_rejected_before_any_work() {
        let server = MockServer::start();
        let (gateway, storage, _) = gateway_for(&server);
        let batch: Vec<Transaction> = (0..101).map(|i| sample_tx(&format!("tx{}", i), 1.0)).collect();
        let err = gateway.analyze_batch(batch).await.unwrap_err();
        assert!(matches!(err, SentinelError::InvalidInput(_)));
        assert_eq!(storage.stats().unwrap().transactions, 0);
    }

    #[tokio::test]
    async fn test_all_invalid_batch_skips_oracle() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST).path("/batch-predict");
            then.status(200);
        });

        let (gateway, _, _) = gateway_for(&server);
        let outcome = gateway
            .analyze_batch(vec![invalid_tx("tx0"), invalid_tx("tx1")])
            .await
            .unwrap();
        assert_eq!(outcome.processed, 0);
        assert!(outcome.results.iter().all(|r| r.is_err()));
        mock.assert_hits(0);
    }
}

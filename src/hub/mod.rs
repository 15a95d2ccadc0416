//! Broadcast hub
//!
//! Publishes alert and analytics events to live subscribers, grouped by
//! topic. Delivery is best-effort, at-most-once per connected subscriber:
//! there is no replay buffer, and a lagged or disconnected subscriber
//! never blocks the publisher or its peers.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use crate::storage::StorageBackend;

/// Bootstrap topics. Clients opt into each one independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    FraudAlerts,
    AnalyticsUpdates,
}

impl Topic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Topic::FraudAlerts => "fraud_alerts",
            Topic::AnalyticsUpdates => "analytics_updates",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "fraud_alerts" => Some(Topic::FraudAlerts),
            "analytics_updates" => Some(Topic::AnalyticsUpdates),
            _ => None,
        }
    }
}

/// One pushed event: topic plus an opaque JSON payload.
#[derive(Debug, Clone, Serialize)]
pub struct HubEvent {
    pub topic: Topic,
    #[serde(rename = "type")]
    pub event_type: String,
    pub payload: serde_json::Value,
    pub timestamp: String,
}

/// Topic-grouped broadcast hub over `tokio::sync::broadcast` channels.
///
/// `broadcast::Sender::send` never awaits; slow receivers fall behind and
/// observe `Lagged`, which satisfies the no-backpressure requirement.
pub struct BroadcastHub {
    alerts_tx: broadcast::Sender<HubEvent>,
    analytics_tx: broadcast::Sender<HubEvent>,
}

impl BroadcastHub {
    pub fn new(buffer_size: usize) -> Self {
        let (alerts_tx, _) = broadcast::channel(buffer_size.max(1));
        let (analytics_tx, _) = broadcast::channel(buffer_size.max(1));
        Self { alerts_tx, analytics_tx }
    }

    fn sender(&self, topic: Topic) -> &broadcast::Sender<HubEvent> {
        match topic {
            Topic::FraudAlerts => &self.alerts_tx,
            Topic::AnalyticsUpdates => &self.analytics_tx,
        }
    }

    /// Subscribe to a topic. Dropping the receiver unsubscribes.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<HubEvent> {
        self.sender(topic).subscribe()
    }

    /// Publish an event to every current subscriber of the topic.
    /// Returns the number of subscribers the event was queued for.
    pub fn publish(&self, topic: Topic, event_type: &str, payload: serde_json::Value) -> usize {
        let event = HubEvent {
            topic,
            event_type: event_type.to_string(),
            payload,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };
        // send only fails when there are no receivers, which is fine
        let delivered = self.sender(topic).send(event).unwrap_or(0);
        debug!(topic = topic.as_str(), event_type, delivered, "event published");
        delivered
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.sender(topic).receiver_count()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Periodic analytics snapshots on `analytics_updates`. Snapshots are
/// aggregate, not per-transaction.
pub fn spawn_analytics_publisher(
    hub: Arc<BroadcastHub>,
    storage: Arc<dyn StorageBackend>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Ok(stats) = storage.stats() {
                let payload = serde_json::to_value(&stats).unwrap_or_default();
                hub.publish(Topic::AnalyticsUpdates, "analytics_snapshot", payload);
            }
        }
    })
}

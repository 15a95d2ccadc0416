//! Notification fanout
//!
//! Dispatches an opened or updated alert to every configured channel in parallel with
//! all-settled semantics: one channel failing or hanging never blocks the
//! others, and the aggregate result is a per-channel outcome list in
//! channel-config order.

pub mod email;
pub mod webhook;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::config::NotifyConfig;
use crate::core::domain::{Alert, DeliveryOutcome, DeliveryStatus, Transaction};
use crate::core::errors::{Result, SentinelError};

pub use email::EmailChannel;
pub use webhook::WebhookChannel;

/// Normalized alert data handed to every channel's renderer.
#[derive(Debug, Clone, serde::Serialize)]
pub struct AlertMessage {
    pub alert_id: String,
    pub tx_hash: String,
    pub severity: String,
    pub confidence: f64,
    pub amount: f64,
    pub sender: String,
    pub receiver: String,
    pub network: String,
    pub risk_factors: Vec<String>,
}

impl AlertMessage {
    pub fn from_alert(alert: &Alert, tx: &Transaction) -> Self {
        Self {
            alert_id: alert.id.to_string(),
            tx_hash: alert.tx_hash.clone(),
            severity: alert.severity.to_string(),
            confidence: alert.confidence,
            amount: tx.amount,
            sender: tx.sender.clone(),
            receiver: tx.receiver.clone(),
            network: tx.network.to_string(),
            risk_factors: alert.risk_factors.clone(),
        }
    }
}

/// One outbound notification channel.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Channel name recorded in delivery outcomes (e.g. "webhook").
    fn name(&self) -> &str;

    /// Logical recipient recorded in delivery outcomes.
    fn recipient(&self) -> &str;

    /// Render and deliver one alert message.
    async fn deliver(&self, message: &AlertMessage) -> Result<()>;
}

/// Parallel all-settled dispatcher over a fixed channel list.
pub struct Fanout {
    channels: Vec<Arc<dyn NotificationChannel>>,
    timeouts: Vec<Duration>,
}

impl Fanout {
    pub fn new(channels: Vec<(Arc<dyn NotificationChannel>, Duration)>) -> Self {
        let (channels, timeouts) = channels.into_iter().unzip();
        Self { channels, timeouts }
    }

    /// Build the channel set from configuration, preserving config order.
    pub fn from_config(config: &NotifyConfig) -> Self {
        let channels = config
            .channels
            .iter()
            .map(|c| {
                let channel: Arc<dyn NotificationChannel> = match c.kind.as_str() {
                    "email" => Arc::new(EmailChannel::new(c.endpoint.clone(), c.recipient.clone())),
                    // config validation only admits "webhook" | "email"
                    _ => Arc::new(WebhookChannel::new(c.endpoint.clone(), c.recipient.clone())),
                };
                (channel, Duration::from_secs(c.timeout_secs))
            })
            .collect();
        Self::new(channels)
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Dispatch to all channels in parallel, each bounded by its own
    /// timeout. Always returns one outcome per channel, in config order.
    pub async fn dispatch(&self, message: &AlertMessage) -> Vec<DeliveryOutcome> {
        let attempts = self.channels.iter().zip(&self.timeouts).map(|(channel, timeout)| {
            let channel = channel.clone();
            let timeout = *timeout;
            async move {
                let result = tokio::time::timeout(timeout, channel.deliver(message)).await;
                let outcome = match result {
                    Ok(Ok(())) => DeliveryOutcome {
                        channel: channel.name().to_string(),
                        recipient: channel.recipient().to_string(),
                        timestamp: Utc::now(),
                        status: DeliveryStatus::Sent,
                        error: None,
                    },
                    Ok(Err(err)) => DeliveryOutcome {
                        channel: channel.name().to_string(),
                        recipient: channel.recipient().to_string(),
                        timestamp: Utc::now(),
                        status: DeliveryStatus::Failed,
                        error: Some(err.to_string()),
                    },
                    Err(_) => DeliveryOutcome {
                        channel: channel.name().to_string(),
                        recipient: channel.recipient().to_string(),
                        timestamp: Utc::now(),
                        status: DeliveryStatus::Failed,
                        error: Some(format!("delivery timed out after {:?}", timeout)),
                    },
                };
                match outcome.status {
                    DeliveryStatus::Sent => debug!(
                        channel = outcome.channel,
                        recipient = outcome.recipient,
                        "notification delivered"
                    ),
                    DeliveryStatus::Failed => warn!(
                        channel = outcome.channel,
                        recipient = outcome.recipient,
                        error = outcome.error.as_deref().unwrap_or(""),
                        "notification delivery failed"
                    ),
                }
                outcome
            }
        });
        join_all(attempts).await
    }
}

/// Map a reqwest failure to the pipeline taxonomy: transport problems are
/// `Unavailable`, anything else is an invalid response.
pub(crate) fn classify_http_error(err: reqwest::Error) -> SentinelError {
    if err.is_timeout() || err.is_connect() {
        SentinelError::Unavailable(err.to_string())
    } else {
        SentinelError::InvalidResponse(err.to_string())
    }
}

//! Chat webhook channel
//!
//! Posts a JSON payload to a webhook endpoint (Slack/Discord-compatible
//! `text` field plus the structured alert data).

use async_trait::async_trait;

use crate::core::errors::{Result, SentinelError};
use crate::notify::{classify_http_error, AlertMessage, NotificationChannel};

pub struct WebhookChannel {
    endpoint: String,
    recipient: String,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(endpoint: String, recipient: String) -> Self {
        Self {
            endpoint,
            recipient,
            client: reqwest::Client::new(),
        }
    }

    fn render(&self, message: &AlertMessage) -> serde_json::Value {
        let factors = if message.risk_factors.is_empty() {
            "none".to_string()
        } else {
            message.risk_factors.join(", ")
        };
        serde_json::json!({
            "text": format!(
                "[{}] Fraud alert {} on {}: tx {} ({} -> {}), amount {:.2}, confidence {:.2}. Factors: {}",
                message.severity.to_uppercase(),
                message.alert_id,
                message.network,
                message.tx_hash,
                message.sender,
                message.receiver,
                message.amount,
                message.confidence,
                factors,
            ),
            "alert": message,
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn recipient(&self) -> &str {
        &self.recipient
    }

    async fn deliver(&self, message: &AlertMessage) -> Result<()> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&self.render(message))
            .send()
            .await
            .map_err(classify_http_error)?;
        if !response.status().is_success() {
            return Err(SentinelError::Unavailable(format!(
                "webhook endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

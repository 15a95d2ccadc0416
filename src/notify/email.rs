//! Email channel
//!
//! Renders an HTML body and posts it to a mail relay endpoint. Addresses,
//! hashes and risk factors originate from user-controlled input and are
//! escaped before entering markup.

use async_trait::async_trait;

use crate::core::errors::{Result, SentinelError};
use crate::notify::{classify_http_error, AlertMessage, NotificationChannel};

pub struct EmailChannel {
    relay_endpoint: String,
    recipient: String,
    client: reqwest::Client,
}

impl EmailChannel {
    pub fn new(relay_endpoint: String, recipient: String) -> Self {
        Self {
            relay_endpoint,
            recipient,
            client: reqwest::Client::new(),
        }
    }

    fn render_html(&self, message: &AlertMessage) -> String {
        let factors = message
            .risk_factors
            .iter()
            .map(|f| format!("<li>{}</li>", escape_html(f)))
            .collect::<String>();
        format!(
            "<h2>Fraud alert: severity {severity}</h2>\
             <p>Transaction <code>{tx_hash}</code> on {network}</p>\
             <table>\
             <tr><td>Amount</td><td>{amount:.2}</td></tr>\
             <tr><td>Sender</td><td>{sender}</td></tr>\
             <tr><td>Receiver</td><td>{receiver}</td></tr>\
             <tr><td>Confidence</td><td>{confidence:.2}</td></tr>\
             </table>\
             <ul>{factors}</ul>",
            severity = escape_html(&message.severity),
            tx_hash = escape_html(&message.tx_hash),
            network = escape_html(&message.network),
            amount = message.amount,
            sender = escape_html(&message.sender),
            receiver = escape_html(&message.receiver),
            confidence = message.confidence,
            factors = factors,
        )
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    fn recipient(&self) -> &str {
        &self.recipient
    }

    async fn deliver(&self, message: &AlertMessage) -> Result<()> {
        let body = serde_json::json!({
            "to": self.recipient,
            "subject": format!("[{}] Fraud alert for tx {}", message.severity, message.tx_hash),
            "html": self.render_html(message),
        });
        let response = self
            .client
            .post(&self.relay_endpoint)
            .json(&body)
            .send()
            .await
            .map_err(classify_http_error)?;
        if !response.status().is_success() {
            return Err(SentinelError::Unavailable(format!(
                "mail relay returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Minimal HTML escaping for text interpolated into markup.
pub fn escape_html(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn hostile_message() -> AlertMessage {
        AlertMessage {
            alert_id: "a1".to_string(),
            tx_hash: "tx1".to_string(),
            severity: "high".to_string(),
            confidence: 0.85,
            amount: 100.0,
            sender: "<script>alert(1)</script>".to_string(),
            receiver: "r\"1'".to_string(),
            network: "hathor".to_string(),
            risk_factors: vec!["factor <b>bold</b> & co".to_string()],
        }
    }

    #[test]
    fn test_escape_html() {
        assert_eq!(escape_html("a&b<c>d\"e'f"), "a&amp;b&lt;c&gt;d&quot;e&#x27;f");
        assert_eq!(escape_html("plain"), "plain");
    }

    #[test]
    fn test_render_escapes_user_strings() {
        let channel = EmailChannel::new("http://unused".to_string(), "ops@example.com".to_string());
        let html = channel.render_html(&hostile_message());
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;"));
        assert!(html.contains("factor &lt;b&gt;bold&lt;/b&gt; &amp; co"));
    }

    #[tokio::test]
    async fn test_email_posts_to_relay() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/send")
                .json_body_partial(r#"{"to": "ops@example.com"}"#);
            then.status(202);
        });

        let channel = EmailChannel::new(server.url("/send"), "ops@example.com".to_string());
        channel.deliver(&hostile_message()).await.unwrap();
        mock.assert();
    }
}

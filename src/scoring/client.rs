//! Scoring oracle client
//!
//! HTTP client for the fraud scoring oracle. Transient failures
//! (connection refused, timeout) are retried with exponential backoff;
//! malformed payloads surface immediately as `InvalidResponse`. Exhausted
//! retries are a hard failure for the transaction, never "no fraud".

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::config::ScoringConfig;
use crate::core::domain::{Transaction, Verdict};
use crate::core::errors::{Result, SentinelError};
use crate::scoring::dto::{BatchPredictionResponse, PredictionResponse, RetrainResponse, ScoreRequest};

/// Contract the pipeline depends on. The transport behind it is swappable.
#[async_trait]
pub trait ScoringOracle: Send + Sync {
    /// Score one transaction.
    async fn score(&self, tx: &Transaction) -> Result<Verdict>;

    /// Score a bounded batch, returning one verdict per input in input
    /// order. A short response is a protocol error, not a truncation.
    async fn score_batch(&self, txs: &[Transaction]) -> Result<Vec<Verdict>>;

    /// Opaque passthrough to the oracle's retraining endpoint.
    async fn trigger_retrain(&self) -> Result<RetrainResponse>;

    /// Probe the oracle's health endpoint. Never retried.
    async fn check_health(&self) -> Result<serde_json::Value>;
}

/// Reqwest-backed oracle client.
pub struct HttpScoringClient {
    base_url: String,
    client: reqwest::Client,
    config: ScoringConfig,
    backoff_base: Duration,
}

impl HttpScoringClient {
    pub fn new(config: ScoringConfig) -> Self {
        let base_url = config.base_url.trim_end_matches('/').to_string();
        Self {
            base_url,
            client: reqwest::Client::new(),
            backoff_base: Duration::from_secs(config.backoff_base_secs),
            config,
        }
    }

    /// Override the backoff base, mainly to keep tests fast.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.backoff_base = base;
        self
    }

    fn classify(err: reqwest::Error) -> SentinelError {
        if err.is_timeout() || err.is_connect() {
            SentinelError::Unavailable(err.to_string())
        } else if err.is_decode() {
            SentinelError::InvalidResponse(err.to_string())
        } else {
            SentinelError::Unavailable(err.to_string())
        }
    }

    /// Run `op` with up to `max_retries` retries on `Unavailable`,
    /// sleeping base * 2^attempt between attempts.
    async fn with_retries<T, F, Fut>(&self, what: &str, op: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.backoff_base * 2u32.pow(attempt);
                    attempt += 1;
                    warn!(
                        target = what,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "scoring oracle unavailable, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn post_predict(&self, request: &ScoreRequest, timeout: Duration) -> Result<Verdict> {
        let url = format!("{}/predict", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(Self::classify)?;

        if response.status().is_server_error() {
            return Err(SentinelError::Unavailable(format!(
                "oracle returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(SentinelError::InvalidResponse(format!(
                "oracle returned {}",
                response.status()
            )));
        }

        let parsed: PredictionResponse = response.json().await.map_err(Self::classify)?;
        parsed.into_verdict()
    }

    async fn post_batch(&self, requests: &[ScoreRequest], timeout: Duration) -> Result<BatchPredictionResponse> {
        let url = format!("{}/batch-predict", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .json(requests)
            .send()
            .await
            .map_err(Self::classify)?;

        if response.status().is_server_error() {
            return Err(SentinelError::Unavailable(format!(
                "oracle returned {}",
                response.status()
            )));
        }
        if !response.status().is_success() {
            return Err(SentinelError::InvalidResponse(format!(
                "oracle returned {}",
                response.status()
            )));
        }

        response.json().await.map_err(Self::classify)
    }
}

#[async_trait]
impl ScoringOracle for HttpScoringClient {
    async fn score(&self, tx: &Transaction) -> Result<Verdict> {
        let request = ScoreRequest::from(tx);
        let timeout = self.config.request_timeout();
        let verdict = self
            .with_retries("scoring", || self.post_predict(&request, timeout))
            .await?;
        debug!(
            tx_hash = %verdict.tx_hash,
            is_fraud = verdict.is_fraud,
            confidence = verdict.confidence,
            "verdict received"
        );
        Ok(verdict)
    }

    async fn score_batch(&self, txs: &[Transaction]) -> Result<Vec<Verdict>> {
        if txs.is_empty() {
            return Ok(Vec::new());
        }
        if txs.len() > self.config.max_batch_size {
            return Err(SentinelError::InvalidInput(format!(
                "batch size {} exceeds maximum {}",
                txs.len(),
                self.config.max_batch_size
            )));
        }

        let requests: Vec<ScoreRequest> = txs.iter().map(ScoreRequest::from).collect();
        let timeout = self.config.batch_timeout();
        let batch = self
            .with_retries("scoring_batch", || self.post_batch(&requests, timeout))
            .await?;

        // A partial batch is a protocol violation, never silently truncated.
        if batch.results.len() != txs.len() {
            return Err(SentinelError::InvalidResponse(format!(
                "batch {} returned {} results for {} transactions",
                batch.batch_id,
                batch.results.len(),
                txs.len()
            )));
        }

        let mut verdicts = Vec::with_capacity(batch.results.len());
        for (tx, result) in txs.iter().zip(batch.results) {
            if result.tx_hash != tx.tx_hash {
                return Err(SentinelError::InvalidResponse(format!(
                    "batch result order mismatch: expected {}, got {}",
                    tx.tx_hash, result.tx_hash
                )));
            }
            verdicts.push(result.into_verdict()?);
        }
        Ok(verdicts)
    }

    async fn trigger_retrain(&self) -> Result<RetrainResponse> {
        let url = format!("{}/model/retrain", self.base_url);
        let response = self
            .client
            .post(&url)
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(Self::classify)?;
        if !response.status().is_success() {
            return Err(SentinelError::Unavailable(format!(
                "retrain endpoint returned {}",
                response.status()
            )));
        }
        response.json().await.map_err(Self::classify)
    }

    async fn check_health(&self) -> Result<serde_json::Value> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(Self::classify)?;
        if !response.status().is_success() {
            return Err(SentinelError::Unavailable(format!(
                "health endpoint returned {}",
                response.status()
            )));
        }
        response.json().await.map_err(Self::classify)
    }
}

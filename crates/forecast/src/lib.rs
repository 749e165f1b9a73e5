//! Forecast provider adapters.
//!
//! The pipeline treats a forecast as a pure function from recent bars to a
//! predicted-return score. `RestForecast` talks to an external prediction
//! endpoint with bounded retries; `NeutralForecast` scores everything 0.0
//! so the scorer degrades to pure technical signals.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use intraday_core::config::ForecastConfig;
use intraday_core::events::Bar;
use intraday_core::traits::ForecastProvider;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const INITIAL_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Serialize)]
struct PredictRequest<'a> {
    symbol: &'a str,
    closes: Vec<f64>,
    volumes: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct PredictResponse {
    predicted_return: f64,
}

/// REST-backed forecast client. Timeouts, connection errors, 429 and 5xx
/// responses are retried with exponential backoff up to `max_retries`
/// attempts; other non-2xx statuses fail immediately. After exhaustion the
/// call returns an error and the caller falls back to a neutral score.
pub struct RestForecast {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    max_retries: u32,
}

impl RestForecast {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &ForecastConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone(),
            max_retries: config.max_retries.max(1),
        })
    }

    async fn attempt(&self, request: &PredictRequest<'_>) -> Result<RestOutcome> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await;

        let response = match response {
            Ok(r) => r,
            // Timeouts and transport errors are worth another try.
            Err(e) => return Ok(RestOutcome::Retry(anyhow!(e))),
        };

        let status = response.status();
        if status.is_success() {
            let body: PredictResponse = response.json().await?;
            return Ok(RestOutcome::Score(body.predicted_return));
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Ok(RestOutcome::Retry(anyhow!("HTTP {status}")));
        }
        Err(anyhow!("forecast endpoint rejected request: HTTP {status}"))
    }
}

enum RestOutcome {
    Score(f64),
    Retry(anyhow::Error),
}

#[async_trait]
impl ForecastProvider for RestForecast {
    async fn predict(&self, symbol: &str, recent_bars: &[Bar]) -> Result<f64> {
        let request = PredictRequest {
            symbol,
            closes: recent_bars
                .iter()
                .map(|b| b.close.to_f64().unwrap_or(0.0))
                .collect(),
            volumes: recent_bars
                .iter()
                .map(|b| b.volume.to_f64().unwrap_or(0.0))
                .collect(),
        };

        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = None;
        for attempt in 1..=self.max_retries {
            match self.attempt(&request).await? {
                RestOutcome::Score(score) => return Ok(score),
                RestOutcome::Retry(e) => {
                    tracing::warn!(
                        symbol,
                        attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "forecast request failed; backing off"
                    );
                    last_error = Some(e);
                    if attempt < self.max_retries {
                        tokio::time::sleep(backoff).await;
                        backoff *= 2;
                    }
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow!("forecast retries exhausted")))
    }
}

/// Always predicts a 0.0 return. Used when no endpoint is configured and in
/// tests; the scorer then runs on technical conditions alone.
pub struct NeutralForecast;

#[async_trait]
impl ForecastProvider for NeutralForecast {
    async fn predict(&self, _symbol: &str, _recent_bars: &[Bar]) -> Result<f64> {
        Ok(0.0)
    }
}

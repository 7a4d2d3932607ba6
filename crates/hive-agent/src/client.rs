//! Anthropic Messages API generator
//!
//! Every call is stateless: one system prompt, one user message, no history.

use crate::auth;
use crate::circuit_breaker::CircuitBreaker;
use crate::generation::GenerationService;
use crate::types::{AnthropicMessage, AnthropicRequest, AnthropicResponse};
use async_trait::async_trait;
use hive_core::{GenerationConfig, HiveError, Result};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

const MAX_RETRIES: u32 = 5;
const INITIAL_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(120);

/// [`GenerationService`] backed by the Anthropic Messages API
pub struct AnthropicGenerator {
    http: reqwest::Client,
    config: GenerationConfig,
    api_key: String,
    api_url: String,
    breaker: CircuitBreaker,
    initial_backoff: Duration,
}

impl AnthropicGenerator {
    /// Build a generator, reading the API key from the configured variable
    pub fn from_config(config: GenerationConfig) -> Result<Self> {
        let api_key = auth::resolve_api_key(&config)?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: GenerationConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| HiveError::Api(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config,
            api_key: api_key.into(),
            api_url: ANTHROPIC_API_URL.to_string(),
            breaker: CircuitBreaker::default(),
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    /// Point at a different endpoint (proxies, local stubs)
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_circuit_breaker(mut self, breaker: CircuitBreaker) -> Self {
        self.breaker = breaker;
        self
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn build_request(&self, system_prompt: &str, user_prompt: &str) -> AnthropicRequest {
        AnthropicRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: (!system_prompt.is_empty()).then(|| system_prompt.to_string()),
            messages: vec![AnthropicMessage::user(user_prompt)],
        }
    }

    async fn wait(&self, duration: Duration, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            _ = cancel.cancelled() => {
                Err(HiveError::Cancelled("generation cancelled during backoff".to_string()))
            }
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }
}

impl std::fmt::Debug for AnthropicGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicGenerator")
            .field("model", &self.config.model)
            .field("api_url", &self.api_url)
            .field("breaker", &self.breaker.state())
            .finish_non_exhaustive()
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[async_trait]
impl GenerationService for AnthropicGenerator {
    #[instrument(skip_all, fields(model = %self.config.model))]
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        cancel: &CancellationToken,
    ) -> Result<String> {
        if !self.breaker.can_execute() {
            return Err(HiveError::ApiLimit(format!(
                "Circuit breaker is open after repeated API failures; retry in {}s",
                self.breaker.time_until_retry().as_secs()
            )));
        }

        let request = self.build_request(system_prompt, user_prompt);
        let mut retries = 0;
        let mut backoff = self.initial_backoff;

        loop {
            if cancel.is_cancelled() {
                return Err(HiveError::Cancelled("generation cancelled".to_string()));
            }
            tracing::debug!("Sending request to Anthropic API (attempt {})", retries + 1);

            let send = self
                .http
                .post(&self.api_url)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION)
                .json(&request)
                .send();

            let response = tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(HiveError::Cancelled("generation cancelled".to_string()));
                }
                response = send => response.map_err(|e| {
                    self.breaker.record_failure();
                    HiveError::Api(format!("Failed to send request: {}", e))
                })?,
            };

            let status = response.status();
            let retryable = status.as_u16() == 429 || status.is_server_error();

            if retryable && retries < MAX_RETRIES {
                retries += 1;
                let wait = retry_after(&response).unwrap_or(backoff);
                tracing::warn!(
                    "Anthropic API returned {}. Waiting {}s before retry {}/{}",
                    status,
                    wait.as_secs(),
                    retries,
                    MAX_RETRIES
                );
                self.wait(wait, cancel).await?;
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }

            if !status.is_success() {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                self.breaker.record_failure();
                tracing::error!(
                    "Anthropic API error {} (breaker failures: {})",
                    status,
                    self.breaker.failure_count()
                );

                return Err(if status.as_u16() == 429 {
                    HiveError::ApiLimit(format!(
                        "Rate limit exceeded after {} retries: {}",
                        MAX_RETRIES, body
                    ))
                } else {
                    HiveError::Api(format!("Anthropic API error {}: {}", status, body))
                });
            }

            let parsed: AnthropicResponse = response
                .json()
                .await
                .map_err(|e| HiveError::Api(format!("Failed to parse response: {}", e)))?;
            self.breaker.record_success();

            let text = parsed.text();
            if text.is_empty() {
                return Err(HiveError::Generation(format!(
                    "Response {} contained no text",
                    parsed.id
                )));
            }

            match parsed.usage {
                Some(usage) => tracing::info!(
                    "Generation complete ({} chars, {} input tokens, {} output tokens)",
                    text.len(),
                    usage.input_tokens,
                    usage.output_tokens
                ),
                None => tracing::info!("Generation complete ({} chars)", text.len()),
            }

            return Ok(text);
        }
    }
}

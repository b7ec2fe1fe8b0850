// HTTP plumbing shared by the embedding and chat clients
// Speaks the OpenAI-compatible REST API (`/v1/...`)


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::config::Config;

const DEFAULT_TIMEOUT_SECONDS: u64 = 60;
const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
const EXPONENTIAL_BACKOFF_BASE: u32 = 2;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);
const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Retry schedule for blocking HTTP calls: retries server errors, rate
/// limiting and transport failures with exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based)
    #[inline]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(EXPONENTIAL_BACKOFF_BASE.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Run `request_fn` until it succeeds, fails with a non-retryable error,
    /// or the attempts run out.
    #[inline]
    pub fn run<F>(&self, target: &str, mut request_fn: F) -> Result<String>
    where
        F: FnMut() -> Result<String, ureq::Error>,
    {
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            debug!("HTTP request attempt {}/{}", attempt, self.attempts);

            match request_fn() {
                Ok(response_text) => {
                    debug!("Request succeeded on attempt {}", attempt);
                    return Ok(response_text);
                }
                Err(error) => {
                    match &error {
                        ureq::Error::StatusCode(status)
                            if *status >= 500 || *status == STATUS_TOO_MANY_REQUESTS =>
                        {
                            warn!(
                                "Server error (status {}), attempt {}/{}",
                                status, attempt, self.attempts
                            );
                        }
                        ureq::Error::StatusCode(status) => {
                            warn!("Client error (status {}), not retrying", status);
                            return Err(anyhow::anyhow!("Client error: HTTP {}", status));
                        }
                        ureq::Error::ConnectionFailed
                        | ureq::Error::HostNotFound
                        | ureq::Error::Timeout(_)
                        | ureq::Error::Io(_) => {
                            warn!(
                                "Transport error: {}, attempt {}/{}",
                                error, attempt, self.attempts
                            );
                        }
                        _ => {
                            warn!("Non-retryable error: {}", error);
                            return Err(anyhow::anyhow!("Non-retryable error: {}", error));
                        }
                    }

                    last_error = Some(anyhow::anyhow!("Request error: {}", error));

                    if attempt < self.attempts {
                        let delay = self.delay_after(attempt);
                        debug!("Waiting {:?} before retry", delay);
                        std::thread::sleep(delay);
                    }
                }
            }
        }

        error!("All retry attempts failed for request to {}", target);

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("Request failed after retries")))
    }
}

/// Blocking client for an OpenAI-compatible inference endpoint
#[derive(Debug, Clone)]
pub struct ProviderClient {
    base_url: Url,
    api_key: Option<String>,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub owned_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

impl ProviderClient {
    #[inline]
    pub fn new(config: &Config) -> Result<Self> {
        let base_url = config
            .provider_url()
            .context("Failed to generate provider URL from config")?;

        Ok(Self::with_base_url(base_url, config.api_key())
            .with_timeout(Duration::from_secs(config.provider.timeout_seconds)))
    }

    #[inline]
    pub fn with_base_url(base_url: Url, api_key: Option<String>) -> Self {
        Self {
            base_url,
            api_key,
            agent: build_agent(Duration::from_secs(DEFAULT_TIMEOUT_SECONDS)),
            retry: RetryPolicy::default(),
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry.attempts = attempts;
        self
    }

    #[inline]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry.base_delay = delay;
        self
    }

    #[inline]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    #[inline]
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Check that the provider answers on its models endpoint
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        debug!("Performing health check for provider at {}", self.base_url);

        let models = self.list_models().context("Provider health check failed")?;

        info!(
            "Health check passed for provider at {} ({} models)",
            self.base_url,
            models.len()
        );
        Ok(())
    }

    /// List the models the provider serves
    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let url = self.endpoint("/v1/models")?;

        debug!("Fetching available models from {}", url);

        let response_text = self
            .retry
            .run(self.base_url.as_str(), || {
                let mut request = self.agent.get(url.as_str());
                if let Some(key) = &self.api_key {
                    request = request.header("Authorization", format!("Bearer {key}"));
                }
                request
                    .call()
                    .and_then(|mut resp| resp.body_mut().read_to_string())
            })
            .context("Failed to fetch models")?;

        let models: ModelsResponse =
            serde_json::from_str(&response_text).context("Failed to parse models response")?;

        debug!("Found {} models", models.data.len());
        Ok(models.data)
    }

    /// POST a JSON body to `path` and decode the JSON response
    #[inline]
    pub fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(path)?;
        let request_json = serde_json::to_string(body).context("Failed to serialize request")?;

        let response_text = self.retry.run(self.base_url.as_str(), || {
            let mut request = self
                .agent
                .post(url.as_str())
                .header("Content-Type", "application/json");
            if let Some(key) = &self.api_key {
                request = request.header("Authorization", format!("Bearer {key}"));
            }
            request
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        serde_json::from_str(&response_text)
            .with_context(|| format!("Failed to parse response from {path}"))
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Failed to build URL for {path}"))
    }
}

fn build_agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

//! Batch dispatch: validation gate, rate limiting, retrying send and
//! per-message reconciliation.

use std::{fmt, sync::Arc, time::Duration};

use bytes::Bytes;
use mailwire_core::{Clock, MailError, Message, RealClock, Result, SendResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::{
    rate_limit::{RateLimitPolicy, RateLimiter},
    response::{error_message, process_response},
    retry::{is_retryable_status, RetryPolicy},
    transport::{ApiRequest, ApiResponse, HttpTransport, Transport, TransportError},
    DEFAULT_BASE_URL, DEFAULT_TIMEOUT_SECONDS,
};

/// Configuration for [`EmailClient`].
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// API base URL, without the `/v1/...` path.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub api_token: String,
    /// Per-attempt request timeout.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Retry policy for the physical send.
    pub retry: RetryPolicy,
    /// Request budget per window.
    pub rate_limit: RateLimitPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_token: String::new(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
            user_agent: format!("mailwire-rust/{}", env!("CARGO_PKG_VERSION")),
            retry: RetryPolicy::default(),
            rate_limit: RateLimitPolicy::default(),
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("base_url", &self.base_url)
            .field("api_token", &self.api_token_masked())
            .field("timeout", &self.timeout)
            .field("user_agent", &self.user_agent)
            .field("retry", &self.retry)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

impl ClientConfig {
    /// Default configuration with the given API token.
    pub fn new(api_token: impl Into<String>) -> Self {
        Self { api_token: api_token.into(), ..Self::default() }
    }

    /// API token with all but the last four characters masked for logging.
    pub fn api_token_masked(&self) -> String {
        let chars = self.api_token.chars().count();
        if chars <= 8 {
            return "***".to_string();
        }
        let tail: String = self.api_token.chars().skip(chars - 4).collect();
        format!("***{tail}")
    }

    /// Checks the configuration and its policies.
    ///
    /// # Errors
    ///
    /// Returns `MailError::Client` naming the first invalid value.
    pub fn validate(&self) -> Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(MailError::client("base_url must not be empty"));
        }
        if self.api_token.trim().is_empty() {
            return Err(MailError::client("api_token must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(MailError::client("timeout must be greater than 0"));
        }
        self.retry.validate().map_err(|e| MailError::client(format!("invalid retry policy: {e}")))?;
        self.rate_limit
            .validate()
            .map_err(|e| MailError::client(format!("invalid rate limit policy: {e}")))?;
        Ok(())
    }
}

/// Client for the transactional email API.
///
/// One instance owns one retry policy, one rate limiter and one transport.
/// Instances are independent; cloning the `Arc` is the way to share one.
pub struct EmailClient {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    rate_limiter: RateLimiter,
}

impl fmt::Debug for EmailClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmailClient")
            .field("config", &self.config)
            .field("transport", &self.transport)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

impl EmailClient {
    /// Creates a client posting over HTTP with the real clock.
    ///
    /// # Errors
    ///
    /// Returns `MailError::Client` if the configuration is invalid or the
    /// HTTP client cannot be built.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config).map_err(|e| MailError::client(e.to_string()))?;
        Ok(Self::build(config, Arc::new(transport), Arc::new(RealClock::new())))
    }

    /// Creates a client with an injected transport and clock.
    ///
    /// # Errors
    ///
    /// Returns `MailError::Client` if the configuration is invalid.
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config, transport, clock))
    }

    fn build(config: ClientConfig, transport: Arc<dyn Transport>, clock: Arc<dyn Clock>) -> Self {
        let rate_limiter = RateLimiter::new(config.rate_limit.clone(), clock.now());
        Self { config, transport, clock, rate_limiter }
    }

    /// The client's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send requests still available in the current rate-limit window.
    pub fn remaining_requests(&self) -> u32 {
        self.rate_limiter.remaining(self.clock.now())
    }

    /// Sends a batch of messages in one API request.
    ///
    /// Returns exactly one result per input message, ordered by input index.
    /// Invalid messages get `validation_failed` results and are left out of
    /// the request. Transport and API failures do not fail the call; they
    /// become `failed` results for every message that was sent.
    ///
    /// # Errors
    ///
    /// - `MailError::Validation` if `messages` is empty or every message is
    ///   invalid. No request is made.
    /// - `MailError::RateLimited` if the request budget for the current
    ///   window is spent. No request is made.
    /// - `MailError::Client` if the payload cannot be serialized.
    pub async fn send_batch(&self, messages: &[Message]) -> Result<Vec<SendResult>> {
        if messages.is_empty() {
            return Err(MailError::validation("at least one message is required"));
        }

        let request_id = Uuid::new_v4();
        let span = info_span!(
            "email_send",
            request_id = %request_id,
            batch_size = messages.len()
        );

        async move {
            let (valid, mut results) = partition(messages);

            if valid.is_empty() {
                let failures = results
                    .into_iter()
                    .map(|result| (result.index, result.error.unwrap_or_default()))
                    .collect::<Vec<_>>();
                warn!(invalid = failures.len(), "Every message in the batch failed validation");
                return Err(MailError::batch_validation(failures));
            }

            if !results.is_empty() {
                debug!(valid = valid.len(), invalid = results.len(), "Partially valid batch");
            }

            self.rate_limiter.try_acquire(self.clock.now()).map_err(|retry_after| {
                warn!(retry_after_ms = retry_after.as_millis(), "Rate limit exceeded");
                MailError::RateLimited { retry_after }
            })?;

            let emails = valid.iter().map(|(_, message)| message.to_wire()).collect::<Vec<_>>();
            let body = serde_json::to_vec(&json!({ "emails": emails }))
                .map_err(|e| MailError::client(format!("failed to serialize batch: {e}")))?;
            let request = ApiRequest { request_id, body: Bytes::from(body) };

            let outcome = self
                .execute_with_retry(&request)
                .await
                .and_then(|response| process_response(response.status, &response.body));

            let indices = valid.iter().map(|(index, _)| *index).collect::<Vec<_>>();
            let sent = reconcile(&indices, outcome);
            let accepted = sent.iter().filter(|result| result.success).count();
            info!(accepted, failed = sent.len() - accepted, "Batch send completed");

            results.extend(sent);
            results.sort_by_key(|result| result.index);
            Ok(results)
        }
        .instrument(span)
        .await
    }

    /// Sends one message; sugar over [`EmailClient::send_batch`].
    ///
    /// # Errors
    ///
    /// Same as [`EmailClient::send_batch`]; an invalid message is a
    /// `MailError::Validation`.
    pub async fn send_single(&self, message: &Message) -> Result<SendResult> {
        self.send_batch(std::slice::from_ref(message))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MailError::client("empty result for single send"))
    }

    /// Runs up to `max_retries + 1` attempts of the physical request.
    ///
    /// Transport failures, 429 and 5xx other than 501 are retried with
    /// backoff. Any response left after the last attempt, error status or
    /// not, is returned for classification.
    async fn execute_with_retry(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let policy = &self.config.retry;
        let mut attempt = 0;

        loop {
            debug!(attempt = attempt + 1, "Sending batch request");
            let outcome = self.transport.execute(request).await;

            let retryable = match &outcome {
                Ok(response) => is_retryable_status(response.status),
                Err(error) => error.is_retryable(),
            };

            if retryable && attempt < policy.max_retries {
                let delay = policy.delay_for_attempt(attempt);
                match &outcome {
                    Ok(response) => warn!(
                        attempt = attempt + 1,
                        status = response.status,
                        delay_ms = delay.as_millis(),
                        "Retryable response, backing off"
                    ),
                    Err(error) => warn!(
                        attempt = attempt + 1,
                        error = %error,
                        delay_ms = delay.as_millis(),
                        "Request failed, backing off"
                    ),
                }
                self.clock.sleep(delay).await;
                attempt += 1;
                continue;
            }

            return match outcome {
                Ok(response) => {
                    debug!(
                        status = response.status,
                        duration_ms = response.duration.as_millis(),
                        "Received response"
                    );
                    Ok(response)
                },
                Err(TransportError::Timeout) => {
                    Err(MailError::Timeout { timeout: self.config.timeout })
                },
                Err(TransportError::Connect { message }) => Err(MailError::connection(message)),
                Err(error) => {
                    Err(MailError::RetriesExhausted { attempts: attempt + 1, message: error.to_string() })
                },
            };
        }
    }
}

/// Splits a batch into valid messages (with their indices) and
/// `validation_failed` results for the rest.
fn partition(messages: &[Message]) -> (Vec<(usize, &Message)>, Vec<SendResult>) {
    let mut valid = Vec::with_capacity(messages.len());
    let mut invalid = Vec::new();

    for (index, message) in messages.iter().enumerate() {
        match message.validate() {
            Ok(()) => valid.push((index, message)),
            Err(error) => invalid.push(SendResult::validation_failed(index, error.to_string())),
        }
    }

    (valid, invalid)
}

/// Expands the single aggregate outcome into one result per sent message.
///
/// The API reports acceptance for the whole request, never per message, so
/// every sent message shares the same outcome.
fn reconcile(indices: &[usize], outcome: Result<Value>) -> Vec<SendResult> {
    match outcome {
        Ok(body) if body.get("status").and_then(Value::as_str) == Some("accepted") => {
            indices.iter().map(|&index| SendResult::accepted(index)).collect()
        },
        Ok(body) => {
            let error = error_message(&body).unwrap_or_else(|| "unexpected response".to_string());
            indices.iter().map(|&index| SendResult::failed(index, error.clone())).collect()
        },
        Err(error) => {
            let error = match error {
                MailError::Api { message, .. } => message,
                other => other.to_string(),
            };
            indices.iter().map(|&index| SendResult::failed(index, error.clone())).collect()
        },
    }
}

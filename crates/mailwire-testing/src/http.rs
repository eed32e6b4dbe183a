//! Mock send API backed by wiremock.

use std::{sync::Arc, time::Duration};

use mailwire_client::{
    transport::SEND_PATH, ClientConfig, EmailClient, HttpTransport, RateLimitPolicy, RetryPolicy,
};
use mailwire_core::{Clock, MailError, Result, TestClock};
use serde_json::{json, Value};
use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

/// Token the mock expects in the `Authorization` header.
pub const TEST_TOKEN: &str = "mw_test_token";

/// A mock of `POST /v1/email/send`.
///
/// Mocks only match requests carrying [`TEST_TOKEN`], so a client built
/// from [`MockApi::client_config`] reaches them and any other client gets
/// wiremock's default 404.
pub struct MockApi {
    server: MockServer,
}

impl MockApi {
    /// Starts a mock server with no responses mounted.
    pub async fn start() -> Self {
        Self { server: MockServer::start().await }
    }

    /// Base URL of the mock server.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// The underlying server, for custom mocks and `expect` assertions.
    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// Client configuration pointing at this server.
    ///
    /// Retries back off for 1-4ms without jitter, so real-clock tests stay
    /// fast; the rate limit is left at its default.
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.uri(),
            api_token: TEST_TOKEN.to_string(),
            timeout: Duration::from_secs(5),
            retry: RetryPolicy {
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(4),
                jitter_factor: 0.0,
                ..RetryPolicy::default()
            },
            rate_limit: RateLimitPolicy::default(),
            ..ClientConfig::default()
        }
    }

    /// HTTP client for this server using `config` and a virtual clock.
    ///
    /// # Errors
    ///
    /// Returns the client's configuration error.
    pub fn client_with(&self, config: ClientConfig, clock: &TestClock) -> Result<EmailClient> {
        let transport = HttpTransport::new(&config).map_err(|e| MailError::client(e.to_string()))?;
        let clock: Arc<dyn Clock> = Arc::new(clock.clone());
        EmailClient::with_transport(config, Arc::new(transport), clock)
    }

    /// HTTP client for this server using [`MockApi::client_config`].
    ///
    /// # Errors
    ///
    /// Returns the client's configuration error.
    pub fn client(&self, clock: &TestClock) -> Result<EmailClient> {
        self.client_with(self.client_config(), clock)
    }

    fn send_mock() -> wiremock::MockBuilder {
        Mock::given(matchers::method("POST"))
            .and(matchers::path(SEND_PATH))
            .and(matchers::header("authorization", format!("Bearer {TEST_TOKEN}").as_str()))
    }

    /// Answers every send with `200 {"status": "accepted"}`.
    pub async fn accept(&self) {
        self.respond(200, json!({"status": "accepted"})).await;
    }

    /// Answers every send with `200 {"status": "rejected", "error": error}`.
    pub async fn reject(&self, error: &str) {
        self.respond(200, json!({"status": "rejected", "error": error})).await;
    }

    /// Answers every send with `status` and a JSON body.
    pub async fn respond(&self, status: u16, body: Value) {
        Self::send_mock()
            .respond_with(ResponseTemplate::new(status).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Answers every send with `status` and a raw text body.
    pub async fn respond_text(&self, status: u16, body: &str) {
        Self::send_mock()
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&self.server)
            .await;
    }

    /// Answers successive sends with the given responses, one each.
    ///
    /// Sends beyond the sequence get wiremock's default 404.
    pub async fn respond_sequence(&self, responses: Vec<(u16, Value)>) {
        for (status, body) in responses {
            Self::send_mock()
                .respond_with(ResponseTemplate::new(status).set_body_json(body))
                .up_to_n_times(1)
                .mount(&self.server)
                .await;
        }
    }

    /// Number of requests received so far.
    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.map(|requests| requests.len()).unwrap_or(0)
    }

    /// Parsed bodies of the requests received so far.
    pub async fn sent_batches(&self) -> Vec<Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }
}

//! Physical request execution.
//!
//! [`Transport`] is the seam between the dispatch loop and the network. The
//! production implementation, [`HttpTransport`], posts the serialized batch
//! to the API over `reqwest`; tests substitute a scripted transport.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use thiserror::Error;
use uuid::Uuid;

use crate::client::ClientConfig;

/// Path of the batch send endpoint, relative to the base URL.
pub const SEND_PATH: &str = "/v1/email/send";

/// Header carrying the per-request correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Mailwire-Request-Id";

const MAX_RESPONSE_BODY_SIZE: usize = 64 * 1024;

/// Failure to obtain any HTTP response.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The attempt exceeded the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The host could not be reached.
    #[error("connection failed: {message}")]
    Connect {
        /// Underlying failure
        message: String,
    },

    /// The request failed mid-flight.
    #[error("network error: {message}")]
    Network {
        /// Underlying failure
        message: String,
    },

    /// The request could not be built or sent at all.
    #[error("invalid request: {message}")]
    Request {
        /// Underlying failure
        message: String,
    },
}

impl TransportError {
    /// Creates a connect error.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect { message: message.into() }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network { message: message.into() }
    }

    /// Creates a request construction error.
    pub fn request(message: impl Into<String>) -> Self {
        Self::Request { message: message.into() }
    }

    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Connect { .. } | Self::Network { .. } => true,
            Self::Request { .. } => false,
        }
    }
}

/// One physical send request.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Correlation id, constant across retries of the same batch.
    pub request_id: Uuid,
    /// Serialized `{"emails": [...]}` payload.
    pub body: Bytes,
}

/// Raw HTTP response to an [`ApiRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, lossily decoded and size-capped.
    pub body: String,
    /// Time spent on the attempt.
    pub duration: Duration,
}

impl ApiResponse {
    /// Builds a response with zero duration.
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into(), duration: Duration::ZERO }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Executes one physical send attempt.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// Sends the request and returns whatever response the server produced.
    ///
    /// Error statuses are responses, not errors; only failures to obtain a
    /// response are reported as [`TransportError`].
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError>;
}

/// `reqwest`-backed transport posting to `{base_url}/v1/email/send`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTransport {
    /// Builds the HTTP client with auth, content negotiation, timeout and
    /// user agent taken from `config`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Request` if the token is not a valid header
    /// value or the client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut headers = HeaderMap::new();
        let mut authorization = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .map_err(|_| TransportError::request("API token is not a valid header value"))?;
        authorization.set_sensitive(true);
        headers.insert(header::AUTHORIZATION, authorization);
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .build()
            .map_err(|e| TransportError::request(format!("failed to build HTTP client: {e}")))?;

        let endpoint = format!("{}{SEND_PATH}", config.base_url.trim_end_matches('/'));

        Ok(Self { client, endpoint })
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        let start_time = Instant::now();

        let response = self
            .client
            .post(&self.endpoint)
            .header(REQUEST_ID_HEADER, request.request_id.to_string())
            .body(request.body.clone())
            .send()
            .await
            .map_err(|e| {
                tracing::debug!(
                    duration_ms = start_time.elapsed().as_millis(),
                    "Request failed: {}",
                    e
                );
                classify(&e)
            })?;

        let status = response.status().as_u16();
        let body = match response.bytes().await {
            Ok(bytes) => truncate_body(&bytes),
            Err(e) => {
                tracing::warn!(status, "Failed to read response body: {}", e);
                if e.is_timeout() {
                    return Err(TransportError::Timeout);
                }
                return Err(TransportError::network(format!("failed to read response body: {e}")));
            },
        };

        Ok(ApiResponse { status, body, duration: start_time.elapsed() })
    }
}

fn classify(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::connect(error.to_string())
    } else if error.is_builder() {
        TransportError::request(error.to_string())
    } else {
        TransportError::network(error.to_string())
    }
}

fn truncate_body(bytes: &[u8]) -> String {
    let end = bytes.len().min(MAX_RESPONSE_BODY_SIZE);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use wiremock::{matchers, Mock, MockServer, ResponseTemplate};

    use super::*;

    fn config(base_url: String) -> ClientConfig {
        ClientConfig {
            base_url,
            api_token: "test-token".to_string(),
            timeout: Duration::from_secs(5),
            ..ClientConfig::default()
        }
    }

    fn request() -> ApiRequest {
        ApiRequest { request_id: Uuid::new_v4(), body: Bytes::from_static(br#"{"emails":[]}"#) }
    }

    #[tokio::test]
    async fn posts_with_auth_and_json_headers() {
        let server = MockServer::start().await;
        let request = request();

        Mock::given(matchers::method("POST"))
            .and(matchers::path(SEND_PATH))
            .and(matchers::header("authorization", "Bearer test-token"))
            .and(matchers::header("accept", "application/json"))
            .and(matchers::header("content-type", "application/json"))
            .and(matchers::header(REQUEST_ID_HEADER, request.request_id.to_string().as_str()))
            .and(matchers::body_string(r#"{"emails":[]}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"status":"accepted"}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&config(server.uri())).unwrap();
        let response = transport.execute(&request).await.unwrap();

        assert_eq!(response.status, 200);
        assert_eq!(response.body, r#"{"status":"accepted"}"#);
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn error_status_is_a_response() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&config(server.uri())).unwrap();
        let response = transport.execute(&request()).await.unwrap();

        assert_eq!(response.status, 503);
        assert_eq!(response.body, "unavailable");
        assert!(!response.is_success());
    }

    #[tokio::test]
    async fn slow_response_is_timeout() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let mut config = config(server.uri());
        config.timeout = Duration::from_millis(50);
        let transport = HttpTransport::new(&config).unwrap();

        let error = transport.execute(&request()).await.unwrap_err();
        assert_eq!(error, TransportError::Timeout);
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn unreachable_host_is_retryable() {
        let transport = HttpTransport::new(&config("http://127.0.0.1:1".to_string())).unwrap();

        let error = transport.execute(&request()).await.unwrap_err();
        assert!(error.is_retryable(), "unexpected error: {error:?}");
    }

    #[tokio::test]
    async fn large_bodies_are_capped() {
        let server = MockServer::start().await;
        Mock::given(matchers::any())
            .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(100 * 1024)))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(&config(server.uri())).unwrap();
        let response = transport.execute(&request()).await.unwrap();

        assert_eq!(response.body.len(), MAX_RESPONSE_BODY_SIZE);
    }

    /// Serves `connections` requests that each promise 100 body bytes, send
    /// 10, then close the socket.
    fn truncating_server(connections: usize) -> String {
        use std::{io::Write, net::TcpListener};

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming().take(connections) {
                let mut stream = stream.unwrap();
                read_request(&mut stream);
                let _ = stream.write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: 100\r\n\r\n{\"status\":",
                );
                let _ = stream.flush();
            }
        });
        format!("http://{addr}")
    }

    fn read_request(stream: &mut impl std::io::Read) {
        use std::io::Read;

        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let Ok(read) = stream.read(&mut buf) else { return };
            if read == 0 {
                return;
            }
            received.extend_from_slice(&buf[..read]);

            let text = String::from_utf8_lossy(&received).to_ascii_lowercase();
            if let Some(end) = text.find("\r\n\r\n") {
                let length = text[..end]
                    .lines()
                    .find_map(|line| line.strip_prefix("content-length:"))
                    .and_then(|value| value.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if received.len() >= end + 4 + length {
                    return;
                }
            }
        }
    }

    #[tokio::test]
    async fn dropped_body_is_network_error() {
        let transport = HttpTransport::new(&config(truncating_server(1))).unwrap();

        let error = transport.execute(&request()).await.unwrap_err();

        assert!(matches!(error, TransportError::Network { .. }), "unexpected error: {error:?}");
        assert!(error.to_string().contains("failed to read response body"));
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn dropped_body_retried_by_client() {
        use std::sync::Arc;

        use mailwire_core::{Message, SendStatus, TestClock};

        use crate::{EmailClient, RetryPolicy};

        let clock = TestClock::new();
        let config = ClientConfig {
            retry: RetryPolicy { max_retries: 2, jitter_factor: 0.0, ..RetryPolicy::default() },
            ..config(truncating_server(3))
        };
        let transport = Arc::new(HttpTransport::new(&config).unwrap());
        let client = EmailClient::with_transport(config, transport, Arc::new(clock.clone())).unwrap();

        let message = Message::builder()
            .from("noreply@example.com")
            .to("ada@example.com")
            .text("Hello")
            .build();
        let result = client.send_single(&message).await.unwrap();

        assert_eq!(result.status, SendStatus::Failed);
        assert_eq!(clock.sleeps().len(), 2);
        let error = result.error.unwrap();
        assert!(error.contains("after 3 attempts"), "unexpected error: {error}");
        assert!(error.contains("failed to read response body"));
    }

    #[test]
    fn endpoint_joins_base_url() {
        let transport = HttpTransport::new(&config("https://api.example.com/".to_string())).unwrap();
        assert_eq!(transport.endpoint(), "https://api.example.com/v1/email/send");
    }

    #[test]
    fn invalid_token_rejected() {
        let mut config = config("https://api.example.com".to_string());
        config.api_token = "bad\ntoken".to_string();

        let error = HttpTransport::new(&config).unwrap_err();
        assert!(!error.is_retryable());
    }

    #[test]
    fn request_errors_are_not_retryable() {
        assert!(TransportError::Timeout.is_retryable());
        assert!(TransportError::connect("refused").is_retryable());
        assert!(TransportError::network("reset").is_retryable());
        assert!(!TransportError::request("bad url").is_retryable());
    }
}

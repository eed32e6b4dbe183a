//! Scripted transport for deterministic dispatch tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex, PoisonError,
    },
};

use async_trait::async_trait;
use mailwire_client::{ApiRequest, ApiResponse, Transport, TransportError};
use serde_json::Value;
use uuid::Uuid;

type Outcome = Result<ApiResponse, TransportError>;

/// A [`Transport`] that replays queued outcomes.
///
/// Each `execute` pops the next outcome; once the queue is empty the
/// fallback outcome (by default `200 {"status":"accepted"}`) is returned
/// forever. Every call is counted and its request recorded.
#[derive(Debug)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Outcome>>,
    fallback: Outcome,
    calls: AtomicUsize,
    requests: Mutex<Vec<ApiRequest>>,
}

impl Default for ScriptedTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedTransport {
    /// Creates a transport that accepts every request.
    pub fn new() -> Self {
        Self::with_fallback(Ok(ApiResponse::new(200, r#"{"status":"accepted"}"#)))
    }

    /// Creates a transport that answers every unscripted request with
    /// `fallback`.
    pub fn with_fallback(fallback: Outcome) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Creates a transport that always fails with `error`.
    pub fn failing(error: TransportError) -> Self {
        Self::with_fallback(Err(error))
    }

    /// Creates a transport that always answers `status` with `body`.
    pub fn always(status: u16, body: &Value) -> Self {
        Self::with_fallback(Ok(ApiResponse::new(status, body.to_string())))
    }

    /// Queues a response.
    #[must_use]
    pub fn then_respond(self, status: u16, body: &Value) -> Self {
        self.push(Ok(ApiResponse::new(status, body.to_string())));
        self
    }

    /// Queues a transport failure.
    #[must_use]
    pub fn then_fail(self, error: TransportError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, outcome: Outcome) {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).push_back(outcome);
    }

    /// Number of `execute` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Requests received so far, in call order.
    pub fn requests(&self) -> Vec<ApiRequest> {
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Request ids received so far, in call order.
    pub fn request_ids(&self) -> Vec<Uuid> {
        self.requests().iter().map(|request| request.request_id).collect()
    }

    /// Parsed bodies of the requests received so far.
    pub fn sent_batches(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .filter_map(|request| serde_json::from_slice(&request.body).ok())
            .collect()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap_or_else(PoisonError::into_inner).push(request.clone());

        let next = self.queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
        next.unwrap_or_else(|| self.fallback.clone())
    }
}

//! Handler registry and payload dispatch.
//!
//! A [`WebhookHandler`] owns an optional signing secret and at most one
//! handler per [`EventKind`]. `process` parses a payload (one event object or
//! an array of them) and invokes the registered handler for each event.
//! Batch elements are parsed and dispatched concurrently; one element's
//! failure does not stop the others, and all failures are reported together
//! once every element has finished.

use std::{collections::HashMap, fmt, future::Future, sync::Arc};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info_span, warn, Instrument};

use crate::{
    error::{Result, WebhookError},
    events::{EventKind, WebhookEvent},
    signature::{generate_signature, verify_signature},
};

/// Error type returned by event handlers.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Result type returned by event handlers.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Callback for one kind of webhook event.
#[async_trait]
pub trait EventHandler: Send + Sync + fmt::Debug {
    /// Handles one event.
    async fn handle(&self, event: &WebhookEvent) -> HandlerResult;
}

struct FnHandler<F>(F);

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnHandler")
    }
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(WebhookEvent) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send,
{
    async fn handle(&self, event: &WebhookEvent) -> HandlerResult {
        (self.0)(event.clone()).await
    }
}

struct SyncHandler<F>(F);

impl<F> fmt::Debug for SyncHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SyncHandler")
    }
}

#[async_trait]
impl<F> EventHandler for SyncHandler<F>
where
    F: Fn(&WebhookEvent) -> HandlerResult + Send + Sync,
{
    async fn handle(&self, event: &WebhookEvent) -> HandlerResult {
        (self.0)(event)
    }
}

/// Adapts an async closure into an [`EventHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(WebhookEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(FnHandler(f))
}

/// Adapts a synchronous closure into an [`EventHandler`].
pub fn sync_handler<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&WebhookEvent) -> HandlerResult + Send + Sync + 'static,
{
    Arc::new(SyncHandler(f))
}

/// A parsed payload: one event or a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// The payload was a single event object.
    Single(WebhookEvent),
    /// The payload was an array of event objects.
    Batch(Vec<WebhookEvent>),
}

impl Parsed {
    /// The parsed events, in payload order.
    pub fn into_events(self) -> Vec<WebhookEvent> {
        match self {
            Self::Single(event) => vec![event],
            Self::Batch(events) => events,
        }
    }
}

/// Counts from one `process` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Events parsed from the payload.
    pub events: usize,
    /// Events handed to a registered handler that completed successfully.
    pub dispatched: usize,
    /// Events whose kind had no registered handler.
    pub ignored: usize,
}

/// Verifies, parses and dispatches inbound webhook payloads.
#[derive(Clone, Default)]
pub struct WebhookHandler {
    secret: Option<String>,
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl fmt::Debug for WebhookHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds = self.handlers.keys().copied().collect::<Vec<_>>();
        kinds.sort();
        f.debug_struct("WebhookHandler")
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("handlers", &kinds)
            .finish()
    }
}

enum Outcome {
    Dispatched,
    Ignored,
}

impl WebhookHandler {
    /// Creates a handler without a secret; every signature verifies.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handler that verifies signatures with `secret`.
    ///
    /// An empty secret counts as no secret: signatures are not enforced and
    /// [`WebhookHandler::sign`] fails with `MissingSecret`.
    pub fn with_secret(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if secret.is_empty() {
            warn!("Empty webhook secret ignored; signatures will not be verified");
            return Self::new();
        }
        Self { secret: Some(secret), handlers: HashMap::new() }
    }

    /// Whether a secret is configured.
    pub fn has_secret(&self) -> bool {
        self.secret.is_some()
    }

    /// Verifies a signature header value against the raw payload.
    ///
    /// Without a configured secret this always returns `true`. The header
    /// may be bare hex or `sha256=<hex>`.
    pub fn verify(&self, payload: impl AsRef<[u8]>, signature: &str) -> bool {
        match &self.secret {
            Some(secret) => verify_signature(payload.as_ref(), signature, secret),
            None => true,
        }
    }

    /// Signs a payload with the configured secret.
    ///
    /// # Errors
    ///
    /// Returns `WebhookError::MissingSecret` if no secret is configured.
    pub fn sign(&self, payload: impl AsRef<[u8]>) -> Result<String> {
        let secret = self.secret.as_deref().ok_or(WebhookError::MissingSecret)?;
        generate_signature(payload.as_ref(), secret)
    }

    /// Registers the handler for `kind`, replacing any previous one.
    pub fn register(&mut self, kind: EventKind, handler: Arc<dyn EventHandler>) {
        if self.handlers.insert(kind, handler).is_some() {
            debug!(%kind, "Replaced webhook handler");
        }
    }

    /// Fluent form of [`WebhookHandler::register`].
    #[must_use]
    pub fn on(mut self, kind: EventKind, handler: Arc<dyn EventHandler>) -> Self {
        self.register(kind, handler);
        self
    }

    /// Removes the handler for `kind`, returning it.
    pub fn unregister(&mut self, kind: EventKind) -> Option<Arc<dyn EventHandler>> {
        self.handlers.remove(&kind)
    }

    /// Whether a handler is registered for `kind`.
    pub fn has_handler(&self, kind: EventKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Parses a raw payload into typed events.
    ///
    /// # Errors
    ///
    /// - `InvalidJson` if the payload is not JSON
    /// - the element's error for a single event
    /// - `Batch` listing every failing element of an array payload
    pub fn parse(&self, payload: impl AsRef<[u8]>) -> Result<Parsed> {
        events_from_value(&parse_json(payload.as_ref())?)
    }

    /// [`WebhookHandler::parse`] for an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`WebhookHandler::parse`], minus `InvalidJson`; any value
    /// other than an object or array is `Malformed`.
    pub fn parse_value(&self, value: &Value) -> Result<Parsed> {
        events_from_value(value)
    }

    /// Parses a payload and dispatches each event to its handler.
    ///
    /// Completes once every invoked handler has completed. Events without a
    /// registered handler are counted as ignored.
    ///
    /// # Errors
    ///
    /// - `InvalidJson`, `Malformed`, `MissingField` or `UnknownEventKind` for
    ///   an unparseable single event
    /// - `Handler` if the single event's handler fails
    /// - `Batch` if any element of an array payload fails to parse or
    ///   dispatch; the remaining elements are still dispatched
    pub async fn process(&self, payload: impl AsRef<[u8]>) -> Result<DispatchReport> {
        let value = parse_json(payload.as_ref())?;
        self.process_value(&value).await
    }

    /// [`WebhookHandler::process`] for an already-decoded JSON value.
    ///
    /// # Errors
    ///
    /// Same as [`WebhookHandler::process`], minus `InvalidJson`.
    pub async fn process_value(&self, value: &Value) -> Result<DispatchReport> {
        match value {
            Value::Array(elements) => {
                let span = info_span!("webhook_process", batch_size = elements.len());
                self.process_batch(elements).instrument(span).await
            },
            Value::Object(_) => {
                let span = info_span!("webhook_process", batch_size = 1);
                async move {
                    let event = WebhookEvent::from_json(value)?;
                    let outcome = self.dispatch(&event).await?;
                    Ok(report(1, [outcome]))
                }
                .instrument(span)
                .await
            },
            _ => Err(WebhookError::malformed("payload must be a JSON object or array")),
        }
    }

    async fn process_batch(&self, elements: &[Value]) -> Result<DispatchReport> {
        let futures = elements.iter().enumerate().map(|(index, element)| async move {
            let outcome = match WebhookEvent::from_json(element) {
                Ok(event) => self.dispatch(&event).await,
                Err(error) => Err(error),
            };
            (index, outcome)
        });

        let mut outcomes = Vec::with_capacity(elements.len());
        let mut failures = Vec::new();
        for (index, outcome) in futures::future::join_all(futures).await {
            match outcome {
                Ok(outcome) => outcomes.push(outcome),
                Err(error) => {
                    warn!(index, error = %error, "Batch webhook event failed");
                    failures.push((index, error));
                },
            }
        }

        if failures.is_empty() {
            Ok(report(elements.len(), outcomes))
        } else {
            Err(WebhookError::Batch { total: elements.len(), failures })
        }
    }

    async fn dispatch(&self, event: &WebhookEvent) -> Result<Outcome> {
        let kind = event.kind();
        let Some(handler) = self.handlers.get(&kind) else {
            debug!(%kind, "No handler registered, ignoring event");
            return Ok(Outcome::Ignored);
        };

        debug!(%kind, message_id = %event.base().message_id, "Dispatching webhook event");
        handler
            .handle(event)
            .await
            .map(|()| Outcome::Dispatched)
            .map_err(|error| WebhookError::handler(kind, error.to_string()))
    }
}

fn parse_json(payload: &[u8]) -> Result<Value> {
    serde_json::from_slice(payload).map_err(|e| WebhookError::invalid_json(e.to_string()))
}

fn events_from_value(value: &Value) -> Result<Parsed> {
    match value {
        Value::Array(elements) => {
            let mut events = Vec::with_capacity(elements.len());
            let mut failures = Vec::new();
            for (index, element) in elements.iter().enumerate() {
                match WebhookEvent::from_json(element) {
                    Ok(event) => events.push(event),
                    Err(error) => failures.push((index, error)),
                }
            }
            if failures.is_empty() {
                Ok(Parsed::Batch(events))
            } else {
                Err(WebhookError::Batch { total: elements.len(), failures })
            }
        },
        Value::Object(_) => WebhookEvent::from_json(value).map(Parsed::Single),
        _ => Err(WebhookError::malformed("payload must be a JSON object or array")),
    }
}

fn report(events: usize, outcomes: impl IntoIterator<Item = Outcome>) -> DispatchReport {
    outcomes.into_iter().fold(DispatchReport { events, ..DispatchReport::default() }, |mut r, o| {
        match o {
            Outcome::Dispatched => r.dispatched += 1,
            Outcome::Ignored => r.ignored += 1,
        }
        r
    })
}

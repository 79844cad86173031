//! Scripted generation client for tests.
//!
//! [`ScriptedClient`] answers requests from per-route reply queues instead of
//! calling the network. A route is the pair of model identifier and response
//! format. When a queue holds more than one reply, each call consumes the
//! front; the last reply repeats forever.
//!
//! # Example
//!
//! ```
//! use canvas_genai::mock::{ScriptedClient, ScriptedReply};
//! use canvas_genai::{GenerationClient, GenerationRequest, ResponseFormat};
//!
//! # tokio_test::block_on(async {
//! let client = ScriptedClient::with_credential()
//!     .script("model", ResponseFormat::Text, ScriptedReply::text("graph TD"));
//!
//! let text = client
//!     .generate(&GenerationRequest::new("model", "fn main() {}"))
//!     .await
//!     .unwrap();
//! assert_eq!(text, "graph TD");
//! # });
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use crate::{Credential, GenAiError, GenerationClient, GenerationRequest, ResponseFormat};

/// Outcome a scripted route produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedOutcome {
    /// Successful response text.
    Text(String),
    /// Non-success HTTP status with a message.
    Status(u16, String),
    /// Connection-level failure.
    Network(String),
}

/// One scripted reply, optionally delayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedReply {
    /// What the call returns.
    pub outcome: ScriptedOutcome,
    /// How long the call is suspended before returning.
    pub delay: Duration,
}

impl ScriptedReply {
    /// A successful text reply.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            outcome: ScriptedOutcome::Text(text.into()),
            delay: Duration::ZERO,
        }
    }

    /// A failed reply with the given HTTP status.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            outcome: ScriptedOutcome::Status(status, message.into()),
            delay: Duration::ZERO,
        }
    }

    /// A connection-level failure.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            outcome: ScriptedOutcome::Network(message.into()),
            delay: Duration::ZERO,
        }
    }

    /// Suspends the call for `delay` before returning.
    #[must_use]
    pub const fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn into_result(self) -> Result<String, GenAiError> {
        match self.outcome {
            ScriptedOutcome::Text(text) => Ok(text),
            ScriptedOutcome::Status(status, message) => Err(GenAiError::api(status, message)),
            ScriptedOutcome::Network(message) => Err(GenAiError::Network(message)),
        }
    }
}

type Route = (String, ResponseFormat);

/// In-memory [`GenerationClient`] driven by scripted replies.
#[derive(Debug, Default)]
pub struct ScriptedClient {
    routes: Mutex<HashMap<Route, VecDeque<ScriptedReply>>>,
    requests: Mutex<Vec<GenerationRequest>>,
    credential: AtomicBool,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedClient {
    /// Creates a client with no credential installed.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a client that behaves as if a credential were installed.
    #[must_use]
    pub fn with_credential() -> Self {
        let client = Self::default();
        client.credential.store(true, Ordering::SeqCst);
        client
    }

    /// Appends a reply to the queue for `(model, format)`.
    #[must_use]
    pub fn script(self, model: &str, format: ResponseFormat, reply: ScriptedReply) -> Self {
        self.push(model, format, reply);
        self
    }

    /// Appends a reply to the queue for `(model, format)` on a shared client.
    pub fn push(&self, model: &str, format: ResponseFormat, reply: ScriptedReply) {
        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry((model.to_string(), format))
            .or_default()
            .push_back(reply);
    }

    /// Returns every request received so far, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns the highest number of requests that were suspended at once.
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_reply(&self, route: &Route) -> Option<ScriptedReply> {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        let queue = routes.get_mut(route)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl GenerationClient for ScriptedClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String, GenAiError> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        if !self.has_credential() {
            return Err(GenAiError::MissingCredential);
        }

        let route = (request.model.clone(), request.format);
        let Some(reply) = self.next_reply(&route) else {
            return Err(GenAiError::api(
                404,
                format!("models/{} is not found", request.model),
            ));
        };

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if reply.delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(reply.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        reply.into_result()
    }

    fn install_credential(&self, _credential: Credential) {
        self.credential.store(true, Ordering::SeqCst);
    }

    fn has_credential(&self) -> bool {
        self.credential.load(Ordering::SeqCst)
    }
}

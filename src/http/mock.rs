//! Scripted transport for tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::{HttpClient, HttpResponse};
use crate::error::{Result, SortieError};
use crate::request::{HttpMethod, OutgoingRequest};

/// Mock HTTP client for testing.
///
/// Allows configuring predetermined responses for specific requests without
/// making actual HTTP calls.
///
/// # Example
/// ```ignore
/// let mock = MockHttpClient::new();
/// mock.add_response(
///     "GET /items",
///     Ok(HttpResponse::ok(serde_json::json!([1, 2, 3]))),
/// );
/// ```
#[derive(Clone)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, Vec<MockResponse>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
}

/// A mock response that can optionally wait for a trigger before completing.
enum MockResponse {
    /// Immediate response
    Immediate(Result<HttpResponse>),
    /// Response that waits for a trigger signal before completing
    Triggered {
        response: Result<HttpResponse>,
        trigger: oneshot::Receiver<()>,
        /// When false the response is delivered even after cancellation,
        /// like a transport that never looks at its abort signal.
        honor_cancellation: bool,
    },
}

/// Record of a call made to the mock HTTP client.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub headers: Vec<(String, String)>,
    /// The cancellation token the call was issued with
    pub cancel: CancellationToken,
}

impl MockCall {
    /// Look up a recorded header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Whether this call's token has been cancelled since it was issued.
    pub fn was_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl MockHttpClient {
    /// Create a new mock HTTP client.
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(HashMap::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Add a predetermined response for a specific method and path.
    ///
    /// The key is formatted as "{method} {path}". Multiple responses can be
    /// added for the same key - they will be returned in FIFO order.
    pub fn add_response(&self, key: &str, response: Result<HttpResponse>) {
        self.push(key, MockResponse::Immediate(response));
    }

    /// Add a response that will wait for a manual trigger before completing.
    ///
    /// Returns a sender that when triggered (by sending `()` or dropping) will
    /// cause the HTTP request to complete with the given response. If the
    /// call's token is cancelled first, the call ends with `Cancelled`.
    pub fn add_response_with_trigger(
        &self,
        key: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        self.push_triggered(key, response, true)
    }

    /// Like [`add_response_with_trigger`](Self::add_response_with_trigger),
    /// but the response is delivered even if the call was cancelled.
    pub fn add_response_ignoring_cancellation(
        &self,
        key: &str,
        response: Result<HttpResponse>,
    ) -> oneshot::Sender<()> {
        self.push_triggered(key, response, false)
    }

    fn push_triggered(
        &self,
        key: &str,
        response: Result<HttpResponse>,
        honor_cancellation: bool,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(
            key,
            MockResponse::Triggered {
                response,
                trigger: rx,
                honor_cancellation,
            },
        );
        tx
    }

    fn push(&self, key: &str, response: MockResponse) {
        self.responses
            .lock()
            .entry(key.to_string())
            .or_default()
            .push(response);
    }

    /// Get all calls that have been made to this mock client.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Get the number of calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Get the number of requests currently in-flight (executing).
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Default for MockHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(
        &self,
        request: &OutgoingRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let in_flight = self.in_flight.clone();
        let _guard = scopeguard::guard((), move |_| {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        });

        self.calls.lock().push(MockCall {
            method: request.method,
            url: request.url.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
            headers: request.headers.clone(),
            cancel: cancel.clone(),
        });

        if cancel.is_cancelled() {
            return Err(SortieError::Cancelled);
        }

        let key = format!("{} {}", request.method, request.path());
        let mock_response = {
            let mut responses = self.responses.lock();
            match responses.get_mut(&key) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        match mock_response {
            Some(MockResponse::Immediate(response)) => response,
            Some(MockResponse::Triggered {
                response,
                trigger,
                honor_cancellation,
            }) => {
                if honor_cancellation {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(SortieError::Cancelled),
                        _ = trigger => {}
                    }
                } else {
                    // Proceed whether the sender fired or was dropped
                    let _ = trigger.await;
                }
                response
            }
            None => Err(SortieError::Other(anyhow::anyhow!(
                "No mock response configured for {}",
                key
            ))),
        }
    }
}

//! Request lifecycle client.
//!
//! A [`RequestClient`] runs at most one logical request at a time and exposes
//! its outcome as a [`RequestState`]. Starting a new request cancels the one
//! in flight:
//!
//! ```text
//! call A ──begin()──> loading, token A ──execute──> ...
//! call B ──begin()──> token A cancelled, loading, token B ──execute──> settle B
//!                                               A settles late ──> dropped
//! ```
//!
//! Each call takes a generation number when it begins. Only the call holding
//! the latest generation may write into the state, so a transport that
//! ignores its cancellation token cannot overwrite a newer result.

use std::sync::Arc;

use metrics::counter;
use parking_lot::Mutex;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthInterceptor, AuthOutcome, SessionStore};
use crate::config::ClientConfig;
use crate::error::{ErrorInfo, Result, SortieError};
use crate::http::{HttpClient, HttpResponse, ReqwestHttpClient};
use crate::request::{HttpMethod, OutgoingRequest, RequestId, RequestState};

/// The request currently owning the client state.
struct Flight {
    id: RequestId,
    token: CancellationToken,
}

#[derive(Default)]
struct Inner {
    state: RequestState,
    /// Generation of the most recently started request
    generation: u64,
    current: Option<Flight>,
}

/// Tracks one logical request at a time.
///
/// Construct one per call site that wants its own loading/error state. To
/// share supersession between call sites, share the instance (e.g. behind an
/// `Arc`).
pub struct RequestClient<H: HttpClient> {
    http: H,
    auth: Option<AuthInterceptor>,
    inner: Mutex<Inner>,
}

impl RequestClient<ReqwestHttpClient> {
    /// Build a reqwest-backed client that authenticates from `store`.
    ///
    /// # Errors
    /// Returns `Construction` if the configured base URL is invalid.
    pub fn from_config(config: &ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        let http = ReqwestHttpClient::from_config(config)?;
        Ok(Self::new(http).with_auth(AuthInterceptor::new(config.auth.clone(), store)))
    }
}

impl<H: HttpClient> RequestClient<H> {
    /// Create a client without authentication.
    pub fn new(http: H) -> Self {
        Self {
            http,
            auth: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn with_auth(mut self, auth: AuthInterceptor) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn http_client(&self) -> &H {
        &self.http
    }

    /// Bind an HTTP method, returning the function that issues requests.
    pub fn request(&self, method: HttpMethod) -> RequestFn<'_, H> {
        RequestFn {
            client: self,
            method,
        }
    }

    /// Cancel the in-flight request, if any.
    ///
    /// The cancelled call settles with empty `data` and `error`.
    pub fn cancel(&self) {
        let inner = self.inner.lock();
        if let Some(flight) = &inner.current {
            flight.token.cancel();
            tracing::warn!(request_id = %flight.id, "Request cancelled");
        }
    }

    /// Snapshot of the current state.
    pub fn state(&self) -> RequestState {
        self.inner.lock().state.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().state.loading
    }

    /// Reset the state, supersede any in-flight request and register a new one.
    ///
    /// Runs synchronously, so the previous token is cancelled before the new
    /// transport call can start.
    fn begin(&self, id: RequestId) -> (u64, CancellationToken) {
        let mut inner = self.inner.lock();

        if let Some(previous) = inner.current.take() {
            previous.token.cancel();
            counter!("sortie_requests_superseded_total").increment(1);
            tracing::debug!(
                request_id = %id,
                superseded = %previous.id,
                "Superseding in-flight request"
            );
        }

        inner.generation += 1;
        let generation = inner.generation;
        let token = CancellationToken::new();
        inner.current = Some(Flight {
            id,
            token: token.clone(),
        });
        inner.state = RequestState::loading();

        (generation, token)
    }

    /// Record the outcome of `generation`, unless a newer request started.
    fn settle(
        &self,
        generation: u64,
        method: HttpMethod,
        id: RequestId,
        token: &CancellationToken,
        outcome: Result<HttpResponse>,
    ) -> Result<RequestState> {
        let mut inner = self.inner.lock();

        if inner.generation != generation {
            tracing::debug!(request_id = %id, "Dropping result of superseded request");
            return Ok(inner.state.clone());
        }
        inner.current = None;
        inner.state.loading = false;

        // A cancelled token wins even if the transport delivered anyway
        let outcome = if token.is_cancelled() {
            Err(SortieError::Cancelled)
        } else {
            outcome
        };

        match outcome {
            Ok(response) => {
                counter!("sortie_requests_total", "method" => method.as_str(), "outcome" => "success")
                    .increment(1);
                tracing::debug!(request_id = %id, status = response.status, "Request succeeded");
                inner.state.data = Some(response.data);
            }
            Err(SortieError::Cancelled) => {
                counter!("sortie_requests_total", "method" => method.as_str(), "outcome" => "cancelled")
                    .increment(1);
                tracing::warn!(request_id = %id, "Request cancelled before completion");
            }
            Err(e) => {
                counter!("sortie_requests_total", "method" => method.as_str(), "outcome" => "error")
                    .increment(1);
                tracing::warn!(request_id = %id, error = %e, "Request failed");
                inner.state.error = Some(ErrorInfo::from(&e));
            }
        }

        Ok(inner.state.clone())
    }

    /// Clear `loading` for a call that ended without settling (its future was
    /// dropped mid-flight).
    fn release(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation != generation || !inner.state.loading {
            return;
        }
        if let Some(flight) = inner.current.take() {
            flight.token.cancel();
            tracing::debug!(request_id = %flight.id, "Request abandoned by caller");
        }
        inner.state.loading = false;
    }
}

/// A request function with its HTTP method bound.
///
/// Obtained from [`RequestClient::request`]; each call is one logical
/// request on the owning client.
pub struct RequestFn<'a, H: HttpClient> {
    client: &'a RequestClient<H>,
    method: HttpMethod,
}

impl<H: HttpClient> Clone for RequestFn<'_, H> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<H: HttpClient> Copy for RequestFn<'_, H> {}

impl<H: HttpClient> RequestFn<'_, H> {
    pub fn method(&self) -> HttpMethod {
        self.method
    }

    /// Issue the request and wait for it to settle.
    ///
    /// `params` become the query string for `GET` and are ignored otherwise;
    /// `body` is sent as JSON for every method except `GET`. Network failures,
    /// error statuses and cancellation all end up in the returned state.
    ///
    /// A call superseded by a newer one returns the client's current state,
    /// which belongs to the newer request and may still be loading.
    ///
    /// # Errors
    /// Only `Construction` errors (empty or unresolvable URL, malformed
    /// header including the attached credential) are returned, and they
    /// leave the client state untouched.
    pub async fn call(
        &self,
        url: &str,
        params: &[(&str, &str)],
        body: Option<serde_json::Value>,
    ) -> Result<RequestState> {
        if url.trim().is_empty() {
            return Err(SortieError::Construction("URL must not be empty".to_string()));
        }

        let query = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let mut request = OutgoingRequest::new(self.method, url, query, body);
        self.client.http.validate(&request)?;

        // The credential header comes from the session store, so it is
        // checked again once attached.
        let auth = self
            .client
            .auth
            .as_ref()
            .map(|auth| auth.apply(&mut request))
            .transpose();
        if matches!(auth, Ok(Some(AuthOutcome::Attached))) {
            self.client.http.validate(&request)?;
        }

        self.run(request, auth.map(|_| ())).await
    }

    /// Like [`call`](Self::call), serializing `body` first.
    ///
    /// # Errors
    /// Returns `Construction` if `body` cannot be represented as JSON.
    pub async fn call_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        params: &[(&str, &str)],
        body: &B,
    ) -> Result<RequestState> {
        let body = serde_json::to_value(body).map_err(|e| {
            SortieError::Construction(format!("Failed to serialize request body: {}", e))
        })?;
        self.call(url, params, Some(body)).await
    }

    async fn run(&self, request: OutgoingRequest, auth: Result<()>) -> Result<RequestState> {
        let client = self.client;
        let id = request.id;

        tracing::debug!(
            request_id = %id,
            method = %request.method,
            url = %request.url,
            "Starting request"
        );

        let (generation, token) = client.begin(id);
        let _release = scopeguard::guard(generation, |generation| client.release(generation));

        let outcome = match auth {
            Ok(()) => client.http.execute(&request, &token).await,
            Err(e) => Err(e),
        };

        client.settle(generation, self.method, id, &token, outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AuthConfig, MemorySessionStore};
    use crate::http::MockHttpClient;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn test_success_sets_data_and_clears_loading() {
        let mock = MockHttpClient::new();
        mock.add_response("GET /items", Ok(HttpResponse::ok(json!([1, 2]))));
        let client = RequestClient::new(mock.clone());

        let state = client
            .request(HttpMethod::Get)
            .call("/items", &[("page", "1")], None)
            .await
            .unwrap();

        assert_eq!(state.data, Some(json!([1, 2])));
        assert!(state.error.is_none());
        assert!(!state.loading);
        assert_eq!(client.state(), state);
        assert_eq!(
            mock.get_calls()[0].query,
            vec![("page".to_string(), "1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_error_sets_error_only() {
        let mock = MockHttpClient::new();
        mock.add_response(
            "POST /items",
            Err(SortieError::Transport {
                status: 500,
                message: "Error 500: Internal Server Error".to_string(),
            }),
        );
        let client = RequestClient::new(mock);

        let state = client
            .request(HttpMethod::Post)
            .call("/items", &[], Some(json!({"name": "x"})))
            .await
            .unwrap();

        assert!(state.data.is_none());
        assert_eq!(state.error.as_ref().and_then(|e| e.status()), Some(500));
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_new_request_clears_previous_outcome() {
        let mock = MockHttpClient::new();
        mock.add_response("GET /a", Ok(HttpResponse::ok(json!("a"))));
        let trigger = mock.add_response_with_trigger("GET /b", Ok(HttpResponse::ok(json!("b"))));
        let client = RequestClient::new(mock);

        client
            .request(HttpMethod::Get)
            .call("/a", &[], None)
            .await
            .unwrap();
        assert_eq!(client.state().data, Some(json!("a")));

        let get = client.request(HttpMethod::Get);
        let (state, ()) = tokio::join!(get.call("/b", &[], None), async {
            tokio::task::yield_now().await;
            let mid = client.state();
            assert!(mid.loading);
            assert!(mid.data.is_none());
            assert!(mid.error.is_none());
            trigger.send(()).unwrap();
        });

        assert_eq!(state.unwrap().data, Some(json!("b")));
    }

    #[tokio::test]
    async fn test_construction_error_leaves_state_untouched() {
        let mock = MockHttpClient::new();
        mock.add_response("GET /ok", Ok(HttpResponse::ok(json!(1))));
        let client = RequestClient::new(mock.clone());
        client
            .request(HttpMethod::Get)
            .call("/ok", &[], None)
            .await
            .unwrap();

        let err = client
            .request(HttpMethod::Get)
            .call("  ", &[], None)
            .await
            .unwrap_err();

        assert!(matches!(err, SortieError::Construction(_)));
        assert_eq!(client.state().data, Some(json!(1)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_late_construction_error_is_recorded_as_error() {
        let mock = MockHttpClient::new();
        mock.add_response("GET /ok", Ok(HttpResponse::ok(json!(1))));
        mock.add_response(
            "GET /bad",
            Err(SortieError::Construction("builder error".to_string())),
        );
        let client = RequestClient::new(mock);
        client
            .request(HttpMethod::Get)
            .call("/ok", &[], None)
            .await
            .unwrap();

        let state = client
            .request(HttpMethod::Get)
            .call("/bad", &[], None)
            .await
            .unwrap();

        assert!(state.data.is_none());
        assert_eq!(
            state.error.map(|e| e.kind),
            Some(crate::error::ErrorKind::Other)
        );
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_call_json_rejects_unrepresentable_body() {
        let client = RequestClient::new(MockHttpClient::new());
        let mut body = std::collections::HashMap::new();
        body.insert(vec![1u8], "non-string key");

        let err = client
            .request(HttpMethod::Post)
            .call_json("/items", &[], &body)
            .await
            .unwrap_err();
        assert!(matches!(err, SortieError::Construction(_)));
        assert!(!client.is_loading());
    }

    #[tokio::test]
    async fn test_explicit_cancel_leaves_data_and_error_empty() {
        let mock = MockHttpClient::new();
        let _trigger =
            mock.add_response_with_trigger("GET /slow", Ok(HttpResponse::ok(json!("late"))));
        let client = RequestClient::new(mock);

        let get = client.request(HttpMethod::Get);
        let (state, ()) = tokio::join!(get.call("/slow", &[], None), async {
            tokio::task::yield_now().await;
            client.cancel();
        });

        let state = state.unwrap();
        assert_eq!(state, RequestState::default());
    }

    #[tokio::test]
    async fn test_cancel_wins_over_transport_that_ignores_it() {
        let mock = MockHttpClient::new();
        let trigger = mock
            .add_response_ignoring_cancellation("GET /stale", Ok(HttpResponse::ok(json!("stale"))));
        let client = RequestClient::new(mock);

        let get = client.request(HttpMethod::Get);
        let (state, ()) = tokio::join!(get.call("/stale", &[], None), async {
            tokio::task::yield_now().await;
            client.cancel();
            trigger.send(()).unwrap();
        });

        let state = state.unwrap();
        assert!(state.data.is_none());
        assert!(state.error.is_none());
        assert!(!state.loading);
    }

    #[tokio::test]
    async fn test_dropped_call_releases_loading() {
        let mock = MockHttpClient::new();
        let _trigger =
            mock.add_response_with_trigger("GET /slow", Ok(HttpResponse::ok(json!("never"))));
        let client = RequestClient::new(mock.clone());

        let result = tokio::time::timeout(
            Duration::from_millis(20),
            client.request(HttpMethod::Get).call("/slow", &[], None),
        )
        .await;

        assert!(result.is_err());
        assert!(!client.is_loading());
        assert!(mock.get_calls()[0].was_cancelled());
    }

    #[tokio::test]
    async fn test_fail_fast_auth_skips_transport() {
        let mock = MockHttpClient::new();
        let auth = AuthInterceptor::new(
            AuthConfig::token_strict(),
            Arc::new(MemorySessionStore::new()),
        );
        let client = RequestClient::new(mock.clone()).with_auth(auth);

        let state = client
            .request(HttpMethod::Get)
            .call("/items", &[], None)
            .await
            .unwrap();

        assert_eq!(mock.call_count(), 0);
        let error = state.error.unwrap();
        assert_eq!(error.kind, crate::error::ErrorKind::Unauthenticated);
        assert!(!state.loading);
    }
}

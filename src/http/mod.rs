//! HTTP transport abstraction.
//!
//! This module defines the `HttpClient` trait that the lifecycle client
//! delegates to, so the same request tracking works over reqwest in
//! production and over a scripted mock in tests.

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::request::OutgoingRequest;

mod mock;
mod reqwest_client;

pub use mock::{MockCall, MockHttpClient};
pub use reqwest_client::ReqwestHttpClient;

/// Header attached to every request.
pub const ACCEPT_JSON: (&str, &str) = ("Accept", "application/json");
/// Header attached to every request.
pub const CONTENT_TYPE_JSON: (&str, &str) = ("Content-Type", "application/json");

/// Response from an HTTP request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Decoded JSON body (`Null` for an empty body)
    pub data: serde_json::Value,
}

impl HttpResponse {
    pub fn new(status: u16, data: serde_json::Value) -> Self {
        Self { status, data }
    }

    /// A `200 OK` carrying `data`.
    pub fn ok(data: serde_json::Value) -> Self {
        Self::new(200, data)
    }
}

/// Trait for executing HTTP requests.
///
/// Implementations must watch `cancel`: once it fires, the call ends with
/// [`SortieError::Cancelled`](crate::SortieError::Cancelled) rather than a
/// transport error. Non-2xx responses are reported as
/// [`SortieError::Transport`](crate::SortieError::Transport).
///
/// # Example
/// ```ignore
/// let client = ReqwestHttpClient::new();
/// let request = OutgoingRequest::new(HttpMethod::Get, "https://api.example.com/items", vec![], None);
/// let response = client.execute(&request, &CancellationToken::new()).await?;
/// println!("Status: {}, Data: {}", response.status, response.data);
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync + Clone {
    /// Check that `request` can be sent at all (e.g. that its URL resolves).
    ///
    /// Called before any client state changes, so malformed input is reported
    /// to the caller instead of being recorded as a request failure.
    fn validate(&self, _request: &OutgoingRequest) -> Result<()> {
        Ok(())
    }

    /// Execute an HTTP request.
    ///
    /// # Errors
    /// Returns an error if:
    /// - `cancel` fires before the response is complete (`Cancelled`)
    /// - The server answers with a non-2xx status (`Transport`)
    /// - The request fails due to network issues or times out (`Network`)
    /// - A 2xx body is not valid JSON (`Decode`)
    async fn execute(
        &self,
        request: &OutgoingRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse>;
}

//! Core types for a logical request.
//!
//! A logical request is one call to a [`crate::RequestFn`], spanning issuance
//! through settlement. These types describe what goes out on the wire
//! ([`OutgoingRequest`]) and what the caller observes afterwards
//! ([`RequestState`]).

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ErrorInfo, SortieError};

/// HTTP methods the client can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    /// Whether the request body is sent for this method.
    ///
    /// `GET` carries its arguments in the query string; every other method
    /// carries them in the JSON payload.
    pub fn sends_body(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = SortieError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            _ => Err(SortieError::Construction(format!(
                "Unsupported HTTP method '{}'",
                s
            ))),
        }
    }
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Unique identifier for a logical request, used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Display only first 8 characters for readability in logs
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        RequestId(uuid)
    }
}

/// A request as handed to the transport.
///
/// The auth interceptor may append headers before the transport sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutgoingRequest {
    pub id: RequestId,
    pub method: HttpMethod,
    /// Absolute URL, or a path relative to the transport's base URL
    pub url: String,
    /// Query parameters, only sent for `GET`
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub query: Vec<(String, String)>,
    /// JSON payload, never sent for `GET`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
    /// Per-request headers on top of the transport defaults
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<(String, String)>,
}

impl OutgoingRequest {
    /// Build a request, dropping whichever of `query`/`body` the method does
    /// not carry.
    pub fn new(
        method: HttpMethod,
        url: impl Into<String>,
        query: Vec<(String, String)>,
        body: Option<serde_json::Value>,
    ) -> Self {
        let (query, body) = if method.sends_body() {
            (Vec::new(), body)
        } else {
            (query, None)
        };
        Self {
            id: RequestId::new(),
            method,
            url: url.into(),
            query,
            body,
            headers: Vec::new(),
        }
    }

    /// Set a header, replacing any existing value with the same
    /// (case-insensitive) name.
    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.into()));
    }

    /// Look up a header by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The path portion of the URL, without scheme, host or query string.
    ///
    /// Relative URLs are returned as given (minus any query string).
    pub fn path(&self) -> &str {
        let without_query = self.url.split('?').next().unwrap_or(self.url.as_str());
        match without_query.split_once("://") {
            Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).unwrap_or("/"),
            None => without_query,
        }
    }
}

/// Observable state of a request lifecycle client.
///
/// While `loading` is true, `data` and `error` are empty. Once `loading` is
/// false at most one of them is set; both stay empty when the last request was
/// cancelled.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RequestState {
    pub data: Option<serde_json::Value>,
    pub error: Option<ErrorInfo>,
    pub loading: bool,
}

impl RequestState {
    /// State at the moment a new request starts.
    pub fn loading() -> Self {
        Self {
            data: None,
            error: None,
            loading: true,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.loading && self.data.is_some()
    }

    pub fn is_error(&self) -> bool {
        !self.loading && self.error.is_some()
    }
}

//! Production transport using reqwest.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tokio_util::sync::CancellationToken;

use super::{ACCEPT_JSON, CONTENT_TYPE_JSON, HttpClient, HttpResponse};
use crate::config::ClientConfig;
use crate::error::{Result, SortieError};
use crate::request::OutgoingRequest;

/// Production HTTP client using reqwest.
///
/// Relative request URLs are appended to the configured base URL. Every
/// request carries `Accept` and `Content-Type: application/json` plus the
/// configured default headers; cookies are kept and replayed when
/// `with_credentials` is set.
///
/// Headers are merged by name: configured defaults replace the JSON pair and
/// per-request headers replace both.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
    base_url: Option<String>,
    timeout: Option<Duration>,
    default_headers: Vec<(String, String)>,
}

impl ReqwestHttpClient {
    /// Create a client with no base URL, no timeout and no cookie store.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: None,
            timeout: None,
            default_headers: Vec::new(),
        }
    }

    /// Create a client from configuration.
    ///
    /// # Errors
    /// Returns `Construction` if the base URL is not an absolute URL or the
    /// underlying reqwest client cannot be built.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        if let Some(base_url) = &config.base_url {
            reqwest::Url::parse(base_url).map_err(|e| {
                SortieError::Construction(format!("Invalid base URL '{}': {}", base_url, e))
            })?;
        }

        let client = reqwest::Client::builder()
            .cookie_store(config.with_credentials)
            .build()
            .map_err(|e| SortieError::Construction(e.to_string()))?;

        let mut default_headers: Vec<(String, String)> = config
            .default_headers
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        default_headers.sort();

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            timeout: config.timeout_ms.map(Duration::from_millis),
            default_headers,
        })
    }

    /// Use an existing reqwest client (e.g. one shared with other code).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    fn resolve_url(&self, url: &str) -> Result<reqwest::Url> {
        let full = match &self.base_url {
            Some(base) if !is_absolute_url(url) => {
                format!(
                    "{}/{}",
                    base.trim_end_matches('/'),
                    url.trim_start_matches('/')
                )
            }
            _ => url.to_string(),
        };
        reqwest::Url::parse(&full)
            .map_err(|e| SortieError::Construction(format!("Invalid URL '{}': {}", full, e)))
    }

    /// The full header set for `request`, later entries replacing earlier
    /// ones with the same name.
    fn build_headers(&self, request: &OutgoingRequest) -> Result<HeaderMap> {
        let builtin = [ACCEPT_JSON, CONTENT_TYPE_JSON].into_iter();
        let configured = self
            .default_headers
            .iter()
            .chain(request.headers.iter())
            .map(|(name, value)| (name.as_str(), value.as_str()));

        let mut headers = HeaderMap::new();
        for (name, value) in builtin.chain(configured) {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                SortieError::Construction(format!("Invalid header name '{}': {}", name, e))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                SortieError::Construction(format!("Invalid value for header '{}': {}", name, e))
            })?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    async fn send(&self, request: &OutgoingRequest, url: reqwest::Url) -> Result<HttpResponse> {
        let headers = self.build_headers(request)?;
        let mut req = self
            .client
            .request(request.method.into(), url)
            .headers(headers);

        if let Some(timeout) = self.timeout {
            req = req.timeout(timeout);
        }

        if request.method.sends_body() {
            if let Some(body) = &request.body {
                req = req.body(serde_json::to_vec(body)?);
                tracing::trace!(request_id = %request.id, "Added request body");
            }
        } else if !request.query.is_empty() {
            req = req.query(&request.query);
        }

        let response = req.send().await.map_err(|e| {
            tracing::error!(request_id = %request.id, error = %e, "HTTP request failed");
            SortieError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::error!(
                request_id = %request.id,
                status = status.as_u16(),
                "HTTP request returned error status"
            );
            return Err(SortieError::from_status(status));
        }

        let bytes = response.bytes().await?;
        let data = if bytes.iter().all(u8::is_ascii_whitespace) {
            serde_json::Value::Null
        } else {
            serde_json::from_slice(&bytes).map_err(|e| SortieError::Decode(e.to_string()))?
        };

        tracing::info!(
            request_id = %request.id,
            status = status.as_u16(),
            response_len = bytes.len(),
            "HTTP request completed"
        );

        Ok(HttpResponse {
            status: status.as_u16(),
            data,
        })
    }
}

/// Whether `url` carries its own origin (`scheme://` or protocol-relative
/// `//`). A URL appearing later, e.g. in the query string, does not count.
fn is_absolute_url(url: &str) -> bool {
    if url.starts_with("//") {
        return true;
    }
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl Default for ReqwestHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    fn validate(&self, request: &OutgoingRequest) -> Result<()> {
        self.resolve_url(&request.url)?;
        self.build_headers(request).map(|_| ())
    }

    #[tracing::instrument(skip(self, request, cancel), fields(request_id = %request.id, method = %request.method, url = %request.url))]
    async fn execute(
        &self,
        request: &OutgoingRequest,
        cancel: &CancellationToken,
    ) -> Result<HttpResponse> {
        if cancel.is_cancelled() {
            return Err(SortieError::Cancelled);
        }

        let url = self.resolve_url(&request.url)?;
        tracing::debug!(url = %url, "Executing HTTP request");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(request_id = %request.id, "HTTP request aborted");
                Err(SortieError::Cancelled)
            }
            result = self.send(request, url) => result,
        }
    }
}

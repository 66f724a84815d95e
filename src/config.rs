//! Client configuration.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::auth::AuthConfig;

/// Configuration for a [`crate::RequestClient`] and its reqwest transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL that relative request URLs are appended to
    pub base_url: Option<String>,

    /// Timeout for each request in milliseconds (None = no timeout)
    pub timeout_ms: Option<u64>,

    /// Extra headers sent with every request, on top of the JSON
    /// `Accept`/`Content-Type` pair
    pub default_headers: HashMap<String, String>,

    /// Keep cookies from responses and send them on later requests
    pub with_credentials: bool,

    /// Authentication behaviour
    pub auth: AuthConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: None,
            default_headers: HashMap::new(),
            with_credentials: true,
            auth: AuthConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Configuration with the given base URL and defaults otherwise.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Default::default()
        }
    }
}

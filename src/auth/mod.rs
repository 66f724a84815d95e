//! Authentication for outgoing requests.
//!
//! The [`AuthInterceptor`] re-reads the session credential before every
//! request, attaches `Authorization: Bearer <token>` when the session is
//! authenticated, and otherwise asks the [`Navigator`] (if one is installed)
//! to show the session-expired page. Whether an unauthenticated request is
//! still sent or fails with [`SortieError::Unauthenticated`] is a
//! configuration choice ([`AuthConfig::fail_fast_on_missing_auth`]).

use std::sync::Arc;

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SortieError};
use crate::request::OutgoingRequest;

mod store;

pub use store::{MemorySessionStore, Navigator, RecordingNavigator, SessionStore};

/// How "authenticated" is decided from a stored credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// Trust the stored `authenticated` flag.
    Flag,
    /// Authenticated exactly when a non-empty token is stored.
    TokenPresence,
}

/// Authentication behaviour of a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub mode: AuthMode,

    /// Fail with `Unauthenticated` before touching the network when no
    /// credential is present. When false the request is sent without an
    /// `Authorization` header and the server decides.
    pub fail_fast_on_missing_auth: bool,

    /// Location the navigator is sent to when authentication is missing
    pub session_expired_path: String,

    /// Session store key holding the JSON credential
    pub store_key: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::Flag,
            fail_fast_on_missing_auth: false,
            session_expired_path: "/session-expired".to_string(),
            store_key: "auth".to_string(),
        }
    }
}

impl AuthConfig {
    /// Trust the `authenticated` flag and always send the request.
    pub fn flag_lenient() -> Self {
        Self::default()
    }

    /// Require a token and fail unauthenticated requests before sending.
    pub fn token_strict() -> Self {
        Self {
            mode: AuthMode::TokenPresence,
            fail_fast_on_missing_auth: true,
            ..Self::default()
        }
    }
}

/// Credential as stored in the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credential {
    pub authenticated: bool,
    pub token: Option<String>,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            token: Some(token.into()),
        }
    }

    fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    fn is_authenticated(&self, mode: AuthMode) -> bool {
        match mode {
            AuthMode::Flag => self.authenticated,
            AuthMode::TokenPresence => self.token().is_some(),
        }
    }
}

/// What the interceptor did to a request that it let through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    /// `Authorization: Bearer` was attached.
    Attached,
    /// Authenticated by flag but no token stored; sent without a bearer
    /// header (the session cookie is expected to carry it).
    FlagOnly,
    /// Not authenticated; sent without credentials.
    Anonymous { redirect_requested: bool },
}

/// Attaches credentials to outgoing requests.
#[derive(Clone)]
pub struct AuthInterceptor {
    config: AuthConfig,
    store: Arc<dyn SessionStore>,
    navigator: Option<Arc<dyn Navigator>>,
}

impl AuthInterceptor {
    pub fn new(config: AuthConfig, store: Arc<dyn SessionStore>) -> Self {
        Self {
            config,
            store,
            navigator: None,
        }
    }

    /// Install the navigation hook used when authentication is missing.
    pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Read the current credential from the store.
    ///
    /// A missing entry is an empty credential. A malformed entry is logged and
    /// also treated as empty.
    pub fn credential(&self) -> Credential {
        let Some(raw) = self.store.get(&self.config.store_key) else {
            return Credential::default();
        };
        match serde_json::from_str(&raw) {
            Ok(credential) => credential,
            Err(e) => {
                tracing::warn!(
                    key = %self.config.store_key,
                    error = %e,
                    "Ignoring malformed session credential"
                );
                Credential::default()
            }
        }
    }

    /// Apply the current credential to `request`.
    ///
    /// # Errors
    /// Returns `Unauthenticated` when no credential is present and
    /// `fail_fast_on_missing_auth` is set.
    pub fn apply(&self, request: &mut OutgoingRequest) -> Result<AuthOutcome> {
        let credential = self.credential();

        if credential.is_authenticated(self.config.mode) {
            return Ok(match credential.token() {
                Some(token) => {
                    request.set_header("Authorization", format!("Bearer {}", token));
                    tracing::trace!(request_id = %request.id, "Added Authorization header");
                    AuthOutcome::Attached
                }
                None => AuthOutcome::FlagOnly,
            });
        }

        let redirect_requested = self.request_session_expired();

        if self.config.fail_fast_on_missing_auth {
            tracing::warn!(
                request_id = %request.id,
                url = %request.url,
                "Refusing to send request without credentials"
            );
            return Err(SortieError::Unauthenticated);
        }

        tracing::debug!(request_id = %request.id, "Sending request without credentials");
        Ok(AuthOutcome::Anonymous { redirect_requested })
    }

    fn request_session_expired(&self) -> bool {
        let Some(navigator) = &self.navigator else {
            return false;
        };
        let target = &self.config.session_expired_path;
        if navigator.current_location() == *target {
            return false;
        }
        tracing::info!(path = %target, "Session missing, redirecting");
        counter!("sortie_auth_redirects_total").increment(1);
        navigator.navigate_to_session_expired(target);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::HttpMethod;

    fn request() -> OutgoingRequest {
        OutgoingRequest::new(HttpMethod::Get, "/items", vec![], None)
    }

    fn store_with(json: &str) -> MemorySessionStore {
        let store = MemorySessionStore::new();
        store.set("auth", json);
        store
    }

    #[test]
    fn test_attaches_bearer_when_authenticated() {
        let store = store_with(r#"{"authenticated": true, "token": "abc"}"#);
        let auth = AuthInterceptor::new(AuthConfig::default(), Arc::new(store));

        let mut req = request();
        let outcome = auth.apply(&mut req).unwrap();

        assert_eq!(outcome, AuthOutcome::Attached);
        assert_eq!(req.header("Authorization"), Some("Bearer abc"));
    }

    #[test]
    fn test_credential_is_reread_every_time() {
        let store = MemorySessionStore::new();
        let auth = AuthInterceptor::new(AuthConfig::default(), Arc::new(store.clone()));

        let mut first = request();
        assert!(matches!(
            auth.apply(&mut first).unwrap(),
            AuthOutcome::Anonymous { .. }
        ));
        assert_eq!(first.header("Authorization"), None);

        store.set("auth", r#"{"authenticated": true, "token": "fresh"}"#);
        let mut second = request();
        auth.apply(&mut second).unwrap();
        assert_eq!(second.header("Authorization"), Some("Bearer fresh"));
    }

    #[test]
    fn test_flag_mode_ignores_token_without_flag() {
        let store = store_with(r#"{"authenticated": false, "token": "abc"}"#);
        let auth = AuthInterceptor::new(AuthConfig::flag_lenient(), Arc::new(store));

        let mut req = request();
        let outcome = auth.apply(&mut req).unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Anonymous {
                redirect_requested: false
            }
        );
        assert_eq!(req.header("Authorization"), None);
    }

    #[test]
    fn test_flag_without_token_sends_no_header() {
        let store = store_with(r#"{"authenticated": true}"#);
        let auth = AuthInterceptor::new(AuthConfig::flag_lenient(), Arc::new(store));

        let mut req = request();
        assert_eq!(auth.apply(&mut req).unwrap(), AuthOutcome::FlagOnly);
        assert_eq!(req.header("Authorization"), None);
    }

    #[test]
    fn test_token_presence_mode_uses_token() {
        let store = store_with(r#"{"token": "abc"}"#);
        let auth = AuthInterceptor::new(AuthConfig::token_strict(), Arc::new(store));

        let mut req = request();
        assert_eq!(auth.apply(&mut req).unwrap(), AuthOutcome::Attached);
        assert_eq!(req.header("Authorization"), Some("Bearer abc"));
    }

    #[test]
    fn test_fail_fast_returns_unauthenticated_and_redirects() {
        let navigator = Arc::new(RecordingNavigator::at("/dashboard"));
        let store = store_with(r#"{"token": ""}"#);
        let auth = AuthInterceptor::new(AuthConfig::token_strict(), Arc::new(store))
            .with_navigator(navigator.clone());

        let err = auth.apply(&mut request()).unwrap_err();
        assert!(matches!(err, SortieError::Unauthenticated));
        assert_eq!(navigator.redirects(), vec!["/session-expired".to_string()]);
    }

    #[test]
    fn test_no_redirect_when_already_on_session_expired_page() {
        let navigator = Arc::new(RecordingNavigator::at("/session-expired"));
        let auth = AuthInterceptor::new(AuthConfig::default(), Arc::new(MemorySessionStore::new()))
            .with_navigator(navigator.clone());

        let outcome = auth.apply(&mut request()).unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Anonymous {
                redirect_requested: false
            }
        );
        assert!(navigator.redirects().is_empty());
    }

    #[test]
    fn test_lenient_mode_redirects_but_proceeds() {
        let navigator = Arc::new(RecordingNavigator::at("/home"));
        let auth = AuthInterceptor::new(AuthConfig::default(), Arc::new(MemorySessionStore::new()))
            .with_navigator(navigator.clone());

        let outcome = auth.apply(&mut request()).unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Anonymous {
                redirect_requested: true
            }
        );
        assert_eq!(navigator.redirects().len(), 1);
    }

    #[test]
    fn test_malformed_credential_is_treated_as_missing() {
        let store = store_with("{not json");
        let auth = AuthInterceptor::new(AuthConfig::default(), Arc::new(store));
        assert_eq!(auth.credential(), Credential::default());
    }
}

//! Single-flight HTTP request tracking for interactive call sites.
//!
//! A [`RequestClient`] issues one logical request at a time, keeps its
//! `data`/`error`/`loading` state, attaches the session credential through an
//! [`AuthInterceptor`], and cancels the in-flight request when a newer one
//! supersedes it. [`settle_all`] waits on a group of independently issued
//! requests and maps failures to `None`.
//!
//! ```ignore
//! let store = Arc::new(MemorySessionStore::new());
//! let client = RequestClient::from_config(&ClientConfig::with_base_url("https://api.example.com"), store)?;
//! let state = client.request(HttpMethod::Get).call("/items", &[("page", "1")], None).await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod request;
pub mod settle;

// Re-export commonly used types
pub use auth::{
    AuthConfig, AuthInterceptor, AuthMode, AuthOutcome, Credential, MemorySessionStore, Navigator,
    RecordingNavigator, SessionStore,
};
pub use client::{RequestClient, RequestFn};
pub use config::ClientConfig;
pub use error::{ErrorInfo, ErrorKind, Result, SortieError};
pub use http::{HttpClient, HttpResponse, MockCall, MockHttpClient, ReqwestHttpClient};
pub use request::{HttpMethod, OutgoingRequest, RequestId, RequestState};
pub use settle::{Settled, settle_all, settle_all_detailed};
pub use tokio_util::sync::CancellationToken;

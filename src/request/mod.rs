//! Request data model - methods, outgoing requests and observable state.

pub mod types;

pub use types::{HttpMethod, OutgoingRequest, RequestId, RequestState};

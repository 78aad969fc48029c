//! Endpoint addressing shared by both probes

pub mod endpoint;

pub use endpoint::{DEFAULT_HTTP_ENDPOINT, DEFAULT_WS_ENDPOINT, Endpoint, Scheme};

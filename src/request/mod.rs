//! JSON request/response probe
//!
//! This module performs a single HTTP/1.1 POST with a JSON body, classifies
//! the response, and times the whole exchange.

pub mod config;
pub mod outcome;
pub mod probe;
pub mod protocol;


pub use config::RequestProbeConfig;
pub use outcome::RequestOutcome;
pub use probe::RequestProbe;
pub use protocol::RawResponse;

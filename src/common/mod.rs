//! Common traits and types used across the echoprobe library
//!
//! This module contains the observer interface both probes report to,
//! the default tracing-backed observer, and helpers for tests.

pub mod observer;
pub mod test_utils;
pub mod traits;

pub use observer::TracingObserver;
pub use traits::{NullObserver, ProbeEvent, ProbeObserver};

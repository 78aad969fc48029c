use crate::network::Endpoint;
use crate::{RequestError, RequestErrorKind};
use http::StatusCode;
use serde_json::Value;
use std::time::Duration;

/// Finalized result of one request/response exchange
///
/// Built once when the exchange ends, whichever way it ends, and
/// immutable afterwards.
#[derive(Debug)]
pub struct RequestOutcome {
    target: Endpoint,
    request_body: Value,
    status: Option<StatusCode>,
    result: Result<Value, RequestError>,
    elapsed: Duration,
}

impl RequestOutcome {
    pub(crate) fn finalize(
        target: Endpoint,
        request_body: Value,
        status: Option<StatusCode>,
        result: Result<Value, RequestError>,
        elapsed: Duration,
    ) -> Self {
        Self {
            target,
            request_body,
            status,
            result,
            elapsed,
        }
    }

    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Body as sent; `Null` when it could not be serialized
    pub fn request_body(&self) -> &Value {
        &self.request_body
    }

    /// Status line code, if a response head arrived
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    /// Parsed response body, only present on success
    pub fn body(&self) -> Option<&Value> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&RequestError> {
        self.result.as_ref().err()
    }

    pub fn error_kind(&self) -> Option<RequestErrorKind> {
        self.error().map(RequestError::kind)
    }

    /// Time from dispatch start to finalization
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    pub fn into_result(self) -> Result<Value, RequestError> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(result: Result<Value, RequestError>, status: Option<StatusCode>) -> RequestOutcome {
        RequestOutcome::finalize(
            Endpoint::default_http(),
            json!({"hello": "dsad"}),
            status,
            result,
            Duration::from_micros(1500),
        )
    }

    #[test]
    fn test_success_accessors() {
        let outcome = outcome(Ok(json!({"ok": true})), Some(StatusCode::OK));
        assert!(outcome.is_success());
        assert_eq!(outcome.body(), Some(&json!({"ok": true})));
        assert!(outcome.error().is_none());
        assert!((outcome.elapsed_ms() - 1.5).abs() < 1e-9);
        assert_eq!(outcome.request_body(), &json!({"hello": "dsad"}));
    }

    #[test]
    fn test_failure_has_no_body() {
        let outcome = outcome(
            Err(RequestError::HttpStatus {
                status: StatusCode::NOT_FOUND,
            }),
            Some(StatusCode::NOT_FOUND),
        );
        assert!(!outcome.is_success());
        assert!(outcome.body().is_none());
        assert_eq!(outcome.error_kind(), Some(RequestErrorKind::HttpStatus));
        assert_eq!(
            outcome.error().unwrap().to_string(),
            "HTTP error! Status: 404 Not Found"
        );
    }
}

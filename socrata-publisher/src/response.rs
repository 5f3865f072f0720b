//! Status-code classification of transport responses.
//!
//! Every operation that inspects a response goes through [`classify`], a plain
//! switch on the status code. Bodies of failed responses are decoded into an
//! [`ErrorEnvelope`]; a malformed envelope still reports the classification.

use serde::de::DeserializeOwned;

use crate::error::{ErrorEnvelope, FailureKind, Result, SocrataError};
use crate::transport::Response;

/// Status code of a completed operation.
pub const STATUS_OK: u16 = 200;
/// Status code of an operation the server is still processing.
pub const STATUS_ACCEPTED: u16 = 202;

/// The classified outcome of a single response.
#[derive(Debug)]
pub enum Outcome {
    /// 200: the body carries the result payload.
    Complete(String),
    /// 202: the body may carry a ticket id.
    Pending(String),
    /// Anything else, already decoded into the error taxonomy.
    Failed(SocrataError),
}

impl Outcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Outcome::Pending(_))
    }
}

/// Map a failing status code to its failure class.
pub fn failure_kind(status: u16) -> FailureKind {
    match status {
        401 | 403 => FailureKind::Unauthorized,
        404 => FailureKind::NotFound,
        _ => FailureKind::Request,
    }
}

/// Classify a response by status code alone, decoding failure bodies.
pub fn classify(response: Response) -> Outcome {
    match response.status {
        STATUS_OK => Outcome::Complete(response.body),
        STATUS_ACCEPTED => Outcome::Pending(response.body),
        status => Outcome::Failed(failure_from_body(status, &response.body)),
    }
}

/// Decode a failure body into the error for `status`.
pub fn failure_from_body(status: u16, body: &str) -> SocrataError {
    let kind = failure_kind(status);
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => SocrataError::from_envelope(kind, status, envelope),
        Err(source) => SocrataError::MalformedFailure {
            kind,
            status,
            source,
        },
    }
}

/// Require a terminal success and return its body.
///
/// A 202 here means the caller did not expect a deferred job; it is reported
/// as a generic request failure.
pub fn expect_complete(response: Response) -> Result<String> {
    match classify(response) {
        Outcome::Complete(body) => Ok(body),
        Outcome::Pending(_) => Err(SocrataError::Request {
            status: STATUS_ACCEPTED,
            code: None,
            message: Some("operation was deferred by the server".to_string()),
        }),
        Outcome::Failed(err) => Err(err),
    }
}

/// Accept either a completed or a pending response and return its body.
pub fn expect_accepted(response: Response) -> Result<String> {
    match classify(response) {
        Outcome::Complete(body) | Outcome::Pending(body) => Ok(body),
        Outcome::Failed(err) => Err(err),
    }
}

/// Decode a success body into `T`.
pub fn decode<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body)
        .map_err(|e| SocrataError::parse(format!("response does not appear to be a {}", what), e))
}

/// Require a terminal success and decode it into `T`.
pub fn expect_json<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    let body = expect_complete(response)?;
    decode(&body, what)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> Response {
        Response {
            status,
            body: body.to_string(),
        }
    }

    #[test]
    fn test_classify_success_and_pending() {
        assert!(matches!(classify(response(200, "{}")), Outcome::Complete(b) if b == "{}"));
        assert!(classify(response(202, "")).is_pending());
    }

    #[test]
    fn test_classify_unauthorized_statuses() {
        for status in [401, 403] {
            let outcome = classify(response(status, r#"{"code":"auth","message":"no"}"#));
            match outcome {
                Outcome::Failed(SocrataError::Unauthorized { status: s, code, .. }) => {
                    assert_eq!(s, status);
                    assert_eq!(code.as_deref(), Some("auth"));
                }
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
    }

    #[test]
    fn test_classify_not_found() {
        let outcome = classify(response(404, r#"{"message":"gone"}"#));
        assert!(matches!(
            outcome,
            Outcome::Failed(SocrataError::NotFound { message: Some(ref m), .. }) if m == "gone"
        ));
    }

    #[test]
    fn test_classify_other_statuses_are_request_failures() {
        for status in [201, 204, 400, 409, 500, 503] {
            let outcome = classify(response(status, "{}"));
            assert!(
                matches!(outcome, Outcome::Failed(SocrataError::Request { status: s, .. }) if s == status),
                "status {} was not a request failure",
                status
            );
        }
    }

    #[test]
    fn test_malformed_failure_body_keeps_classification() {
        let outcome = classify(response(403, "<html>Forbidden</html>"));
        match outcome {
            Outcome::Failed(err) => {
                assert!(err.is_parse_failure());
                assert_eq!(err.failure_kind(), Some(FailureKind::Unauthorized));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_expect_complete_rejects_pending() {
        let err = expect_complete(response(202, "{}")).unwrap_err();
        assert!(matches!(err, SocrataError::Request { status: 202, .. }));
    }

    #[test]
    fn test_expect_accepted() {
        assert!(expect_accepted(response(200, "")).is_ok());
        assert!(expect_accepted(response(202, "")).is_ok());
        assert!(expect_accepted(response(500, "{}")).is_err());
    }

    #[test]
    fn test_expect_json_malformed_success_body() {
        let err = expect_json::<serde_json::Value>(response(200, "not json"), "view").unwrap_err();
        assert!(matches!(err, SocrataError::Parse { .. }));
    }
}

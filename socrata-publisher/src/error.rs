//! Error types for the publisher client.
//!
//! Server responses are classified by status code (see [`crate::response`])
//! into the variants below. Local misuse of the model surfaces as
//! [`SocrataError::Precondition`].

use serde::Deserialize;
use std::fmt;

/// Which failure class a non-success status code was mapped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Unauthorized,
    NotFound,
    Request,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Unauthorized => write!(f, "unauthorized"),
            FailureKind::NotFound => write!(f, "not found"),
            FailureKind::Request => write!(f, "request failure"),
        }
    }
}

/// The structured error envelope the service returns on failure.
///
/// Every field is optional on the wire; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ErrorEnvelope {
    pub code: Option<String>,
    pub message: Option<String>,
    pub error: bool,
}

/// Top-level error type for the publisher client.
#[derive(Debug, thiserror::Error)]
pub enum SocrataError {
    #[error("Request failed (HTTP {status}): {}", display_message(.code, .message))]
    Request {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    #[error("Unauthorized (HTTP {status}): {}", display_message(.code, .message))]
    Unauthorized {
        status: u16,
        code: Option<String>,
        message: Option<String>,
    },

    #[error("Not found: {}", display_message(.code, .message))]
    NotFound {
        code: Option<String>,
        message: Option<String>,
    },

    #[error("Malformed {kind} response (HTTP {status}): {source}")]
    MalformedFailure {
        kind: FailureKind,
        status: u16,
        #[source]
        source: serde_json::Error,
    },

    #[error("Response parse error: {message}: {source}")]
    Parse {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected response: {message}")]
    UnexpectedResponse { message: String },

    #[error("Precondition violated: {message}")]
    Precondition { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("Operation timed out after {waited_secs}s of polling")]
    TimedOut { waited_secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

fn display_message(code: &Option<String>, message: &Option<String>) -> String {
    match (code, message) {
        (Some(code), Some(message)) => format!("{} ({})", message, code),
        (None, Some(message)) => message.clone(),
        (Some(code), None) => code.clone(),
        (None, None) => "no details".to_string(),
    }
}

impl SocrataError {
    /// Build the typed failure for `kind` from a decoded envelope.
    pub fn from_envelope(kind: FailureKind, status: u16, envelope: ErrorEnvelope) -> Self {
        let ErrorEnvelope { code, message, .. } = envelope;
        match kind {
            FailureKind::Unauthorized => SocrataError::Unauthorized {
                status,
                code,
                message,
            },
            FailureKind::NotFound => SocrataError::NotFound { code, message },
            FailureKind::Request => SocrataError::Request {
                status,
                code,
                message,
            },
        }
    }

    pub(crate) fn parse(message: impl Into<String>, source: serde_json::Error) -> Self {
        SocrataError::Parse {
            message: message.into(),
            source,
        }
    }

    pub(crate) fn precondition(message: impl Into<String>) -> Self {
        SocrataError::Precondition {
            message: message.into(),
        }
    }

    /// True for both malformed success bodies and malformed failure bodies.
    pub fn is_parse_failure(&self) -> bool {
        matches!(
            self,
            SocrataError::Parse { .. } | SocrataError::MalformedFailure { .. }
        )
    }

    /// The failure class this error was classified into, if it came from the server.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            SocrataError::Unauthorized { .. } => Some(FailureKind::Unauthorized),
            SocrataError::NotFound { .. } => Some(FailureKind::NotFound),
            SocrataError::Request { .. } => Some(FailureKind::Request),
            SocrataError::MalformedFailure { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// The machine-readable error code supplied by the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            SocrataError::Request { code, .. }
            | SocrataError::Unauthorized { code, .. }
            | SocrataError::NotFound { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// A type alias for results using [`SocrataError`].
pub type Result<T> = std::result::Result<T, SocrataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_request() {
        let err = SocrataError::Request {
            status: 400,
            code: Some("invalid_request".into()),
            message: Some("Missing viewId".into()),
        };
        assert_eq!(
            err.to_string(),
            "Request failed (HTTP 400): Missing viewId (invalid_request)"
        );
    }

    #[test]
    fn test_error_display_not_found_without_details() {
        let err = SocrataError::NotFound {
            code: None,
            message: None,
        };
        assert_eq!(err.to_string(), "Not found: no details");
    }

    #[test]
    fn test_from_envelope_maps_kind() {
        let envelope = ErrorEnvelope {
            code: Some("permission_denied".into()),
            message: Some("nope".into()),
            error: true,
        };
        let err = SocrataError::from_envelope(FailureKind::Unauthorized, 403, envelope);
        assert!(matches!(err, SocrataError::Unauthorized { status: 403, .. }));
        assert_eq!(err.code(), Some("permission_denied"));
        assert_eq!(err.failure_kind(), Some(FailureKind::Unauthorized));
    }

    #[test]
    fn test_envelope_ignores_unknown_fields() {
        let envelope: ErrorEnvelope =
            serde_json::from_str(r#"{"code":"x","message":"y","error":true,"extra":1}"#).unwrap();
        assert_eq!(envelope.code.as_deref(), Some("x"));
        assert!(envelope.error);
    }

    #[test]
    fn test_is_parse_failure() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = SocrataError::MalformedFailure {
            kind: FailureKind::NotFound,
            status: 404,
            source: json_err,
        };
        assert!(err.is_parse_failure());
        assert_eq!(err.failure_kind(), Some(FailureKind::NotFound));
        assert!(!SocrataError::Cancelled.is_parse_failure());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing.csv");
        let err: SocrataError = io_err.into();
        assert!(matches!(err, SocrataError::Io(_)));
    }
}

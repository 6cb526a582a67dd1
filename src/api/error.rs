//! Error types for the remote API boundary.

use std::fmt;

use thiserror::Error;

/// Standard outcome classes of a remote failure.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorCode {
    /// The resource does not exist.
    NotFound,
    /// The patch changed nothing.
    NotModified,
    /// The resource already exists or a precondition failed.
    Conflict,
    /// The credentials lack a required permission.
    PermissionDenied,
    /// Any other vendor status.
    Other(u16),
}

impl ErrorCode {
    /// Classifies a vendor HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            304 => Self::NotModified,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 | 412 => Self::Conflict,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => f.write_str("not found"),
            Self::NotModified => f.write_str("not modified"),
            Self::Conflict => f.write_str("conflict"),
            Self::PermissionDenied => f.write_str("permission denied"),
            Self::Other(status) => write!(f, "status {status}"),
        }
    }
}

/// Failure reported by the remote API.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{message} ({code})")]
pub struct ApiError {
    /// Outcome class.
    pub code: ErrorCode,
    /// Message returned by the provider.
    pub message: String,
}

impl ApiError {
    /// Creates an error from a classified code.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates an error from a vendor HTTP status code.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::from_status(status), message)
    }

    /// Shorthand for a not-found error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Returns `true` when the resource does not exist.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.code == ErrorCode::NotFound
    }

    /// Returns `true` when the patch changed nothing.
    #[must_use]
    pub fn is_not_modified(&self) -> bool {
        self.code == ErrorCode::NotModified
    }
}

/// Errors raised while driving the remote API through a [`super::Client`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ClientError {
    /// Raised when the provider rejects a call.
    #[error(transparent)]
    Api(#[from] ApiError),
    /// Raised when an asynchronous operation finishes with an error.
    #[error("operation {operation} failed: {message}")]
    OperationFailed {
        /// Operation name.
        operation: String,
        /// Error reported by the operation.
        message: String,
    },
    /// Raised when an asynchronous operation does not finish in time.
    #[error("timeout waiting for operation {operation}")]
    OperationTimeout {
        /// Operation name.
        operation: String,
    },
    /// Raised when the run is cancelled while waiting.
    #[error("cancelled while waiting for operation {operation}")]
    Cancelled {
        /// Operation name.
        operation: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(304, ErrorCode::NotModified)]
    #[case(403, ErrorCode::PermissionDenied)]
    #[case(404, ErrorCode::NotFound)]
    #[case(409, ErrorCode::Conflict)]
    #[case(412, ErrorCode::Conflict)]
    #[case(500, ErrorCode::Other(500))]
    fn classifies_vendor_status(#[case] status: u16, #[case] expected: ErrorCode) {
        assert_eq!(ErrorCode::from_status(status), expected);
    }

    #[test]
    fn api_error_is_wrapped_transparently() {
        let err = ClientError::from(ApiError::from_status(500, "backend unavailable"));
        assert_eq!(err.to_string(), "backend unavailable (status 500)");
    }
}

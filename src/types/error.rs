//! Error types for docdispatch
//!
//! Every failure inside an invocation ends up here and is folded into a
//! response envelope at the handler boundary.

use hyper::StatusCode;

/// Main error type for dispatch operations
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    /// Request body could not be decoded; reported before any database work
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Missing required field: '{0}'")]
    MissingField(&'static str),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Convert error to HTTP status code
    ///
    /// Only malformed input is a client error; everything that happens once an
    /// operation is attempted is reported as an operation failure.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequest(_)
            | Self::MissingField(_)
            | Self::Database(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to status code and message tuple for the response envelope
    pub fn into_status_code_and_message(self) -> (StatusCode, String) {
        let status = self.status_code();
        let message = self.to_string();
        (status, message)
    }
}

impl From<bson::extjson::de::Error> for DispatchError {
    fn from(err: bson::extjson::de::Error) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<std::io::Error> for DispatchError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_bad_request_is_a_client_error() {
        assert_eq!(
            DispatchError::BadRequest("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            DispatchError::MissingField("data").status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            DispatchError::Database("down".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_message_text() {
        let (status, message) = DispatchError::MissingField("update").into_status_code_and_message();
        assert_eq!(status.as_u16(), 500);
        assert_eq!(message, "Missing required field: 'update'");
    }

    #[test]
    fn test_conversions_used_by_question_mark() {
        let err: DispatchError = std::io::Error::new(std::io::ErrorKind::AddrInUse, "taken").into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Internal error: taken");

        let extjson = bson::Bson::try_from(serde_json::json!({ "$oid": "not-hex" })).unwrap_err();
        assert!(matches!(DispatchError::from(extjson), DispatchError::InvalidRequest(_)));
    }
}

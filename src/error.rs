// Error handling for the transit proxy and the client-side state machines

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub enum TransitError {
    /// A required query parameter was absent or empty
    MissingParameter(&'static str),
    /// A query parameter was present but could not be used
    InvalidParameter { name: &'static str, reason: String },
    /// Transport failure talking to the upstream API
    NetworkError(String),
    /// Upstream answered with a non-success status
    UpstreamStatus(u16),
    /// Upstream answered, but not with the shape we expected
    ParseError(String),
    /// History store could not be read or written
    StorageError(String),
}

impl std::fmt::Display for TransitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransitError::MissingParameter(name) => {
                write!(f, "Missing required parameter '{}'", name)
            }
            TransitError::InvalidParameter { name, reason } => {
                write!(f, "Invalid parameter '{}': {}", name, reason)
            }
            TransitError::NetworkError(e) => write!(f, "Network error: {}", e),
            TransitError::UpstreamStatus(status) => {
                write!(f, "Upstream returned error status {}", status)
            }
            TransitError::ParseError(e) => write!(f, "Parse error: {}", e),
            TransitError::StorageError(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for TransitError {}

pub type Result<T> = std::result::Result<T, TransitError>;

impl TransitError {
    /// Machine-readable code sent in error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            TransitError::MissingParameter(_) => "missing_parameter",
            TransitError::InvalidParameter { .. } => "invalid_parameter",
            TransitError::NetworkError(_) => "upstream_unreachable",
            TransitError::UpstreamStatus(_) => "upstream_error",
            TransitError::ParseError(_) => "upstream_schema",
            TransitError::StorageError(_) => "storage_error",
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            TransitError::MissingParameter(_) | TransitError::InvalidParameter { .. }
        )
    }

    fn parameter(&self) -> Option<&'static str> {
        match self {
            TransitError::MissingParameter(name) => Some(*name),
            TransitError::InvalidParameter { name, .. } => Some(*name),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter: Option<&'static str>,
}

pub const GENERIC_UPSTREAM_ERROR: &str = "Failed to fetch data from the transit service";

impl ResponseError for TransitError {
    fn status_code(&self) -> StatusCode {
        if self.is_validation() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = if self.is_validation() {
            ErrorBody {
                error: self.to_string(),
                code: Some(self.code()),
                parameter: self.parameter(),
            }
        } else {
            // Upstream details stay in the logs
            ErrorBody {
                error: GENERIC_UPSTREAM_ERROR.to_string(),
                code: None,
                parameter: None,
            }
        };

        HttpResponse::build(self.status_code())
            .insert_header(("Cache-Control", "no-store"))
            .json(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let err = TransitError::MissingParameter("stationId");
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "missing_parameter");
        assert_eq!(err.to_string(), "Missing required parameter 'stationId'");
    }

    #[test]
    fn upstream_errors_map_to_internal_error() {
        for err in [
            TransitError::NetworkError("connection refused".to_string()),
            TransitError::UpstreamStatus(502),
            TransitError::ParseError("expected array".to_string()),
        ] {
            assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
            assert!(!err.is_validation());
        }
    }
}

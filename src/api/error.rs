use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::domain::ConfigurationError;
use crate::modbus::ProtocolError;

/// API error types that can be returned from handlers
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    /// Zone did not answer; the request may succeed later
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Hardware error: {0}")]
    HardwareError(String),
}

/// Error response that gets serialized to JSON
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) | ApiError::ValidationError(_) => StatusCode::BAD_REQUEST,
            ApiError::InternalError(_) | ApiError::HardwareError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            ApiError::NotFound(_) => "NotFound",
            ApiError::BadRequest(_) => "BadRequest",
            ApiError::ValidationError(_) => "ValidationError",
            ApiError::InternalError(_) => "InternalServerError",
            ApiError::ServiceUnavailable(_) => "ServiceUnavailable",
            ApiError::HardwareError(_) => "HardwareError",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        let message = match &self {
            ApiError::InternalError(_) | ApiError::HardwareError(_) => {
                tracing::error!(error = %self, "API error occurred");
                "An internal error occurred".to_string()
            }
            ApiError::ServiceUnavailable(_) => {
                tracing::warn!(error = %self, "Service unavailable");
                self.to_string()
            }
            _ => {
                tracing::debug!(error = %self, "Client error");
                self.to_string()
            }
        };

        (
            status,
            Json(ErrorResponse {
                error: error_type.to_string(),
                message,
            }),
        )
            .into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::InternalError(error.to_string())
    }
}

impl From<ConfigurationError> for ApiError {
    fn from(error: ConfigurationError) -> Self {
        ApiError::ValidationError(error.to_string())
    }
}

impl From<ProtocolError> for ApiError {
    fn from(error: ProtocolError) -> Self {
        match error {
            e if e.is_communication() => ApiError::ServiceUnavailable(e.to_string()),
            e @ (ProtocolError::ReadOnlyRegister(_)
            | ProtocolError::ValueOutOfRange(_)
            | ProtocolError::KindMismatch(_)) => ApiError::BadRequest(e.to_string()),
            e => ApiError::HardwareError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::NotFound("zone 9".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::ValidationError("test".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::InternalError("test".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_protocol_error_mapping() {
        let timeout: ApiError = ProtocolError::Timeout(Duration::from_secs(3)).into();
        assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let range: ApiError = ProtocolError::ValueOutOfRange(9000.0).into();
        assert_eq!(range.status_code(), StatusCode::BAD_REQUEST);

        let exception: ApiError = ProtocolError::Exception(4).into();
        assert_eq!(exception.error_type(), "HardwareError");
    }

    #[test]
    fn test_configuration_error_is_validation() {
        let err: ApiError = ConfigurationError::InvertedBounds { min: 25.0, max: 18.0 }.into();
        assert_eq!(err.error_type(), "ValidationError");
    }
}

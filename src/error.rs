use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GuardError>;

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GuardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GuardError::Config(_) | GuardError::Io(_) | GuardError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn code(&self) -> &'static str {
        match self {
            GuardError::Config(_) => "CONFIGURATION_ERROR",
            GuardError::Io(_) => "IO_ERROR",
            GuardError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error: &str, code: &str) -> Self {
        Self {
            success: false,
            error: error.to_string(),
            code: code.to_string(),
        }
    }

    pub fn from_guard_error(err: &GuardError) -> Self {
        Self::new(&err.to_string(), err.code())
    }
}

impl IntoResponse for GuardError {
    fn into_response(self) -> Response {
        tracing::error!(target: "reqguard::error", error = %self, "Request failed");
        (self.status_code(), Json(ErrorResponse::from_guard_error(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_response_shape() {
        let err = GuardError::Internal("boom".to_string());
        let body = ErrorResponse::from_guard_error(&err);

        assert!(!body.success);
        assert_eq!(body.code, "INTERNAL_ERROR");
        assert_eq!(body.error, "Internal error: boom");
    }

    #[test]
    fn test_config_error_is_server_error() {
        let err = GuardError::Config("cache ttl must be positive".to_string());
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}

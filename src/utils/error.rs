//! Error types and handling
//!
//! Common error types used across the capture and pairing core.

use crate::source::Side;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("no supported recording format: {0}")]
    RecorderUnsupported(String),

    #[error("empty capture on side {0}")]
    EmptyCapture(Side),

    #[error("session state error: {0}")]
    SessionState(String),

    #[error("transport failure: {0}")]
    TransportFailure(String),

    #[error("recording error: {0}")]
    Recording(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Stable machine-readable code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::DeviceUnavailable(_) => "DEVICE_UNAVAILABLE",
            AppError::RecorderUnsupported(_) => "RECORDER_UNSUPPORTED",
            AppError::EmptyCapture(_) => "EMPTY_CAPTURE",
            AppError::SessionState(_) => "SESSION_STATE",
            AppError::TransportFailure(_) => "TRANSPORT_FAILURE",
            AppError::Recording(_) => "RECORDING_ERROR",
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }
}

/// Error response surfaced to an operator frontend
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

//! Custom error types for the asr4 server.
//!
//! This module provides a centralized error handling system using the `thiserror` crate
//! to define structured, typed errors with clear messages and proper error conversion.

use std::future::Future;
use std::io;
use std::time::Duration;
use thiserror::Error;
use tonic::Status as TonicStatus;

/// Primary error type for the application, covering all possible error cases.
#[derive(Debug, Error)]
pub enum AppError {
    /// Errors returned by the Triton Inference Server.
    #[error("Triton inference error: {0}")]
    TritonInference(String),

    /// Errors occurring during model processing or prediction.
    #[error("Model error: {0}")]
    Model(String),

    /// Errors related to audio processing.
    #[error("Audio processing error: {0}")]
    Audio(String),

    /// Invalid request content. The message is sent verbatim to the client.
    #[error("{0}")]
    Validation(String),

    /// Errors from invalid configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Errors from the underlying IO system.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Network-related errors.
    #[error("Network error: {0}")]
    Network(String),

    /// Timeouts in various operations.
    #[error("Operation timeout: {0}")]
    Timeout(String),

    /// Internal server errors.
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Service is unavailable (e.g., the inference backend is not ready).
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Conversion used by every gRPC handler when an operation fails.
impl From<AppError> for TonicStatus {
    fn from(err: AppError) -> Self {
        match &err {
            AppError::Validation(message) => TonicStatus::invalid_argument(message.clone()),
            AppError::Audio(_) => TonicStatus::invalid_argument(err.to_string()),
            AppError::ServiceUnavailable(_) | AppError::Network(_) => {
                TonicStatus::unavailable(err.to_string())
            }
            AppError::Timeout(_) => TonicStatus::deadline_exceeded(err.to_string()),
            _ => TonicStatus::internal(err.to_string()),
        }
    }
}

impl From<tonic::transport::Error> for AppError {
    fn from(err: tonic::transport::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

impl From<figment::Error> for AppError {
    fn from(err: figment::Error) -> Self {
        AppError::Configuration(format!("Failed to load configuration: {}", err))
    }
}

/// Convenience type alias for Results with AppError.
pub type Result<T> = std::result::Result<T, AppError>;

/// Standardized async operation with timeout and custom error conversion.
pub async fn with_timeout_and_convert<T, E, F, C>(
    operation: F,
    timeout_duration: Duration,
    context: &'static str,
    error_converter: C,
) -> Result<T>
where
    F: Future<Output = std::result::Result<T, E>>,
    C: FnOnce(E) -> AppError,
{
    match tokio::time::timeout(timeout_duration, operation).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err(error_converter(e)),
        Err(_) => Err(AppError::Timeout(format!(
            "{}: operation timed out after {:?}",
            context, timeout_duration
        ))),
    }
}

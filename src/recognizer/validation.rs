//! Request validation.
//!
//! Checks run in a fixed order and stop at the first failure; the error
//! message is returned to the client unchanged.

use crate::error::{AppError, Result};
use crate::recognizer::proto::{
    RecognitionConfig, RecognitionParameters, RecognitionResource, RecognizeRequest,
};
use crate::types::{AudioEncoding, Language, SampleRate, Topic};

/// Validate a unary request: configuration, then audio.
pub fn event_source(request: &RecognizeRequest) -> Result<()> {
    validate_config(request.config.as_ref())?;
    validate_audio(&request.audio)
}

/// Validate a recognition configuration.
///
/// Missing parameters or resource validate as their default values.
pub fn validate_config(config: Option<&RecognitionConfig>) -> Result<()> {
    let default_parameters = RecognitionParameters::default();
    let default_resource = RecognitionResource::default();

    let parameters = config
        .and_then(|c| c.parameters.as_ref())
        .unwrap_or(&default_parameters);
    let resource = config
        .and_then(|c| c.resource.as_ref())
        .unwrap_or(&default_resource);

    validate_parameters(parameters)?;
    validate_resource(resource)
}

fn validate_parameters(parameters: &RecognitionParameters) -> Result<()> {
    if !SampleRate::check(parameters.sample_rate_hz) {
        return Err(AppError::Validation(format!(
            "Invalid value '{}' for sample_rate_hz parameter",
            parameters.sample_rate_hz
        )));
    }
    if !Language::check(&parameters.language) {
        return Err(AppError::Validation(format!(
            "Invalid value '{}' for language parameter",
            parameters.language
        )));
    }
    if !AudioEncoding::check(parameters.audio_encoding) {
        return Err(AppError::Validation(format!(
            "Invalid value '{}' for audio_encoding parameter",
            parameters.audio_encoding
        )));
    }
    Ok(())
}

fn validate_resource(resource: &RecognitionResource) -> Result<()> {
    if !Topic::check(resource.topic) {
        return Err(AppError::Validation(format!(
            "Invalid value '{}' for topic resource",
            resource.topic
        )));
    }
    Ok(())
}

/// Reject empty audio.
pub fn validate_audio(audio: &[u8]) -> Result<()> {
    if audio.is_empty() {
        return Err(AppError::Validation("Empty value for audio".to_string()));
    }
    Ok(())
}

//! The `asr4.recognizer.v1.Recognizer` gRPC service.
//!
//! Unary and streaming recognition share validation and response building;
//! the streaming path collects audio through an [`EventHandler`].

pub mod proto {
    tonic::include_proto!("asr4.recognizer.v1");
}

mod handler;
mod service;
mod time;
mod validation;

pub use handler::{average_score, EventHandler};
pub use service::{RecognizerService, RequestIds, TranscriptionResult};
pub use time::{add_duration, audio_duration_secs, duration_from_secs, duration_to_secs};
pub use validation::{event_source, validate_audio, validate_config};

//! Triton Inference Server integration.
//!
//! This module provides the gRPC client and the [`TritonSession`] that runs
//! the acoustic model for the recognizer runtime.

// Re-export proto definitions
pub mod proto {
    tonic::include_proto!("inference");
}

mod client;
mod session;
mod types;

pub use client::{InferRequestBuilder, TritonClient, TritonClientError};
pub use session::{logits_from_response, model_name_for, TritonSession, INPUT_NAME, OUTPUT_NAME};
pub use types::{output_tensor, RawTensor, TensorDataType};

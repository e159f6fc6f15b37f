//! Triton client for communicating with the Triton Inference Server.

use crate::error::{AppError, Result};
use crate::triton::proto::{
    grpc_inference_service_client::GrpcInferenceServiceClient,
    model_infer_request::{InferInputTensor, InferRequestedOutputTensor},
    ModelInferRequest, ModelInferResponse, ModelReadyRequest, ServerLiveRequest,
};
use std::fmt;
use tonic::transport::Channel;
use tracing::debug;
use uuid::Uuid;

/// Error type for Triton client operations.
#[derive(Debug)]
pub enum TritonClientError {
    /// Error creating the Triton client.
    ConnectionError(tonic::transport::Error),

    /// Error returned by a Triton RPC.
    RequestError(tonic::Status),
}

impl fmt::Display for TritonClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionError(e) => write!(f, "Triton connection error: {}", e),
            Self::RequestError(e) => write!(f, "Triton request error: {}", e),
        }
    }
}

impl std::error::Error for TritonClientError {}

impl From<TritonClientError> for AppError {
    fn from(err: TritonClientError) -> Self {
        match err {
            TritonClientError::ConnectionError(e) => {
                AppError::ServiceUnavailable(format!("Triton connection error: {}", e))
            }
            TritonClientError::RequestError(e) => {
                AppError::TritonInference(e.message().to_string())
            }
        }
    }
}

/// A client for the Triton Inference Server.
///
/// Cloning is cheap; clones share the underlying channel.
#[derive(Clone)]
pub struct TritonClient {
    /// The gRPC client for communicating with Triton.
    client: GrpcInferenceServiceClient<Channel>,
}

impl TritonClient {
    /// Create a new Triton client.
    ///
    /// # Arguments
    /// * `endpoint` - The URL of the Triton Inference Server.
    pub async fn connect(endpoint: &str) -> std::result::Result<Self, TritonClientError> {
        let client = GrpcInferenceServiceClient::connect(endpoint.to_string())
            .await
            .map_err(TritonClientError::ConnectionError)?;

        debug!("Connected to Triton at {}", endpoint);
        Ok(Self { client })
    }

    /// Whether the server reports itself live.
    pub async fn server_live(&mut self) -> std::result::Result<bool, TritonClientError> {
        let response = self
            .client
            .server_live(ServerLiveRequest {})
            .await
            .map_err(TritonClientError::RequestError)?;
        Ok(response.into_inner().live)
    }

    /// Whether `model_name` is loaded and ready.
    pub async fn model_ready(
        &mut self,
        model_name: &str,
    ) -> std::result::Result<bool, TritonClientError> {
        let response = self
            .client
            .model_ready(ModelReadyRequest {
                name: model_name.to_string(),
                version: String::new(),
            })
            .await
            .map_err(TritonClientError::RequestError)?;
        Ok(response.into_inner().ready)
    }

    /// Execute an inference request.
    pub async fn infer(&mut self, request: ModelInferRequest) -> Result<ModelInferResponse> {
        let response = self
            .client
            .model_infer(request)
            .await
            .map_err(TritonClientError::RequestError)?;

        Ok(response.into_inner())
    }

    /// Create a new inference request builder.
    pub fn request_builder(&self, model_name: &str) -> InferRequestBuilder {
        InferRequestBuilder::new(model_name)
    }
}

/// Builder for Triton inference requests.
pub struct InferRequestBuilder {
    /// The request being built.
    request: ModelInferRequest,
}

impl InferRequestBuilder {
    /// Create a request for `model_name` with a fresh request id.
    pub fn new(model_name: &str) -> Self {
        let request = ModelInferRequest {
            model_name: model_name.to_string(),
            id: Uuid::new_v4().to_string(),
            ..Default::default()
        };

        Self { request }
    }

    /// Add an input tensor to the request.
    pub fn with_input(mut self, tensor: InferInputTensor) -> Self {
        self.request.inputs.push(tensor);
        self
    }

    /// Add an output tensor to the request.
    pub fn with_output(mut self, tensor: InferRequestedOutputTensor) -> Self {
        self.request.outputs.push(tensor);
        self
    }

    /// Build the inference request.
    pub fn build(self) -> ModelInferRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::triton::types::{requested_output, waveform_input};

    #[test]
    fn test_builder_sets_model_and_unique_ids() {
        let first = InferRequestBuilder::new("asr4-en-us")
            .with_input(waveform_input("input", &[0.0; 3]))
            .with_output(requested_output("output"))
            .build();
        let second = InferRequestBuilder::new("asr4-en-us").build();

        assert_eq!(first.model_name, "asr4-en-us");
        assert_eq!(first.inputs.len(), 1);
        assert_eq!(first.outputs[0].name, "output");
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_request_errors_map_to_inference_errors() {
        let err: AppError =
            TritonClientError::RequestError(tonic::Status::not_found("no model")).into();
        assert!(matches!(err, AppError::TritonInference(ref m) if m == "no model"));
    }
}

//! Acoustic model session backed by Triton.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::asr::{ExecutionProvider, Logits, Session, SessionOptions};
use crate::config::RecognitionServiceConfiguration;
use crate::error::{with_timeout_and_convert, AppError, Result};
use crate::triton::client::TritonClient;
use crate::triton::proto::ModelInferResponse;
use crate::triton::types::{output_tensor, requested_output, waveform_input};

/// Input tensor of the acoustic model.
pub const INPUT_NAME: &str = "input";

/// Output tensor of the acoustic model, `[1, frames, labels]`.
pub const OUTPUT_NAME: &str = "output";

/// [`Session`] running the acoustic model on a Triton Inference Server.
///
/// The model is served under the file stem of the configured model path.
pub struct TritonSession {
    client: TritonClient,
    model_name: String,
    limiter: Option<Arc<Semaphore>>,
    timeout: Duration,
}

impl TritonSession {
    /// Connect to Triton and check the model is ready.
    pub async fn connect(config: &RecognitionServiceConfiguration) -> Result<Self> {
        let model_name = model_name_for(&config.model)?;

        let mut client = TritonClient::connect(&config.triton_endpoint).await?;
        if !client.server_live().await? {
            return Err(AppError::ServiceUnavailable(format!(
                "Triton at {} is not live",
                config.triton_endpoint
            )));
        }
        if !client.model_ready(&model_name).await? {
            return Err(AppError::ServiceUnavailable(format!(
                "Model '{}' is not ready on Triton",
                model_name
            )));
        }

        info!(
            "Session for model '{}' on {} (providers: {})",
            model_name,
            config.triton_endpoint,
            describe_providers(&config.providers)
        );

        Ok(Self::new(client, model_name, config.session_options, config.inference_timeout))
    }

    fn new(
        client: TritonClient,
        model_name: String,
        options: SessionOptions,
        timeout: Duration,
    ) -> Self {
        let limiter = match options.intra_op_num_threads {
            0 => None,
            permits => Some(Arc::new(Semaphore::new(permits))),
        };
        Self {
            client,
            model_name,
            limiter,
            timeout,
        }
    }
}

#[async_trait]
impl Session for TritonSession {
    fn name(&self) -> &str {
        &self.model_name
    }

    async fn run(&self, waveform: &[f32]) -> Result<Logits> {
        let _permit = match &self.limiter {
            Some(limiter) => Some(
                limiter
                    .clone()
                    .acquire_owned()
                    .await
                    .map_err(|e| AppError::Internal(format!("Session limiter closed: {}", e)))?,
            ),
            None => None,
        };

        let mut client = self.client.clone();
        let request = client
            .request_builder(&self.model_name)
            .with_input(waveform_input(INPUT_NAME, waveform))
            .with_output(requested_output(OUTPUT_NAME))
            .build();

        debug!("Inference on {} samples", waveform.len());
        let response = with_timeout_and_convert(
            client.infer(request),
            self.timeout,
            "Triton inference",
            |e| e,
        )
        .await?;

        logits_from_response(&response)
    }
}

/// Model name Triton serves `path` under.
///
/// The model file must exist.
pub fn model_name_for(path: &Path) -> Result<String> {
    fs::metadata(path)?;
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::Configuration(format!("Invalid model path {:?}", path)))
}

/// Read `[1, frames, labels]` logits from an inference response.
pub fn logits_from_response(response: &ModelInferResponse) -> Result<Logits> {
    let tensor = output_tensor(response, OUTPUT_NAME)?;
    let (frames, labels) = match tensor.shape.as_slice() {
        [1, frames, labels] | [frames, labels] => (dimension(*frames)?, dimension(*labels)?),
        shape => {
            return Err(AppError::Model(format!(
                "Unexpected output shape {:?}, expected [1, frames, labels]",
                shape
            )))
        }
    };
    Logits::new(frames, labels, tensor.as_f32()?)
}

fn dimension(value: i64) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| AppError::Model(format!("Invalid output dimension {}", value)))
}

fn describe_providers(providers: &[ExecutionProvider]) -> String {
    providers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

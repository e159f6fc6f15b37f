//! Inference session abstraction.
//!
//! A session runs the acoustic model on a waveform and returns frame logits.
//! The production session talks to Triton; tests plug in their own.

use crate::asr::types::Logits;
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hardware a session may execute on, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionProvider {
    Cuda,
    Cpu,
}

impl fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cuda => f.write_str("CUDAExecutionProvider"),
            Self::Cpu => f.write_str("CPUExecutionProvider"),
        }
    }
}

/// Concurrency limits of a session.
///
/// `intra_op_num_threads` bounds concurrent inference calls on the session,
/// `inter_op_num_threads` bounds windows of one request in flight. Zero
/// means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionOptions {
    pub intra_op_num_threads: usize,
    pub inter_op_num_threads: usize,
}

impl SessionOptions {
    /// Options for `workers` workers per server.
    pub fn new(workers: usize) -> Self {
        if workers == 0 {
            Self::default()
        } else {
            Self {
                intra_op_num_threads: workers,
                inter_op_num_threads: 1,
            }
        }
    }
}

/// Trait for acoustic model backends.
#[async_trait]
pub trait Session: Send + Sync {
    /// Name of the model the session runs.
    fn name(&self) -> &str;

    /// Run the model on a normalised 16 kHz waveform.
    async fn run(&self, waveform: &[f32]) -> Result<Logits>;
}

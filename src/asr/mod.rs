//! Core ASR (Automatic Speech Recognition) functionality.
//!
//! This module contains the components for speech-to-text conversion:
//! audio preprocessing, the session seam to the acoustic model, the CTC
//! decoder, formatting and the runtime tying them together.

mod audio;
mod decoder;
pub mod formatter;
mod runtime;
mod session;
pub mod types;

pub use audio::{bytes_to_f32_samples, normalize, plan_windows, preprocess, resample_linear, Window};
pub use decoder::{greedy_decode, postprocess};
pub use formatter::{Formatter, TableFormatter};
pub use runtime::{DecodingOptions, Runtime};
pub use session::{ExecutionProvider, Session, SessionOptions};
pub use types::{DecodedLabel, Logits, RuntimeResult, Vocabulary, WordTiming};

//! The `asr4_server` core library.
//!
//! A gRPC speech recognition server: CTC acoustic model inference through
//! Triton Inference Server, greedy decoding into timed words and optional
//! text formatting, plus the launcher used by deployments.

pub mod asr;
pub mod config;
pub mod error;
pub mod launcher;
pub mod logging;
pub mod recognizer;
pub mod server;
pub mod triton;
pub mod types;

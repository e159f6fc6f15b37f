//! Recognition runtime.
//!
//! The runtime owns a session, the label vocabulary and an optional
//! formatter. It turns request audio into a transcript: preprocessing,
//! windowed inference, CTC decoding, postprocessing and formatting.

use std::sync::Arc;
use std::time::Instant;

use futures::{stream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::asr::audio::{plan_windows, preprocess};
use crate::asr::decoder::{greedy_decode, postprocess};
use crate::asr::formatter::Formatter;
use crate::asr::session::{Session, SessionOptions};
use crate::asr::types::{DecodedLabel, Logits, RuntimeResult, Vocabulary};
use crate::error::{AppError, Result};
use crate::types::{DecodingType, LmAlgorithm};

/// Decoder settings resolved from the server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodingOptions {
    pub decoding_type: DecodingType,
    pub lm_algorithm: LmAlgorithm,
    /// Frames of left context added to every window after the first
    pub overlap: usize,
    /// Labels are sentencepiece pieces
    pub subwords: bool,
    /// Windows decoded together with `DecodingType::Local`
    pub max_chunks_for_decoding: usize,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        Self {
            decoding_type: DecodingType::Global,
            lm_algorithm: LmAlgorithm::Viterbi,
            overlap: 0,
            subwords: false,
            max_chunks_for_decoding: 1,
        }
    }
}

/// Speech recognition runtime over a [`Session`].
pub struct Runtime {
    session: Arc<dyn Session>,
    vocabulary: Vocabulary,
    formatter: Option<Arc<dyn Formatter>>,
    options: DecodingOptions,
    session_options: SessionOptions,
}

impl Runtime {
    /// Create a runtime.
    ///
    /// Fails when a language-model decoder is requested, as only best-path
    /// decoding is available.
    pub fn new(
        session: Arc<dyn Session>,
        vocabulary: Vocabulary,
        formatter: Option<Arc<dyn Formatter>>,
        options: DecodingOptions,
        session_options: SessionOptions,
    ) -> Result<Self> {
        if options.lm_algorithm != LmAlgorithm::Viterbi {
            return Err(AppError::Configuration(format!(
                "Language model algorithm '{}' is not available; use 'viterbi'",
                options.lm_algorithm
            )));
        }
        if formatter.is_none() {
            warn!("No formatter provided. Text will be generated without format");
        }

        info!(
            "Runtime ready: model={} labels={} decoding={:?} overlap={} subwords={}",
            session.name(),
            vocabulary.len(),
            options.decoding_type,
            options.overlap,
            options.subwords
        );

        Ok(Self {
            session,
            vocabulary,
            formatter,
            options,
            session_options,
        })
    }

    /// Name of the model behind the session.
    pub fn model_name(&self) -> &str {
        self.session.name()
    }

    /// Whether a formatter is loaded.
    pub fn has_formatter(&self) -> bool {
        self.formatter.is_some()
    }

    /// Transcribe 16-bit PCM mono audio.
    pub async fn run(
        &self,
        audio: &[u8],
        sample_rate_hz: u32,
        enable_formatting: bool,
    ) -> Result<RuntimeResult> {
        let start = Instant::now();
        let waveform = preprocess(audio, sample_rate_hz)?;
        let windows = plan_windows(waveform.len(), self.options.overlap);

        let in_flight = match self.session_options.inter_op_num_threads {
            0 => windows.len().max(1),
            n => n,
        };

        let waveform = &waveform;
        let chunks: Vec<Logits> = stream::iter(windows)
            .map(|window| async move {
                let logits = self.session.run(&waveform[window.begin..window.end]).await?;
                self.check_vocabulary_size(&logits)?;
                Ok::<_, AppError>(logits.skip_frames(window.skip_frames))
            })
            .buffered(in_flight)
            .try_collect()
            .await?;

        let labels = self.decode(chunks)?;
        let mut result = postprocess(&labels, &self.vocabulary, self.options.subwords);

        if enable_formatting {
            self.apply_formatting(&mut result);
        }

        debug!(
            "Recognised {} words in {:?} (score {:.3})",
            result.words.len(),
            start.elapsed(),
            result.score
        );
        Ok(result)
    }

    fn check_vocabulary_size(&self, logits: &Logits) -> Result<()> {
        if logits.vocab_size != self.vocabulary.len() {
            return Err(AppError::Model(format!(
                "Model '{}' produced {} labels per frame but the vocabulary has {}",
                self.session.name(),
                logits.vocab_size,
                self.vocabulary.len()
            )));
        }
        Ok(())
    }

    /// Decode window logits, grouped by the decoding type.
    fn decode(&self, chunks: Vec<Logits>) -> Result<Vec<DecodedLabel>> {
        let group_size = match self.options.decoding_type {
            DecodingType::Global => chunks.len().max(1),
            DecodingType::Local => self.options.max_chunks_for_decoding.max(1),
        };

        let mut labels = Vec::new();
        let mut frame_offset = 0;
        let mut chunks = chunks.into_iter().peekable();

        while chunks.peek().is_some() {
            let mut group = Logits::default();
            for chunk in chunks.by_ref().take(group_size) {
                group.extend(chunk)?;
            }
            labels.extend(greedy_decode(&group, &self.vocabulary, frame_offset));
            frame_offset += group.frames;
        }

        Ok(labels)
    }

    fn apply_formatting(&self, result: &mut RuntimeResult) {
        let Some(formatter) = &self.formatter else {
            return;
        };

        let formatted = formatter.format(&result.sequence);
        let tokens: Vec<&str> = formatted.split_whitespace().collect();
        if tokens.len() == result.words.len() {
            for (word, token) in result.words.iter_mut().zip(tokens) {
                word.word = token.to_string();
            }
        } else {
            debug!("Formatting changed the word count; keeping raw word timings");
        }
        result.sequence = formatted;
    }
}

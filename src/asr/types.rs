//! Core ASR domain types.
//!
//! This module defines the data structures shared by the runtime: the label
//! vocabulary, frame logits produced by a session, and transcription results.

use crate::error::{AppError, Result};
use std::fs;
use std::path::Path;
use tracing::debug;

/// CTC blank label of letter vocabularies.
pub const BLANK_LABEL: &str = "<s>";

/// Labels that never reach the transcript.
pub const SPECIAL_LABELS: [&str; 3] = ["<s>", "<pad>", "</s>"];

/// Word separator label of letter vocabularies.
pub const WORD_SEPARATOR: &str = "|";

/// Word-start marker of sentencepiece vocabularies.
pub const SUBWORD_MARKER: char = '▁';

/// Letter vocabulary of the default acoustic models.
pub const DEFAULT_VOCABULARY: [&str; 32] = [
    "<s>", "<pad>", "</s>", "<unk>", "|", "e", "t", "a", "o", "n", "i", "h", "s", "r", "d", "l",
    "u", "m", "w", "c", "f", "g", "y", "p", "b", "v", "k", "'", "x", "j", "q", "z",
];

/// Represents the label set of the acoustic model output.
#[derive(Debug, Clone, PartialEq)]
pub struct Vocabulary {
    /// Labels indexed by output position
    labels: Vec<String>,

    /// Position of the CTC blank
    blank: usize,
}

impl Vocabulary {
    /// Build a vocabulary from labels in output order.
    pub fn new(labels: Vec<String>) -> Self {
        let blank = labels.iter().position(|l| l == BLANK_LABEL).unwrap_or(0);
        Self { labels, blank }
    }

    /// Load a vocabulary from a dictionary file.
    ///
    /// The file holds one label per line. Lines in the `label count` form
    /// keep only the label; blank lines are skipped.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref()).map_err(AppError::Io)?;

        let labels: Vec<String> = content
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(str::to_string)
            .collect();

        if labels.is_empty() {
            return Err(AppError::Configuration(format!(
                "Vocabulary {:?} contains no labels",
                path.as_ref()
            )));
        }

        debug!("Loaded vocabulary with {} labels", labels.len());
        Ok(Self::new(labels))
    }

    /// Get the label at a given output position.
    pub fn label(&self, id: usize) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    /// All labels in output order.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Output position of the CTC blank.
    pub fn blank(&self) -> usize {
        self.blank
    }

    /// Get the number of labels in the vocabulary.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Check if the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_VOCABULARY.iter().map(|l| l.to_string()).collect())
    }
}

/// Frame-level scores produced by a session, row-major `[frames x vocab_size]`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Logits {
    pub frames: usize,
    pub vocab_size: usize,
    pub data: Vec<f32>,
}

impl Logits {
    /// Wrap a flat buffer, checking its shape.
    pub fn new(frames: usize, vocab_size: usize, data: Vec<f32>) -> Result<Self> {
        if data.len() != frames * vocab_size {
            return Err(AppError::Model(format!(
                "Logits shape mismatch: {} values for {} frames x {} labels",
                data.len(),
                frames,
                vocab_size
            )));
        }
        Ok(Self {
            frames,
            vocab_size,
            data,
        })
    }

    /// Scores of frame `t`.
    pub fn row(&self, t: usize) -> &[f32] {
        &self.data[t * self.vocab_size..(t + 1) * self.vocab_size]
    }

    /// Drop the first `frames` frames.
    pub fn skip_frames(mut self, frames: usize) -> Self {
        let frames = frames.min(self.frames);
        self.data.drain(..frames * self.vocab_size);
        self.frames -= frames;
        self
    }

    /// Append the frames of `other`, which must share the label dimension.
    pub fn extend(&mut self, other: Logits) -> Result<()> {
        if self.frames == 0 && self.data.is_empty() {
            *self = other;
            return Ok(());
        }
        if other.vocab_size != self.vocab_size {
            return Err(AppError::Model(format!(
                "Cannot join logits with {} and {} labels",
                self.vocab_size, other.vocab_size
            )));
        }
        self.frames += other.frames;
        self.data.extend(other.data);
        Ok(())
    }
}

/// One label emitted by the CTC decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodedLabel {
    /// Output position in the vocabulary
    pub id: usize,

    /// Frame the label was emitted at
    pub frame: usize,

    /// Probability of the label at that frame
    pub probability: f32,
}

/// A recognised word with its position in the audio, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct WordTiming {
    pub word: String,
    pub start: f64,
    pub end: f64,
    pub probability: f32,
}

/// Result of running the recognizer on one utterance.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RuntimeResult {
    /// The transcript
    pub sequence: String,

    /// Confidence in `[0, 1]`
    pub score: f32,

    /// Word timings, in transcript order
    pub words: Vec<WordTiming>,
}

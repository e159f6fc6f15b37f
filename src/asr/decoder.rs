//! CTC greedy decoder.
//!
//! This module turns frame logits into a label sequence (best path) and
//! the label sequence into a transcript with word timings.

use crate::asr::types::{
    DecodedLabel, Logits, RuntimeResult, Vocabulary, WordTiming, SPECIAL_LABELS, SUBWORD_MARKER,
    WORD_SEPARATOR,
};
use crate::config::audio::FRAME_DURATION_SECS;
use tracing::debug;

/// Performs a greedy CTC search.
///
/// Picks the best label of every frame, collapses repeats and drops the
/// blank. Frame indices of the emitted labels start at `frame_offset`.
///
/// # Arguments
/// * `logits` - Frame scores of the acoustic model
/// * `vocabulary` - Labels, used for the blank position
/// * `frame_offset` - Index of the first frame of `logits` in the utterance
///
/// # Returns
/// The emitted labels with their frame and probability
pub fn greedy_decode(
    logits: &Logits,
    vocabulary: &Vocabulary,
    frame_offset: usize,
) -> Vec<DecodedLabel> {
    let blank = vocabulary.blank();
    let mut labels = Vec::new();
    let mut previous = None;

    for t in 0..logits.frames {
        let row = logits.row(t);
        let (id, probability) = argmax_with_probability(row);

        if previous != Some(id) && id != blank {
            labels.push(DecodedLabel {
                id,
                frame: frame_offset + t,
                probability,
            });
        }
        previous = Some(id);
    }

    debug!("CTC decoding of {} frames emitted {} labels", logits.frames, labels.len());
    labels
}

/// Index of the highest score and its softmax probability.
fn argmax_with_probability(row: &[f32]) -> (usize, f32) {
    let (best, max) = row
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(idx_max, val_max), (idx, &val)| {
            if val > val_max {
                (idx, val)
            } else {
                (idx_max, val_max)
            }
        });

    if !max.is_finite() {
        return (best, 0.0);
    }
    let normalizer: f32 = row.iter().map(|&x| (x - max).exp()).sum();
    (best, 1.0 / normalizer)
}

/// Word under construction.
#[derive(Default)]
struct WordBuilder {
    text: String,
    first_frame: usize,
    last_frame: usize,
    probabilities: Vec<f32>,
}

impl WordBuilder {
    fn push(&mut self, piece: &str, label: &DecodedLabel) {
        if self.text.is_empty() {
            self.first_frame = label.frame;
        }
        self.text.push_str(piece);
        self.last_frame = label.frame;
        self.probabilities.push(label.probability);
    }

    fn finish(&mut self, words: &mut Vec<WordTiming>) {
        let builder = std::mem::take(self);
        if builder.text.is_empty() {
            return;
        }
        words.push(WordTiming {
            word: builder.text,
            start: builder.first_frame as f64 * FRAME_DURATION_SECS,
            end: (builder.last_frame + 1) as f64 * FRAME_DURATION_SECS,
            probability: mean(&builder.probabilities),
        });
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Turn decoded labels into a transcript.
///
/// Special labels are dropped and `<unk>` is kept. Letter vocabularies
/// separate words with `|`; sentencepiece vocabularies (`subwords`) start a
/// word with `▁`. Whitespace in the transcript is collapsed and trimmed.
pub fn postprocess(
    labels: &[DecodedLabel],
    vocabulary: &Vocabulary,
    subwords: bool,
) -> RuntimeResult {
    let mut words = Vec::new();
    let mut current = WordBuilder::default();
    let mut probabilities = Vec::with_capacity(labels.len());

    for label in labels {
        let Some(text) = vocabulary.label(label.id) else {
            continue;
        };
        if SPECIAL_LABELS.contains(&text) {
            continue;
        }
        probabilities.push(label.probability);

        if subwords {
            let piece = match text.strip_prefix(SUBWORD_MARKER) {
                Some(rest) => {
                    current.finish(&mut words);
                    rest
                }
                None => text,
            };
            push_piece(&mut current, &mut words, piece, label);
        } else if text == WORD_SEPARATOR {
            current.finish(&mut words);
        } else {
            push_piece(&mut current, &mut words, text, label);
        }
    }
    current.finish(&mut words);

    let sequence = words
        .iter()
        .map(|w| w.word.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    RuntimeResult {
        sequence,
        score: mean(&probabilities),
        words,
    }
}

/// Append a label to the current word, splitting on whitespace inside it.
fn push_piece(
    current: &mut WordBuilder,
    words: &mut Vec<WordTiming>,
    piece: &str,
    label: &DecodedLabel,
) {
    let mut parts = piece.split(char::is_whitespace).peekable();
    while let Some(part) = parts.next() {
        if !part.is_empty() {
            current.push(part, label);
        }
        if parts.peek().is_some() {
            current.finish(words);
        }
    }
}

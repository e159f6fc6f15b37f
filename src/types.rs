//! Strong typing for the recognizer's domain values.
//!
//! Request fields arrive as raw strings and integers on the wire; these types
//! are the validated forms the rest of the server works with.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::recognizer::proto::{recognition_parameters, recognition_resource};

/// Fully-qualified names of the gRPC services exposed by the server.
pub const SERVICES_NAMES: &[&str] = &["asr4.recognizer.v1.Recognizer", "grpc.health.v1.Health"];

/// Languages a recognizer instance can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Language {
    /// American English
    EnUs,
    /// Spanish
    Es,
    /// Brazilian Portuguese
    PtBr,
}

impl Language {
    /// Every supported language.
    pub const ALL: [Language; 3] = [Language::EnUs, Language::Es, Language::PtBr];

    /// Canonical language code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnUs => "en-US",
            Self::Es => "es",
            Self::PtBr => "pt-BR",
        }
    }

    /// Parse a language code, ignoring case.
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|language| language.as_str().eq_ignore_ascii_case(value))
    }

    /// Whether `value` names a supported language.
    pub fn check(value: &str) -> bool {
        Self::parse(value).is_some()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid language '{}'", s))
    }
}

impl TryFrom<String> for Language {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Language> for String {
    fn from(language: Language) -> Self {
        language.as_str().to_string()
    }
}

/// Sample rate in Hz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleRate(pub u32);

impl SampleRate {
    /// Telephony sample rate.
    pub const STANDARD_8KHZ: Self = Self(8000);

    /// Sample rate the acoustic model expects.
    pub const STANDARD_16KHZ: Self = Self(16000);

    /// Sample rates accepted on requests.
    pub const SUPPORTED: [SampleRate; 2] = [Self::STANDARD_8KHZ, Self::STANDARD_16KHZ];

    /// Whether `rate` is accepted on requests.
    pub fn check(rate: u32) -> bool {
        Self::SUPPORTED.iter().any(|supported| supported.0 == rate)
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz", self.0)
    }
}

/// Audio encodings accepted on requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEncoding {
    /// Signed 16-bit little-endian PCM, mono.
    Pcm,
}

impl AudioEncoding {
    /// Parse the raw enum value sent on the wire.
    pub fn parse(raw: i32) -> Option<Self> {
        match recognition_parameters::AudioEncoding::try_from(raw).ok()? {
            recognition_parameters::AudioEncoding::Pcm => Some(Self::Pcm),
        }
    }

    /// Whether `raw` names a supported encoding.
    pub fn check(raw: i32) -> bool {
        Self::parse(raw).is_some()
    }

    /// Size in bytes of one sample of one channel.
    pub fn sample_size_in_bytes(self) -> usize {
        match self {
            Self::Pcm => 2,
        }
    }
}

/// Recognition topics (models) a request can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    /// General-purpose dictation.
    Generic,
}

impl Topic {
    /// Parse the raw enum value sent on the wire.
    pub fn parse(raw: i32) -> Option<Self> {
        match recognition_resource::Model::try_from(raw).ok()? {
            recognition_resource::Model::Generic => Some(Self::Generic),
        }
    }

    /// Whether `raw` names a known topic.
    pub fn check(raw: i32) -> bool {
        Self::parse(raw).is_some()
    }

    /// Name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Generic => "GENERIC",
        }
    }
}

/// How frame logits are grouped before CTC decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DecodingType {
    /// Decode the whole utterance at once.
    #[default]
    Global,
    /// Decode every group of `max_chunks_for_decoding` windows separately.
    Local,
}

impl FromStr for DecodingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GLOBAL" => Ok(Self::Global),
            "LOCAL" => Ok(Self::Local),
            other => Err(format!("Invalid decoding type '{}'", other)),
        }
    }
}

/// Language-model algorithm applied on top of the acoustic model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LmAlgorithm {
    /// Plain best-path decoding.
    #[default]
    Viterbi,
    /// Lexicon + KenLM beam search.
    Kenlm,
}

impl FromStr for LmAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "viterbi" => Ok(Self::Viterbi),
            "kenlm" => Ok(Self::Kenlm),
            other => Err(format!("Invalid lm algorithm '{}'", other)),
        }
    }
}

impl fmt::Display for LmAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Viterbi => f.write_str("viterbi"),
            Self::Kenlm => f.write_str("kenlm"),
        }
    }
}

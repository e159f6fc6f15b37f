//! Streaming recognition event handler.
//!
//! One handler lives for the duration of a `StreamingRecognize` call. The
//! first message must carry the configuration; audio chunks that follow are
//! accumulated and transcribed once the client closes its side.

use std::sync::Arc;

use tracing::{debug, info};

use crate::asr::Runtime;
use crate::error::{AppError, Result};
use crate::recognizer::proto::{
    streaming_recognize_request::StreamingRequest, RecognitionAlternative, RecognitionConfig,
    StreamingRecognitionResult, StreamingRecognizeRequest, StreamingRecognizeResponse, WordInfo,
};
use crate::recognizer::service::{check_language, RequestIds, TranscriptionResult};
use crate::recognizer::time::{audio_duration_secs, duration_from_secs};
use crate::recognizer::validation::{validate_audio, validate_config};
use crate::types::{AudioEncoding, Language};

/// Mean of `scores`, `0.0` when empty.
pub fn average_score(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return 0.0;
    }
    scores.iter().sum::<f32>() / scores.len() as f32
}

pub struct EventHandler {
    language: Language,
    runtime: Arc<Runtime>,
    ids: RequestIds,
    config: Option<RecognitionConfig>,
    audio: Vec<u8>,
    total_duration: f64,
}

impl EventHandler {
    pub fn new(language: Language, runtime: Arc<Runtime>, ids: RequestIds) -> Self {
        Self {
            language,
            runtime,
            ids,
            config: None,
            audio: Vec::new(),
            total_duration: 0.0,
        }
    }

    /// Seconds of audio already answered on this stream.
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Handle one inbound message.
    pub fn process_request(&mut self, request: StreamingRecognizeRequest) -> Result<()> {
        match request.streaming_request {
            None => Err(AppError::Validation("Empty request".to_string())),
            Some(StreamingRequest::Config(config)) => {
                validate_config(Some(&config))?;
                let parameters = config.parameters.clone().unwrap_or_default();
                check_language(self.language, &parameters.language)?;

                info!(
                    user_id = %self.ids.user_id,
                    request_id = %self.ids.request_id,
                    language = %parameters.language,
                    sample_rate = parameters.sample_rate_hz,
                    formatting = parameters.enable_formatting,
                    "Received streaming request"
                );
                self.config = Some(config);
                Ok(())
            }
            Some(StreamingRequest::Audio(audio)) => {
                if self.config.is_none() {
                    return Err(AppError::Validation(
                        "A request containing RecognitionConfig must be sent first".to_string(),
                    ));
                }
                validate_audio(&audio)?;
                debug!(
                    request_id = %self.ids.request_id,
                    "Received partial audio [length={}]",
                    audio.len()
                );
                self.audio.extend_from_slice(&audio);
                Ok(())
            }
        }
    }

    /// Transcribe the accumulated audio.
    ///
    /// Returns `None` when no audio was received.
    pub async fn finish(&mut self) -> Result<Option<StreamingRecognizeResponse>> {
        if self.audio.is_empty() {
            debug!(request_id = %self.ids.request_id, "Stream closed without audio");
            return Ok(None);
        }

        let parameters = self
            .config
            .as_ref()
            .and_then(|config| config.parameters.clone())
            .unwrap_or_default();
        let encoding =
            AudioEncoding::parse(parameters.audio_encoding).unwrap_or(AudioEncoding::Pcm);
        let duration = audio_duration_secs(self.audio.len(), encoding, parameters.sample_rate_hz);
        info!(
            user_id = %self.ids.user_id,
            request_id = %self.ids.request_id,
            length = self.audio.len(),
            duration,
            "Received total audio"
        );

        let audio = std::mem::take(&mut self.audio);
        let result = self
            .runtime
            .run(&audio, parameters.sample_rate_hz, parameters.enable_formatting)
            .await?;

        let probabilities: Vec<f32> = result.words.iter().map(|w| w.probability).collect();
        let transcription = TranscriptionResult {
            transcription: result.sequence,
            score: average_score(&probabilities),
            words: result.words,
            duration,
        };

        let response = self.streaming_response(&transcription);
        info!(
            request_id = %self.ids.request_id,
            "Recognition result: '{}'",
            transcription.transcription
        );
        Ok(Some(response))
    }

    /// Build the final response for `result`, placing it after the audio
    /// already answered on this stream.
    pub fn streaming_response(
        &mut self,
        result: &TranscriptionResult,
    ) -> StreamingRecognizeResponse {
        let offset = self.total_duration;
        let words = result
            .words
            .iter()
            .map(|word| WordInfo {
                start_time: Some(duration_from_secs(offset + word.start)),
                end_time: Some(duration_from_secs(offset + word.end)),
                word: word.word.clone(),
                confidence: word.probability,
            })
            .collect();

        let end_time = offset + result.duration;
        self.total_duration = end_time;

        StreamingRecognizeResponse {
            results: Some(StreamingRecognitionResult {
                alternatives: vec![RecognitionAlternative {
                    transcript: result.transcription.clone(),
                    confidence: result.score,
                    words,
                }],
                end_time: Some(duration_from_secs(end_time)),
                duration: Some(duration_from_secs(result.duration)),
                is_final: true,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asr::WordTiming;
    use crate::recognizer::proto::{RecognitionParameters, RecognitionResource};
    use crate::recognizer::service::tests::{runtime_for, DEFAULT_ENGLISH_MESSAGE};
    use prost_types::Duration;

    fn handler(language: Language) -> EventHandler {
        EventHandler::new(language, runtime_for(DEFAULT_ENGLISH_MESSAGE), RequestIds::default())
    }

    fn config(
        language: &str,
        sample_rate_hz: u32,
        encoding: i32,
        topic: i32,
    ) -> StreamingRecognizeRequest {
        StreamingRecognizeRequest {
            streaming_request: Some(StreamingRequest::Config(RecognitionConfig {
                parameters: Some(RecognitionParameters {
                    language: language.to_string(),
                    sample_rate_hz,
                    audio_encoding: encoding,
                    enable_formatting: false,
                }),
                resource: Some(RecognitionResource { topic }),
            })),
        }
    }

    fn audio(bytes: &[u8]) -> StreamingRecognizeRequest {
        StreamingRecognizeRequest {
            streaming_request: Some(StreamingRequest::Audio(bytes.to_vec())),
        }
    }

    fn error(handler: &mut EventHandler, requests: Vec<StreamingRecognizeRequest>) -> String {
        for request in requests {
            if let Err(e) = handler.process_request(request) {
                return e.to_string();
            }
        }
        panic!("all requests were accepted");
    }

    #[test]
    fn test_average_score() {
        assert_eq!(average_score(&[]), 0.0);
        let score = average_score(&[0.9740297068720278, 0.4466984412249397, 0.24860173759730994]);
        assert!((score - 0.556_443_3).abs() < 1e-6);
    }

    #[test]
    fn test_empty_request() {
        let mut handler = handler(Language::EnUs);
        let message = error(&mut handler, vec![StreamingRecognizeRequest::default()]);
        assert_eq!(message, "Empty request");
    }

    #[test]
    fn test_audio_before_config() {
        let mut handler = handler(Language::EnUs);
        let message = error(&mut handler, vec![audio(b"SOMETHING")]);
        assert_eq!(message, "A request containing RecognitionConfig must be sent first");
    }

    #[test]
    fn test_invalid_config_messages() {
        let cases = [
            (config("en-US", 16000, 0, -1), "Invalid value '-1' for topic resource"),
            (config("en-US", 16000, 2, 0), "Invalid value '2' for audio_encoding parameter"),
            (config("en-US", 16001, 0, 0), "Invalid value '16001' for sample_rate_hz parameter"),
            (config("", 16000, 0, 0), "Invalid value '' for language parameter"),
            (config("INVALID", 16000, 0, 0), "Invalid value 'INVALID' for language parameter"),
            (config("", 8000, 0, 0), "Invalid value '' for language parameter"),
        ];
        for (request, expected) in cases {
            let mut handler = handler(Language::EnUs);
            assert_eq!(error(&mut handler, vec![request]), expected);
        }
    }

    #[test]
    fn test_missing_parameters_fail_on_sample_rate() {
        let mut handler = handler(Language::EnUs);
        let request = StreamingRecognizeRequest {
            streaming_request: Some(StreamingRequest::Config(RecognitionConfig {
                parameters: None,
                resource: Some(RecognitionResource { topic: 0 }),
            })),
        };
        assert_eq!(
            error(&mut handler, vec![request]),
            "Invalid value '0' for sample_rate_hz parameter"
        );
    }

    #[test]
    fn test_empty_audio_chunk() {
        let mut handler = handler(Language::EnUs);
        let message = error(&mut handler, vec![config("en-US", 16000, 0, 0), audio(b"")]);
        assert_eq!(message, "Empty value for audio");
    }

    #[test]
    fn test_incorrect_language() {
        let mut handler = handler(Language::Es);
        let message = error(&mut handler, vec![config("en-US", 16000, 0, 0), audio(b"0000")]);
        assert_eq!(message, "Invalid language 'en-US'. Only 'es' is supported.");
    }

    #[tokio::test]
    async fn test_missing_audio_writes_nothing() {
        let mut handler = handler(Language::EnUs);
        handler.process_request(config("en-US", 16000, 0, 0)).unwrap();
        assert!(handler.finish().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recognition_with_all_sample_rates() {
        for sample_rate in [8000, 16000] {
            let mut handler = handler(Language::EnUs);
            handler.process_request(config("en-US", sample_rate, 0, 0)).unwrap();
            handler.process_request(audio(b"00")).unwrap();
            handler.process_request(audio(b"00")).unwrap();

            let response = handler.finish().await.unwrap().unwrap();
            let results = response.results.unwrap();
            assert!(results.is_final);
            assert_eq!(results.alternatives[0].transcript, DEFAULT_ENGLISH_MESSAGE);
            assert_eq!(handler.total_duration(), 2.0 / sample_rate as f64);
        }
    }

    #[test]
    fn test_empty_streaming_response() {
        let mut handler = handler(Language::EnUs);
        let response = handler.streaming_response(&TranscriptionResult::default());
        let results = response.results.unwrap();

        assert_eq!(results.alternatives[0].transcript, "");
        assert_eq!(results.alternatives[0].confidence, 0.0);
        assert!(results.alternatives[0].words.is_empty());
        assert_eq!(results.duration, Some(Duration::default()));
        assert_eq!(results.end_time, Some(Duration::default()));
        assert!(results.is_final);
    }

    #[test]
    fn test_streaming_response_offsets_by_total_duration() {
        let mut handler = handler(Language::EnUs);
        handler.total_duration = 3.4;
        let result = TranscriptionResult {
            transcription: "Hello World!".to_string(),
            score: 1.0,
            words: vec![
                WordTiming { word: "Hello".to_string(), start: 1.0, end: 1.5, probability: 1.0 },
                WordTiming { word: "World!".to_string(), start: 1.8, end: 2.6, probability: 1.0 },
            ],
            duration: 5.0,
        };

        let results = handler.streaming_response(&result).results.unwrap();
        let words = &results.alternatives[0].words;
        assert_eq!(words[0].start_time, Some(Duration { seconds: 4, nanos: 400_000_000 }));
        assert_eq!(words[0].end_time, Some(Duration { seconds: 4, nanos: 900_000_000 }));
        assert_eq!(words[1].start_time, Some(Duration { seconds: 5, nanos: 200_000_000 }));
        assert_eq!(words[1].end_time, Some(Duration { seconds: 6, nanos: 0 }));
        assert_eq!(results.duration, Some(Duration { seconds: 5, nanos: 0 }));
        assert_eq!(results.end_time, Some(Duration { seconds: 8, nanos: 400_000_000 }));
        assert!((handler.total_duration() - 8.4).abs() < 1e-9);
    }
}

//! Recognizer gRPC service.
//!
//! Every request goes through the same three steps: `event_source`
//! validates it, `event_handle` runs recognition and `event_sink` builds the
//! response message.

use std::pin::Pin;
use std::sync::Arc;

use tokio_stream::Stream;
use tonic::metadata::MetadataMap;
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, trace};

use crate::asr::{Runtime, WordTiming};
use crate::error::{AppError, Result};
use crate::recognizer::handler::EventHandler;
use crate::recognizer::proto::{
    recognizer_server::Recognizer, RecognitionAlternative, RecognitionParameters,
    RecognizeRequest, RecognizeResponse, StreamingRecognizeRequest, StreamingRecognizeResponse,
    WordInfo,
};
use crate::recognizer::time::{audio_duration_secs, duration_from_secs};
use crate::recognizer::validation::event_source;
use crate::types::{AudioEncoding, Language, Topic};

/// Outcome of recognising one request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscriptionResult {
    pub transcription: String,
    pub score: f32,
    pub words: Vec<WordTiming>,
    /// Audio duration in seconds
    pub duration: f64,
}

/// Caller identifiers sent as gRPC metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestIds {
    pub user_id: String,
    pub request_id: String,
}

impl RequestIds {
    /// Read `user-id` and `request-id`; missing keys are left empty.
    pub fn from_metadata(metadata: &MetadataMap) -> Self {
        let get = |key: &str| {
            metadata
                .get(key)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string()
        };
        Self {
            user_id: get("user-id"),
            request_id: get("request-id"),
        }
    }
}

/// Implementation of the `asr4.recognizer.v1.Recognizer` service for one
/// language.
#[derive(Clone)]
pub struct RecognizerService {
    language: Language,
    runtime: Arc<Runtime>,
}

impl RecognizerService {
    pub fn new(language: Language, runtime: Arc<Runtime>) -> Self {
        Self { language, runtime }
    }

    /// Language this service transcribes.
    pub fn language(&self) -> Language {
        self.language
    }

    /// Run recognition on a validated request.
    pub async fn event_handle(&self, request: &RecognizeRequest) -> Result<TranscriptionResult> {
        let parameters = parameters_of(request);
        check_language(self.language, &parameters.language)?;

        let encoding =
            AudioEncoding::parse(parameters.audio_encoding).unwrap_or(AudioEncoding::Pcm);
        let result = self
            .runtime
            .run(&request.audio, parameters.sample_rate_hz, parameters.enable_formatting)
            .await?;

        Ok(TranscriptionResult {
            transcription: result.sequence,
            score: result.score,
            words: result.words,
            duration: audio_duration_secs(request.audio.len(), encoding, parameters.sample_rate_hz),
        })
    }

    /// Build the unary response.
    pub fn event_sink(
        &self,
        result: TranscriptionResult,
        duration: f64,
        end_time: f64,
    ) -> RecognizeResponse {
        let words = result
            .words
            .iter()
            .map(|word| WordInfo {
                start_time: Some(duration_from_secs(word.start)),
                end_time: Some(duration_from_secs(word.end)),
                word: word.word.clone(),
                confidence: 1.0,
            })
            .collect();

        RecognizeResponse {
            alternatives: vec![RecognitionAlternative {
                transcript: result.transcription,
                confidence: result.score,
                words,
            }],
            end_time: Some(duration_from_secs(end_time)),
            duration: Some(duration_from_secs(duration)),
        }
    }

    async fn recognize_request(
        &self,
        request: RecognizeRequest,
        ids: RequestIds,
    ) -> Result<RecognizeResponse> {
        event_source(&request)?;

        let parameters = parameters_of(&request);
        let encoding =
            AudioEncoding::parse(parameters.audio_encoding).unwrap_or(AudioEncoding::Pcm);
        let duration =
            audio_duration_secs(request.audio.len(), encoding, parameters.sample_rate_hz);
        info!(
            user_id = %ids.user_id,
            request_id = %ids.request_id,
            language = %parameters.language,
            sample_rate = parameters.sample_rate_hz,
            formatting = parameters.enable_formatting,
            length = request.audio.len(),
            duration,
            topic = topic_name(&request),
            "Received request"
        );

        let result = self.event_handle(&request).await?;
        let response = self.event_sink(result, duration, duration);
        trace!(request_id = %ids.request_id, "Recognition result: {:?}", response);
        Ok(response)
    }
}

fn parameters_of(request: &RecognizeRequest) -> RecognitionParameters {
    request
        .config
        .as_ref()
        .and_then(|config| config.parameters.clone())
        .unwrap_or_default()
}

fn topic_name(request: &RecognizeRequest) -> &'static str {
    request
        .config
        .as_ref()
        .and_then(|config| config.resource.as_ref())
        .and_then(|resource| Topic::parse(resource.topic))
        .unwrap_or(Topic::Generic)
        .name()
}

/// Fail unless `requested` names the served language.
pub(crate) fn check_language(served: Language, requested: &str) -> Result<()> {
    match Language::parse(requested) {
        Some(language) if language == served => Ok(()),
        parsed => Err(AppError::Validation(format!(
            "Invalid language '{}'. Only '{}' is supported.",
            parsed.map(|l| l.to_string()).unwrap_or_else(|| requested.to_string()),
            served
        ))),
    }
}

#[tonic::async_trait]
impl Recognizer for RecognizerService {
    async fn recognize(
        &self,
        request: Request<RecognizeRequest>,
    ) -> std::result::Result<Response<RecognizeResponse>, Status> {
        let ids = RequestIds::from_metadata(request.metadata());
        let response = self.recognize_request(request.into_inner(), ids).await?;
        Ok(Response::new(response))
    }

    type StreamingRecognizeStream =
        Pin<Box<dyn Stream<Item = std::result::Result<StreamingRecognizeResponse, Status>> + Send>>;

    async fn streaming_recognize(
        &self,
        request: Request<Streaming<StreamingRecognizeRequest>>,
    ) -> std::result::Result<Response<Self::StreamingRecognizeStream>, Status> {
        let ids = RequestIds::from_metadata(request.metadata());
        let mut inbound = request.into_inner();
        let mut handler = EventHandler::new(self.language, self.runtime.clone(), ids);

        let stream = async_stream::stream! {
            loop {
                match inbound.message().await {
                    Ok(Some(message)) => {
                        if let Err(e) = handler.process_request(message) {
                            yield Err(Status::from(e));
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(status) => {
                        yield Err(status);
                        return;
                    }
                }
            }

            match handler.finish().await {
                Ok(Some(response)) => yield Ok(response),
                Ok(None) => {}
                Err(e) => yield Err(Status::from(e)),
            }
        };

        Ok(Response::new(Box::pin(stream)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::asr::{DecodingOptions, Logits, Session, SessionOptions, Vocabulary};
    use crate::recognizer::proto::{RecognitionConfig, RecognitionResource};
    use async_trait::async_trait;
    use tonic::metadata::MetadataValue;

    pub(crate) const DEFAULT_ENGLISH_MESSAGE: &str =
        "hello i am up and running received a message from you";
    pub(crate) const DEFAULT_SPANISH_MESSAGE: &str =
        "hola estoy  levantado y en marcha  y he recibido un mensaje tuyo";

    /// Session spelling out a fixed message, one letter per frame.
    pub(crate) struct MessageSession {
        frames: Vec<usize>,
        vocab_size: usize,
    }

    impl MessageSession {
        pub(crate) fn new(message: &str) -> Self {
            let vocabulary = Vocabulary::default();
            let index = |label: &str| vocabulary.labels().iter().position(|l| l == label).unwrap();

            let mut frames = Vec::new();
            let mut last = None;
            for letter in message.chars() {
                let label = if letter == ' ' { "|".to_string() } else { letter.to_string() };
                if last.as_deref() == Some(label.as_str()) {
                    frames.push(vocabulary.blank());
                }
                frames.push(index(&label));
                last = Some(label);
            }
            Self {
                frames,
                vocab_size: vocabulary.len(),
            }
        }
    }

    #[async_trait]
    impl Session for MessageSession {
        fn name(&self) -> &str {
            "message"
        }

        async fn run(&self, _waveform: &[f32]) -> Result<Logits> {
            let mut data = vec![-10.0; self.frames.len() * self.vocab_size];
            for (t, &id) in self.frames.iter().enumerate() {
                data[t * self.vocab_size + id] = 10.0;
            }
            Logits::new(self.frames.len(), self.vocab_size, data)
        }
    }

    pub(crate) fn runtime_for(message: &str) -> Arc<Runtime> {
        Arc::new(
            Runtime::new(
                Arc::new(MessageSession::new(message)),
                Vocabulary::default(),
                None,
                DecodingOptions::default(),
                SessionOptions::new(2),
            )
            .unwrap(),
        )
    }

    fn request(language: &str, audio: &[u8]) -> RecognizeRequest {
        RecognizeRequest {
            config: Some(RecognitionConfig {
                parameters: Some(RecognitionParameters {
                    language: language.to_string(),
                    sample_rate_hz: 16000,
                    ..Default::default()
                }),
                resource: Some(RecognitionResource::default()),
            }),
            audio: audio.to_vec(),
        }
    }

    #[tokio::test]
    async fn test_event_handle_en_us() {
        let service = RecognizerService::new(Language::EnUs, runtime_for(DEFAULT_ENGLISH_MESSAGE));
        let result = service.event_handle(&request("en-US", b"0000")).await.unwrap();
        assert_eq!(result.transcription, DEFAULT_ENGLISH_MESSAGE);
        assert_eq!(result.duration, 2.0 / 16000.0);
    }

    #[tokio::test]
    async fn test_event_handle_collapses_double_spaces() {
        let service = RecognizerService::new(Language::Es, runtime_for(DEFAULT_SPANISH_MESSAGE));
        let result = service.event_handle(&request("es", b"0000")).await.unwrap();
        assert_eq!(
            result.transcription,
            "hola estoy levantado y en marcha y he recibido un mensaje tuyo"
        );
    }

    #[tokio::test]
    async fn test_event_handle_rejects_other_language() {
        let service = RecognizerService::new(Language::Es, runtime_for(DEFAULT_ENGLISH_MESSAGE));
        let err = service.event_handle(&request("en-us", b"0000")).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid language 'en-US'. Only 'es' is supported.");
    }

    #[test]
    fn test_event_sink_single_alternative() {
        let service = RecognizerService::new(Language::EnUs, runtime_for("a"));
        let response = service.event_sink(
            TranscriptionResult {
                transcription: "hello world".to_string(),
                score: 0.75,
                words: vec![
                    WordTiming {
                        word: "hello".to_string(),
                        start: 0.0,
                        end: 0.5,
                        probability: 0.5,
                    },
                    WordTiming {
                        word: "world".to_string(),
                        start: 0.6,
                        end: 1.25,
                        probability: 0.5,
                    },
                ],
                duration: 1.5,
            },
            1.5,
            1.5,
        );

        assert_eq!(response.alternatives.len(), 1);
        let alternative = &response.alternatives[0];
        assert_eq!(alternative.transcript, "hello world");
        assert_eq!(alternative.confidence, 0.75);
        assert_eq!(alternative.words[1].confidence, 1.0);
        assert_eq!(
            alternative.words[1].end_time,
            Some(prost_types::Duration { seconds: 1, nanos: 250_000_000 })
        );
        assert_eq!(response.duration, response.end_time);
    }

    #[tokio::test]
    async fn test_recognize_rejects_invalid_request() {
        let service = RecognizerService::new(Language::EnUs, runtime_for("a"));
        let status = service
            .recognize(Request::new(request("en-US", b"")))
            .await
            .unwrap_err();
        assert_eq!(status.code(), tonic::Code::InvalidArgument);
        assert_eq!(status.message(), "Empty value for audio");
    }

    #[test]
    fn test_request_ids_from_metadata() {
        let mut metadata = MetadataMap::new();
        metadata.insert("user-id", MetadataValue::from_static("testUser"));
        metadata.insert("request-id", MetadataValue::from_static("testRequest"));

        let ids = RequestIds::from_metadata(&metadata);
        assert_eq!(ids.user_id, "testUser");
        assert_eq!(ids.request_id, "testRequest");
        assert_eq!(RequestIds::from_metadata(&MetadataMap::new()), RequestIds::default());
    }
}

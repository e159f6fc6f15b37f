//! Server configuration and constants.
//!
//! Settings are resolved from several sources with precedence:
//! 1. Command-line flags (highest priority)
//! 2. Environment variables (`LOG_LEVEL`, `TRITON_ENDPOINT`)
//! 3. The `[global]` table of the TOML config file (`asr4_config.toml` by default)
//! 4. Built-in defaults (lowest priority)
//!
//! After merging, the number of jobs is applied and the model, dictionary and
//! language-model files are looked up on their standard names when missing.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use figment::{
    providers::{Format, Toml},
    Figment,
};
use serde::Deserialize;
use tracing::debug;

use crate::asr::{DecodingOptions, ExecutionProvider, SessionOptions};
use crate::error::{AppError, Result};
use crate::types::{DecodingType, Language, LmAlgorithm};

/// Audio processing constants
pub mod audio {
    /// Sample rate the acoustic model consumes
    pub const MODEL_SAMPLE_RATE: u32 = 16000;

    /// Samples consumed per output frame (20 ms at 16 kHz)
    pub const FRAME_STRIDE_SAMPLES: usize = 320;

    /// Duration of one output frame in seconds
    pub const FRAME_DURATION_SECS: f64 = FRAME_STRIDE_SAMPLES as f64 / MODEL_SAMPLE_RATE as f64;

    /// Length of one inference window in seconds
    pub const CHUNK_SECONDS: usize = 10;

    /// Length of one inference window in samples
    pub const CHUNK_SAMPLES: usize = CHUNK_SECONDS * MODEL_SAMPLE_RATE as usize;

    /// Only mono audio is accepted
    pub const CHANNELS: usize = 1;
}

/// Server defaults
pub mod server {
    /// Port the gRPC service listens on
    pub const DEFAULT_PORT: u16 = 50051;

    /// Address the gRPC service binds to
    pub const DEFAULT_BIND_ADDRESS: &str = "[::]:50051";

    /// Config file read when `--config` is not given
    pub const DEFAULT_CONFIG_FILE: &str = "asr4_config.toml";

    /// Dictionary file looked up next to a standard model name
    pub const STANDARD_DICTIONARY: &str = "dict.ltr.txt";

    /// Default Triton Inference Server endpoint
    pub const DEFAULT_TRITON_ENDPOINT: &str = "http://localhost:8001";

    /// Largest gRPC message accepted, enough for several minutes of audio
    pub const MAX_MESSAGE_BYTES: usize = 64 * 1024 * 1024;

    /// Pending connections per listening socket
    pub const LISTEN_BACKLOG: u32 = 1024;
}

/// Centralized timeout configuration constants
pub mod timeouts {
    use std::time::Duration;

    /// Inference timeout for one window
    pub const INFERENCE_TIMEOUT: Duration = Duration::from_secs(30);

    /// Time allowed for in-flight requests once shutdown starts
    pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);
}

/// Launcher constants
pub mod launcher {
    /// Seconds the launcher waits after spawning the server
    pub const STARTUP_WAIT_SECS: u64 = 30;

    /// Fixed server flags: one server, one listener, two workers
    pub const SERVER_FLAGS: [&str; 3] = ["-s1", "-L1", "-w2"];

    /// Environment variable selecting the visible GPUs
    pub const GPU_VISIBILITY_ENV: &str = "CUDA_VISIBLE_DEVICES";

    /// Environment variable overriding the server executable
    pub const SERVER_BIN_ENV: &str = "ASR4_SERVER_BIN";

    /// Server executable name
    pub const SERVER_BIN_NAME: &str = "asr4-server";
}

fn default_verbose() -> String {
    "INFO".to_string()
}

fn default_servers() -> usize {
    1
}

fn default_listeners() -> usize {
    1
}

fn default_workers() -> usize {
    2
}

fn default_lm_weight() -> f32 {
    0.2
}

fn default_word_score() -> f32 {
    -1.0
}

fn default_sil_score() -> f32 {
    0.0
}

fn default_max_chunks_for_decoding() -> usize {
    1
}

fn default_language() -> String {
    "en-US".to_string()
}

/// Command-line arguments of the server.
///
/// Every value is optional so that unset flags can be filled from the
/// environment, the config file and the defaults, in that order.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "asr4-server", version, about = "ASR4 speech recognition gRPC server")]
pub struct ServerArgs {
    /// Log level (TRACE, DEBUG, INFO, WARNING, ERROR). Defaults to $LOG_LEVEL.
    #[arg(short = 'v', long)]
    pub verbose: Option<String>,

    /// Address the server binds to, e.g. `[::]:50051`
    #[arg(long = "host")]
    pub bind_address: Option<String>,

    /// Path to the asr4 config file
    #[arg(short = 'C', long)]
    pub config: Option<PathBuf>,

    /// Acoustic model file
    #[arg(short = 'm', long)]
    pub model: Option<PathBuf>,

    /// Dictionary (vocabulary) file, one label per line
    #[arg(short = 'd', long, visible_alias = "dictionary")]
    pub vocabulary: Option<PathBuf>,

    /// Formatter model file
    #[arg(short = 'f', long)]
    pub formatter: Option<PathBuf>,

    /// Language served by this instance (en-US, es, pt-BR)
    #[arg(short = 'l', long)]
    pub language: Option<String>,

    /// Run inference on the GPU
    #[arg(long)]
    pub gpu: bool,

    /// Number of server instances bound to the same address
    #[arg(short = 's', long)]
    pub servers: Option<usize>,

    /// Number of listener threads per server
    #[arg(short = 'L', long)]
    pub listeners: Option<usize>,

    /// Number of concurrent inference workers (0 = unbounded)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Shorthand for one server with N listeners and unbounded workers
    #[arg(short = 'j', long)]
    pub jobs: Option<usize>,

    /// GLOBAL or LOCAL decoding
    #[arg(long)]
    pub decoding_type: Option<String>,

    /// viterbi or kenlm
    #[arg(long)]
    pub lm_algorithm: Option<String>,

    /// KenLM binary model
    #[arg(long)]
    pub lm_model: Option<PathBuf>,

    /// Lexicon used by the language model
    #[arg(long)]
    pub lexicon: Option<PathBuf>,

    #[arg(long, allow_negative_numbers = true)]
    pub lm_weight: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub word_score: Option<f32>,

    #[arg(long, allow_negative_numbers = true)]
    pub sil_score: Option<f32>,

    /// Frames of left context added to every window after the first
    #[arg(long)]
    pub overlap: Option<usize>,

    /// Vocabulary labels are sentencepiece pieces
    #[arg(long)]
    pub subwords: bool,

    /// Format every kenlm segment instead of the whole transcript.
    /// Needs a formatter and `--lm-algorithm kenlm`.
    #[arg(long)]
    pub local_formatting: bool,

    /// Windows decoded together when decoding is LOCAL
    #[arg(long)]
    pub max_chunks_for_decoding: Option<usize>,

    /// Version suffix of the CPU model on its standard name
    #[arg(long)]
    pub cpu_version: Option<String>,

    /// Version suffix of the GPU model on its standard name
    #[arg(long)]
    pub gpu_version: Option<String>,

    /// Version suffix of the language model on its standard name
    #[arg(long)]
    pub lm_version: Option<String>,

    /// Triton Inference Server endpoint
    #[arg(long)]
    pub triton_endpoint: Option<String>,

    /// Per-window inference timeout in seconds
    #[arg(long)]
    pub inference_timeout_secs: Option<u64>,
}

/// The `[global]` table of the config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GlobalSection {
    host: Option<String>,
    port: Option<u16>,
    verbose: Option<String>,
    model: Option<PathBuf>,
    #[serde(alias = "dictionary")]
    vocabulary: Option<PathBuf>,
    formatter: Option<PathBuf>,
    language: Option<String>,
    gpu: Option<bool>,
    servers: Option<usize>,
    listeners: Option<usize>,
    workers: Option<usize>,
    jobs: Option<usize>,
    decoding_type: Option<String>,
    lm_algorithm: Option<String>,
    lm_model: Option<PathBuf>,
    lexicon: Option<PathBuf>,
    lm_weight: Option<f32>,
    word_score: Option<f32>,
    sil_score: Option<f32>,
    overlap: Option<usize>,
    subwords: Option<bool>,
    local_formatting: Option<bool>,
    #[serde(alias = "maxChunksForDecoding")]
    max_chunks_for_decoding: Option<usize>,
    cpu_version: Option<String>,
    gpu_version: Option<String>,
    lm_version: Option<String>,
    triton_endpoint: Option<String>,
    inference_timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    global: GlobalSection,
}

/// Fully resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfiguration {
    /// Log level name
    pub verbose: String,
    /// Address every server instance binds to
    pub bind_address: String,
    /// Acoustic model file
    pub model: PathBuf,
    /// Dictionary file; the built-in letter vocabulary is used when absent
    pub vocabulary: Option<PathBuf>,
    /// Formatter model file
    pub formatter: Option<PathBuf>,
    /// Language code as configured, validated later
    pub language: String,
    pub gpu: bool,
    pub servers: usize,
    pub listeners: usize,
    pub workers: usize,
    pub decoding_type: DecodingType,
    pub lm_algorithm: LmAlgorithm,
    pub lm_model: Option<PathBuf>,
    pub lexicon: Option<PathBuf>,
    pub lm_weight: f32,
    pub word_score: f32,
    pub sil_score: f32,
    pub overlap: usize,
    pub subwords: bool,
    pub local_formatting: bool,
    pub max_chunks_for_decoding: usize,
    pub triton_endpoint: String,
    pub inference_timeout: Duration,
}

impl ServerConfiguration {
    /// Resolve the configuration from parsed arguments, the process
    /// environment and files in the working directory.
    pub fn resolve(args: ServerArgs) -> Result<Self> {
        Self::resolve_with(args, |key| std::env::var(key).ok(), Path::new("."))
    }

    /// Resolve the configuration with an explicit environment lookup and the
    /// directory standard model names are looked up in.
    pub fn resolve_with<E>(mut args: ServerArgs, env: E, base_dir: &Path) -> Result<Self>
    where
        E: Fn(&str) -> Option<String>,
    {
        Self::fill_from_env(&mut args, &env);
        Self::fill_from_config_file(&mut args, base_dir)?;
        let mut config = Self::fill_defaults(args.clone())?;
        config.apply_jobs(args.jobs);
        config.check_required(&args, base_dir)?;
        Ok(config)
    }

    fn fill_from_env<E>(args: &mut ServerArgs, env: &E)
    where
        E: Fn(&str) -> Option<String>,
    {
        if args.verbose.is_none() {
            args.verbose = Some(env("LOG_LEVEL").unwrap_or_else(default_verbose));
        }
        if args.triton_endpoint.is_none() {
            args.triton_endpoint = env("TRITON_ENDPOINT");
        }
    }

    fn fill_from_config_file(args: &mut ServerArgs, base_dir: &Path) -> Result<()> {
        let path = match &args.config {
            Some(path) => path.clone(),
            None => base_dir.join(server::DEFAULT_CONFIG_FILE),
        };
        if !path.exists() {
            debug!("No config file at {:?}", path);
            return Ok(());
        }

        let file: ConfigFile = Figment::new().merge(Toml::file(&path)).extract()?;
        debug!("Loaded config file {:?}", path);
        let global = file.global;

        if args.bind_address.is_none() {
            if let (Some(host), Some(port)) = (&global.host, global.port) {
                args.bind_address = Some(format!("{}:{}", host, port));
            }
        }

        args.verbose = args.verbose.take().or(global.verbose);
        args.model = args.model.take().or(global.model);
        args.vocabulary = args.vocabulary.take().or(global.vocabulary);
        args.formatter = args.formatter.take().or(global.formatter);
        args.language = args.language.take().or(global.language);
        args.gpu = args.gpu || global.gpu.unwrap_or(false);
        args.servers = args.servers.or(global.servers);
        args.listeners = args.listeners.or(global.listeners);
        args.workers = args.workers.or(global.workers);
        args.jobs = args.jobs.or(global.jobs);
        args.decoding_type = args.decoding_type.take().or(global.decoding_type);
        args.lm_algorithm = args.lm_algorithm.take().or(global.lm_algorithm);
        args.lm_model = args.lm_model.take().or(global.lm_model);
        args.lexicon = args.lexicon.take().or(global.lexicon);
        args.lm_weight = args.lm_weight.or(global.lm_weight);
        args.word_score = args.word_score.or(global.word_score);
        args.sil_score = args.sil_score.or(global.sil_score);
        args.overlap = args.overlap.or(global.overlap);
        args.subwords = args.subwords || global.subwords.unwrap_or(false);
        args.local_formatting = args.local_formatting || global.local_formatting.unwrap_or(false);
        args.max_chunks_for_decoding = args
            .max_chunks_for_decoding
            .or(global.max_chunks_for_decoding);
        args.cpu_version = args.cpu_version.take().or(global.cpu_version);
        args.gpu_version = args.gpu_version.take().or(global.gpu_version);
        args.lm_version = args.lm_version.take().or(global.lm_version);
        args.triton_endpoint = args.triton_endpoint.take().or(global.triton_endpoint);
        args.inference_timeout_secs = args.inference_timeout_secs.or(global.inference_timeout_secs);
        Ok(())
    }

    fn fill_defaults(args: ServerArgs) -> Result<Self> {
        let decoding_type = match args.decoding_type.as_deref() {
            Some(value) => value.parse().map_err(AppError::Configuration)?,
            None => DecodingType::default(),
        };
        let lm_algorithm = match args.lm_algorithm.as_deref() {
            Some(value) => value.parse().map_err(AppError::Configuration)?,
            None => LmAlgorithm::default(),
        };

        Ok(Self {
            verbose: args.verbose.unwrap_or_else(default_verbose),
            bind_address: args
                .bind_address
                .unwrap_or_else(|| server::DEFAULT_BIND_ADDRESS.to_string()),
            model: args.model.unwrap_or_default(),
            vocabulary: args.vocabulary,
            formatter: args.formatter,
            language: args.language.unwrap_or_else(default_language),
            gpu: args.gpu,
            servers: args.servers.unwrap_or_else(default_servers),
            listeners: args.listeners.unwrap_or_else(default_listeners),
            workers: args.workers.unwrap_or_else(default_workers),
            decoding_type,
            lm_algorithm,
            lm_model: args.lm_model,
            lexicon: args.lexicon,
            lm_weight: args.lm_weight.unwrap_or_else(default_lm_weight),
            word_score: args.word_score.unwrap_or_else(default_word_score),
            sil_score: args.sil_score.unwrap_or_else(default_sil_score),
            overlap: args.overlap.unwrap_or(0),
            subwords: args.subwords,
            local_formatting: args.local_formatting,
            max_chunks_for_decoding: args
                .max_chunks_for_decoding
                .unwrap_or_else(default_max_chunks_for_decoding),
            triton_endpoint: args
                .triton_endpoint
                .unwrap_or_else(|| server::DEFAULT_TRITON_ENDPOINT.to_string()),
            inference_timeout: args
                .inference_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(timeouts::INFERENCE_TIMEOUT),
        })
    }

    fn apply_jobs(&mut self, jobs: Option<usize>) {
        if let Some(jobs) = jobs {
            self.servers = 1;
            self.workers = 0;
            self.listeners = jobs;
        }
    }

    fn check_required(&mut self, args: &ServerArgs, base_dir: &Path) -> Result<()> {
        let language = self.language.to_lowercase();

        if args.model.is_none() {
            let mut candidates = vec![(
                format!("asr4-{}.onnx", language),
                server::STANDARD_DICTIONARY.to_string(),
            )];
            if self.gpu {
                if let Some(version) = &args.gpu_version {
                    candidates.push((
                        format!("asr4-{}-{}.onnx", language, version),
                        format!("asr4-{}-{}.dict.ltr.txt", language, version),
                    ));
                }
            }
            if let Some(version) = &args.cpu_version {
                candidates.push((
                    format!("asr4-{}-{}.onnx", language, version),
                    format!("asr4-{}-{}.dict.ltr.txt", language, version),
                ));
            }

            let (model, vocabulary) = find_pair(base_dir, &candidates).ok_or_else(|| {
                AppError::Configuration(
                    "No model/dict was specified and it couldn't be found on the standard paths/naming"
                        .to_string(),
                )
            })?;
            self.model = model;
            self.vocabulary = Some(vocabulary);
        }

        if self.lm_algorithm == LmAlgorithm::Kenlm
            && self.lm_model.is_none()
            && self.lexicon.is_none()
        {
            let mut candidates = vec![(
                format!("asr4-{}-lm.bin", language),
                format!("asr4-{}-lm.lexicon.txt", language),
            )];
            if let Some(version) = &args.lm_version {
                candidates.push((
                    format!("asr4-{}-lm-{}.bin", language, version),
                    format!("asr4-{}-lm-{}.lexicon.txt", language, version),
                ));
            }

            let (lm_model, lexicon) = find_pair(base_dir, &candidates).ok_or_else(|| {
                AppError::Configuration(
                    "KenLM Language was specified but no Lexicon/LM could be found on the standards path naming"
                        .to_string(),
                )
            })?;
            self.lm_model = Some(lm_model);
            self.lexicon = Some(lexicon);
        }

        if self.local_formatting
            && (self.formatter.is_none() || self.lm_algorithm != LmAlgorithm::Kenlm)
        {
            return Err(AppError::Configuration(
                "Local formatting was specified but no formatter model was given or lm algorithm is not kenlm"
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Return the first candidate pair whose files both exist under `base_dir`.
fn find_pair(base_dir: &Path, candidates: &[(String, String)]) -> Option<(PathBuf, PathBuf)> {
    candidates.iter().find_map(|(first, second)| {
        let first = base_dir.join(first);
        let second = base_dir.join(second);
        (first.exists() && second.exists()).then_some((first, second))
    })
}

/// Settings one recognizer service instance is built from.
#[derive(Debug, Clone)]
pub struct RecognitionServiceConfiguration {
    pub language: Language,
    pub model: PathBuf,
    pub vocabulary: Option<PathBuf>,
    pub formatter: Option<PathBuf>,
    pub providers: Vec<ExecutionProvider>,
    pub session_options: SessionOptions,
    pub decoding: DecodingOptions,
    pub triton_endpoint: String,
    pub inference_timeout: Duration,
}

impl RecognitionServiceConfiguration {
    /// Execution providers in order of preference.
    pub fn providers_for(gpu: bool) -> Vec<ExecutionProvider> {
        if gpu {
            vec![ExecutionProvider::Cuda, ExecutionProvider::Cpu]
        } else {
            vec![ExecutionProvider::Cpu]
        }
    }
}

impl TryFrom<&ServerConfiguration> for RecognitionServiceConfiguration {
    type Error = AppError;

    fn try_from(config: &ServerConfiguration) -> Result<Self> {
        let language = Language::parse(&config.language).ok_or_else(|| {
            AppError::Configuration(format!("Invalid language '{}'", config.language))
        })?;

        // Only best-path decoding is built in. Local formatting depends on
        // kenlm segments, so it is rejected along with it.
        if config.lm_algorithm != LmAlgorithm::Viterbi {
            return Err(AppError::Configuration(format!(
                "Language model algorithm '{}' is not available (lm model {:?}); use 'viterbi'",
                config.lm_algorithm, config.lm_model
            )));
        }

        Ok(Self {
            language,
            model: config.model.clone(),
            vocabulary: config.vocabulary.clone(),
            formatter: config.formatter.clone(),
            providers: Self::providers_for(config.gpu),
            session_options: SessionOptions::new(config.workers),
            decoding: DecodingOptions {
                decoding_type: config.decoding_type,
                lm_algorithm: config.lm_algorithm,
                overlap: config.overlap,
                subwords: config.subwords,
                max_chunks_for_decoding: config.max_chunks_for_decoding.max(1),
            },
            triton_endpoint: config.triton_endpoint.clone(),
            inference_timeout: config.inference_timeout,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn args(argv: &[&str]) -> ServerArgs {
        let mut full = vec!["asr4-server"];
        full.extend_from_slice(argv);
        ServerArgs::parse_from(full)
    }

    fn resolve(argv: &[&str], dir: &Path) -> Result<ServerConfiguration> {
        ServerConfiguration::resolve_with(args(argv), no_env, dir)
    }

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), b"").unwrap();
    }

    #[test]
    fn test_defaults_when_model_given() {
        let dir = TempDir::new().unwrap();
        let config = resolve(&["-m", "model.onnx"], dir.path()).unwrap();

        assert_eq!(config.bind_address, "[::]:50051");
        assert_eq!(config.verbose, "INFO");
        assert_eq!(config.servers, 1);
        assert_eq!(config.listeners, 1);
        assert_eq!(config.workers, 2);
        assert_eq!(config.decoding_type, DecodingType::Global);
        assert_eq!(config.lm_algorithm, LmAlgorithm::Viterbi);
        assert_eq!(config.lm_weight, 0.2);
        assert_eq!(config.word_score, -1.0);
        assert_eq!(config.sil_score, 0.0);
        assert_eq!(config.overlap, 0);
        assert_eq!(config.max_chunks_for_decoding, 1);
        assert!(!config.gpu && !config.subwords && !config.local_formatting);
        assert_eq!(config.language, "en-US");
    }

    #[test]
    fn test_launcher_flags_parse() {
        let dir = TempDir::new().unwrap();
        let argv = [
            "-m", "m.onnx", "-d", "dict.txt", "-f", "f.fm", "-l", "es", "-s1", "-L1", "-w2",
            "--gpu",
        ];
        let config = resolve(&argv, dir.path()).unwrap();

        assert_eq!(config.language, "es");
        assert_eq!(config.vocabulary, Some(PathBuf::from("dict.txt")));
        assert_eq!(config.formatter, Some(PathBuf::from("f.fm")));
        assert_eq!((config.servers, config.listeners, config.workers), (1, 1, 2));
        assert!(config.gpu);
    }

    #[test]
    fn test_log_level_env_used_when_flag_missing() {
        let dir = TempDir::new().unwrap();
        let env = |key: &str| (key == "LOG_LEVEL").then(|| "DEBUG".to_string());

        let flags = args(&["-m", "m"]);
        let config = ServerConfiguration::resolve_with(flags, env, dir.path()).unwrap();
        assert_eq!(config.verbose, "DEBUG");

        let flags = args(&["-m", "m", "-v", "ERROR"]);
        let config = ServerConfiguration::resolve_with(flags, env, dir.path()).unwrap();
        assert_eq!(config.verbose, "ERROR");
    }

    #[test]
    fn test_config_file_fills_undefined_values_only() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("asr4_config.toml"),
            r#"
[global]
host = "127.0.0.1"
port = 6000
language = "pt-BR"
workers = 8
lm_weight = 0.5
maxChunksForDecoding = 3
gpu = true
"#,
        )
        .unwrap();

        let config = resolve(&["-m", "m", "-w", "4"], dir.path()).unwrap();

        assert_eq!(config.bind_address, "127.0.0.1:6000");
        assert_eq!(config.language, "pt-BR");
        assert_eq!(config.workers, 4);
        assert_eq!(config.lm_weight, 0.5);
        assert_eq!(config.max_chunks_for_decoding, 3);
        assert!(config.gpu);
    }

    #[test]
    fn test_host_flag_beats_config_file_address() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[global]\nhost = \"0.0.0.0\"\nport = 7000\n").unwrap();

        let argv = ["-m", "m", "--host", "[::]:9000", "-C", path.to_str().unwrap()];
        let config = resolve(&argv, dir.path()).unwrap();
        assert_eq!(config.bind_address, "[::]:9000");
    }

    #[test]
    fn test_host_without_port_is_ignored() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("asr4_config.toml"), "[global]\nhost = \"0.0.0.0\"\n").unwrap();

        let config = resolve(&["-m", "m"], dir.path()).unwrap();
        assert_eq!(config.bind_address, "[::]:50051");
    }

    #[test]
    fn test_jobs_override_servers_workers_listeners() {
        let dir = TempDir::new().unwrap();
        let config = resolve(&["-m", "m", "-j", "6", "-s", "3", "-w", "5"], dir.path()).unwrap();

        assert_eq!(config.servers, 1);
        assert_eq!(config.workers, 0);
        assert_eq!(config.listeners, 6);
    }

    #[test]
    fn test_standard_model_path_discovery() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "asr4-es.onnx");
        touch(dir.path(), "dict.ltr.txt");

        let config = resolve(&["-l", "es"], dir.path()).unwrap();
        assert_eq!(config.model, dir.path().join("asr4-es.onnx"));
        assert_eq!(config.vocabulary, Some(dir.path().join("dict.ltr.txt")));
    }

    #[test]
    fn test_gpu_versioned_model_preferred_over_cpu() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "asr4-en-us-2.0.0.onnx");
        touch(dir.path(), "asr4-en-us-2.0.0.dict.ltr.txt");
        touch(dir.path(), "asr4-en-us-1.0.0.onnx");
        touch(dir.path(), "asr4-en-us-1.0.0.dict.ltr.txt");

        let argv = ["--gpu", "--gpu-version", "2.0.0", "--cpu-version", "1.0.0"];
        let config = resolve(&argv, dir.path()).unwrap();
        assert_eq!(config.model, dir.path().join("asr4-en-us-2.0.0.onnx"));

        let config = resolve(&argv[1..], dir.path()).unwrap();
        assert_eq!(config.model, dir.path().join("asr4-en-us-1.0.0.onnx"));
    }

    #[test]
    fn test_missing_model_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = resolve(&[], dir.path()).unwrap_err();
        assert!(err.to_string().contains("No model/dict was specified"));
    }

    #[test]
    fn test_kenlm_paths_discovered_or_rejected() {
        let dir = TempDir::new().unwrap();
        let err = resolve(&["-m", "m", "--lm-algorithm", "kenlm"], dir.path()).unwrap_err();
        assert!(err.to_string().contains("KenLM Language was specified"));

        touch(dir.path(), "asr4-en-us-lm-3.bin");
        touch(dir.path(), "asr4-en-us-lm-3.lexicon.txt");
        let argv = ["-m", "m", "--lm-algorithm", "kenlm", "--lm-version", "3"];
        let config = resolve(&argv, dir.path()).unwrap();
        assert_eq!(config.lm_model, Some(dir.path().join("asr4-en-us-lm-3.bin")));
        assert_eq!(config.lexicon, Some(dir.path().join("asr4-en-us-lm-3.lexicon.txt")));
    }

    #[test]
    fn test_local_formatting_requires_formatter_and_kenlm() {
        let dir = TempDir::new().unwrap();
        let argv = ["-m", "m", "-f", "f.fm", "--local-formatting"];
        let err = resolve(&argv, dir.path()).unwrap_err();
        assert!(err.to_string().contains("Local formatting was specified"));

        let argv = [
            "-m", "m", "-f", "f.fm", "--local-formatting", "--lm-algorithm", "kenlm",
            "--lm-model", "lm.bin",
        ];
        let config = resolve(&argv, dir.path()).unwrap();
        assert!(config.local_formatting);

        let err = RecognitionServiceConfiguration::try_from(&config).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
        assert!(err.to_string().contains("'kenlm' is not available"));
    }

    #[test]
    fn test_negative_word_score_flag() {
        let dir = TempDir::new().unwrap();
        let config = resolve(&["-m", "m", "--word-score", "-2.5"], dir.path()).unwrap();
        assert_eq!(config.word_score, -2.5);
    }

    #[test]
    fn test_recognition_configuration_validates_language() {
        let dir = TempDir::new().unwrap();
        let mut config = resolve(&["-m", "m", "--gpu"], dir.path()).unwrap();

        let service = RecognitionServiceConfiguration::try_from(&config).unwrap();
        assert_eq!(service.language, Language::EnUs);
        assert_eq!(service.providers, vec![ExecutionProvider::Cuda, ExecutionProvider::Cpu]);

        config.language = "fr".to_string();
        let err = RecognitionServiceConfiguration::try_from(&config).unwrap_err();
        assert!(err.to_string().contains("Invalid language 'fr'"));
    }

    #[test]
    fn test_cpu_only_providers() {
        assert_eq!(
            RecognitionServiceConfiguration::providers_for(false),
            vec![ExecutionProvider::Cpu]
        );
    }
}

//! Launcher for the recognition server.
//!
//! Turns the positional deployment arguments into an `asr4-server`
//! invocation, starts it in the background and gives it time to load the
//! model before exiting.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

use clap::Parser;
use globset::Glob;
use tracing::{debug, info};

use crate::config::launcher::{
    GPU_VISIBILITY_ENV, SERVER_BIN_ENV, SERVER_BIN_NAME, SERVER_FLAGS, STARTUP_WAIT_SECS,
};
use crate::error::{AppError, Result};

pub const USAGE: &str =
    "asr4-launcher <model_path> <dictionary_path> <formatter_path> [<language>] [<with_gpu>]";

/// Positional launcher arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "asr4-launcher",
    about = "Start the asr4 recognition server",
    override_usage = USAGE
)]
pub struct LaunchArgs {
    /// Acoustic model file
    pub model: PathBuf,

    /// Dictionary file
    pub dictionary: PathBuf,

    /// Formatter model file, or a directory holding `format-model.<lang>*.fm` files
    pub formatter: PathBuf,

    /// Language code
    #[arg(default_value = "en-US")]
    pub language: String,

    /// Run inference on the GPU (1, true, yes, on, gpu)
    #[arg(default_value = "false")]
    pub with_gpu: String,

    /// Seconds to wait after starting the server
    #[arg(long, hide = true, default_value_t = STARTUP_WAIT_SECS)]
    pub wait_secs: u64,
}

impl LaunchArgs {
    pub fn gpu(&self) -> bool {
        is_truthy(&self.with_gpu)
    }
}

pub fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on" | "gpu"
    )
}

/// Resolve the formatter model for `language`.
///
/// A directory is searched for `format-model.<language>*.fm`; the greatest
/// file name wins, which is the latest version for the usual naming.
pub fn select_formatter(path: &Path, language: &str) -> Result<PathBuf> {
    if !path.is_dir() {
        return Ok(path.to_path_buf());
    }

    let pattern = format!("format-model.{}*.fm", language.to_lowercase());
    let matcher = Glob::new(&pattern)
        .map_err(|e| {
            AppError::Configuration(format!("Invalid formatter pattern '{}': {}", pattern, e))
        })?
        .compile_matcher();

    let mut best: Option<PathBuf> = None;
    for entry in std::fs::read_dir(path)? {
        let entry = entry?;
        let name = entry.file_name();
        if !matcher.is_match(Path::new(&name)) {
            continue;
        }
        debug!("Formatter candidate {:?}", name);
        let candidate = entry.path();
        if best.as_ref().map_or(true, |current| candidate.file_name() > current.file_name()) {
            best = Some(candidate);
        }
    }

    best.ok_or_else(|| {
        AppError::Configuration(format!(
            "No formatter model matching '{}' found in {:?}",
            pattern, path
        ))
    })
}

/// Locate the server executable.
pub fn server_program<E>(env: E, current_exe: Option<&Path>) -> PathBuf
where
    E: Fn(&str) -> Option<String>,
{
    if let Some(program) = env(SERVER_BIN_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(program);
    }
    current_exe
        .and_then(Path::parent)
        .map(|dir| dir.join(SERVER_BIN_NAME))
        .filter(|sibling| sibling.is_file())
        .unwrap_or_else(|| PathBuf::from(SERVER_BIN_NAME))
}

/// Build the server command line.
pub fn build_command<E>(program: &Path, args: &LaunchArgs, formatter: &Path, env: E) -> Command
where
    E: Fn(&str) -> Option<String>,
{
    let mut command = Command::new(program);
    command
        .arg("-m")
        .arg(&args.model)
        .arg("-d")
        .arg(&args.dictionary)
        .arg("-f")
        .arg(formatter)
        .arg("-l")
        .arg(&args.language)
        .args(SERVER_FLAGS);

    if args.gpu() {
        command.arg("--gpu");
        if env(GPU_VISIBILITY_ENV).is_none() {
            command.env(GPU_VISIBILITY_ENV, "0");
        }
    }
    command
}

/// Start the server in the background.
pub fn launch(args: &LaunchArgs) -> Result<Child> {
    let formatter = select_formatter(&args.formatter, &args.language)?;
    let current_exe = std::env::current_exe().ok();
    let program = server_program(|key| std::env::var(key).ok(), current_exe.as_deref());

    let mut command = build_command(&program, args, &formatter, |key| std::env::var(key).ok());
    command.stdin(Stdio::null());

    info!(
        "Launching {:?} for language {} (gpu: {}) with formatter {:?}",
        program,
        args.language,
        args.gpu(),
        formatter
    );
    command.spawn().map_err(|e| {
        AppError::Internal(format!("Failed to start server {:?}: {}", program, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use std::fs;
    use tempfile::TempDir;

    fn parse(argv: &[&str]) -> LaunchArgs {
        let mut full = vec!["asr4-launcher"];
        full.extend_from_slice(argv);
        LaunchArgs::try_parse_from(full).unwrap()
    }

    fn no_env(_: &str) -> Option<String> {
        None
    }

    fn args_of(command: &Command) -> Vec<String> {
        command
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["m.onnx", "dict.ltr.txt", "fmt.fm"]);
        assert_eq!(args.language, "en-US");
        assert!(!args.gpu());
        assert_eq!(args.wait_secs, 30);
    }

    #[test]
    fn test_too_few_arguments_rejected() {
        assert!(LaunchArgs::try_parse_from(["asr4-launcher", "m.onnx", "dict"]).is_err());
    }

    #[test]
    fn test_truthy_values() {
        for value in ["1", "true", "YES", "on", "Gpu"] {
            assert!(is_truthy(value), "{}", value);
        }
        for value in ["0", "false", "cpu", ""] {
            assert!(!is_truthy(value), "{}", value);
        }
    }

    #[test]
    fn test_command_line() {
        let args = parse(&["m.onnx", "dict.ltr.txt", "fmt.fm", "es"]);
        let command = build_command(Path::new("asr4-server"), &args, Path::new("fmt.fm"), no_env);

        assert_eq!(
            args_of(&command),
            ["-m", "m.onnx", "-d", "dict.ltr.txt", "-f", "fmt.fm", "-l", "es", "-s1", "-L1", "-w2"]
        );
        assert_eq!(command.get_envs().count(), 0);
    }

    #[test]
    fn test_gpu_command_sets_visible_devices() {
        let args = parse(&["m.onnx", "dict", "fmt.fm", "en-US", "true"]);
        let command = build_command(Path::new("asr4-server"), &args, Path::new("fmt.fm"), no_env);

        assert_eq!(args_of(&command).last().map(String::as_str), Some("--gpu"));
        let envs: Vec<_> = command.get_envs().collect();
        assert_eq!(envs, [(OsStr::new(GPU_VISIBILITY_ENV), Some(OsStr::new("0")))]);

        let preset = |key: &str| (key == GPU_VISIBILITY_ENV).then(|| "2".to_string());
        let command = build_command(Path::new("asr4-server"), &args, Path::new("fmt.fm"), preset);
        assert_eq!(command.get_envs().count(), 0);
    }

    #[test]
    fn test_formatter_file_used_verbatim() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("anything.fm");
        fs::write(&file, b"").unwrap();
        assert_eq!(select_formatter(&file, "es").unwrap(), file);
    }

    #[test]
    fn test_formatter_directory_picks_latest_for_language() {
        let dir = TempDir::new().unwrap();
        for name in [
            "format-model.en-us-1.0.0.fm",
            "format-model.en-us-1.2.0.fm",
            "format-model.es-9.0.0.fm",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), b"").unwrap();
        }

        let selected = select_formatter(dir.path(), "en-US").unwrap();
        assert_eq!(selected, dir.path().join("format-model.en-us-1.2.0.fm"));
    }

    #[test]
    fn test_formatter_directory_without_match() {
        let dir = TempDir::new().unwrap();
        let err = select_formatter(dir.path(), "pt-BR").unwrap_err();
        assert!(err.to_string().contains("format-model.pt-br*.fm"));
    }

    #[test]
    fn test_server_program_lookup() {
        let from_env = |key: &str| (key == SERVER_BIN_ENV).then(|| "/opt/asr4/server".to_string());
        assert_eq!(server_program(from_env, None), PathBuf::from("/opt/asr4/server"));

        let dir = TempDir::new().unwrap();
        let launcher = dir.path().join("asr4-launcher");
        assert_eq!(server_program(no_env, Some(&launcher)), PathBuf::from(SERVER_BIN_NAME));

        fs::write(dir.path().join(SERVER_BIN_NAME), b"").unwrap();
        assert_eq!(
            server_program(no_env, Some(&launcher)),
            dir.path().join(SERVER_BIN_NAME)
        );
    }
}

//! Command-line behaviour of the `asr4-launcher` binary.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;

fn launcher() -> Command {
    cargo_bin_cmd!("asr4-launcher")
}

#[test]
fn test_missing_arguments_print_usage() {
    launcher()
        .args(["model.onnx", "dict.ltr.txt"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "asr4-launcher <model_path> <dictionary_path> <formatter_path>",
        ));
}

#[test]
fn test_no_arguments_fail() {
    launcher()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_missing_formatter_fails_without_launching() {
    let dir = tempfile::TempDir::new().unwrap();

    launcher()
        .env("ASR4_SERVER_BIN", "/nonexistent/asr4-server")
        .args(["model.onnx", "dict.ltr.txt"])
        .arg(dir.path())
        .args(["es", "--wait-secs", "0"])
        .assert()
        .failure();
}

#[cfg(unix)]
#[test]
fn test_launches_server_binary() {
    let dir = tempfile::TempDir::new().unwrap();
    let formatter = dir.path().join("format-model.es-1.0.0.fm");
    std::fs::write(&formatter, b"").unwrap();

    launcher()
        .env("ASR4_SERVER_BIN", "true")
        .args(["model.onnx", "dict.ltr.txt"])
        .arg(dir.path())
        .args(["es", "0", "--wait-secs", "0"])
        .assert()
        .success();
}

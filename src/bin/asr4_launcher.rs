//! Starts `asr4-server` from positional deployment arguments.

use std::process::ExitCode;
use std::time::Duration;

use clap::error::ErrorKind;
use clap::Parser;
use tracing::{error, info};

use asr4_server::launcher::{self, LaunchArgs};
use asr4_server::logging;

fn main() -> ExitCode {
    let args = match LaunchArgs::try_parse() {
        Ok(args) => args,
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            eprint!("{}", e.render());
            return ExitCode::FAILURE;
        }
    };

    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string());
    if let Err(e) = logging::init(&level) {
        eprintln!("{}", e);
        return ExitCode::FAILURE;
    }

    match launcher::launch(&args) {
        Ok(child) => {
            info!("Server started with pid {}", child.id());
            std::thread::sleep(Duration::from_secs(args.wait_secs));
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Launch failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

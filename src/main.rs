//! asr4 speech recognition server.
//!
//! Resolves the configuration, loads the recognition runtime against Triton
//! and serves the recognizer and health services until SIGINT or SIGTERM.

use anyhow::Context;
use clap::Parser;
use tracing::info;

use asr4_server::config::{ServerArgs, ServerConfiguration};
use asr4_server::logging;
use asr4_server::server::{GracefulShutdown, Server};

fn main() -> anyhow::Result<()> {
    let args = ServerArgs::parse();
    let config = ServerConfiguration::resolve(args)?;
    logging::init(&config.verbose)?;

    let worker_threads = (config.listeners * config.servers).max(1);
    info!(
        "Starting with {} servers, {} listeners, {} workers ({} worker threads)",
        config.servers, config.listeners, config.workers, worker_threads
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()
        .context("Failed to build the async runtime")?;

    runtime.block_on(serve(config))
}

async fn serve(config: ServerConfiguration) -> anyhow::Result<()> {
    let shutdown = GracefulShutdown::new();
    shutdown.listen_for_signals();

    let server = Server::spawn(&config, &shutdown)
        .await
        .context("Failed to start the server")?;
    info!("Server started on {}", server.local_addr());

    server.join().await?;
    Ok(())
}

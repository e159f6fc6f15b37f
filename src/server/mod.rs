//! gRPC server.
//!
//! A [`Server`] runs `servers` instances of the recognizer and health
//! services on the same address. Instances share the recognition runtime
//! and stop together when the shutdown handle fires.

pub mod health;
mod listener;
mod shutdown;

use std::net::SocketAddr;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tracing::{info, warn};

use crate::asr::{Formatter, Runtime, Session, TableFormatter, Vocabulary};
use crate::config::server::MAX_MESSAGE_BYTES;
use crate::config::timeouts::SHUTDOWN_GRACE_PERIOD;
use crate::config::{RecognitionServiceConfiguration, ServerConfiguration};
use crate::error::{AppError, Result};
use crate::recognizer::proto::recognizer_server::RecognizerServer;
use crate::recognizer::RecognizerService;
use crate::triton::TritonSession;
use crate::types::{Language, SERVICES_NAMES};

pub use health::{HealthReporter, HealthService};
pub use listener::{bind_resolved, bind_shared};
pub use shutdown::{GracefulShutdown, ShutdownSignal};

use health::proto::health_check_response::ServingStatus;
use health::proto::health_server::HealthServer;

/// Build the recognition runtime for a service configuration.
pub async fn build_runtime(config: &RecognitionServiceConfiguration) -> Result<Arc<Runtime>> {
    let session = Arc::new(TritonSession::connect(config).await?);
    runtime_with_session(config, session)
}

/// Load the vocabulary and formatter files of `config` around `session`.
pub fn runtime_with_session(
    config: &RecognitionServiceConfiguration,
    session: Arc<dyn Session>,
) -> Result<Arc<Runtime>> {
    let vocabulary = match &config.vocabulary {
        Some(path) => Vocabulary::load_from_file(path)?,
        None => Vocabulary::default(),
    };

    let formatter: Option<Arc<dyn Formatter>> = match &config.formatter {
        Some(path) => Some(Arc::new(TableFormatter::load_from_file(path)?)),
        None => None,
    };

    let runtime = Runtime::new(
        session,
        vocabulary,
        formatter,
        config.decoding.clone(),
        config.session_options,
    )?;
    info!(
        "Runtime for model '{}' ready (formatter: {})",
        runtime.model_name(),
        runtime.has_formatter()
    );
    Ok(Arc::new(runtime))
}

/// Running server instances.
pub struct Server {
    addr: SocketAddr,
    health: HealthReporter,
    shutdown: GracefulShutdown,
    instances: Vec<JoinHandle<Result<()>>>,
}

impl Server {
    /// Load the runtime described by `config` and start serving.
    pub async fn spawn(config: &ServerConfiguration, shutdown: &GracefulShutdown) -> Result<Self> {
        let service_config = RecognitionServiceConfiguration::try_from(config)?;
        info!(
            "Loading {} runtime for model {:?}",
            service_config.language, service_config.model
        );
        let runtime = build_runtime(&service_config).await?;
        Self::spawn_with_runtime(
            &config.bind_address,
            config.servers,
            service_config.language,
            runtime,
            shutdown,
        )
        .await
    }

    /// Start `servers` instances on `bind_address` around an existing runtime.
    pub async fn spawn_with_runtime(
        bind_address: &str,
        servers: usize,
        language: Language,
        runtime: Arc<Runtime>,
        shutdown: &GracefulShutdown,
    ) -> Result<Self> {
        let health = HealthReporter::new(SERVICES_NAMES);
        let service = RecognizerService::new(language, runtime);

        // Port 0 resolves on the first bind; the other instances join it.
        let first = bind_resolved(bind_address).await?;
        let addr = first.local_addr()?;
        let mut listeners = vec![first];
        for _ in 1..servers.max(1) {
            listeners.push(bind_shared(addr)?);
        }

        let instances = listeners
            .into_iter()
            .enumerate()
            .map(|(index, listener)| {
                let signal = shutdown.signal(format!("server-{}", index));
                tokio::spawn(serve_instance(
                    index,
                    listener,
                    service.clone(),
                    health.clone(),
                    signal,
                ))
            })
            .collect();

        health.set_all(ServingStatus::Serving);
        info!(
            "Server listening on {} ({} instances, language {})",
            addr,
            servers.max(1),
            language
        );

        Ok(Self {
            addr,
            health,
            shutdown: shutdown.clone(),
            instances,
        })
    }

    /// Address the instances listen on.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Status table served by the health service.
    pub fn health(&self) -> &HealthReporter {
        &self.health
    }

    /// Wait for every instance to stop.
    ///
    /// Once shutdown is triggered, connections get [`SHUTDOWN_GRACE_PERIOD`]
    /// to finish before the instances are aborted.
    pub async fn join(self) -> Result<()> {
        let Self {
            shutdown,
            mut instances,
            ..
        } = self;

        let signal = shutdown.signal("server");
        let deadline = async move {
            signal.wait().await;
            tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
        };

        let results = tokio::select! {
            results = join_all(instances.iter_mut()) => results,
            _ = deadline => {
                warn!("Connections still open after {:?}, aborting", SHUTDOWN_GRACE_PERIOD);
                for instance in &instances {
                    instance.abort();
                }
                return Err(AppError::Timeout(format!(
                    "server shutdown exceeded {:?}",
                    SHUTDOWN_GRACE_PERIOD
                )));
            }
        };

        let mut outcome = Ok(());
        for result in results {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!("Server instance failed: {}", e);
                    outcome = Err(e);
                }
                Err(e) => {
                    outcome = Err(AppError::Internal(format!("Server task failed: {}", e)));
                }
            }
        }
        info!("Server shutdown complete");
        outcome
    }
}

async fn serve_instance(
    index: usize,
    listener: tokio::net::TcpListener,
    service: RecognizerService,
    health: HealthReporter,
    signal: ShutdownSignal,
) -> Result<()> {
    let incoming = TcpListenerStream::new(listener);
    let health_service = HealthService::new(health.clone());

    let recognizer = RecognizerServer::new(service)
        .max_decoding_message_size(MAX_MESSAGE_BYTES)
        .max_encoding_message_size(MAX_MESSAGE_BYTES);

    tonic::transport::Server::builder()
        .add_service(HealthServer::new(health_service))
        .add_service(recognizer)
        .serve_with_incoming_shutdown(incoming, async move {
            signal.wait().await;
            health.set_all(ServingStatus::NotServing);
        })
        .await?;

    info!("Server instance {} stopped", index);
    Ok(())
}

//! `grpc.health.v1.Health` service.
//!
//! Status is tracked per service name (`""` stands for the whole server).
//! Every name starts `NOT_SERVING`; the server flips them once the runtime
//! is loaded and back again on shutdown.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tokio_stream::Stream;
use tonic::{Request, Response, Status};
use tracing::debug;

pub mod proto {
    tonic::include_proto!("grpc.health.v1");
}

use proto::health_check_response::ServingStatus;
use proto::health_server::Health;
use proto::{HealthCheckRequest, HealthCheckResponse};

/// Shared status table behind the health service.
#[derive(Clone)]
pub struct HealthReporter {
    statuses: Arc<HashMap<String, watch::Sender<ServingStatus>>>,
}

impl HealthReporter {
    /// Register `services` and the server-wide `""` entry as `NOT_SERVING`.
    pub fn new(services: &[&str]) -> Self {
        let statuses = std::iter::once("")
            .chain(services.iter().copied())
            .map(|name| (name.to_string(), watch::channel(ServingStatus::NotServing).0))
            .collect();
        Self {
            statuses: Arc::new(statuses),
        }
    }

    /// Current status of `service`, `None` when not registered.
    pub fn status(&self, service: &str) -> Option<ServingStatus> {
        self.statuses.get(service).map(|tx| *tx.borrow())
    }

    /// Set the status of one registered service.
    pub fn set_status(&self, service: &str, status: ServingStatus) {
        if let Some(tx) = self.statuses.get(service) {
            tx.send_replace(status);
        }
    }

    /// Set the status of every registered service.
    pub fn set_all(&self, status: ServingStatus) {
        debug!("Health status of all services: {:?}", status);
        for tx in self.statuses.values() {
            tx.send_replace(status);
        }
    }

    fn subscribe(&self, service: &str) -> Option<watch::Receiver<ServingStatus>> {
        self.statuses.get(service).map(|tx| tx.subscribe())
    }
}

/// Implementation of the standard gRPC health service.
pub struct HealthService {
    reporter: HealthReporter,
}

impl HealthService {
    pub fn new(reporter: HealthReporter) -> Self {
        Self { reporter }
    }
}

fn response(status: ServingStatus) -> HealthCheckResponse {
    HealthCheckResponse {
        status: status as i32,
    }
}

#[tonic::async_trait]
impl Health for HealthService {
    async fn check(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<HealthCheckResponse>, Status> {
        let service = request.into_inner().service;
        match self.reporter.status(&service) {
            Some(status) => Ok(Response::new(response(status))),
            None => Err(Status::not_found(format!("Unknown service '{}'", service))),
        }
    }

    type WatchStream = Pin<Box<dyn Stream<Item = Result<HealthCheckResponse, Status>> + Send>>;

    async fn watch(
        &self,
        request: Request<HealthCheckRequest>,
    ) -> Result<Response<Self::WatchStream>, Status> {
        let service = request.into_inner().service;
        let receiver = self.reporter.subscribe(&service);

        let stream = async_stream::stream! {
            let Some(mut receiver) = receiver else {
                yield Ok(response(ServingStatus::ServiceUnknown));
                return;
            };
            loop {
                let status = *receiver.borrow_and_update();
                yield Ok(response(status));
                if receiver.changed().await.is_err() {
                    break;
                }
            }
        };

        Ok(Response::new(Box::pin(stream)))
    }
}

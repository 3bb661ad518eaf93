//! Runner creation: per-service creators behind one dispatch registry.
//!
//! Each service kind has a creator implementing [`CreateRunner`];
//! [`CreateStrategy`] routes a request to the creator whose declared service
//! matches. Registering a creator here is the sole extension point for new
//! container kinds.

pub mod connect;
pub mod identity;

use std::sync::Arc;

use async_trait::async_trait;

use crate::docker::label::LabelEntry;
use crate::error::{FleetError, Result};
use crate::model::runner::{Runner, ServiceKind, VolumeBinding};

/// A request to create one runner.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    /// Service kind, used for dispatch.
    pub service: ServiceKind,
    /// Base container name; creators may append an allocated suffix.
    pub name: String,
    /// Owning-entity label clusters.
    pub label: Vec<LabelEntry>,
    /// Volumes to attach.
    pub volumes: Vec<VolumeBinding>,
    /// Requested listen port, for services that expose one.
    pub socket_port: Option<u16>,
}

/// Creates one runner for a single declared service kind.
#[async_trait]
pub trait CreateRunner: Send + Sync {
    /// The service kind this creator handles.
    fn service(&self) -> ServiceKind;

    /// Create and start one runner for `request`.
    async fn create(&self, request: &CreateRequest) -> Result<Runner>;
}

/// Registry routing creation requests to the matching creator.
pub struct CreateStrategy {
    creators: Vec<Arc<dyn CreateRunner>>,
}

impl CreateStrategy {
    /// Build a registry from per-service creators.
    pub fn new(creators: Vec<Arc<dyn CreateRunner>>) -> Self {
        Self { creators }
    }

    /// Dispatch to the creator declaring the request's service kind.
    pub async fn create(&self, request: &CreateRequest) -> Result<Runner> {
        let creator = self
            .creators
            .iter()
            .find(|creator| creator.service() == request.service)
            .ok_or(FleetError::Unknown)?;

        creator.create(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCreator {
        service: ServiceKind,
    }

    #[async_trait]
    impl CreateRunner for FixedCreator {
        fn service(&self) -> ServiceKind {
            self.service
        }

        async fn create(&self, request: &CreateRequest) -> Result<Runner> {
            Ok(Runner {
                id: "id".to_string(),
                serial: "serial".to_string(),
                name: request.name.clone(),
                service: self.service,
                exec: crate::model::runner::ExecKind::Docker,
                socket_type: crate::model::runner::SocketType::None,
                socket_addr: None,
                socket_port: None,
                volumes: Vec::new(),
                label: request.label.clone(),
                status: crate::model::runner::RunnerStatus::Running,
                insert_date: chrono::Utc::now(),
            })
        }
    }

    fn request(service: ServiceKind) -> CreateRequest {
        CreateRequest {
            service,
            name: "node".to_string(),
            label: Vec::new(),
            volumes: Vec::new(),
            socket_port: None,
        }
    }

    #[tokio::test]
    async fn dispatches_on_declared_service_kind() {
        let strategy = CreateStrategy::new(vec![
            Arc::new(FixedCreator { service: ServiceKind::Identity }),
            Arc::new(FixedCreator { service: ServiceKind::Connector }),
        ]);

        let runner = strategy.create(&request(ServiceKind::Connector)).await.unwrap();
        assert_eq!(runner.service, ServiceKind::Connector);
    }

    #[tokio::test]
    async fn unregistered_service_kind_is_unknown() {
        let strategy = CreateStrategy::new(vec![Arc::new(FixedCreator {
            service: ServiceKind::Identity,
        })]);

        let err = strategy.create(&request(ServiceKind::Relay)).await.unwrap_err();
        assert!(matches!(err, FleetError::Unknown));
    }
}

//! Connector creator.
//!
//! A connector binds one identity node to one provider. It has no network
//! endpoint of its own: it joins the identity container's network namespace,
//! so creation needs no IP or name-suffix allocation, but it does need a
//! running identity container to attach to.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::docker::client::{ContainerClient, ContainerQuery, ContainerSpec, LabelSelector};
use crate::docker::create::{CreateRequest, CreateRunner};
use crate::docker::label::{self, LabelEntry, LabelParser, Labeled};
use crate::error::{FleetError, Result};
use crate::model::identity::VpnIdentity;
use crate::model::provider::Provider;
use crate::model::runner::{ExecKind, Runner, RunnerStatus, ServiceKind, SocketType};
use crate::model::tracked::Tracked;

/// Configuration for connector containers.
#[derive(Debug, Clone)]
pub struct ConnectorCreatorConfig {
    /// Image to run.
    pub image: String,
    /// Identity-node management API address, as seen from inside the shared
    /// network namespace.
    pub api_base_address: String,
}

impl Default for ConnectorCreatorConfig {
    fn default() -> Self {
        Self {
            image: "mystfleet/connector:latest".to_string(),
            api_base_address: "http://127.0.0.1:4050".to_string(),
        }
    }
}

/// Creates connector containers inside an identity node's namespace.
pub struct ConnectorCreator {
    client: Arc<dyn ContainerClient>,
    config: ConnectorCreatorConfig,
    namespace: String,
}

impl ConnectorCreator {
    /// Build a creator over `client`, labelling under `namespace`.
    pub fn new(
        client: Arc<dyn ContainerClient>,
        config: ConnectorCreatorConfig,
        namespace: &str,
    ) -> Self {
        Self {
            client,
            config,
            namespace: label::normalize_prefix(namespace).to_string(),
        }
    }

    fn require_identity<'a>(parser: &'a LabelParser) -> Result<&'a Tracked<VpnIdentity>> {
        let identity = parser.instance::<VpnIdentity>()?;
        let missing: Vec<&'static str> = ["id", "identity"]
            .into_iter()
            .filter(|field| identity.is_default(field))
            .collect();
        if !missing.is_empty() {
            return Err(FleetError::IncompleteInput { fields: missing });
        }
        Ok(identity)
    }

    fn require_provider<'a>(parser: &'a LabelParser) -> Result<&'a Tracked<Provider>> {
        let provider = parser.instance::<Provider>()?;
        let missing: Vec<&'static str> = ["id", "user-identity", "provider-identity"]
            .into_iter()
            .filter(|field| provider.is_default(field))
            .collect();
        if !missing.is_empty() {
            return Err(FleetError::IncompleteInput { fields: missing });
        }
        Ok(provider)
    }

    /// Serial of the running identity container this connector joins.
    async fn identity_container_serial(&self, identity: &VpnIdentity) -> Result<String> {
        let query = ContainerQuery {
            all: false,
            labels: vec![
                LabelSelector::equals(
                    format!("{}.project", self.namespace),
                    ServiceKind::Identity.as_str(),
                ),
                LabelSelector::equals(
                    format!("{}.vpn-identity.identity", self.namespace),
                    identity.identity.clone(),
                ),
            ],
            ..Default::default()
        };
        let running = self
            .client
            .list_containers(&query)
            .await
            .map_err(FleetError::repository)?;

        running
            .first()
            .map(|record| record.serial.clone())
            .ok_or(FleetError::NotRunning)
    }
}

#[async_trait]
impl CreateRunner for ConnectorCreator {
    fn service(&self) -> ServiceKind {
        ServiceKind::Connector
    }

    async fn create(&self, request: &CreateRequest) -> Result<Runner> {
        let parser = LabelParser::parse(&request.label)?;
        let identity = Self::require_identity(&parser)?;
        let provider = Self::require_provider(&parser)?;

        let identity_serial = self.identity_container_serial(identity.value()).await?;

        let id = Uuid::new_v4().to_string();
        let mut labels = parser.to_label_map(&self.namespace, &["passphrase"]);
        labels.insert(format!("{}.id", self.namespace), id.clone());
        labels.insert(
            format!("{}.project", self.namespace),
            ServiceKind::Connector.as_str().to_string(),
        );
        labels.insert(format!("{}.create-by", self.namespace), "api".to_string());
        labels.insert("autoheal".to_string(), "true".to_string());

        let user_identity = provider
            .user_identity
            .clone()
            .unwrap_or_else(|| identity.identity.clone());

        let spec = ContainerSpec {
            name: request.name.clone(),
            image: self.config.image.clone(),
            env: vec![
                format!(
                    "MYST_API_BASE_ADDRESS={}",
                    self.config.api_base_address.trim_end_matches('/')
                ),
                format!("MYST_IDENTITY={}", identity.identity),
                format!("PROVIDER_IDENTITY={}", provider.provider_identity),
                format!("API_PROVIDER_ID={}", provider.id),
            ],
            labels,
            binds: vec!["/etc/localtime:/etc/localtime:ro".to_string()],
            network_mode: format!("container:{identity_serial}"),
            restart_always: true,
            ..Default::default()
        };

        let serial = self
            .client
            .create_container(&spec)
            .await
            .map_err(FleetError::repository)?;
        if let Err(source) = self.client.start_container(&serial).await {
            let failure = FleetError::Repository {
                source,
                container_created: true,
            };
            return match self.client.remove_container(&serial).await {
                Ok(()) => Err(failure),
                Err(cleanup) => Err(FleetError::combine(
                    failure,
                    FleetError::repository(cleanup),
                )),
            };
        }

        tracing::info!(name = %request.name, serial = %serial, "connector runner started");
        Ok(Runner {
            id,
            serial,
            name: request.name.clone(),
            service: ServiceKind::Connector,
            exec: ExecKind::Docker,
            socket_type: SocketType::None,
            socket_addr: None,
            socket_port: None,
            volumes: Vec::new(),
            label: vec![
                LabelEntry::new(VpnIdentity::NAMESPACE)
                    .field("id", identity.id.clone())
                    .field("identity", identity.identity.clone()),
                LabelEntry::new(Provider::NAMESPACE)
                    .field("id", provider.id.clone())
                    .field("user-identity", user_identity)
                    .field("provider-identity", provider.provider_identity.clone()),
            ],
            status: RunnerStatus::Running,
            insert_date: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::testing::{StubContainerClient, test_container};

    const NS: &str = "com.mystfleet";

    fn request() -> CreateRequest {
        CreateRequest {
            service: ServiceKind::Connector,
            name: "connector-p1".to_string(),
            label: vec![
                LabelEntry::new("vpn-identity")
                    .field("id", "i1")
                    .field("identity", "0xuser"),
                LabelEntry::new("provider")
                    .field("id", "p1")
                    .field("user-identity", "0xuser")
                    .field("provider-identity", "0xprov"),
            ],
            volumes: Vec::new(),
            socket_port: None,
        }
    }

    fn identity_container() -> crate::docker::client::ContainerRecord {
        test_container(
            "identity-serial",
            "identity1",
            "running",
            &[
                ("com.mystfleet.project", "identity"),
                ("com.mystfleet.vpn-identity.identity", "0xuser"),
            ],
        )
    }

    #[tokio::test]
    async fn joins_the_identity_containers_namespace() {
        let client = Arc::new(StubContainerClient::new().with_container(identity_container()));
        let creator = ConnectorCreator::new(client.clone(), Default::default(), NS);

        let runner = creator.create(&request()).await.unwrap();

        assert_eq!(runner.service, ServiceKind::Connector);
        assert_eq!(runner.socket_type, SocketType::None);
        assert_eq!(runner.label.len(), 2);
        let spec = &client.created_specs()[0];
        assert_eq!(spec.network_mode, "container:identity-serial");
        assert!(spec.static_ip.is_none());
    }

    #[tokio::test]
    async fn fails_not_running_without_a_live_identity_container() {
        // The identity container exists but is stopped; running-only listing
        // must not see it.
        let mut stopped = identity_container();
        stopped.state = "exited".to_string();
        let client = Arc::new(StubContainerClient::new().with_container(stopped));
        let creator = ConnectorCreator::new(client.clone(), Default::default(), NS);

        let err = creator.create(&request()).await.unwrap_err();
        assert!(matches!(err, FleetError::NotRunning));
        assert_eq!(client.create_calls(), 0);
    }

    #[tokio::test]
    async fn requires_both_owning_entities() {
        let client = Arc::new(StubContainerClient::new().with_container(identity_container()));
        let creator = ConnectorCreator::new(client.clone(), Default::default(), NS);

        let mut no_provider = request();
        no_provider.label.truncate(1);
        assert!(matches!(
            creator.create(&no_provider).await.unwrap_err(),
            FleetError::MissingModel { namespace: "provider" }
        ));

        let mut bare_provider = request();
        bare_provider.label[1] = LabelEntry::new("provider").field("id", "p1");
        match creator.create(&bare_provider).await.unwrap_err() {
            FleetError::IncompleteInput { fields } => {
                assert_eq!(fields, vec!["user-identity", "provider-identity"]);
            }
            other => panic!("expected IncompleteInput, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn start_failure_removes_the_partial_container() {
        let client = Arc::new(
            StubContainerClient::new()
                .with_container(identity_container())
                .script_start(Err(crate::error::ClientError::Api {
                    status: 500,
                    message: "cannot start".to_string(),
                })),
        );
        let creator = ConnectorCreator::new(client.clone(), Default::default(), NS);

        let err = creator.create(&request()).await.unwrap_err();
        assert!(err.needs_cleanup() || matches!(err, FleetError::Repository { .. }));
        assert_eq!(client.removed().len(), 1);
    }
}

//! Runner discovery over the container runtime.
//!
//! Translates runner queries into Docker name/state/label filters, decodes
//! each returned container back into a [`Runner`] (status from the runtime
//! state, socket address from the bridge network, owning entities from the
//! label clusters), then finishes with the shared filter engine for residual
//! conditions, sort, and pagination.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::docker::client::{ContainerClient, ContainerQuery, ContainerRecord, LabelSelector};
use crate::docker::label::{self, LabelParser};
use crate::error::{FleetError, Result};
use crate::model::filter::{Page, Query};
use crate::model::runner::{
    ExecKind, Runner, RunnerCondition, RunnerStatus, ServiceKind, SocketType,
};
use crate::repository::RunnerRepository;

/// [`RunnerRepository`] over a [`ContainerClient`].
pub struct DockerRunnerRepository {
    client: Arc<dyn ContainerClient>,
    namespace: String,
    network: String,
}

impl DockerRunnerRepository {
    /// Build a discovery repository labelling under `namespace`, reading
    /// socket addresses from `network`.
    pub fn new(client: Arc<dyn ContainerClient>, namespace: &str, network: &str) -> Self {
        Self {
            client,
            namespace: label::normalize_prefix(namespace).to_string(),
            network: network.to_string(),
        }
    }

    /// Push the conditions the runtime can evaluate into the listing;
    /// everything is re-checked by the engine afterwards.
    fn to_container_query(&self, query: &Query<Runner>) -> Result<ContainerQuery> {
        let mut container_query = ContainerQuery {
            all: true,
            ..Default::default()
        };

        for condition in &query.conditions {
            match condition {
                RunnerCondition::Name(name) => container_query.name = Some(name.clone()),
                RunnerCondition::Service(service) => {
                    container_query.labels.push(LabelSelector::equals(
                        format!("{}.project", self.namespace),
                        service.as_str(),
                    ));
                }
                RunnerCondition::Status(status) => {
                    container_query
                        .states
                        .push(status.as_container_state().to_string());
                }
                RunnerCondition::Label(entry) => {
                    let parser = LabelParser::parse(std::slice::from_ref(entry))?;
                    let selectors = parser.to_label_map(&self.namespace, &["passphrase"]);
                    container_query.labels.extend(
                        selectors
                            .into_iter()
                            .map(|(key, value)| LabelSelector::equals(key, value)),
                    );
                }
            }
        }

        Ok(container_query)
    }

    fn fill_runner(&self, record: &ContainerRecord) -> Option<Runner> {
        let service = record
            .labels
            .get(&format!("{}.project", self.namespace))
            .and_then(|value| ServiceKind::from_label(value))?;

        let socket_type = match service {
            ServiceKind::Identity => SocketType::Http,
            ServiceKind::Connector => SocketType::None,
            ServiceKind::Relay => SocketType::Tcp,
        };

        Some(Runner {
            id: record
                .labels
                .get(&format!("{}.id", self.namespace))
                .cloned()
                .unwrap_or_default(),
            serial: record.serial.clone(),
            name: record.name.clone(),
            service,
            exec: ExecKind::Docker,
            socket_type,
            socket_addr: record.addresses.get(&self.network).copied(),
            socket_port: None,
            volumes: Vec::new(),
            label: label::from_label_map(&self.namespace, &record.labels),
            status: RunnerStatus::from_container_state(&record.state),
            insert_date: record.created_at.unwrap_or_else(Utc::now),
        })
    }
}

#[async_trait]
impl RunnerRepository for DockerRunnerRepository {
    async fn find(&self, query: &Query<Runner>) -> Result<Page<Runner>> {
        let container_query = self.to_container_query(query)?;
        let records = self
            .client
            .list_containers(&container_query)
            .await
            .map_err(FleetError::repository)?;

        let runners: Vec<Runner> = records
            .iter()
            .filter_map(|record| {
                let runner = self.fill_runner(record);
                if runner.is_none() {
                    tracing::debug!(serial = %record.serial, "skipping container without a project label");
                }
                runner
            })
            .collect();

        Ok(query.apply(runners))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Runner>> {
        let container_query = ContainerQuery {
            all: true,
            labels: vec![LabelSelector::equals(
                format!("{}.id", self.namespace),
                id,
            )],
            ..Default::default()
        };
        let records = self
            .client
            .list_containers(&container_query)
            .await
            .map_err(FleetError::repository)?;

        Ok(records.first().and_then(|record| self.fill_runner(record)))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::docker::label::LabelEntry;
    use crate::testing::{StubContainerClient, test_container};

    const NS: &str = "com.mystfleet";

    fn identity_record() -> ContainerRecord {
        let mut record = test_container(
            "serial-1",
            "identity1",
            "running",
            &[
                ("com.mystfleet.id", "r1"),
                ("com.mystfleet.project", "identity"),
                ("com.mystfleet.create-by", "api"),
                ("com.mystfleet.vpn-identity.id", "i1"),
                ("com.mystfleet.vpn-identity.identity", "0xuser"),
                ("autoheal", "true"),
            ],
        );
        record
            .addresses
            .insert("fleet-bridge".to_string(), "172.30.0.3".parse().unwrap());
        record
    }

    fn repository(client: Arc<StubContainerClient>) -> DockerRunnerRepository {
        DockerRunnerRepository::new(client, NS, "fleet-bridge")
    }

    #[tokio::test]
    async fn decodes_containers_back_into_runners() {
        let client = Arc::new(StubContainerClient::new().with_container(identity_record()));
        let repo = repository(Arc::clone(&client));

        let page = repo.find(&Query::unpaginated()).await.unwrap();

        assert_eq!(page.total, 1);
        let runner = &page.items[0];
        assert_eq!(runner.id, "r1");
        assert_eq!(runner.service, ServiceKind::Identity);
        assert_eq!(runner.status, RunnerStatus::Running);
        assert_eq!(runner.socket_addr, Some("172.30.0.3".parse().unwrap()));
        // The flat labels regroup into the same entry the creator wrote.
        assert_eq!(runner.label.len(), 1);
        assert_eq!(runner.label[0].namespace, "vpn-identity");
        assert_eq!(
            runner.label[0].fields.get("identity").map(String::as_str),
            Some("0xuser")
        );
    }

    #[tokio::test]
    async fn label_conditions_become_runtime_selectors() {
        let client = Arc::new(
            StubContainerClient::new()
                .with_container(identity_record())
                .with_container(test_container(
                    "serial-2",
                    "identity2",
                    "running",
                    &[
                        ("com.mystfleet.project", "identity"),
                        ("com.mystfleet.vpn-identity.id", "i2"),
                        ("com.mystfleet.vpn-identity.identity", "0xother"),
                    ],
                )),
        );
        let repo = repository(Arc::clone(&client));

        let query = Query::unpaginated().with_condition(RunnerCondition::Label(
            LabelEntry::new("vpn-identity").field("identity", "0xuser"),
        ));
        let page = repo.find(&query).await.unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].serial, "serial-1");
    }

    #[tokio::test]
    async fn containers_without_project_labels_are_skipped() {
        let client = Arc::new(
            StubContainerClient::new()
                .with_container(identity_record())
                .with_container(test_container("other", "bystander", "running", &[])),
        );
        let repo = repository(Arc::clone(&client));

        let page = repo.find(&Query::unpaginated()).await.unwrap();
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn find_by_id_selects_on_the_fleet_id_label() {
        let client = Arc::new(StubContainerClient::new().with_container(identity_record()));
        let repo = repository(Arc::clone(&client));

        let found = repo.find_by_id("r1").await.unwrap();
        assert_eq!(found.map(|r| r.serial), Some("serial-1".to_string()));

        let missing = repo.find_by_id("r9").await.unwrap();
        assert!(missing.is_none());
    }
}

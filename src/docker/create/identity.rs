//! Identity-node creator.
//!
//! Creates exactly one identity container bound to one VPN identity:
//! keystore volume, static bridge address, gap-filled name suffix, bounded
//! collision retry, and compensating cleanup of partial state. The runtime
//! is the only arbiter of allocation races; there is no lock, and a concurrent
//! creator surfaces as an address/name collision, which is the one class of
//! failure this creator retries.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use uuid::Uuid;

use crate::docker::client::{
    ContainerClient, ContainerQuery, ContainerSpec, DeviceSpec, LabelSelector, NetworkInfo,
    VolumeSpec,
};
use crate::docker::create::{CreateRequest, CreateRunner};
use crate::docker::label::{self, LabelParser, Labeled};
use crate::error::{FleetError, Result};
use crate::model::identity::VpnIdentity;
use crate::model::runner::{
    ExecKind, Runner, RunnerStatus, ServiceKind, SocketType, VolumeKind,
};

const MAX_ATTEMPTS: usize = 3;

/// Configuration for identity containers.
#[derive(Debug, Clone)]
pub struct IdentityCreatorConfig {
    /// Image to run.
    pub image: String,
    /// Command passed to the image.
    pub command: Vec<String>,
    /// Management API port inside the container.
    pub http_port: u16,
    /// Keystore mount path inside the container.
    pub data_volume_path: String,
    /// Bridge network identity containers attach to.
    pub network: String,
    /// Collision backoff lower bound.
    pub backoff_min: Duration,
    /// Collision backoff upper bound.
    pub backoff_max: Duration,
}

impl Default for IdentityCreatorConfig {
    fn default() -> Self {
        Self {
            image: "mysteriumnetwork/myst:latest".to_string(),
            command: vec![
                "--auto-reconnect".to_string(),
                "--log-level".to_string(),
                "fatal".to_string(),
                "service".to_string(),
                "--agreed-terms-and-conditions".to_string(),
            ],
            http_port: 4050,
            data_volume_path: "/var/lib/mysterium-node".to_string(),
            network: "fleet-bridge".to_string(),
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(4),
        }
    }
}

/// One pass through the creation state machine.
enum CreateState {
    /// Pre-clean stale remnants, then try create+start.
    Attempting { attempt: usize },
    /// Recoverable collision: wait, then re-enter `Attempting`.
    BackoffWait { attempt: usize },
    /// Terminal failure: remove partial state if any was left behind.
    Cleanup { failure: FleetError },
    /// Runner is live.
    Succeeded(Box<Runner>),
    /// All avenues exhausted.
    Failed(FleetError),
}

/// Creates identity-node containers.
pub struct IdentityCreator {
    client: Arc<dyn ContainerClient>,
    config: IdentityCreatorConfig,
    namespace: String,
}

impl IdentityCreator {
    /// Build a creator over `client`, labelling under `namespace`.
    pub fn new(
        client: Arc<dyn ContainerClient>,
        config: IdentityCreatorConfig,
        namespace: &str,
    ) -> Self {
        Self {
            client,
            config,
            namespace: label::normalize_prefix(namespace).to_string(),
        }
    }

    fn keystore_volume_name(identity: &str) -> String {
        format!("myst-keystore-{identity}")
    }

    async fn ensure_keystore_volume(
        &self,
        request: &CreateRequest,
        parser: &LabelParser,
        identity: &VpnIdentity,
    ) -> Result<String> {
        let volume_name = Self::keystore_volume_name(&identity.identity);
        if self
            .client
            .volume_exists(&volume_name)
            .await
            .map_err(FleetError::repository)?
        {
            return Ok(volume_name);
        }

        let keystore = request
            .volumes
            .iter()
            .find(|v| v.kind == VolumeKind::Keystore)
            .ok_or(FleetError::IncompleteInput {
                fields: vec!["volumes"],
            })?;

        let mut labels = parser.to_label_map(&format!("{}.volume", self.namespace), &["passphrase"]);
        labels.insert(format!("{}.create-by", self.namespace), "api".to_string());

        self.client
            .create_volume(&VolumeSpec {
                name: volume_name.clone(),
                device: keystore.source.clone(),
                labels,
            })
            .await
            .map_err(FleetError::repository)?;

        tracing::info!(volume = %volume_name, "created keystore volume");
        Ok(volume_name)
    }

    /// First address in range order outside the reserved set: subnet
    /// address, gateway, and every bound container address.
    fn next_free_ip(network: &NetworkInfo) -> Option<Ipv4Addr> {
        let mut reserved: HashSet<Ipv4Addr> = network.bound.iter().copied().collect();
        reserved.insert(network.subnet.network());
        reserved.insert(network.gateway);

        network.subnet.iter().find(|addr| !reserved.contains(addr))
    }

    /// Smallest positive integer not taken by an existing name suffix
    /// (gap-filling, not max+1).
    fn next_suffix(taken: impl IntoIterator<Item = u32>) -> u32 {
        let mut suffixes: Vec<u32> = taken.into_iter().collect();
        suffixes.sort_unstable();
        suffixes.dedup();

        let mut next = 1;
        for suffix in suffixes {
            if suffix == next {
                next += 1;
            } else if suffix > next {
                break;
            }
        }
        next
    }

    fn name_suffix(name: &str) -> Option<u32> {
        let digits: String = name
            .chars()
            .rev()
            .take_while(char::is_ascii_digit)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        digits.parse().ok()
    }

    async fn allocate_name(&self, base: &str) -> Result<String> {
        let query = ContainerQuery {
            all: true,
            labels: vec![LabelSelector::equals(
                format!("{}.project", self.namespace),
                ServiceKind::Identity.as_str(),
            )],
            ..Default::default()
        };
        let existing = self
            .client
            .list_containers(&query)
            .await
            .map_err(FleetError::repository)?;

        let suffix = Self::next_suffix(
            existing
                .iter()
                .filter_map(|record| Self::name_suffix(&record.name)),
        );
        Ok(format!("{base}{suffix}"))
    }

    /// Remove a stale created-but-not-started container carrying this
    /// identity's labels. At most one such remnant can exist; it survives a
    /// process restart, so every attempt clears it first.
    async fn remove_stale_created(&self, parser: &LabelParser) -> Result<()> {
        let identity_labels = parser.to_label_map(&self.namespace, &["id", "passphrase"]);
        let mut labels: Vec<LabelSelector> = vec![LabelSelector::equals(
            format!("{}.project", self.namespace),
            ServiceKind::Identity.as_str(),
        )];
        labels.extend(
            identity_labels
                .into_iter()
                .map(|(key, value)| LabelSelector::equals(key, value)),
        );

        let query = ContainerQuery {
            all: true,
            states: vec!["created".to_string()],
            labels,
            ..Default::default()
        };
        let stale = self
            .client
            .list_containers(&query)
            .await
            .map_err(FleetError::repository)?;

        if stale.len() != 1 {
            return Ok(());
        }

        tracing::debug!(serial = %stale[0].serial, "removing stale created container");
        self.client
            .remove_container(&stale[0].serial)
            .await
            .map_err(FleetError::repository)
    }

    async fn try_create(
        &self,
        request: &CreateRequest,
        container_labels: &std::collections::BTreeMap<String, String>,
        volume_name: &str,
        identity: &VpnIdentity,
    ) -> Result<Runner> {
        let network = self
            .client
            .inspect_network(&self.config.network)
            .await
            .map_err(FleetError::repository)?;
        let address = Self::next_free_ip(&network).ok_or_else(|| FleetError::AddressExhausted {
            network: self.config.network.clone(),
        })?;

        let name = self.allocate_name(&request.name).await?;
        let id = Uuid::new_v4().to_string();
        tracing::debug!(%name, %address, "allocated identity container slot");

        let mut labels = container_labels.clone();
        labels.insert(format!("{}.id", self.namespace), id.clone());
        labels.insert(
            format!("{}.project", self.namespace),
            ServiceKind::Identity.as_str().to_string(),
        );
        labels.insert(format!("{}.create-by", self.namespace), "api".to_string());
        labels.insert("autoheal".to_string(), "true".to_string());

        let spec = ContainerSpec {
            name: name.clone(),
            image: self.config.image.clone(),
            cmd: self.config.command.clone(),
            env: vec![
                format!("MYST_IDENTITY={}", identity.identity),
                format!("MYST_IDENTITY_PASS={}", identity.passphrase),
            ],
            labels,
            binds: vec![
                "/etc/localtime:/etc/localtime:ro".to_string(),
                format!("{volume_name}:{}", self.config.data_volume_path),
            ],
            network_mode: "bridge".to_string(),
            static_ip: Some((self.config.network.clone(), address)),
            cap_add: vec!["NET_ADMIN".to_string()],
            devices: vec![DeviceSpec {
                host_path: "/dev/net/tun".to_string(),
                container_path: "/dev/net/tun".to_string(),
                permissions: "rwm".to_string(),
            }],
            restart_always: true,
        };

        let serial = self
            .client
            .create_container(&spec)
            .await
            .map_err(FleetError::repository)?;
        self.client
            .start_container(&serial)
            .await
            .map_err(|source| FleetError::Repository {
                source,
                container_created: true,
            })?;

        let mut volumes = request.volumes.clone();
        if let Some(keystore) = volumes.iter_mut().find(|v| v.kind == VolumeKind::Keystore) {
            keystore.dest = Some(self.config.data_volume_path.clone());
        }

        // The runner's label reflects what actually landed on the container,
        // with the passphrase re-attached for downstream creators.
        let mut runner_label = label::from_label_map(&self.namespace, &spec.labels);
        if let Some(entry) = runner_label
            .iter_mut()
            .find(|entry| entry.namespace == VpnIdentity::NAMESPACE)
        {
            entry
                .fields
                .insert("passphrase".to_string(), identity.passphrase.clone());
        }

        tracing::info!(%name, serial = %serial, "identity runner started");
        Ok(Runner {
            id,
            serial,
            name,
            service: ServiceKind::Identity,
            exec: ExecKind::Docker,
            socket_type: SocketType::Http,
            socket_addr: Some(address),
            socket_port: Some(self.config.http_port),
            volumes,
            label: runner_label,
            status: RunnerStatus::Running,
            insert_date: Utc::now(),
        })
    }

    fn is_collision(error: &FleetError) -> bool {
        matches!(error, FleetError::Repository { source, .. } if source.is_collision())
    }

    fn backoff(&self) -> Duration {
        let min = self.config.backoff_min.as_millis() as u64;
        let max = self.config.backoff_max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max.max(min)))
    }
}

#[async_trait]
impl CreateRunner for IdentityCreator {
    fn service(&self) -> ServiceKind {
        ServiceKind::Identity
    }

    async fn create(&self, request: &CreateRequest) -> Result<Runner> {
        let parser = LabelParser::parse(&request.label)?;
        let identity = parser.instance::<VpnIdentity>()?;

        let missing: Vec<&'static str> = ["id", "identity", "passphrase"]
            .into_iter()
            .filter(|field| identity.is_default(field))
            .collect();
        if !missing.is_empty() {
            return Err(FleetError::IncompleteInput { fields: missing });
        }

        let volume_name = self
            .ensure_keystore_volume(request, &parser, identity.value())
            .await?;
        let container_labels = parser.to_label_map(&self.namespace, &["passphrase"]);

        let mut state = CreateState::Attempting { attempt: 1 };
        loop {
            state = match state {
                CreateState::Attempting { attempt } => {
                    self.remove_stale_created(&parser).await?;
                    match self
                        .try_create(request, &container_labels, &volume_name, identity.value())
                        .await
                    {
                        Ok(runner) => CreateState::Succeeded(Box::new(runner)),
                        Err(err) if Self::is_collision(&err) && attempt < MAX_ATTEMPTS => {
                            tracing::warn!(attempt, error = %err, "allocation collision, retrying");
                            CreateState::BackoffWait { attempt }
                        }
                        Err(err) => CreateState::Cleanup { failure: err },
                    }
                }
                CreateState::BackoffWait { attempt } => {
                    tokio::time::sleep(self.backoff()).await;
                    CreateState::Attempting { attempt: attempt + 1 }
                }
                CreateState::Cleanup { failure } => {
                    if failure.needs_cleanup() {
                        match self.remove_stale_created(&parser).await {
                            Ok(()) => CreateState::Failed(failure),
                            Err(cleanup_err) => {
                                tracing::error!(error = %cleanup_err, "cleanup after failed start also failed");
                                CreateState::Failed(FleetError::combine(failure, cleanup_err))
                            }
                        }
                    } else {
                        CreateState::Failed(failure)
                    }
                }
                CreateState::Succeeded(runner) => return Ok(*runner),
                CreateState::Failed(err) => return Err(err),
            };
        }
    }
}

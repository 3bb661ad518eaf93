//! Container-runtime client abstraction and its bollard implementation.
//!
//! Creators and discovery talk to [`ContainerClient`], never to bollard
//! directly, so every container interaction is substitutable in tests.
//! [`DockerClient`] is the production implementation over the local Docker
//! socket.

use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, ListContainersOptions, RemoveContainerOptions,
    StartContainerOptions,
};
use bollard::models::{
    DeviceMapping, EndpointIpamConfig, EndpointSettings, HostConfig, RestartPolicy,
    RestartPolicyNameEnum,
};
use bollard::network::InspectNetworkOptions;
use bollard::volume::CreateVolumeOptions;
use chrono::{DateTime, Utc};
use ipnetwork::Ipv4Network;

use crate::error::ClientError;

/// One label-equality clause in a container listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSelector {
    /// Label key.
    pub key: String,
    /// Required value; `None` selects on key presence alone.
    pub value: Option<String>,
}

impl LabelSelector {
    /// Select containers where `key` equals `value`.
    pub fn equals(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Select containers carrying `key` with any value.
    pub fn exists(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    fn to_filter(&self) -> String {
        match &self.value {
            Some(value) => format!("{}={}", self.key, value),
            None => self.key.clone(),
        }
    }
}

/// A container listing request: label selectors ANDed together, plus
/// optional name and state filters.
#[derive(Debug, Clone, Default)]
pub struct ContainerQuery {
    /// Include stopped containers.
    pub all: bool,
    /// Exact container name to match.
    pub name: Option<String>,
    /// Runtime state strings to match (e.g. `created`, `running`).
    pub states: Vec<String>,
    /// Label-equality clauses, ANDed.
    pub labels: Vec<LabelSelector>,
}

/// One container as reported by a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerRecord {
    /// Runtime-assigned container id.
    pub serial: String,
    /// Container name without the leading slash.
    pub name: String,
    /// Flat label map.
    pub labels: BTreeMap<String, String>,
    /// Runtime state string.
    pub state: String,
    /// Creation time, when the runtime reports one.
    pub created_at: Option<DateTime<Utc>>,
    /// IPv4 address per attached network.
    pub addresses: BTreeMap<String, Ipv4Addr>,
}

/// Device passed through to a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    /// Path on the host.
    pub host_path: String,
    /// Path inside the container.
    pub container_path: String,
    /// Cgroup permissions, e.g. `rwm`.
    pub permissions: String,
}

/// Everything needed to create one container.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: String,
    /// Command, empty for the image default.
    pub cmd: Vec<String>,
    /// Environment as `KEY=value` pairs.
    pub env: Vec<String>,
    /// Flat label map.
    pub labels: BTreeMap<String, String>,
    /// Volume binds as `source:dest[:opts]`.
    pub binds: Vec<String>,
    /// Network mode: `bridge` or `container:<serial>`.
    pub network_mode: String,
    /// Static IPv4 on a named network.
    pub static_ip: Option<(String, Ipv4Addr)>,
    /// Added capabilities.
    pub cap_add: Vec<String>,
    /// Passed-through devices.
    pub devices: Vec<DeviceSpec>,
    /// Whether the container restarts on exit.
    pub restart_always: bool,
}

/// A bind-backed named volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeSpec {
    /// Volume name.
    pub name: String,
    /// Host path the volume binds.
    pub device: String,
    /// Flat label map.
    pub labels: BTreeMap<String, String>,
}

/// Address layout of a bridge network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkInfo {
    /// Network name.
    pub name: String,
    /// Configured subnet.
    pub subnet: Ipv4Network,
    /// Gateway address.
    pub gateway: Ipv4Addr,
    /// Addresses currently bound by attached containers.
    pub bound: Vec<Ipv4Addr>,
}

/// The container-runtime operations this crate consumes.
#[async_trait]
pub trait ContainerClient: Send + Sync {
    /// List containers matching `query`.
    async fn list_containers(&self, query: &ContainerQuery)
    -> Result<Vec<ContainerRecord>, ClientError>;

    /// Create a container, returning its runtime id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ClientError>;

    /// Start a created container.
    async fn start_container(&self, serial: &str) -> Result<(), ClientError>;

    /// Force-remove a container and its anonymous volumes.
    async fn remove_container(&self, serial: &str) -> Result<(), ClientError>;

    /// Whether a named volume exists.
    async fn volume_exists(&self, name: &str) -> Result<bool, ClientError>;

    /// Create a bind-backed named volume.
    async fn create_volume(&self, spec: &VolumeSpec) -> Result<(), ClientError>;

    /// Inspect a network's subnet, gateway, and bound addresses.
    async fn inspect_network(&self, name: &str) -> Result<NetworkInfo, ClientError>;
}

/// [`ContainerClient`] over the local Docker daemon.
pub struct DockerClient {
    docker: Docker,
}

impl DockerClient {
    /// Connect to the local daemon and verify it responds.
    pub async fn connect() -> Result<Self, ClientError> {
        let docker = Docker::connect_with_local_defaults().map_err(map_bollard_err)?;
        docker.ping().await.map_err(map_bollard_err)?;
        tracing::debug!("connected to docker daemon");

        Ok(Self { docker })
    }

    /// Wrap an existing bollard handle.
    pub fn from_docker(docker: Docker) -> Self {
        Self { docker }
    }
}

#[async_trait]
impl ContainerClient for DockerClient {
    async fn list_containers(
        &self,
        query: &ContainerQuery,
    ) -> Result<Vec<ContainerRecord>, ClientError> {
        let mut filters: HashMap<String, Vec<String>> = HashMap::new();
        if let Some(name) = &query.name {
            filters.insert("name".to_string(), vec![format!("/{name}")]);
        }
        if !query.states.is_empty() {
            filters.insert("status".to_string(), query.states.clone());
        }
        if !query.labels.is_empty() {
            filters.insert(
                "label".to_string(),
                query.labels.iter().map(LabelSelector::to_filter).collect(),
            );
        }

        let options = ListContainersOptions {
            all: query.all,
            filters,
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(map_bollard_err)?;

        Ok(summaries
            .into_iter()
            .map(|summary| {
                let addresses = summary
                    .network_settings
                    .as_ref()
                    .and_then(|settings| settings.networks.as_ref())
                    .map(|networks| {
                        networks
                            .iter()
                            .filter_map(|(network, endpoint)| {
                                let ip = endpoint.ip_address.as_deref()?;
                                ip.parse().ok().map(|addr| (network.clone(), addr))
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                ContainerRecord {
                    serial: summary.id.unwrap_or_default(),
                    name: summary
                        .names
                        .as_ref()
                        .and_then(|names| names.first())
                        .map(|name| name.trim_start_matches('/').to_string())
                        .unwrap_or_default(),
                    labels: summary.labels.unwrap_or_default().into_iter().collect(),
                    state: summary.state.unwrap_or_default(),
                    created_at: summary
                        .created
                        .and_then(|secs| DateTime::from_timestamp(secs, 0)),
                    addresses,
                }
            })
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ClientError> {
        let networking_config = spec.static_ip.as_ref().map(|(network, addr)| {
            let endpoint = EndpointSettings {
                ipam_config: Some(EndpointIpamConfig {
                    ipv4_address: Some(addr.to_string()),
                    ..Default::default()
                }),
                ..Default::default()
            };
            bollard::container::NetworkingConfig {
                endpoints_config: HashMap::from([(network.clone(), endpoint)]),
            }
        });

        let host_config = HostConfig {
            binds: (!spec.binds.is_empty()).then(|| spec.binds.clone()),
            network_mode: Some(spec.network_mode.clone()),
            restart_policy: spec.restart_always.then(|| RestartPolicy {
                name: Some(RestartPolicyNameEnum::ALWAYS),
                ..Default::default()
            }),
            cap_add: (!spec.cap_add.is_empty()).then(|| spec.cap_add.clone()),
            devices: (!spec.devices.is_empty()).then(|| {
                spec.devices
                    .iter()
                    .map(|device| DeviceMapping {
                        path_on_host: Some(device.host_path.clone()),
                        path_in_container: Some(device.container_path.clone()),
                        cgroup_permissions: Some(device.permissions.clone()),
                    })
                    .collect()
            }),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            cmd: (!spec.cmd.is_empty()).then(|| spec.cmd.clone()),
            env: (!spec.env.is_empty()).then(|| spec.env.clone()),
            labels: Some(spec.labels.clone().into_iter().collect()),
            host_config: Some(host_config),
            networking_config,
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        let response = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(map_bollard_err)?;

        Ok(response.id)
    }

    async fn start_container(&self, serial: &str) -> Result<(), ClientError> {
        self.docker
            .start_container(serial, None::<StartContainerOptions<String>>)
            .await
            .map_err(map_bollard_err)
    }

    async fn remove_container(&self, serial: &str) -> Result<(), ClientError> {
        self.docker
            .remove_container(
                serial,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_bollard_err)
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, ClientError> {
        match self.docker.inspect_volume(name).await {
            Ok(_) => Ok(true),
            Err(err) => match map_bollard_err(err) {
                ClientError::NotFound => Ok(false),
                other => Err(other),
            },
        }
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<(), ClientError> {
        let options = CreateVolumeOptions {
            name: spec.name.clone(),
            driver: "local".to_string(),
            driver_opts: HashMap::from([
                ("device".to_string(), spec.device.clone()),
                ("o".to_string(), "bind".to_string()),
                ("type".to_string(), "none".to_string()),
            ]),
            labels: spec.labels.clone().into_iter().collect(),
        };

        self.docker
            .create_volume(options)
            .await
            .map(|_| ())
            .map_err(map_bollard_err)
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkInfo, ClientError> {
        let network = self
            .docker
            .inspect_network(
                name,
                Some(InspectNetworkOptions::<String> {
                    verbose: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(map_bollard_err)?;

        let ipam = network
            .ipam
            .as_ref()
            .and_then(|ipam| ipam.config.as_ref())
            .and_then(|configs| configs.first())
            .ok_or_else(|| ClientError::Malformed(format!("network '{name}' has no IPAM config")))?;

        let subnet: Ipv4Network = ipam
            .subnet
            .as_deref()
            .ok_or_else(|| ClientError::Malformed(format!("network '{name}' has no subnet")))?
            .parse()
            .map_err(|err| ClientError::Malformed(format!("bad subnet on '{name}': {err}")))?;

        let gateway: Ipv4Addr = ipam
            .gateway
            .as_deref()
            .ok_or_else(|| ClientError::Malformed(format!("network '{name}' has no gateway")))?
            .parse()
            .map_err(|err| ClientError::Malformed(format!("bad gateway on '{name}': {err}")))?;

        let bound = network
            .containers
            .unwrap_or_default()
            .into_values()
            .filter_map(|attached| {
                let cidr = attached.ipv4_address?;
                cidr.split('/').next()?.parse().ok()
            })
            .collect();

        Ok(NetworkInfo {
            name: name.to_string(),
            subnet,
            gateway,
            bound,
        })
    }
}

/// Classify a bollard failure into the client error taxonomy.
///
/// Collision detection keys off the daemon's message text because the API
/// reports both address and name conflicts as generic server errors.
fn map_bollard_err(err: bollard::errors::Error) -> ClientError {
    match err {
        bollard::errors::Error::DockerResponseServerError {
            status_code,
            message,
        } => {
            if message.contains("Address already in use") {
                ClientError::AddressInUse
            } else if message.contains("already in use by container") {
                ClientError::NameInUse
            } else if status_code == 404 {
                ClientError::NotFound
            } else {
                ClientError::Api {
                    status: status_code,
                    message,
                }
            }
        }
        other => ClientError::Transport(other.to_string()),
    }
}

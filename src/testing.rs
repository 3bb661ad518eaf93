//! Test doubles for the container-runtime seam.
//!
//! Provides [`StubContainerClient`], a scriptable [`ContainerClient`] used
//! by creator and discovery tests instead of ad-hoc per-test stubs. Listing
//! applies the same name/state/label filtering semantics the daemon would,
//! so discovery tests exercise real query translation.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::docker::client::{
    ContainerClient, ContainerQuery, ContainerRecord, ContainerSpec, NetworkInfo, VolumeSpec,
};
use crate::error::ClientError;

/// A scriptable in-memory container runtime.
///
/// Listings return the configured records filtered by the query; create and
/// start outcomes are scripted FIFO (defaulting to success); every call is
/// counted for assertions.
pub struct StubContainerClient {
    network: Mutex<Option<NetworkInfo>>,
    containers: Mutex<Vec<ContainerRecord>>,
    volumes: Mutex<HashSet<String>>,
    create_results: Mutex<VecDeque<Result<String, ClientError>>>,
    start_results: Mutex<VecDeque<Result<(), ClientError>>>,
    remove_results: Mutex<VecDeque<Result<(), ClientError>>>,
    removed: Mutex<Vec<String>>,
    created_specs: Mutex<Vec<ContainerSpec>>,
    list_calls: AtomicU32,
    create_calls: AtomicU32,
    start_calls: AtomicU32,
    remove_calls: AtomicU32,
}

impl Default for StubContainerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl StubContainerClient {
    /// An empty runtime: no network, no containers, no volumes.
    pub fn new() -> Self {
        Self {
            network: Mutex::new(None),
            containers: Mutex::new(Vec::new()),
            volumes: Mutex::new(HashSet::new()),
            create_results: Mutex::new(VecDeque::new()),
            start_results: Mutex::new(VecDeque::new()),
            remove_results: Mutex::new(VecDeque::new()),
            removed: Mutex::new(Vec::new()),
            created_specs: Mutex::new(Vec::new()),
            list_calls: AtomicU32::new(0),
            create_calls: AtomicU32::new(0),
            start_calls: AtomicU32::new(0),
            remove_calls: AtomicU32::new(0),
        }
    }

    /// Set the network returned by `inspect_network`.
    pub fn with_network(self, network: NetworkInfo) -> Self {
        *self.network.lock().unwrap() = Some(network);
        self
    }

    /// Add a container to the listing.
    pub fn with_container(self, record: ContainerRecord) -> Self {
        self.containers.lock().unwrap().push(record);
        self
    }

    /// Mark a named volume as existing.
    pub fn with_volume(self, name: impl Into<String>) -> Self {
        self.volumes.lock().unwrap().insert(name.into());
        self
    }

    /// Script the next `create_container` outcome (FIFO; default succeeds).
    pub fn script_create(self, result: Result<String, ClientError>) -> Self {
        self.create_results.lock().unwrap().push_back(result);
        self
    }

    /// Script the next `start_container` outcome (FIFO; default succeeds).
    pub fn script_start(self, result: Result<(), ClientError>) -> Self {
        self.start_results.lock().unwrap().push_back(result);
        self
    }

    /// Script the next `remove_container` outcome (FIFO; default succeeds).
    pub fn script_remove(self, result: Result<(), ClientError>) -> Self {
        self.remove_results.lock().unwrap().push_back(result);
        self
    }

    /// Serials passed to `remove_container`, in order.
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    /// Specs passed to `create_container`, in order.
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.created_specs.lock().unwrap().clone()
    }

    /// Number of `list_containers` calls.
    pub fn list_calls(&self) -> u32 {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Number of `create_container` calls.
    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Number of `start_container` calls.
    pub fn start_calls(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Number of `remove_container` calls.
    pub fn remove_calls(&self) -> u32 {
        self.remove_calls.load(Ordering::SeqCst)
    }

    fn matches(record: &ContainerRecord, query: &ContainerQuery) -> bool {
        if let Some(name) = &query.name
            && record.name != *name
        {
            return false;
        }
        if !query.states.is_empty() && !query.states.iter().any(|s| *s == record.state) {
            return false;
        }
        query.labels.iter().all(|selector| match &selector.value {
            Some(value) => record.labels.get(&selector.key) == Some(value),
            None => record.labels.contains_key(&selector.key),
        })
    }
}

#[async_trait]
impl ContainerClient for StubContainerClient {
    async fn list_containers(
        &self,
        query: &ContainerQuery,
    ) -> Result<Vec<ContainerRecord>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        let containers = self.containers.lock().unwrap();
        Ok(containers
            .iter()
            .filter(|record| query.all || record.state == "running")
            .filter(|record| Self::matches(record, query))
            .cloned()
            .collect())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, ClientError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.created_specs.lock().unwrap().push(spec.clone());
        match self.create_results.lock().unwrap().pop_front() {
            Some(result) => result,
            None => Ok(format!("serial-{}", self.create_calls.load(Ordering::SeqCst))),
        }
    }

    async fn start_container(&self, _serial: &str) -> Result<(), ClientError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        self.start_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn remove_container(&self, serial: &str) -> Result<(), ClientError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        self.removed.lock().unwrap().push(serial.to_string());
        self.remove_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn volume_exists(&self, name: &str) -> Result<bool, ClientError> {
        Ok(self.volumes.lock().unwrap().contains(name))
    }

    async fn create_volume(&self, spec: &VolumeSpec) -> Result<(), ClientError> {
        self.volumes.lock().unwrap().insert(spec.name.clone());
        Ok(())
    }

    async fn inspect_network(&self, name: &str) -> Result<NetworkInfo, ClientError> {
        self.network
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| ClientError::Malformed(format!("no network '{name}' configured")))
    }
}

/// A small /29 bridge network for tests: six host addresses, of which the
/// gateway takes one.
pub fn test_network(bound: &[Ipv4Addr]) -> NetworkInfo {
    NetworkInfo {
        name: "fleet-bridge".to_string(),
        subnet: "172.30.0.0/29".parse().expect("valid test subnet"),
        gateway: Ipv4Addr::new(172, 30, 0, 1),
        bound: bound.to_vec(),
    }
}

/// A listing record with the given name, state, and labels.
pub fn test_container(
    serial: &str,
    name: &str,
    state: &str,
    labels: &[(&str, &str)],
) -> ContainerRecord {
    ContainerRecord {
        serial: serial.to_string(),
        name: name.to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        state: state.to_string(),
        created_at: None,
        addresses: BTreeMap::new(),
    }
}

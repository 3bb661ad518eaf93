//! Runner model: one managed container instance.

use std::cmp::Ordering;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::docker::label::LabelEntry;
use crate::model::filter::Filterable;

/// The service a runner implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    /// VPN identity node holding a keystore account.
    Identity,
    /// Connector binding an identity node to one provider.
    Connector,
    /// Traffic relay exposing a listener for end users.
    Relay,
}

impl ServiceKind {
    /// Wire name used in the runtime's project label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Connector => "connector",
            Self::Relay => "relay",
        }
    }

    /// Parse a project-label value back into a service kind.
    pub fn from_label(value: &str) -> Option<Self> {
        match value {
            "identity" => Some(Self::Identity),
            "connector" => Some(Self::Connector),
            "relay" => Some(Self::Relay),
            _ => None,
        }
    }
}

/// Observed container state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerStatus {
    /// Created but never started.
    Creating,
    /// Running.
    Running,
    /// Restart policy cycling the container.
    Restarting,
    /// Exited or paused.
    Stopped,
    /// Dead, OOM-killed, or unrecognized state.
    Error,
}

impl RunnerStatus {
    /// Map a runtime state string to a status.
    pub fn from_container_state(state: &str) -> Self {
        match state {
            "created" => Self::Creating,
            "running" => Self::Running,
            "restarting" => Self::Restarting,
            "exited" | "paused" => Self::Stopped,
            _ => Self::Error,
        }
    }

    /// The runtime state string this status maps back to, for list filters.
    pub fn as_container_state(&self) -> &'static str {
        match self {
            Self::Creating => "created",
            Self::Running => "running",
            Self::Restarting => "restarting",
            Self::Stopped => "exited",
            Self::Error => "dead",
        }
    }
}

/// Execution environment of a runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecKind {
    /// Docker container.
    Docker,
}

/// How callers reach a runner's service socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocketType {
    /// HTTP management API.
    Http,
    /// Raw TCP listener.
    Tcp,
    /// No socket of its own (shares another container's namespace).
    None,
}

/// Role of an attached volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeKind {
    /// Durable keystore holding identity files.
    Keystore,
}

/// One volume attached to a runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeBinding {
    /// Role of the volume.
    pub kind: VolumeKind,
    /// Host source path the volume is bind-mounted from.
    pub source: String,
    /// Mount path inside the container, filled in by the creator.
    pub dest: Option<String>,
}

/// One managed container instance.
///
/// Status transitions only through runtime observation: the crate never
/// mutates a stored status, it re-reads container state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Runner {
    /// Identifier assigned at creation, stored in the runner's labels.
    pub id: String,
    /// Runtime-assigned container id.
    pub serial: String,
    /// Container name.
    pub name: String,
    /// Service this runner implements.
    pub service: ServiceKind,
    /// Execution environment.
    pub exec: ExecKind,
    /// Socket kind callers use.
    pub socket_type: SocketType,
    /// Bridge-network address, when the runner has its own endpoint.
    pub socket_addr: Option<Ipv4Addr>,
    /// Service port, when known.
    pub socket_port: Option<u16>,
    /// Attached volumes.
    pub volumes: Vec<VolumeBinding>,
    /// Owning-entity label clusters.
    pub label: Vec<LabelEntry>,
    /// Observed status.
    pub status: RunnerStatus,
    /// Creation time.
    pub insert_date: DateTime<Utc>,
}

/// Equality conditions accepted when filtering runners.
#[derive(Debug, Clone, PartialEq)]
pub enum RunnerCondition {
    /// Match on container name.
    Name(String),
    /// Match on service kind.
    Service(ServiceKind),
    /// Match on observed status.
    Status(RunnerStatus),
    /// Match runners whose label set contains an entry of this namespace
    /// agreeing on every field the condition entry supplies.
    Label(LabelEntry),
}

/// Sortable runner fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerSort {
    /// Sort by creation time.
    InsertDate,
}

impl Filterable for Runner {
    type Condition = RunnerCondition;
    type SortKey = RunnerSort;

    fn matches(&self, condition: &RunnerCondition) -> bool {
        match condition {
            RunnerCondition::Name(name) => self.name == *name,
            RunnerCondition::Service(service) => self.service == *service,
            RunnerCondition::Status(status) => self.status == *status,
            RunnerCondition::Label(wanted) => self.label.iter().any(|entry| {
                entry.namespace == wanted.namespace
                    && wanted
                        .fields
                        .iter()
                        .all(|(key, value)| entry.fields.get(key) == Some(value))
            }),
        }
    }

    fn compare(&self, other: &Self, key: &RunnerSort) -> Ordering {
        match key {
            RunnerSort::InsertDate => self.insert_date.cmp(&other.insert_date),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docker::label::LabelEntry;
    use crate::model::filter::Query;

    fn runner_with_label(entry: LabelEntry) -> Runner {
        Runner {
            id: "r1".to_string(),
            serial: "abc".to_string(),
            name: "identity1".to_string(),
            service: ServiceKind::Identity,
            exec: ExecKind::Docker,
            socket_type: SocketType::Http,
            socket_addr: None,
            socket_port: None,
            volumes: Vec::new(),
            label: vec![entry],
            status: RunnerStatus::Running,
            insert_date: Utc::now(),
        }
    }

    #[test]
    fn label_condition_requires_every_supplied_field() {
        let runner = runner_with_label(
            LabelEntry::new("provider")
                .field("id", "p1")
                .field("provider-identity", "0xabc"),
        );

        let full_match = Query::<Runner>::unpaginated().with_condition(RunnerCondition::Label(
            LabelEntry::new("provider")
                .field("id", "p1")
                .field("provider-identity", "0xabc"),
        ));
        assert_eq!(full_match.apply(vec![runner.clone()]).total, 1);

        let wrong_field = Query::<Runner>::unpaginated().with_condition(RunnerCondition::Label(
            LabelEntry::new("provider")
                .field("id", "p1")
                .field("provider-identity", "0xother"),
        ));
        assert_eq!(wrong_field.apply(vec![runner.clone()]).total, 0);

        let wrong_namespace = Query::<Runner>::unpaginated()
            .with_condition(RunnerCondition::Label(LabelEntry::new("vpn-identity").field("id", "p1")));
        assert_eq!(wrong_namespace.apply(vec![runner]).total, 0);
    }

    #[test]
    fn container_state_round_trip() {
        for status in [
            RunnerStatus::Creating,
            RunnerStatus::Running,
            RunnerStatus::Restarting,
            RunnerStatus::Stopped,
        ] {
            assert_eq!(
                RunnerStatus::from_container_state(status.as_container_state()),
                status
            );
        }
        assert_eq!(
            RunnerStatus::from_container_state("some-novel-state"),
            RunnerStatus::Error
        );
    }
}

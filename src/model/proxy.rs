//! Proxy topology models: downstream handlers, upstream listeners, and the
//! per-user effective-proxy projection.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::filter::Filterable;
use crate::model::runner::Runner;
use crate::model::user::UserCredentials;

/// What a downstream proxy forwards into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    /// A local network interface.
    Interface,
    /// A VPN identity node.
    Vpn,
}

/// Liveness of a proxy leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    /// Administratively disabled.
    Disable,
    /// Backing runner absent or stopped.
    Offline,
    /// Backing runner live.
    Online,
}

/// The egress leg of a proxy chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyDownstream {
    /// Internal identifier.
    pub id: String,
    /// Id of the provider or interface this leg egresses through.
    pub ref_id: String,
    /// Egress address.
    pub ip: Option<String>,
    /// Egress netmask bits.
    pub mask: Option<u8>,
    /// Egress kind.
    pub kind: ProxyType,
    /// Runner serving this leg, when discovered.
    pub runner: Option<Runner>,
    /// Liveness.
    pub status: ProxyStatus,
}

/// The ingress leg of a proxy chain: one listener end users connect to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyUpstream {
    /// Internal identifier.
    pub id: String,
    /// Listen address.
    pub listen_addr: String,
    /// Listen port; the stable key end users and ACL grants reference.
    pub listen_port: u16,
    /// Egress legs behind this listener.
    pub downstream: Vec<ProxyDownstream>,
    /// Runner serving this listener, when discovered.
    pub runner: Option<Runner>,
    /// Record creation time.
    pub insert_date: DateTime<Utc>,
}

/// A proxy listener reprojected with the credentials of one user who may use
/// it. Computed per request by the user-proxy reconciliation; never stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProxy {
    /// Id of the underlying upstream proxy.
    pub id: String,
    /// Listen address.
    pub listen_addr: String,
    /// Listen port.
    pub listen_port: u16,
    /// Egress legs behind this listener.
    pub downstream: Vec<ProxyDownstream>,
    /// Runner serving this listener, when discovered.
    pub runner: Option<Runner>,
    /// Creation time of the underlying proxy.
    pub insert_date: DateTime<Utc>,
    /// The user this projection was computed for.
    pub user: UserCredentials,
}

impl UserProxy {
    /// Reproject an upstream proxy for one user.
    pub fn from_upstream(proxy: &ProxyUpstream, user: UserCredentials) -> Self {
        Self {
            id: proxy.id.clone(),
            listen_addr: proxy.listen_addr.clone(),
            listen_port: proxy.listen_port,
            downstream: proxy.downstream.clone(),
            runner: proxy.runner.clone(),
            insert_date: proxy.insert_date,
            user,
        }
    }
}

/// Equality conditions accepted when filtering user-proxy projections.
#[derive(Debug, Clone, PartialEq)]
pub enum UserProxyCondition {
    /// Match on listen port.
    ListenPort(u16),
}

/// Sortable user-proxy fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserProxySort {
    /// Sort by the underlying proxy's creation time.
    InsertDate,
}

impl Filterable for UserProxy {
    type Condition = UserProxyCondition;
    type SortKey = UserProxySort;

    fn matches(&self, condition: &UserProxyCondition) -> bool {
        match condition {
            UserProxyCondition::ListenPort(port) => self.listen_port == *port,
        }
    }

    fn compare(&self, other: &Self, key: &UserProxySort) -> Ordering {
        match key {
            UserProxySort::InsertDate => self.insert_date.cmp(&other.insert_date),
        }
    }
}

//! VPN provider model and its filter vocabulary.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::filter::Filterable;
use crate::model::runner::Runner;

/// VPN tunnelling protocol offered by a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VpnServiceType {
    /// WireGuard tunnel.
    Wireguard,
}

/// Network class the provider's egress address belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderIpType {
    /// Datacenter address space.
    Hosting,
    /// Residential address space.
    Residential,
    /// Business address space.
    Business,
    /// Mobile carrier address space.
    Mobile,
}

/// Liveness of a registered provider, derived from its connector runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// No live connector, or the identity node is down.
    Offline,
    /// Connector container still starting.
    Pending,
    /// Connector running.
    Online,
}

/// A VPN provider record, optionally merged with live runner state.
///
/// `is_register`, `status` and `runner` are derived at request time by the
/// provider reconciliation repository; the authoritative store knows nothing
/// about them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provider {
    /// Authoritative record id.
    pub id: String,
    /// Identity address of the account consuming this provider, when known.
    pub user_identity: Option<String>,
    /// The provider's own identity address.
    pub provider_identity: String,
    /// Tunnel protocol.
    pub service_type: VpnServiceType,
    /// Egress address class.
    pub ip_type: ProviderIpType,
    /// ISO country code of the egress address.
    pub country: String,
    /// Egress IP, when a connection has reported one.
    pub ip: Option<String>,
    /// Whether a live runner is bound to this provider (derived).
    pub is_register: bool,
    /// Liveness derived from runner state.
    pub status: Option<ProviderStatus>,
    /// The identity runner serving this provider, when registered.
    pub runner: Option<Runner>,
    /// Record creation time.
    pub insert_date: DateTime<Utc>,
}

impl Default for Provider {
    fn default() -> Self {
        Self {
            id: String::new(),
            user_identity: None,
            provider_identity: String::new(),
            service_type: VpnServiceType::Wireguard,
            ip_type: ProviderIpType::Hosting,
            country: "GB".to_string(),
            ip: None,
            is_register: false,
            status: None,
            runner: None,
            insert_date: Utc::now(),
        }
    }
}

/// Equality conditions accepted when filtering providers.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCondition {
    /// Match on country code.
    Country(String),
    /// Match on provider identity address.
    ProviderIdentity(String),
    /// Match on egress address class.
    IpType(ProviderIpType),
    /// Match on derived registration state. Only meaningful post-merge.
    IsRegister(bool),
}

/// Sortable provider fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderSort {
    /// Sort by record creation time.
    InsertDate,
}

impl Filterable for Provider {
    type Condition = ProviderCondition;
    type SortKey = ProviderSort;

    fn matches(&self, condition: &ProviderCondition) -> bool {
        match condition {
            ProviderCondition::Country(country) => self.country == *country,
            ProviderCondition::ProviderIdentity(identity) => self.provider_identity == *identity,
            ProviderCondition::IpType(ip_type) => self.ip_type == *ip_type,
            ProviderCondition::IsRegister(flag) => self.is_register == *flag,
        }
    }

    fn compare(&self, other: &Self, key: &ProviderSort) -> Ordering {
        match key {
            ProviderSort::InsertDate => self.insert_date.cmp(&other.insert_date),
        }
    }
}

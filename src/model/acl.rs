//! Proxy access-control grants.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::filter::Filterable;
use crate::model::proxy::ProxyUpstream;
use crate::model::user::UserCredentials;

/// How wide a grant reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AclMode {
    /// The user may use every proxy in the inventory.
    All,
    /// The user may use only the proxies listed on the grant.
    Custom,
}

/// One access grant: a user and the proxies it unlocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyAcl {
    /// Internal identifier.
    pub id: String,
    /// Grant reach.
    pub mode: AclMode,
    /// The granted user.
    pub user: Option<UserCredentials>,
    /// Proxies referenced by a `Custom` grant; empty for `All`.
    pub proxies: Vec<ProxyUpstream>,
    /// Record creation time.
    pub insert_date: DateTime<Utc>,
}

/// Equality conditions accepted when filtering grants.
#[derive(Debug, Clone, PartialEq)]
pub enum AclCondition {
    /// Match grants owned by this user id.
    UserId(String),
    /// Match on grant reach.
    Mode(AclMode),
}

/// Sortable grant fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclSort {
    /// Sort by record creation time.
    InsertDate,
}

impl Filterable for ProxyAcl {
    type Condition = AclCondition;
    type SortKey = AclSort;

    fn matches(&self, condition: &AclCondition) -> bool {
        match condition {
            AclCondition::UserId(id) => self.user.as_ref().is_some_and(|u| u.id == *id),
            AclCondition::Mode(mode) => self.mode == *mode,
        }
    }

    fn compare(&self, other: &Self, key: &AclSort) -> Ordering {
        match key {
            AclSort::InsertDate => self.insert_date.cmp(&other.insert_date),
        }
    }
}

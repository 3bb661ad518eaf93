//! VPN identity (keystore account) model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A VPN identity: one keystore account an identity node runs under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VpnIdentity {
    /// Internal identifier.
    pub id: String,
    /// On-chain identity address.
    pub identity: String,
    /// Keystore passphrase. Never written to container labels.
    pub passphrase: String,
    /// Directory holding the keystore file.
    pub path: String,
    /// Keystore file name.
    pub filename: String,
    /// Whether a runner currently uses this identity.
    pub is_use: bool,
    /// Record creation time.
    pub insert_date: DateTime<Utc>,
}

impl Default for VpnIdentity {
    fn default() -> Self {
        Self {
            id: String::new(),
            identity: String::new(),
            passphrase: String::new(),
            path: String::new(),
            filename: String::new(),
            is_use: false,
            insert_date: Utc::now(),
        }
    }
}

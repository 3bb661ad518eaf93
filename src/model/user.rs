//! User account model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A proxy end user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Internal identifier.
    pub id: String,
    /// Login name.
    pub username: String,
    /// Proxy-auth password.
    pub password: String,
    /// Whether the account may authenticate.
    pub is_enable: bool,
    /// Record creation time.
    pub insert_date: DateTime<Utc>,
}

/// The subset of a user carried on request-time projections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCredentials {
    /// Internal identifier.
    pub id: String,
    /// Login name.
    pub username: String,
    /// Proxy-auth password.
    pub password: String,
}

impl From<&User> for UserCredentials {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
            password: user.password.clone(),
        }
    }
}

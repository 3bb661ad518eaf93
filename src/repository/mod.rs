//! Repositories: runner discovery over the container runtime, the
//! authoritative-store seams, and the request-time reconciliation
//! repositories built on both.

pub mod provider;
pub mod provider_cache;
pub mod runner;
pub mod users_proxy;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::acl::ProxyAcl;
use crate::model::filter::{Page, Query};
use crate::model::provider::Provider;
use crate::model::proxy::ProxyUpstream;
use crate::model::runner::Runner;
use crate::model::user::User;

pub use provider::ProviderAggregateRepository;
pub use provider_cache::CachedProviderApi;
pub use runner::DockerRunnerRepository;
pub use users_proxy::UsersProxyAggregateRepository;

/// Live runner discovery.
#[async_trait]
pub trait RunnerRepository: Send + Sync {
    /// Runners matching `query`.
    async fn find(&self, query: &Query<Runner>) -> Result<Page<Runner>>;

    /// The runner carrying this fleet id, if any.
    async fn find_by_id(&self, id: &str) -> Result<Option<Runner>>;
}

/// The authoritative provider store.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// Providers matching `query`.
    async fn get_all(&self, query: &Query<Provider>) -> Result<Page<Provider>>;

    /// One provider by id, if known.
    async fn get_by_id(&self, id: &str) -> Result<Option<Provider>>;
}

/// The proxy inventory store.
#[async_trait]
pub trait ProxyRepository: Send + Sync {
    /// The full proxy inventory.
    async fn get_all(&self) -> Result<Page<ProxyUpstream>>;
}

/// The ACL grant store.
#[async_trait]
pub trait AclRepository: Send + Sync {
    /// Grants matching `query`.
    async fn get_all(&self, query: &Query<ProxyAcl>) -> Result<Page<ProxyAcl>>;
}

/// The user store.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// One user by id, if known.
    async fn get_by_id(&self, id: &str) -> Result<Option<User>>;
}

/// A key-value cache with per-key expiry.
///
/// Consumed by [`CachedProviderApi`]; write and expire failures there are
/// logged, never surfaced to the read path.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Set several keys at once.
    async fn set_many(&self, pairs: Vec<(String, String)>) -> Result<()>;

    /// Set a key's time to live.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<()>;

    /// Read one key.
    async fn get(&self, key: &str) -> Result<Option<String>>;
}

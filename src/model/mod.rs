//! Domain models and the shared filter engine.

pub mod acl;
pub mod filter;
pub mod identity;
pub mod provider;
pub mod proxy;
pub mod runner;
pub mod tracked;
pub mod user;

pub use acl::{AclCondition, AclMode, AclSort, ProxyAcl};
pub use filter::{Filterable, Page, Pagination, Query, SortOrder};
pub use identity::VpnIdentity;
pub use provider::{
    Provider, ProviderCondition, ProviderIpType, ProviderSort, ProviderStatus, VpnServiceType,
};
pub use proxy::{
    ProxyDownstream, ProxyStatus, ProxyType, ProxyUpstream, UserProxy, UserProxyCondition,
    UserProxySort,
};
pub use runner::{
    ExecKind, Runner, RunnerCondition, RunnerSort, RunnerStatus, ServiceKind, SocketType,
    VolumeBinding, VolumeKind,
};
pub use tracked::Tracked;
pub use user::{User, UserCredentials};

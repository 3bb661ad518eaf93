//! User-effective-proxy reconciliation.
//!
//! Which proxies a user may actually use exists in no single store: the ACL
//! store knows grants, the proxy inventory knows listeners. This repository
//! joins them per request into [`UserProxy`] projections, then finishes with
//! the shared filter engine.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::Result;
use crate::model::acl::{AclCondition, AclMode, ProxyAcl};
use crate::model::filter::{Page, Query};
use crate::model::proxy::UserProxy;
use crate::model::user::UserCredentials;
use crate::repository::{AclRepository, ProxyRepository, UserRepository};

/// Computes the effective proxy set per user.
pub struct UsersProxyAggregateRepository {
    users: Arc<dyn UserRepository>,
    acls: Arc<dyn AclRepository>,
    proxies: Arc<dyn ProxyRepository>,
}

impl UsersProxyAggregateRepository {
    /// Build the aggregate over the user, ACL, and proxy stores.
    pub fn new(
        users: Arc<dyn UserRepository>,
        acls: Arc<dyn AclRepository>,
        proxies: Arc<dyn ProxyRepository>,
    ) -> Self {
        Self { users, acls, proxies }
    }

    /// The proxies `user_id` may use, each tagged with the user's
    /// credentials. A missing user or an empty grant set yields an empty
    /// page, not an error.
    pub async fn get_by_user_id(
        &self,
        user_id: &str,
        query: &Query<UserProxy>,
    ) -> Result<Page<UserProxy>> {
        let acl_query = Query::<ProxyAcl>::unpaginated()
            .with_condition(AclCondition::UserId(user_id.to_string()));

        let (user, grants, inventory) = tokio::join!(
            self.users.get_by_id(user_id),
            self.acls.get_all(&acl_query),
            self.proxies.get_all(),
        );
        let grants = grants?;
        let inventory = inventory?;
        let user = user?;

        if grants.total == 0 {
            return Ok(Page::empty());
        }
        let Some(user) = user else {
            return Ok(Page::empty());
        };
        let credentials = UserCredentials::from(&user);

        let effective: Vec<UserProxy> =
            if grants.items.iter().any(|grant| grant.mode == AclMode::All) {
                inventory
                    .items
                    .iter()
                    .map(|proxy| UserProxy::from_upstream(proxy, credentials.clone()))
                    .collect()
            } else {
                // Union of the proxies each custom grant references, matched
                // by listen port and de-duplicated by proxy id.
                let mut seen: HashSet<String> = HashSet::new();
                let mut union = Vec::new();
                for grant in &grants.items {
                    for wanted in &grant.proxies {
                        let Some(found) = inventory
                            .items
                            .iter()
                            .find(|proxy| proxy.listen_port == wanted.listen_port)
                        else {
                            continue;
                        };
                        if seen.insert(found.id.clone()) {
                            union.push(UserProxy::from_upstream(found, credentials.clone()));
                        }
                    }
                }
                union
            };

        Ok(query.apply(effective))
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::model::proxy::ProxyUpstream;
    use crate::model::user::User;

    struct StubUsers {
        user: Option<User>,
    }

    #[async_trait]
    impl UserRepository for StubUsers {
        async fn get_by_id(&self, _id: &str) -> Result<Option<User>> {
            Ok(self.user.clone())
        }
    }

    struct StubAcls {
        grants: Vec<ProxyAcl>,
    }

    #[async_trait]
    impl AclRepository for StubAcls {
        async fn get_all(&self, query: &Query<ProxyAcl>) -> Result<Page<ProxyAcl>> {
            Ok(query.apply(self.grants.clone()))
        }
    }

    struct StubProxies {
        inventory: Vec<ProxyUpstream>,
    }

    #[async_trait]
    impl ProxyRepository for StubProxies {
        async fn get_all(&self) -> Result<Page<ProxyUpstream>> {
            Ok(Page {
                items: self.inventory.clone(),
                total: self.inventory.len(),
            })
        }
    }

    fn user() -> User {
        User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            password: "pw".to_string(),
            is_enable: true,
            insert_date: Utc::now(),
        }
    }

    fn upstream(id: &str, port: u16) -> ProxyUpstream {
        ProxyUpstream {
            id: id.to_string(),
            listen_addr: "0.0.0.0".to_string(),
            listen_port: port,
            downstream: Vec::new(),
            runner: None,
            insert_date: Utc::now(),
        }
    }

    fn grant(mode: AclMode, user_id: &str, proxies: Vec<ProxyUpstream>) -> ProxyAcl {
        ProxyAcl {
            id: format!("acl-{user_id}"),
            mode,
            user: Some(UserCredentials {
                id: user_id.to_string(),
                username: "alice".to_string(),
                password: "pw".to_string(),
            }),
            proxies,
            insert_date: Utc::now(),
        }
    }

    fn aggregate(
        user: Option<User>,
        grants: Vec<ProxyAcl>,
        inventory: Vec<ProxyUpstream>,
    ) -> UsersProxyAggregateRepository {
        UsersProxyAggregateRepository::new(
            Arc::new(StubUsers { user }),
            Arc::new(StubAcls { grants }),
            Arc::new(StubProxies { inventory }),
        )
    }

    #[tokio::test]
    async fn all_mode_grant_projects_the_entire_inventory() {
        let repo = aggregate(
            Some(user()),
            vec![grant(AclMode::All, "u1", Vec::new())],
            vec![upstream("p1", 3128), upstream("p2", 3129)],
        );

        let page = repo
            .get_by_user_id("u1", &Query::unpaginated())
            .await
            .unwrap();

        assert_eq!(page.total, 2);
        assert!(page.items.iter().all(|p| p.user.id == "u1"));
        let ports: Vec<u16> = page.items.iter().map(|p| p.listen_port).collect();
        assert_eq!(ports, vec![3128, 3129]);
    }

    #[tokio::test]
    async fn custom_grants_union_by_listen_port() {
        let inventory = vec![upstream("p1", 3128), upstream("p2", 3129), upstream("p3", 3130)];
        let repo = aggregate(
            Some(user()),
            vec![
                grant(AclMode::Custom, "u1", vec![upstream("x", 3128)]),
                // Overlapping and dangling references: 3128 repeats, 9999
                // matches nothing.
                grant(
                    AclMode::Custom,
                    "u1",
                    vec![upstream("y", 3128), upstream("z", 9999)],
                ),
            ],
            inventory,
        );

        let page = repo
            .get_by_user_id("u1", &Query::unpaginated())
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "p1");
        assert_eq!(page.items[0].user.username, "alice");
    }

    #[tokio::test]
    async fn missing_user_yields_empty_not_error() {
        let repo = aggregate(
            None,
            vec![grant(AclMode::All, "u1", Vec::new())],
            vec![upstream("p1", 3128)],
        );

        let page = repo
            .get_by_user_id("u1", &Query::unpaginated())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn zero_grants_yield_empty_not_error() {
        let repo = aggregate(Some(user()), Vec::new(), vec![upstream("p1", 3128)]);

        let page = repo
            .get_by_user_id("u1", &Query::unpaginated())
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn grants_of_other_users_do_not_leak() {
        let repo = aggregate(
            Some(user()),
            vec![grant(AclMode::All, "someone-else", Vec::new())],
            vec![upstream("p1", 3128)],
        );

        let page = repo
            .get_by_user_id("u1", &Query::unpaginated())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn listen_port_condition_filters_the_projection() {
        let repo = aggregate(
            Some(user()),
            vec![grant(AclMode::All, "u1", Vec::new())],
            vec![upstream("p1", 3128), upstream("p2", 3129)],
        );

        let page = repo
            .get_by_user_id(
                "u1",
                &Query::unpaginated().with_condition(
                    crate::model::proxy::UserProxyCondition::ListenPort(3129),
                ),
            )
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, "p2");
    }
}

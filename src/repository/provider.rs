//! Provider reconciliation.
//!
//! Provider records live in an authoritative external store that knows
//! nothing about this fleet; whether a provider is actually served by a live
//! runner only exists in container state. This repository joins the two at
//! request time: a provider is registered iff a connector runner's label
//! carries the same provider id AND the same provider identity; matching a
//! single key is not a match.

use std::collections::HashMap;
use std::sync::Arc;

use crate::docker::label::{LabelEntry, Labeled};
use crate::error::Result;
use crate::model::filter::{Page, Pagination, Query};
use crate::model::identity::VpnIdentity;
use crate::model::provider::{Provider, ProviderCondition, ProviderStatus};
use crate::model::runner::{Runner, RunnerCondition, RunnerStatus, ServiceKind};
use crate::repository::{ProviderApi, RunnerRepository};

/// Joins authoritative provider records with discovered runner state.
pub struct ProviderAggregateRepository {
    api: Arc<dyn ProviderApi>,
    runners: Arc<dyn RunnerRepository>,
}

/// Live runners serving one provider id.
struct Registration<'a> {
    provider_identity: &'a str,
    connector: &'a Runner,
    identity: &'a Runner,
}

impl ProviderAggregateRepository {
    /// Build the aggregate over the authoritative store and runner discovery.
    pub fn new(api: Arc<dyn ProviderApi>, runners: Arc<dyn RunnerRepository>) -> Self {
        Self { api, runners }
    }

    /// Providers merged with registration state.
    ///
    /// Field conditions are evaluated by the authoritative source;
    /// `is_register` only exists post-merge, so it is filtered in memory and
    /// the returned total is recomputed from the filtered set before
    /// pagination.
    pub async fn get_all(&self, query: &Query<Provider>) -> Result<Page<Provider>> {
        let api_query = Query::<Provider> {
            conditions: query
                .conditions
                .iter()
                .filter(|c| !matches!(c, ProviderCondition::IsRegister(_)))
                .cloned()
                .collect(),
            sort: None,
            pagination: Pagination::Skip,
        };
        let runner_query = Query::<Runner>::unpaginated()
            .with_condition(RunnerCondition::Status(RunnerStatus::Running));

        let (providers, runners) = tokio::join!(
            self.api.get_all(&api_query),
            self.runners.find(&runner_query)
        );
        let providers = providers?;
        let runners = runners?;

        if providers.total == 0 {
            return Ok(Page::empty());
        }

        let registrations = Self::index_registrations(&runners.items);
        let merged: Vec<Provider> = providers
            .items
            .into_iter()
            .map(|provider| Self::merge(provider, &registrations))
            .collect();

        Ok(query.apply(merged))
    }

    /// One provider merged with its runner state, if the provider exists.
    pub async fn get_by_id(&self, id: &str) -> Result<Option<Provider>> {
        let Some(provider) = self.api.get_by_id(id).await? else {
            return Ok(None);
        };

        let connector_query = Query::<Runner>::unpaginated()
            .with_condition(RunnerCondition::Service(ServiceKind::Connector))
            .with_condition(RunnerCondition::Label(
                LabelEntry::new(Provider::NAMESPACE).field("id", id),
            ));
        let connectors = self.runners.find(&connector_query).await?;
        if connectors.total == 0 {
            return Ok(Some(provider));
        }

        let Some(identity_id) = connectors.items[0]
            .label
            .iter()
            .find(|entry| entry.namespace == VpnIdentity::NAMESPACE)
            .and_then(|entry| entry.fields.get("id").cloned())
        else {
            return Ok(Some(provider));
        };

        let identity_query = Query::<Runner>::unpaginated()
            .with_condition(RunnerCondition::Service(ServiceKind::Identity))
            .with_condition(RunnerCondition::Label(
                LabelEntry::new(VpnIdentity::NAMESPACE).field("id", identity_id),
            ));
        let identities = self.runners.find(&identity_query).await?;
        if identities.total == 0 {
            return Ok(Some(provider));
        }

        let mut pool = connectors.items;
        pool.extend(identities.items);
        let registrations = Self::index_registrations(&pool);

        Ok(Some(Self::merge(provider, &registrations)))
    }

    /// Index connector runners by the provider id their label references,
    /// resolving each connector's identity runner alongside. Connectors
    /// whose identity runner is not in the pool are dropped: without it
    /// there is nothing to attach.
    fn index_registrations(runners: &[Runner]) -> HashMap<&str, Registration<'_>> {
        let identity_by_id: HashMap<&str, &Runner> = runners
            .iter()
            .filter(|runner| runner.service == ServiceKind::Identity)
            .filter_map(|runner| {
                runner
                    .label
                    .iter()
                    .find(|entry| entry.namespace == VpnIdentity::NAMESPACE)
                    .and_then(|entry| entry.fields.get("id"))
                    .map(|id| (id.as_str(), runner))
            })
            .collect();

        runners
            .iter()
            .filter(|runner| runner.service == ServiceKind::Connector)
            .filter_map(|connector| {
                let provider_entry = connector
                    .label
                    .iter()
                    .find(|entry| entry.namespace == Provider::NAMESPACE)?;
                let provider_id = provider_entry.fields.get("id")?;
                let provider_identity = provider_entry.fields.get("provider-identity")?;

                let identity_id = connector
                    .label
                    .iter()
                    .find(|entry| entry.namespace == VpnIdentity::NAMESPACE)
                    .and_then(|entry| entry.fields.get("id"))?;
                let identity = *identity_by_id.get(identity_id.as_str())?;

                Some((
                    provider_id.as_str(),
                    Registration {
                        provider_identity,
                        connector,
                        identity,
                    },
                ))
            })
            .collect()
    }

    fn merge(mut provider: Provider, registrations: &HashMap<&str, Registration<'_>>) -> Provider {
        let matched = registrations
            .get(provider.id.as_str())
            // Both join keys must agree; a provider-id hit with a different
            // provider identity is not a registration.
            .filter(|reg| reg.provider_identity == provider.provider_identity);

        let Some(registration) = matched else {
            provider.is_register = false;
            return provider;
        };

        provider.is_register = true;
        provider.user_identity = registration
            .identity
            .label
            .iter()
            .find(|entry| entry.namespace == VpnIdentity::NAMESPACE)
            .and_then(|entry| entry.fields.get("identity").cloned())
            .or(provider.user_identity);
        provider.runner = Some(registration.identity.clone());
        provider.status = Some(match registration.connector.status {
            RunnerStatus::Creating => ProviderStatus::Pending,
            RunnerStatus::Running => ProviderStatus::Online,
            _ => ProviderStatus::Offline,
        });
        if registration.identity.status != RunnerStatus::Running {
            provider.status = Some(ProviderStatus::Offline);
        }

        provider
    }
}

//! Caching decorator for the authoritative provider store.
//!
//! Wraps any [`ProviderApi`] with a [`CacheStore`] mapping
//! `myst_provider:<id>` to the provider's identity string. Population is
//! fire-and-forget: the read path never blocks on cache writes, and cache
//! failures are logged, never surfaced.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::filter::{Page, Query};
use crate::model::provider::{Provider, ProviderCondition};
use crate::repository::{CacheStore, ProviderApi};

const KEY_PREFIX: &str = "myst_provider";
const KEY_TTL: Duration = Duration::from_secs(300);

/// [`ProviderApi`] decorator that caches id-to-identity mappings.
pub struct CachedProviderApi {
    inner: Arc<dyn ProviderApi>,
    cache: Arc<dyn CacheStore>,
}

impl CachedProviderApi {
    /// Wrap `inner` with `cache`.
    pub fn new(inner: Arc<dyn ProviderApi>, cache: Arc<dyn CacheStore>) -> Self {
        Self { inner, cache }
    }

    fn cache_key(id: &str) -> String {
        format!("{KEY_PREFIX}:{id}")
    }
}

#[async_trait]
impl ProviderApi for CachedProviderApi {
    async fn get_all(&self, query: &Query<Provider>) -> Result<Page<Provider>> {
        let page = self.inner.get_all(query).await?;

        if !page.items.is_empty() {
            let pairs: Vec<(String, String)> = page
                .items
                .iter()
                .map(|provider| (Self::cache_key(&provider.id), provider.provider_identity.clone()))
                .collect();

            let cache = Arc::clone(&self.cache);
            tokio::spawn(async move {
                if let Err(err) = cache.set_many(pairs.clone()).await {
                    tracing::error!(error = %err, "failed to populate provider cache");
                    return;
                }
                for (key, _) in &pairs {
                    if let Err(err) = cache.expire(key, KEY_TTL).await {
                        tracing::error!(error = %err, key, "failed to expire provider cache key");
                    }
                }
            });
        }

        Ok(page)
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Provider>> {
        let cached_identity = match self.cache.get(&Self::cache_key(id)).await {
            Ok(found) => found,
            Err(err) => {
                tracing::error!(error = %err, id, "provider cache read failed");
                None
            }
        };

        let Some(provider_identity) = cached_identity else {
            return self.inner.get_by_id(id).await;
        };

        let query = Query::<Provider>::new()
            .with_condition(ProviderCondition::ProviderIdentity(provider_identity));
        let page = self.inner.get_all(&query).await?;

        Ok(page.items.into_iter().next())
    }
}

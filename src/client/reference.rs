use super::proxy::{ServiceProxy, Subscription};
use crate::Extensions;
use crate::cluster::{ClusterContext, SenderPool};
use crate::notify::ChangeEvent;
use crate::registry::ProviderEntry;
use razor_cluster_core::backoff::retry_registry;
use razor_cluster_core::error::RpcError;
use razor_cluster_core::url::keys;
use razor_cluster_core::{ClientConfig, ServiceIdentity, Url};
use std::sync::Arc;

/// Describes the remote service a consumer wants, resolved by [build](Self::build).
///
/// Providers come either from a registry subscription or, with
/// [direct](Self::direct), from a fixed list that bypasses the registry.
pub struct Reference {
    ext: Arc<Extensions>,
    consumer: Url,
    config: ClientConfig,
    registry: Option<Url>,
    direct: Vec<Url>,
}

impl Reference {
    pub fn new(ext: Arc<Extensions>, interface: impl Into<String>) -> Self {
        Self {
            ext,
            consumer: Url::client(interface),
            config: ClientConfig::default(),
            registry: None,
            direct: Vec::new(),
        }
    }

    pub fn group(mut self, group: &str) -> Self {
        self.consumer = self.consumer.with_param(keys::GROUP, group);
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.consumer = self.consumer.with_param(keys::VERSION, version);
        self
    }

    /// Extra consumer parameter. Known keys (`timeout`, `retries`, `cluster`,
    /// `loadbalance`, `serializer`, `heartbeat`) override the config.
    pub fn param(mut self, key: &str, value: impl ToString) -> Self {
        self.consumer = self.consumer.with_param(key, value);
        self
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn registry(mut self, url: Url) -> Self {
        self.registry = Some(url);
        self
    }

    /// Call these providers only, the registry is not consulted
    pub fn direct(mut self, providers: Vec<Url>) -> Self {
        self.direct = providers;
        self
    }

    #[inline]
    pub fn consumer_url(&self) -> &Url {
        &self.consumer
    }

    /// Resolve every strategy by name, build the sender pool and start following
    /// the providers.
    ///
    /// A registry that cannot be reached is retried with `config.registry_retry`.
    pub async fn build(self) -> Result<ServiceProxy, RpcError> {
        let Self { ext, consumer, config, registry, direct } = self;
        let config = config.overlay(&consumer);
        let service = ServiceIdentity::from_url(&consumer);
        let cluster = ext.cluster(&config.cluster)?;
        let balance = ext.load_balance(&config.loadbalance)?;
        let serializer = ext.serializer(&config.serializer)?;
        let pool = SenderPool::new(service.clone(), config.clone(), ext.clone());
        let ctx = ClusterContext::new(pool.clone(), balance, config.retries);

        let subscription = if !direct.is_empty() {
            info!("{}: direct to {} providers", service, direct.len());
            let providers = direct.into_iter().map(|url| ProviderEntry::new(url, true)).collect();
            pool.apply(&ChangeEvent::new(Url::registry("direct", "", 0), service.clone(), providers));
            None
        } else {
            let registry_url = registry.unwrap_or_else(|| Url::registry("none", "", 0));
            let registry = ext.registry_factory(registry_url.protocol())?.create(&registry_url)?;
            let id = retry_registry(&config.registry_retry, "subscribe", || {
                let (registry, consumer, pool) = (registry.clone(), consumer.clone(), pool.clone());
                async move { registry.subscribe(&consumer, pool).await.map_err(RpcError::from) }
            })
            .await?;
            info!("{}: subscribed to {} as {}", service, registry_url, id);
            Some(Subscription { registry, consumer, id })
        };
        Ok(ServiceProxy::new(service, config, cluster, ctx, serializer, subscription))
    }
}

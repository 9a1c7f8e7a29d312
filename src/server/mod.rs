//! Provider side: a [RpcServer] exports services built with [ServiceBuilder]
//! at one address and publishes them to a registry.

mod service;
pub use service::*;

use crate::Extensions;
use crate::registry::Registry;
use parking_lot::Mutex;
use razor_cluster_codec::CodecPool;
use razor_cluster_core::backoff::retry_registry;
use razor_cluster_core::error::RpcError;
use razor_cluster_core::url::keys;
use razor_cluster_core::{ServerConfig, ServiceIdentity, Url};
use razor_cluster_stream::protocol::Exporter;
use std::sync::Arc;

pub struct RpcServer {
    ext: Arc<Extensions>,
    config: ServerConfig,
    /// protocol, host, port and the params every service url inherits
    base: Url,
    mux: Arc<ServiceMux>,
    exporter: tokio::sync::Mutex<Option<Box<dyn Exporter>>>,
    registry: Arc<dyn Registry>,
    /// Provider urls published to the registry, in export order
    published: Mutex<Vec<Url>>,
}

impl RpcServer {
    /// `base` names the protocol and address to serve on. Without a registry url
    /// the services are reachable by direct reference only.
    pub fn new(
        ext: Arc<Extensions>, config: ServerConfig, base: Url, registry: Option<Url>,
    ) -> Result<Self, RpcError> {
        let mut codecs = Vec::new();
        for name in ext.serializer_names() {
            let factory = ext.serializer_factory(name)?;
            codecs.push(CodecPool::new(name, config.codec_pool_size, move || factory()));
        }
        let registry_url = registry.unwrap_or_else(|| Url::registry("none", "", 0));
        let registry = ext.registry_factory(registry_url.protocol())?.create(&registry_url)?;
        let base = base.with_param(keys::SERIALIZER, &config.serializer);
        Ok(Self {
            ext,
            config,
            base,
            mux: Arc::new(ServiceMux::new(codecs)),
            exporter: tokio::sync::Mutex::new(None),
            registry,
            published: Mutex::new(Vec::new()),
        })
    }

    #[inline]
    pub fn url(&self) -> &Url {
        &self.base
    }

    #[inline]
    pub fn registry(&self) -> &Arc<dyn Registry> {
        &self.registry
    }

    pub fn services(&self) -> Vec<ServiceIdentity> {
        self.mux.services()
    }

    /// Serve `handler` and make it visible: register, then activate.
    ///
    /// The address is exported on the first call. Returns the provider url
    /// published for the service.
    pub async fn export(&self, handler: ServiceHandler) -> Result<Url, RpcError> {
        {
            let mut exporter = self.exporter.lock().await;
            if exporter.is_none() {
                let protocol = self.ext.protocol(self.base.protocol())?;
                exporter.replace(protocol.export(&self.base, self.mux.clone()).await?);
                info!("server exported {}", self.base.address());
            }
        }
        let url = handler.url(&self.base);
        if self.mux.add(Arc::new(handler)).is_some() {
            warn!("server: {} exported again, replaced", url);
        }
        self.publish(&url).await?;
        {
            let mut published = self.published.lock();
            if !published.contains(&url) {
                published.push(url.clone());
            }
        }
        Ok(url)
    }

    /// Register then activate `url`, retrying an unreachable registry
    async fn publish(&self, url: &Url) -> Result<(), RpcError> {
        let retry = &self.config.registry_retry;
        retry_registry(retry, "register", move || async move {
            self.registry.register(url).await.map_err(RpcError::from)
        })
        .await?;
        retry_registry(retry, "activate", move || async move {
            self.registry.activate(url).await.map_err(RpcError::from)
        })
        .await?;
        info!("server: {} published to {}", url, self.registry.url());
        Ok(())
    }

    /// Take every service out of rotation while still serving in-flight calls.
    ///
    /// Consumers stop routing to this server once they see the change, then
    /// `drain_wait` gives their in-flight calls time to finish.
    pub async fn drain(&self) -> Result<(), RpcError> {
        let published = self.published.lock().clone();
        for url in &published {
            retry_registry(&self.config.registry_retry, "deactivate", move || async move {
                self.registry.deactivate(url).await.map_err(RpcError::from)
            })
            .await?;
        }
        info!("server {} drained {} services", self.base.address(), published.len());
        if !self.config.drain_wait.is_zero() {
            tokio::time::sleep(self.config.drain_wait).await;
        }
        Ok(())
    }

    /// Drain, deregister everything and stop serving
    pub async fn shutdown(&self) {
        if let Err(e) = self.drain().await {
            warn!("server {}: drain failed: {}", self.base.address(), e);
        }
        let published = std::mem::take(&mut *self.published.lock());
        for url in &published {
            if let Err(e) = self.registry.deregister(url).await {
                warn!("server: deregister {} failed: {}", url, e);
            }
            self.mux.remove(&ServiceIdentity::from_url(url));
        }
        if let Some(exporter) = self.exporter.lock().await.take() {
            exporter.unexport();
        }
        info!("server {} shut down", self.base.address());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotifyListener;
    use crate::registry::{
        ListenerId, MemoryRegistry, MemoryRegistryFactory, ProviderEntry, RegistryFactory,
    };
    use async_trait::async_trait;
    use razor_cluster_core::error::RpcIntErr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use razor_cluster_core::BackoffConfig;
    use razor_cluster_core::extension::Scope;
    use razor_cluster_local::LocalProtocol;
    use razor_cluster_stream::protocol::Protocol;
    use std::time::Duration;

    fn setup() -> (Arc<Extensions>, LocalProtocol, Arc<MemoryRegistryFactory>) {
        let local = LocalProtocol::new();
        let registries = Arc::new(MemoryRegistryFactory::default());
        let mut ext = Extensions::with_defaults().unwrap();
        let shared: Arc<dyn Protocol> = Arc::new(local.clone());
        ext.protocols_mut().replace("local", Scope::Singleton, move || shared.clone()).unwrap();
        let shared: Arc<dyn RegistryFactory> = registries.clone();
        ext.registries_mut().replace("memory", Scope::Singleton, move || shared.clone()).unwrap();
        (Arc::new(ext), local, registries)
    }

    fn echo() -> ServiceHandler {
        ServiceBuilder::new("demo.Echo")
            .version("1.0")
            .method("echo", |(s,): (String,)| async move { Ok(s) })
            .build()
    }

    #[tokio::test]
    async fn test_publish_lifecycle() {
        let (ext, local, registries) = setup();
        let registry_url = Url::registry("memory", "127.0.0.1", 2181);
        let server = RpcServer::new(
            ext,
            ServerConfig::default(),
            Url::provider("local", "127.0.0.1", 7300, ""),
            Some(registry_url.clone()),
        )
        .unwrap();
        let url = server.export(echo()).await.unwrap();
        assert!(local.is_exported("127.0.0.1:7300"));
        assert_eq!(url.serializer(), Some("msgpack"));
        assert_eq!(server.services(), vec![ServiceIdentity::new("demo.Echo", "", "1.0")]);

        let registry = registries.get(&registry_url);
        let consumer = Url::client("demo.Echo").with_param(keys::VERSION, "1.0");
        assert_eq!(registry.discover(&consumer).await.unwrap(), vec![ProviderEntry::new(url.clone(), true)]);

        server.drain().await.unwrap();
        assert_eq!(registry.discover(&consumer).await.unwrap(), vec![ProviderEntry::new(url.clone(), false)]);

        server.shutdown().await;
        assert!(registry.discover(&consumer).await.unwrap().is_empty());
        assert!(!local.is_exported("127.0.0.1:7300"));
        assert!(server.services().is_empty());
    }

    #[tokio::test]
    async fn test_register_retry() {
        let (ext, _local, registries) = setup();
        let registry_url = Url::registry("memory", "127.0.0.1", 2182);
        let registry = registries.get(&registry_url);
        registry.set_reachable(false);
        let config = ServerConfig {
            registry_retry: BackoffConfig {
                max_attempts: 50,
                initial: Duration::from_millis(5),
                max: Duration::from_millis(10),
                multiplier: 2.0,
                jitter: 0.0,
            },
            ..Default::default()
        };
        let server = RpcServer::new(
            ext,
            config,
            Url::provider("local", "127.0.0.1", 7301, ""),
            Some(registry_url),
        )
        .unwrap();
        let restore = registry.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            restore.set_reachable(true);
        });
        let url = server.export(echo()).await.unwrap();
        let consumer = Url::client("demo.Echo").with_param(keys::VERSION, "1.0");
        assert_eq!(registry.discover(&consumer).await.unwrap(), vec![ProviderEntry::new(url, true)]);
    }

    #[tokio::test]
    async fn test_register_gives_up() {
        let (ext, _local, registries) = setup();
        let registry_url = Url::registry("memory", "127.0.0.1", 2183);
        registries.get(&registry_url).set_reachable(false);
        let config = ServerConfig { registry_retry: BackoffConfig::once(), ..Default::default() };
        let server = RpcServer::new(
            ext,
            config,
            Url::provider("local", "127.0.0.1", 7302, ""),
            Some(registry_url),
        )
        .unwrap();
        let err = server.export(echo()).await.unwrap_err();
        assert!(matches!(err, RpcError::Rpc(razor_cluster_core::error::RpcIntErr::RegistryConnection(_))));
    }

    /// Memory registry counting the calls that take a provider down
    struct Counting {
        inner: Arc<MemoryRegistry>,
        deactivated: AtomicUsize,
        deregistered: AtomicUsize,
    }

    #[async_trait]
    impl Registry for Counting {
        fn url(&self) -> &Url {
            self.inner.url()
        }

        async fn register(&self, provider: &Url) -> Result<(), RpcIntErr> {
            self.inner.register(provider).await
        }

        async fn deregister(&self, provider: &Url) -> Result<(), RpcIntErr> {
            self.deregistered.fetch_add(1, Ordering::SeqCst);
            self.inner.deregister(provider).await
        }

        async fn activate(&self, provider: &Url) -> Result<(), RpcIntErr> {
            self.inner.activate(provider).await
        }

        async fn deactivate(&self, provider: &Url) -> Result<(), RpcIntErr> {
            self.deactivated.fetch_add(1, Ordering::SeqCst);
            self.inner.deactivate(provider).await
        }

        async fn discover(&self, consumer: &Url) -> Result<Vec<ProviderEntry>, RpcIntErr> {
            self.inner.discover(consumer).await
        }

        async fn subscribe(
            &self, consumer: &Url, listener: Arc<dyn NotifyListener>,
        ) -> Result<ListenerId, RpcIntErr> {
            self.inner.subscribe(consumer, listener).await
        }

        async fn unsubscribe(&self, consumer: &Url, id: ListenerId) -> Result<(), RpcIntErr> {
            self.inner.unsubscribe(consumer, id).await
        }
    }

    struct CountingFactory(Arc<Counting>);

    impl RegistryFactory for CountingFactory {
        fn create(&self, _url: &Url) -> Result<Arc<dyn Registry>, RpcIntErr> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_export_twice_published_once() {
        let registry_url = Url::registry("memory", "127.0.0.1", 2184);
        let counting = Arc::new(Counting {
            inner: Arc::new(MemoryRegistry::new(registry_url.clone())),
            deactivated: AtomicUsize::new(0),
            deregistered: AtomicUsize::new(0),
        });
        let mut ext = Extensions::with_defaults().unwrap();
        let local: Arc<dyn Protocol> = Arc::new(LocalProtocol::new());
        ext.protocols_mut().replace("local", Scope::Singleton, move || local.clone()).unwrap();
        let factory: Arc<dyn RegistryFactory> = Arc::new(CountingFactory(counting.clone()));
        ext.registries_mut().replace("memory", Scope::Singleton, move || factory.clone()).unwrap();
        let server = RpcServer::new(
            Arc::new(ext),
            ServerConfig::default(),
            Url::provider("local", "127.0.0.1", 7303, ""),
            Some(registry_url),
        )
        .unwrap();
        let first = server.export(echo()).await.unwrap();
        let second = server.export(echo()).await.unwrap();
        assert_eq!(first, second);

        server.shutdown().await;
        assert_eq!(counting.deactivated.load(Ordering::SeqCst), 1);
        assert_eq!(counting.deregistered.load(Ordering::SeqCst), 1);
        let consumer = Url::client("demo.Echo").with_param(keys::VERSION, "1.0");
        assert!(counting.discover(&consumer).await.unwrap().is_empty());
    }
}

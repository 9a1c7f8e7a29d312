use crate::api::server::{Provider, start_provider};
use razor_cluster::client::Reference;
use razor_cluster_core::extension::Scope;
use razor_cluster::registry::{MemoryRegistry, MemoryRegistryFactory, RegistryFactory};
use razor_cluster::stream::protocol::Protocol;
use razor_cluster::{ClientConfig, Extensions, Url, service_client};
use razor_cluster_local::LocalProtocol;
use std::sync::Arc;
use std::time::Duration;

service_client! {
    /// Typed client of the calculator test service
    pub struct CalcClient("test.Calculator") {
        fn add(a: i64, b: i64) -> i64;
        fn whoami() -> u16;
        fn sleep(ms: u64) -> u16;
        fn fail(msg: String) -> ();
    }
}

/// One process worth of providers and consumers sharing a transport and a registry
pub struct Harness {
    pub ext: Arc<Extensions>,
    pub local: LocalProtocol,
    pub registries: Arc<MemoryRegistryFactory>,
    pub registry_url: Url,
}

impl Harness {
    pub fn new() -> Self {
        let local = LocalProtocol::new();
        let registries = Arc::new(MemoryRegistryFactory::default());
        let mut ext = Extensions::with_defaults().expect("extensions");
        let shared: Arc<dyn Protocol> = Arc::new(local.clone());
        ext.protocols_mut()
            .replace("local", Scope::Singleton, move || shared.clone())
            .expect("replace local");
        let shared: Arc<dyn RegistryFactory> = registries.clone();
        ext.registries_mut()
            .replace("memory", Scope::Singleton, move || shared.clone())
            .expect("replace memory");
        Self {
            ext: Arc::new(ext),
            local,
            registries,
            registry_url: Url::registry("memory", "127.0.0.1", 2181),
        }
    }

    pub fn registry(&self) -> Arc<MemoryRegistry> {
        self.registries.get(&self.registry_url)
    }

    pub async fn provider(&self, port: u16) -> Provider {
        start_provider(&self.ext, Some(self.registry_url.clone()), port, None)
            .await
            .expect("start provider")
    }

    pub async fn providers(&self, ports: &[u16]) -> Vec<Provider> {
        let mut providers = Vec::new();
        for port in ports {
            providers.push(self.provider(*port).await);
        }
        providers
    }

    pub fn config() -> ClientConfig {
        ClientConfig {
            health_check_interval: Duration::from_millis(100),
            connect_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    pub fn reference(&self) -> Reference {
        Reference::new(self.ext.clone(), CalcClient::INTERFACE)
            .version("1.0")
            .registry(self.registry_url.clone())
            .config(Self::config())
    }

    /// Build a client from `reference` and wait for `active` providers to be routable
    pub async fn client(&self, reference: Reference, active: usize) -> CalcClient {
        let proxy = reference.build().await.expect("build reference");
        assert!(proxy.pool().wait_active(active, Duration::from_secs(3)).await);
        CalcClient::new(proxy)
    }
}

/// Poll `cond` every few milliseconds until it holds or `timeout` passes
pub async fn wait_until<F: Fn() -> bool>(cond: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    true
}

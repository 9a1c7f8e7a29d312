use super::{ListenerId, ProviderEntry, Registry, RegistryFactory};
use crate::notify::{self, ChangeEvent, NotifyListener};
use async_trait::async_trait;
use parking_lot::Mutex;
use razor_cluster_core::error::RpcIntErr;
use razor_cluster_core::{ServiceIdentity, Url};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
struct ServiceEntry {
    /// In registration order
    providers: Vec<ProviderEntry>,
    listeners: Vec<(ListenerId, Arc<dyn NotifyListener>)>,
}

impl ServiceEntry {
    fn position(&self, url: &Url) -> Option<usize> {
        self.providers.iter().position(|p| &p.url == url)
    }
}

/// A registry living in the process memory.
///
/// Mutations of one registry are applied and delivered one at a time, so
/// every listener sees the changes of a service in the order they happened.
pub struct MemoryRegistry {
    url: Url,
    services: Mutex<HashMap<ServiceIdentity, ServiceEntry>>,
    /// Held from applying a change until its listeners have returned
    delivery: Mutex<()>,
    next_listener: AtomicU64,
    reachable: AtomicBool,
}

impl MemoryRegistry {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            services: Mutex::new(HashMap::new()),
            delivery: Mutex::new(()),
            next_listener: AtomicU64::new(1),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate losing the connection to the registry: while unreachable, every
    /// operation fails with `RegistryConnection`.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Release);
        info!("registry {} reachable={}", self.url, reachable);
    }

    fn check_reachable(&self) -> Result<(), RpcIntErr> {
        if self.reachable.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(RpcIntErr::RegistryConnection(format!("{} unreachable", self.url.address())))
        }
    }

    /// Apply `f` to the entry of `provider`'s service and notify if it reports a change
    fn update<F>(&self, provider: &Url, f: F) -> Result<(), RpcIntErr>
    where
        F: FnOnce(&mut ServiceEntry) -> bool,
    {
        self.check_reachable()?;
        let service = ServiceIdentity::from_url(provider);
        let _delivery = self.delivery.lock();
        let (event, listeners) = {
            let mut services = self.services.lock();
            let entry = services.entry(service.clone()).or_default();
            if !f(entry) {
                return Ok(());
            }
            let event = ChangeEvent::new(self.url.clone(), service, entry.providers.clone());
            let listeners: Vec<_> = entry.listeners.iter().map(|(_, l)| l.clone()).collect();
            (event, listeners)
        };
        debug!(
            "registry {} {}: {} providers, {} active",
            self.url,
            event.service,
            event.providers.len(),
            event.active().count()
        );
        notify::dispatch(&listeners, &event);
        Ok(())
    }

    fn set_active(&self, provider: &Url, active: bool) -> Result<(), RpcIntErr> {
        self.update(provider, |entry| match entry.position(provider) {
            Some(i) if entry.providers[i].active != active => {
                entry.providers[i].active = active;
                true
            }
            Some(_) => false,
            None => {
                warn!("registry: {} is not registered, ignore activate={}", provider, active);
                false
            }
        })
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn register(&self, provider: &Url) -> Result<(), RpcIntErr> {
        self.update(provider, |entry| {
            if entry.position(provider).is_some() {
                return false;
            }
            entry.providers.push(ProviderEntry::new(provider.clone(), false));
            true
        })
    }

    async fn deregister(&self, provider: &Url) -> Result<(), RpcIntErr> {
        self.update(provider, |entry| match entry.position(provider) {
            Some(i) => {
                entry.providers.remove(i);
                true
            }
            None => false,
        })
    }

    async fn activate(&self, provider: &Url) -> Result<(), RpcIntErr> {
        self.set_active(provider, true)
    }

    async fn deactivate(&self, provider: &Url) -> Result<(), RpcIntErr> {
        self.set_active(provider, false)
    }

    async fn discover(&self, consumer: &Url) -> Result<Vec<ProviderEntry>, RpcIntErr> {
        self.check_reachable()?;
        let service = ServiceIdentity::from_url(consumer);
        Ok(self.services.lock().get(&service).map(|e| e.providers.clone()).unwrap_or_default())
    }

    /// The listener is called once with the current providers before this returns.
    async fn subscribe(
        &self, consumer: &Url, listener: Arc<dyn NotifyListener>,
    ) -> Result<ListenerId, RpcIntErr> {
        self.check_reachable()?;
        let service = ServiceIdentity::from_url(consumer);
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        let _delivery = self.delivery.lock();
        let event = {
            let mut services = self.services.lock();
            let entry = services.entry(service.clone()).or_default();
            entry.listeners.push((id, listener.clone()));
            ChangeEvent::new(self.url.clone(), service, entry.providers.clone())
        };
        debug!("registry {} {} subscribed {}", self.url, event.service, id);
        listener.notify(&event);
        Ok(id)
    }

    async fn unsubscribe(&self, consumer: &Url, id: ListenerId) -> Result<(), RpcIntErr> {
        self.check_reachable()?;
        let service = ServiceIdentity::from_url(consumer);
        let _delivery = self.delivery.lock();
        if let Some(entry) = self.services.lock().get_mut(&service) {
            entry.listeners.retain(|(lid, _)| *lid != id);
        }
        Ok(())
    }
}

/// Hands out one [MemoryRegistry] per registry address
#[derive(Default)]
pub struct MemoryRegistryFactory {
    registries: Mutex<HashMap<String, Arc<MemoryRegistry>>>,
}

impl MemoryRegistryFactory {
    /// The concrete registry for `url`, for callers that need [MemoryRegistry::set_reachable]
    pub fn get(&self, url: &Url) -> Arc<MemoryRegistry> {
        self.registries
            .lock()
            .entry(url.address())
            .or_insert_with(|| Arc::new(MemoryRegistry::new(url.clone())))
            .clone()
    }
}

impl RegistryFactory for MemoryRegistryFactory {
    fn create(&self, url: &Url) -> Result<Arc<dyn Registry>, RpcIntErr> {
        Ok(self.get(url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> MemoryRegistry {
        MemoryRegistry::new(Url::registry("memory", "127.0.0.1", 2181))
    }

    fn provider(port: u16) -> Url {
        Url::provider("local", "127.0.0.1", port, "demo.Echo").with_param("version", "1.0")
    }

    fn consumer() -> Url {
        Url::client("demo.Echo").with_param("version", "1.0")
    }

    #[tokio::test]
    async fn test_register_activate_deregister() {
        let reg = registry();
        let e = provider(9001);
        reg.register(&e).await.unwrap();
        assert_eq!(reg.discover(&consumer()).await.unwrap(), vec![ProviderEntry::new(e.clone(), false)]);
        reg.activate(&e).await.unwrap();
        assert_eq!(reg.discover(&consumer()).await.unwrap(), vec![ProviderEntry::new(e.clone(), true)]);
        reg.deactivate(&e).await.unwrap();
        assert_eq!(reg.discover(&consumer()).await.unwrap(), vec![ProviderEntry::new(e.clone(), false)]);
        reg.deregister(&e).await.unwrap();
        assert!(reg.discover(&consumer()).await.unwrap().is_empty());
        // idempotent
        reg.deregister(&e).await.unwrap();
    }

    #[tokio::test]
    async fn test_register_idempotent() {
        let reg = registry();
        let e = provider(9001);
        reg.register(&e).await.unwrap();
        reg.activate(&e).await.unwrap();
        // registering again must not reset the active flag
        reg.register(&e).await.unwrap();
        assert_eq!(reg.discover(&consumer()).await.unwrap(), vec![ProviderEntry::new(e, true)]);
    }

    #[tokio::test]
    async fn test_service_identity_isolation() {
        let reg = registry();
        reg.register(&provider(9001)).await.unwrap();
        let other = Url::provider("local", "127.0.0.1", 9001, "demo.Echo").with_param("version", "2.0");
        reg.register(&other).await.unwrap();
        let found = reg.discover(&consumer()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].url, provider(9001));
        assert!(reg.discover(&Url::client("demo.Other")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_subscribe_order() {
        let reg = registry();
        let (a, b) = (provider(9001), provider(9002));
        reg.register(&a).await.unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let listener = move |e: &ChangeEvent| {
            let snapshot: Vec<(u16, bool)> = e.providers.iter().map(|p| (p.url.port(), p.active)).collect();
            s.lock().push(snapshot);
        };
        let id = reg.subscribe(&consumer(), Arc::new(listener)).await.unwrap();
        reg.activate(&a).await.unwrap();
        reg.register(&b).await.unwrap();
        reg.activate(&b).await.unwrap();
        // no change, no event
        reg.activate(&b).await.unwrap();
        reg.deactivate(&a).await.unwrap();
        reg.deregister(&a).await.unwrap();
        reg.unsubscribe(&consumer(), id).await.unwrap();
        reg.deregister(&b).await.unwrap();
        assert_eq!(
            *seen.lock(),
            vec![
                vec![(9001, false)],
                vec![(9001, true)],
                vec![(9001, true), (9002, false)],
                vec![(9001, true), (9002, true)],
                vec![(9001, false), (9002, true)],
                vec![(9002, true)],
            ]
        );
    }

    #[tokio::test]
    async fn test_unreachable() {
        let reg = registry();
        reg.set_reachable(false);
        let res = reg.register(&provider(9001)).await;
        assert!(matches!(res, Err(RpcIntErr::RegistryConnection(_))));
        assert!(reg.discover(&consumer()).await.is_err());
        reg.set_reachable(true);
        reg.register(&provider(9001)).await.unwrap();
    }

    #[test]
    fn test_factory_shares_by_address() {
        let factory = MemoryRegistryFactory::default();
        let a = factory.get(&Url::registry("memory", "10.0.0.1", 2181));
        let b = factory.get(&Url::registry("memory", "10.0.0.1", 2181).with_param("timeout", 10));
        let c = factory.get(&Url::registry("memory", "10.0.0.2", 2181));
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }
}

use crate::Extensions;
use crate::notify::{self, ChangeEvent, NotifyListener};
use crate::registry::ProviderEntry;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use razor_cluster_core::error::RpcError;
use razor_cluster_core::{BackoffConfig, ClientConfig, ServiceIdentity, Url};
use razor_cluster_stream::{Channel, ChannelConfig, ChannelState, Sender};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// The senders of one service, kept in line with the registry.
///
/// Readers (the load balancers) take a snapshot of the list without locking.
/// Writers (change events, eviction) are serialized and publish a new list,
/// so a membership change never blocks sends on the senders it leaves alone.
pub struct SenderPool {
    service: ServiceIdentity,
    config: ClientConfig,
    ext: Arc<Extensions>,
    senders: ArcSwap<Vec<Arc<Sender>>>,
    update: Mutex<()>,
    registry: Mutex<Option<Url>>,
    listeners: Mutex<Vec<Arc<dyn NotifyListener>>>,
    closed: AtomicBool,
}

impl SenderPool {
    pub fn new(service: ServiceIdentity, config: ClientConfig, ext: Arc<Extensions>) -> Arc<Self> {
        Arc::new(Self {
            service,
            config,
            ext,
            senders: ArcSwap::from_pointee(Vec::new()),
            update: Mutex::new(()),
            registry: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn service(&self) -> &ServiceIdentity {
        &self.service
    }

    /// Every sender, in insertion order
    #[inline]
    pub fn senders(&self) -> Arc<Vec<Arc<Sender>>> {
        self.senders.load_full()
    }

    /// The routable subset, in insertion order
    pub fn active(&self) -> Vec<Arc<Sender>> {
        self.senders.load().iter().filter(|s| s.is_active()).cloned().collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.senders.load().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Observe membership changes of this pool
    pub fn add_listener(&self, listener: Arc<dyn NotifyListener>) {
        self.listeners.lock().push(listener);
    }

    /// Wait until at least `count` senders are routable
    pub async fn wait_active(&self, count: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.active().len() >= count {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Reconcile with the provider list of `event`.
    ///
    /// Senders whose url is still listed are kept (with the registry's active
    /// flag applied), new urls get a sender appended at the tail, the rest are
    /// destroyed.
    pub fn apply(&self, event: &ChangeEvent) {
        if event.service != self.service || self.closed.load(Ordering::Acquire) {
            return;
        }
        let _update = self.update.lock();
        // destroy() may have won the race for the lock
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.registry.lock().replace(event.registry.clone());
        let current = self.senders.load_full();
        let mut next: Vec<Arc<Sender>> = Vec::with_capacity(event.providers.len());
        let mut changed = false;
        for sender in current.iter() {
            match event.providers.iter().find(|p| &p.url == sender.url()) {
                Some(entry) => {
                    if sender.is_enabled() != entry.active {
                        sender.set_enabled(entry.active);
                        changed = true;
                    }
                    next.push(sender.clone());
                }
                None => {
                    changed = true;
                    info!("pool {}: remove {}", self.service, sender.url());
                    let sender = sender.clone();
                    tokio::spawn(async move { sender.destroy().await });
                }
            }
        }
        for entry in &event.providers {
            if next.iter().any(|s| s.url() == &entry.url) {
                continue;
            }
            match self.new_sender(&entry.url) {
                Ok(sender) => {
                    sender.set_enabled(entry.active);
                    info!("pool {}: add {} active={}", self.service, entry.url, entry.active);
                    self.spawn_connect(sender.clone());
                    next.push(sender);
                    changed = true;
                }
                Err(e) => error!("pool {}: cannot refer {}: {}", self.service, entry.url, e),
            }
        }
        if changed {
            self.senders.store(Arc::new(next));
            self.notify_listeners();
        }
    }

    /// Remove a sender whose channel is gone for good
    pub fn evict(&self, sender: &Arc<Sender>) {
        let _update = self.update.lock();
        let current = self.senders.load_full();
        if !current.iter().any(|s| Arc::ptr_eq(s, sender)) {
            return;
        }
        let next: Vec<Arc<Sender>> =
            current.iter().filter(|s| !Arc::ptr_eq(s, sender)).cloned().collect();
        self.senders.store(Arc::new(next));
        warn!("pool {}: evict {}", self.service, sender.url());
        let sender = sender.clone();
        tokio::spawn(async move { sender.destroy().await });
        self.notify_listeners();
    }

    /// Close every sender, later change events are ignored
    pub async fn destroy(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let senders = {
            let _update = self.update.lock();
            self.senders.swap(Arc::new(Vec::new()))
        };
        for sender in senders.iter() {
            sender.destroy().await;
        }
        info!("pool {} destroyed", self.service);
    }

    fn new_sender(&self, url: &Url) -> Result<Arc<Sender>, RpcError> {
        let name = if url.protocol().is_empty() { self.config.protocol.as_str() } else { url.protocol() };
        let protocol = self.ext.protocol(name)?;
        let backend = protocol.refer(url)?;
        let channel = Channel::new(
            url.clone(),
            backend,
            ChannelConfig::from(&self.config),
            self.ext.new_logger(),
        );
        Ok(Arc::new(Sender::new(url.clone(), channel)))
    }

    /// Open the channel, retrying until it connects or the sender is destroyed.
    /// A channel that connects but fails its first health check is left to the heartbeat.
    fn spawn_connect(&self, sender: Arc<Sender>) {
        let backoff = BackoffConfig { max: Duration::from_secs(1), ..Default::default() };
        tokio::spawn(async move {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match sender.connect().await {
                    Ok(()) => return,
                    Err(e) => {
                        if sender.channel().state() != ChannelState::Created {
                            debug!("{:?}: {}", sender, e);
                            return;
                        }
                        let delay = backoff.delay(attempt);
                        debug!("{:?} connect failed: {}, retry in {:?}", sender, e, delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        });
    }

    fn notify_listeners(&self) {
        let listeners = self.listeners.lock().clone();
        if listeners.is_empty() {
            return;
        }
        let registry = self.registry.lock().clone().unwrap_or_else(|| Url::registry("none", "", 0));
        let providers = self
            .senders
            .load()
            .iter()
            .map(|s| ProviderEntry::new(s.url().clone(), s.is_enabled()))
            .collect();
        let event = ChangeEvent::new(registry, self.service.clone(), providers);
        notify::dispatch(&listeners, &event);
    }
}

impl NotifyListener for SenderPool {
    fn notify(&self, event: &ChangeEvent) {
        self.apply(event)
    }
}

impl std::fmt::Debug for SenderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "pool({}, {} senders)", self.service, self.len())
    }
}

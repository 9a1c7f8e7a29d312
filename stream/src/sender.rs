use crate::channel::Channel;
use razor_cluster_core::Url;
use razor_cluster_core::error::RpcError;
use razor_cluster_core::proto::Request;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Dispatch unit bound to one provider.
///
/// A sender is routable when the registry has it enabled and its channel is
/// `Active`. Its lifetime belongs to the sender pool, not to a call.
pub struct Sender {
    url: Url,
    channel: Channel,
    enabled: AtomicBool,
    /// Business requests in flight, health checks excluded
    active: AtomicUsize,
}

/// Counts one business request as in flight until dropped
pub struct InflightGuard<'a>(&'a AtomicUsize);

impl Drop for InflightGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Sender {
    pub fn new(url: Url, channel: Channel) -> Self {
        Self { url, channel, enabled: AtomicBool::new(true), active: AtomicUsize::new(0) }
    }

    #[inline]
    pub fn url(&self) -> &Url {
        &self.url
    }

    #[inline]
    pub fn channel(&self) -> &Channel {
        &self.channel
    }

    #[inline]
    pub fn weight(&self) -> u32 {
        self.url.weight()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.enabled.load(Ordering::Acquire) && self.channel.is_active()
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Follow the registry's active/inactive tag without touching the channel
    #[inline]
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    /// Business requests currently in flight
    #[inline]
    pub fn inflight(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Open the underlying channel
    pub async fn connect(&self) -> Result<(), RpcError> {
        self.channel.open().await
    }

    /// Count a request as in flight for as long as the guard lives
    #[inline]
    pub fn track(&self) -> InflightGuard<'_> {
        self.active.fetch_add(1, Ordering::AcqRel);
        InflightGuard(&self.active)
    }

    /// Send and wait for the response or the deadline
    pub async fn send_request(&self, req: &Request) -> Result<Vec<u8>, RpcError> {
        let _guard = self.track();
        let fut = self.channel.send_request(req).await?;
        fut.wait().await
    }

    /// Close the channel, idempotent
    pub async fn destroy(&self) {
        self.channel.close().await
    }
}

impl fmt::Debug for Sender {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "sender({}, {}, enabled={})", self.url, self.channel.state(), self.is_enabled())
    }
}

//! Stateful logical connection to one provider.
//!
//! A [Channel] drives its [ChannelBackend] through the lifecycle in
//! [ChannelState], assigns a `seq` to every outgoing packet, and matches
//! responses back to their [FutureResponse] through the in-flight table.
//! Responses may arrive in any order.

use crate::future::FutureResponse;
use crate::inflight::InflightTable;
use crate::state::{ChannelState, StateCell};
use async_trait::async_trait;
use captains_log::filter::LogFilter;
use parking_lot::Mutex;
use razor_cluster_core::error::{RpcError, RpcIntErr};
use razor_cluster_core::proto::{Request, RpcReqPacket, RpcRespPacket};
use razor_cluster_core::{ClientConfig, Url};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::AbortHandle;

/// This trait is for the transport under a channel.
///
/// The implementation can be found on:
///
/// - `razor-cluster-local`: in-process transport
#[async_trait]
pub trait ChannelBackend: Send + Sync + 'static {
    /// Allocate the transport resource. Incoming responses and disconnects
    /// are reported through `events`.
    async fn connect(&self, events: ChannelEvents) -> Result<(), RpcIntErr>;

    /// Write one packet. The response, if any, comes back through [ChannelEvents].
    async fn send(&self, packet: RpcReqPacket) -> Result<(), RpcIntErr>;

    /// Release the transport resource
    async fn close(&self);

    fn local_addr(&self) -> String {
        String::new()
    }

    fn remote_addr(&self) -> String {
        String::new()
    }
}

#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Zero disables the periodic health check
    pub health_check_interval: Duration,
    pub health_check_timeout: Duration,
    pub connect_timeout: Duration,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            health_check_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(3),
        }
    }
}

impl From<&ClientConfig> for ChannelConfig {
    fn from(config: &ClientConfig) -> Self {
        Self {
            health_check_interval: config.health_check_interval,
            health_check_timeout: config.connect_timeout,
            connect_timeout: config.connect_timeout,
        }
    }
}

/// Handle given to the backend to report what happens on the wire
#[derive(Clone)]
pub struct ChannelEvents(Weak<ChannelInner>);

impl ChannelEvents {
    pub fn on_response(&self, packet: RpcRespPacket) {
        if let Some(inner) = self.0.upgrade() {
            inner.on_response(packet);
        }
    }

    pub fn on_disconnect(&self, reason: &str) {
        if let Some(inner) = self.0.upgrade() {
            inner.mark_inactive(reason);
        }
    }

    /// Whether both handles report to the same channel
    #[inline]
    pub fn same_channel(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }

    /// False once the channel is dropped
    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

struct ChannelInner {
    url: Url,
    state: StateCell,
    backend: Arc<dyn ChannelBackend>,
    inflight: InflightTable,
    seq: AtomicU64,
    config: ChannelConfig,
    logger: Arc<LogFilter>,
    heartbeat: Mutex<Option<AbortHandle>>,
}

#[derive(Clone)]
pub struct Channel(Arc<ChannelInner>);

impl Channel {
    pub fn new(
        url: Url, backend: Arc<dyn ChannelBackend>, config: ChannelConfig, logger: Arc<LogFilter>,
    ) -> Self {
        Self(Arc::new(ChannelInner {
            url,
            state: StateCell::new(),
            backend,
            inflight: InflightTable::new(),
            seq: AtomicU64::new(1),
            config,
            logger,
            heartbeat: Mutex::new(None),
        }))
    }

    #[inline]
    pub fn url(&self) -> &Url {
        &self.0.url
    }

    #[inline]
    pub fn state(&self) -> ChannelState {
        self.0.state.get()
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.state() == ChannelState::Active
    }

    /// Number of requests waiting for a response, health checks included
    #[inline]
    pub fn inflight(&self) -> usize {
        self.0.inflight.len()
    }

    pub fn local_addr(&self) -> String {
        self.0.backend.local_addr()
    }

    pub fn remote_addr(&self) -> String {
        self.0.backend.remote_addr()
    }

    /// Connect the backend, pass the first health check and start the heartbeat.
    ///
    /// Only valid on a freshly created channel. When the health check fails the
    /// channel stays `Initialized` and the heartbeat keeps trying.
    pub async fn open(&self) -> Result<(), RpcError> {
        let inner = &self.0;
        match inner.state.get() {
            ChannelState::Created => {}
            ChannelState::Closed => return Err(RpcIntErr::ChannelClosed.into()),
            _ => return Ok(()),
        }
        let events = ChannelEvents(Arc::downgrade(inner));
        match tokio::time::timeout(inner.config.connect_timeout, inner.backend.connect(events))
            .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(RpcError::Rpc(RpcIntErr::Timeout)),
        }
        if inner.state.transition(ChannelState::Initialized).is_err() {
            // closed while connecting
            inner.backend.close().await;
            return Err(RpcIntErr::ChannelClosed.into());
        }
        logger_debug!(inner.logger, "channel {} initialized", inner.url);
        let healthy = self.health_check().await;
        self.start_heartbeat();
        if healthy { Ok(()) } else { Err(RpcIntErr::ChannelInactive.into()) }
    }

    /// Round trip a ping. Success makes the channel `Active`, failure moves an
    /// `Active` channel to `Inactive`.
    pub async fn health_check(&self) -> bool {
        let inner = &self.0;
        let state = inner.state.get();
        if matches!(state, ChannelState::Created | ChannelState::Closed) {
            return false;
        }
        let deadline = Instant::now() + inner.config.health_check_timeout;
        let res = match inner.dispatch(RpcReqPacket::ping, deadline).await {
            Ok(fut) => fut.wait().await.map(|_| ()),
            Err(e) => Err(e),
        };
        match res {
            Ok(()) => {
                if let Ok(prev) = inner.state.transition(ChannelState::Active) {
                    logger_info!(inner.logger, "channel {} {} -> Active", inner.url, prev);
                }
                true
            }
            Err(e) => {
                inner.mark_inactive(&format!("health check failed: {}", e));
                false
            }
        }
    }

    /// Send a business request, the returned future resolves with its response.
    pub async fn send_request(&self, req: &Request) -> Result<FutureResponse, RpcError> {
        let inner = &self.0;
        match inner.state.get() {
            ChannelState::Active => {}
            ChannelState::Closed => return Err(RpcIntErr::ChannelClosed.into()),
            _ => return Err(RpcIntErr::ChannelInactive.into()),
        }
        if req.is_expired() {
            return Err(RpcError::Rpc(RpcIntErr::Timeout));
        }
        let req = req.clone();
        let deadline = req.deadline;
        inner.dispatch(move |seq| RpcReqPacket::call(seq, req), deadline).await
    }

    /// Take the channel out of rotation until the next successful health check
    pub fn deactivate(&self) {
        self.0.mark_inactive("deactivated");
    }

    /// Close for good, failing every in-flight request with `ChannelClosed`.
    /// Calling it again is a no-op.
    pub async fn close(&self) {
        let inner = &self.0;
        let prev = match inner.state.transition(ChannelState::Closed) {
            Ok(prev) => prev,
            Err(_) => return,
        };
        logger_info!(inner.logger, "channel {} {} -> Closed", inner.url, prev);
        if let Some(heartbeat) = inner.heartbeat.lock().take() {
            heartbeat.abort();
        }
        for fut in inner.inflight.drain() {
            fut.resolve(Err(RpcError::Rpc(RpcIntErr::ChannelClosed)));
        }
        if prev != ChannelState::Created {
            inner.backend.close().await;
        }
    }

    fn start_heartbeat(&self) {
        let interval = self.0.config.health_check_interval;
        if interval.is_zero() {
            return;
        }
        let weak = Arc::downgrade(&self.0);
        let task = tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(inner) = weak.upgrade() else { return };
                if inner.state.get() == ChannelState::Closed {
                    return;
                }
                Channel(inner).health_check().await;
            }
        });
        let mut heartbeat = self.0.heartbeat.lock();
        if self.0.state.get() == ChannelState::Closed {
            task.abort();
        } else if let Some(old) = heartbeat.replace(task.abort_handle()) {
            old.abort();
        }
    }
}

impl ChannelInner {
    /// Register a future under a fresh seq, arm its deadline and write the packet.
    async fn dispatch<F>(self: &Arc<Self>, make: F, deadline: Instant) -> Result<FutureResponse, RpcError>
    where
        F: FnOnce(u64) -> RpcReqPacket,
    {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let fut = FutureResponse::new(seq);
        self.inflight.insert(fut.clone());
        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline.into()).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(seq);
            }
        });
        self.inflight.set_timer(seq, timer.abort_handle());
        let packet = make(seq);
        logger_trace!(self.logger, "channel {} send seq={} {:?}", self.url, seq, packet.action);
        if let Err(e) = self.backend.send(packet).await {
            if let Some(fut) = self.inflight.take(seq) {
                fut.resolve(Err(e.clone().into()));
            }
            self.mark_inactive(&e.to_string());
            return Err(e.into());
        }
        Ok(fut)
    }

    fn on_response(&self, packet: RpcRespPacket) {
        match self.inflight.take(packet.seq) {
            Some(fut) => {
                fut.resolve(packet.res);
            }
            None => {
                logger_warn!(
                    self.logger,
                    "channel {} discard response seq={}, no longer in flight",
                    self.url,
                    packet.seq
                );
            }
        }
    }

    fn expire(&self, seq: u64) {
        if let Some(fut) = self.inflight.take(seq) {
            logger_debug!(self.logger, "channel {} seq={} timed out", self.url, seq);
            fut.resolve(Err(RpcError::Rpc(RpcIntErr::Timeout)));
        }
    }

    fn mark_inactive(&self, reason: &str) {
        if self.state.transition(ChannelState::Inactive).is_ok() {
            logger_warn!(self.logger, "channel {} Active -> Inactive: {}", self.url, reason);
        }
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "channel({}, {})", self.0.url, self.state())
    }
}

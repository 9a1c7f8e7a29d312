#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # razor-cluster-local
//!
//! This crate provides an in-process transport for [`razor-cluster-stream`](https://docs.rs/razor-cluster-stream).
//! Providers export an [InvocationHandler] under an address, consumers in the same process reach it
//! through a [Channel](razor_cluster_stream::Channel) exactly as they would a remote one: requests
//! are matched by `seq`, responses come back through [ChannelEvents], and an unexport is observed
//! as a disconnect.
//!
//! The export table belongs to one [LocalProtocol] instance, clone it to share.

#[macro_use]
extern crate captains_log;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use razor_cluster_core::Url;
use razor_cluster_core::error::RpcIntErr;
use razor_cluster_core::proto::{RpcAction, RpcReqPacket, RpcRespPacket};
use razor_cluster_stream::channel::{ChannelBackend, ChannelEvents};
use razor_cluster_stream::protocol::{Exporter, Protocol};
use razor_cluster_stream::server::InvocationHandler;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

pub const PROTOCOL_NAME: &str = "local";

struct Endpoint {
    id: u64,
    handler: Arc<dyn InvocationHandler>,
    closed: AtomicBool,
    /// Refuse traffic without dropping peers, see [LocalProtocol::suspend]
    suspended: AtomicBool,
    peers: Mutex<Vec<ChannelEvents>>,
}

impl Endpoint {
    /// Track a connected channel, forgetting the ones already dropped
    fn attach(&self, events: &ChannelEvents) {
        let mut peers = self.peers.lock();
        peers.retain(|p| p.is_alive());
        peers.push(events.clone());
    }

    fn detach(&self, events: &ChannelEvents) {
        self.peers.lock().retain(|p| !p.same_channel(events));
    }

    fn shutdown(&self, reason: &str) {
        self.closed.store(true, Ordering::Release);
        let peers = std::mem::take(&mut *self.peers.lock());
        for peer in peers {
            peer.on_disconnect(reason);
        }
    }
}

type ExportTable = Arc<RwLock<HashMap<String, Arc<Endpoint>>>>;

#[derive(Clone, Default)]
pub struct LocalProtocol {
    exports: ExportTable,
    next_id: Arc<AtomicU64>,
}

impl LocalProtocol {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether something is exported at `address` ("host:port")
    pub fn is_exported(&self, address: &str) -> bool {
        self.exports.read().contains_key(address)
    }

    /// Make the provider at `address` fail every packet with a transport error,
    /// as a peer behind a broken link would. Connected channels are not told.
    pub fn suspend(&self, address: &str) -> bool {
        self.set_suspended(address, true)
    }

    pub fn resume(&self, address: &str) -> bool {
        self.set_suspended(address, false)
    }

    fn set_suspended(&self, address: &str, suspended: bool) -> bool {
        match self.exports.read().get(address) {
            Some(ep) => {
                ep.suspended.store(suspended, Ordering::Release);
                info!("local {} suspended={}", address, suspended);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl Protocol for LocalProtocol {
    fn name(&self) -> &'static str {
        PROTOCOL_NAME
    }

    fn refer(&self, url: &Url) -> Result<Arc<dyn ChannelBackend>, RpcIntErr> {
        Ok(Arc::new(LocalBackend {
            address: url.address(),
            exports: self.exports.clone(),
            link: Mutex::new(None),
        }))
    }

    async fn export(
        &self, url: &Url, handler: Arc<dyn InvocationHandler>,
    ) -> Result<Box<dyn Exporter>, RpcIntErr> {
        let address = url.address();
        let mut exports = self.exports.write();
        if exports.contains_key(&address) {
            return Err(RpcIntErr::Transport(format!("address {} already in use", address)));
        }
        let endpoint = Arc::new(Endpoint {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            handler,
            closed: AtomicBool::new(false),
            suspended: AtomicBool::new(false),
            peers: Mutex::new(Vec::new()),
        });
        exports.insert(address.clone(), endpoint.clone());
        debug!("local exported {}", address);
        Ok(Box::new(LocalExporter {
            url: url.clone(),
            address,
            endpoint,
            exports: self.exports.clone(),
        }))
    }
}

pub struct LocalExporter {
    url: Url,
    address: String,
    endpoint: Arc<Endpoint>,
    exports: ExportTable,
}

impl Exporter for LocalExporter {
    fn url(&self) -> &Url {
        &self.url
    }

    fn unexport(&self) {
        {
            let mut exports = self.exports.write();
            // the address may have been exported again by someone else
            if exports.get(&self.address).is_some_and(|ep| ep.id == self.endpoint.id) {
                exports.remove(&self.address);
            }
        }
        if !self.endpoint.closed.load(Ordering::Acquire) {
            debug!("local unexported {}", self.address);
            self.endpoint.shutdown("provider unexported");
        }
    }
}

impl Drop for LocalExporter {
    fn drop(&mut self) {
        self.unexport();
    }
}

struct Link {
    endpoint: Arc<Endpoint>,
    events: ChannelEvents,
}

/// Client side of a local channel
pub struct LocalBackend {
    address: String,
    exports: ExportTable,
    link: Mutex<Option<Link>>,
}

impl LocalBackend {
    /// The endpoint behind this link. When the linked one is gone and the address
    /// was exported again, as after a provider restart, the link moves to the new one.
    fn link(&self) -> Result<(Arc<Endpoint>, ChannelEvents), RpcIntErr> {
        let mut guard = self.link.lock();
        let Some(link) = guard.as_mut() else {
            return Err(RpcIntErr::Transport(format!("{} not connected", self.address)));
        };
        if link.endpoint.closed.load(Ordering::Acquire) {
            let fresh = self.exports.read().get(&self.address).cloned();
            match fresh {
                Some(ep) if !ep.closed.load(Ordering::Acquire) => {
                    ep.attach(&link.events);
                    debug!("local {} relinked to export #{}", self.address, ep.id);
                    link.endpoint = ep;
                }
                _ => {
                    return Err(RpcIntErr::Transport(format!(
                        "connection to {} reset",
                        self.address
                    )));
                }
            }
        }
        let ep = &link.endpoint;
        if ep.suspended.load(Ordering::Acquire) {
            return Err(RpcIntErr::Transport(format!("connection to {} reset", self.address)));
        }
        Ok((ep.clone(), link.events.clone()))
    }
}

#[async_trait]
impl ChannelBackend for LocalBackend {
    async fn connect(&self, events: ChannelEvents) -> Result<(), RpcIntErr> {
        let endpoint = self.exports.read().get(&self.address).cloned();
        let Some(endpoint) = endpoint else {
            return Err(RpcIntErr::Transport(format!("connection refused by {}", self.address)));
        };
        if endpoint.suspended.load(Ordering::Acquire) {
            return Err(RpcIntErr::Transport(format!("connection refused by {}", self.address)));
        }
        endpoint.attach(&events);
        if let Some(old) = self.link.lock().replace(Link { endpoint, events }) {
            old.endpoint.detach(&old.events);
        }
        Ok(())
    }

    async fn send(&self, packet: RpcReqPacket) -> Result<(), RpcIntErr> {
        let (endpoint, events) = self.link()?;
        let seq = packet.seq;
        match (packet.action, packet.req) {
            (RpcAction::Ping, _) => events.on_response(RpcRespPacket::ok(seq, Vec::new())),
            (RpcAction::Call, Some(req)) => {
                trace!("local {} seq={} {:?}", self.address, seq, req);
                let handler = endpoint.handler.clone();
                tokio::spawn(async move {
                    let res = handler.invoke(req).await;
                    if !endpoint.closed.load(Ordering::Acquire) {
                        events.on_response(RpcRespPacket { seq, res });
                    }
                });
            }
            (RpcAction::Call, None) => {
                return Err(RpcIntErr::Transport("call packet without request".to_string()));
            }
        }
        Ok(())
    }

    async fn close(&self) {
        let link = self.link.lock().take();
        if let Some(link) = link {
            link.endpoint.detach(&link.events);
        }
    }

    fn local_addr(&self) -> String {
        "local".to_string()
    }

    fn remote_addr(&self) -> String {
        self.address.clone()
    }
}

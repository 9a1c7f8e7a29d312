//! Fault tolerance strategies.
//!
//! A strategy decides how many senders one call may touch and what to do with
//! their failures. It is the only place that drives the load balancer.

use super::balance::LoadBalance;
use super::pool::SenderPool;
use async_trait::async_trait;
use razor_cluster_core::error::{RpcError, RpcIntErr};
use razor_cluster_core::proto::Request;
use razor_cluster_stream::Sender;
use std::sync::Arc;
use tokio::task::JoinSet;

/// What a strategy works with for one reference
#[derive(Clone)]
pub struct ClusterContext {
    pool: Arc<SenderPool>,
    balance: Arc<dyn LoadBalance>,
    /// Senders tried at most by [Failover]
    retries: usize,
}

impl ClusterContext {
    pub fn new(pool: Arc<SenderPool>, balance: Arc<dyn LoadBalance>, retries: usize) -> Self {
        Self { pool, balance, retries }
    }

    #[inline]
    pub fn pool(&self) -> &Arc<SenderPool> {
        &self.pool
    }

    #[inline]
    pub fn retries(&self) -> usize {
        self.retries
    }

    /// Pick an active sender that is not in `exclude`
    pub fn select(&self, req: &Request, exclude: &[Arc<Sender>]) -> Result<Arc<Sender>, RpcError> {
        let candidates: Vec<Arc<Sender>> = self
            .pool
            .active()
            .into_iter()
            .filter(|s| !exclude.iter().any(|e| Arc::ptr_eq(e, s)))
            .collect();
        self.balance
            .select(&candidates, req)
            .ok_or_else(|| RpcIntErr::NoActiveSender(req.service.to_string()).into())
    }

    /// One attempt on `sender`. A closed channel takes its sender out of the pool.
    pub async fn send(&self, sender: &Arc<Sender>, req: &Request) -> Result<Vec<u8>, RpcError> {
        let res = sender.send_request(req).await;
        if let Err(e) = &res {
            if e.is_channel_closed() {
                self.pool.evict(sender);
            }
        }
        res
    }
}

#[async_trait]
pub trait Cluster: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn invoke(&self, ctx: &ClusterContext, req: &Request) -> Result<Vec<u8>, RpcError>;
}

/// One sender, one attempt. For operations that are not idempotent.
#[derive(Default)]
pub struct Failfast();

#[async_trait]
impl Cluster for Failfast {
    fn name(&self) -> &'static str {
        "failfast"
    }

    async fn invoke(&self, ctx: &ClusterContext, req: &Request) -> Result<Vec<u8>, RpcError> {
        let sender = ctx.select(req, &[])?;
        ctx.send(&sender, req).await
    }
}

/// Try up to `retries` different senders until one succeeds.
///
/// Every attempt shares the deadline of the request. Errors the next sender
/// cannot fix (remote business errors, serialization) end the call at once.
#[derive(Default)]
pub struct Failover();

#[async_trait]
impl Cluster for Failover {
    fn name(&self) -> &'static str {
        "failover"
    }

    async fn invoke(&self, ctx: &ClusterContext, req: &Request) -> Result<Vec<u8>, RpcError> {
        let attempts = ctx.retries().max(1);
        let mut tried: Vec<Arc<Sender>> = Vec::with_capacity(attempts);
        // went inactive after being selected, excluded without using up an attempt
        let mut skipped: Vec<Arc<Sender>> = Vec::new();
        let mut last: Option<RpcError> = None;
        while tried.len() < attempts {
            if req.is_expired() {
                last = Some(RpcIntErr::Timeout.into());
                break;
            }
            let exclude: Vec<Arc<Sender>> = tried.iter().chain(skipped.iter()).cloned().collect();
            let sender = match ctx.select(req, &exclude) {
                Ok(s) => s,
                Err(e) => {
                    if tried.is_empty() {
                        return Err(e);
                    }
                    break;
                }
            };
            match ctx.send(&sender, req).await {
                Ok(resp) => return Ok(resp),
                Err(RpcError::Rpc(RpcIntErr::ChannelInactive)) => {
                    debug!("failover {}.{}: {} inactive, skip", req.service, req.method, sender.url());
                    skipped.push(sender);
                }
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => {
                    warn!(
                        "failover {}.{}: attempt {} on {} failed: {}",
                        req.service,
                        req.method,
                        tried.len() + 1,
                        sender.url(),
                        e
                    );
                    tried.push(sender);
                    last = Some(e);
                }
            }
        }
        let last = last.unwrap_or_else(|| RpcIntErr::NoActiveSender(req.service.to_string()).into());
        Err(RpcError::RetryExhausted { attempts: tried.len(), last: Box::new(last) })
    }
}

/// Like [Failfast] but a failure turns into an empty payload, which the proxy
/// decodes as the default value of the return type
#[derive(Default)]
pub struct Failsafe();

#[async_trait]
impl Cluster for Failsafe {
    fn name(&self) -> &'static str {
        "failsafe"
    }

    async fn invoke(&self, ctx: &ClusterContext, req: &Request) -> Result<Vec<u8>, RpcError> {
        let res = match ctx.select(req, &[]) {
            Ok(sender) => ctx.send(&sender, req).await,
            Err(e) => Err(e),
        };
        match res {
            Ok(resp) => Ok(resp),
            Err(e) => {
                warn!("failsafe {}.{}: ignore error: {}", req.service, req.method, e);
                Ok(Vec::new())
            }
        }
    }
}

/// Send to every active sender at once.
///
/// Succeeds with the response of the first sender (in pool order) that
/// answered; fails with every error only when all of them failed.
#[derive(Default)]
pub struct Broadcast();

#[async_trait]
impl Cluster for Broadcast {
    fn name(&self) -> &'static str {
        "broadcast"
    }

    async fn invoke(&self, ctx: &ClusterContext, req: &Request) -> Result<Vec<u8>, RpcError> {
        let senders = ctx.pool().active();
        if senders.is_empty() {
            return Err(RpcIntErr::NoActiveSender(req.service.to_string()).into());
        }
        let mut tasks = JoinSet::new();
        for (i, sender) in senders.into_iter().enumerate() {
            let (ctx, req) = (ctx.clone(), req.clone());
            tasks.spawn(async move { (i, ctx.send(&sender, &req).await) });
        }
        let mut results: Vec<Option<Result<Vec<u8>, RpcError>>> = vec![None; tasks.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((i, res)) => results[i] = Some(res),
                Err(e) => warn!("broadcast {}.{}: task lost: {}", req.service, req.method, e),
            }
        }
        let mut errors = Vec::new();
        let mut first_ok = None;
        for res in results {
            match res {
                Some(Ok(resp)) => {
                    if first_ok.is_none() {
                        first_ok = Some(resp);
                    }
                }
                Some(Err(e)) => errors.push(e),
                None => errors.push(RpcIntErr::Transport("broadcast task aborted".to_string()).into()),
            }
        }
        match first_ok {
            Some(resp) => {
                if !errors.is_empty() {
                    debug!("broadcast {}.{}: {} of the senders failed", req.service, req.method, errors.len());
                }
                Ok(resp)
            }
            None => Err(RpcError::BroadcastFailed(errors)),
        }
    }
}

use crate::cluster::{Cluster, ClusterContext, SenderPool};
use crate::registry::{ListenerId, Registry};
use razor_cluster_codec::Serializer;
use razor_cluster_core::error::{RpcError, RpcIntErr};
use razor_cluster_core::proto::Request;
use razor_cluster_core::{ClientConfig, ServiceIdentity, Url};
use razor_cluster_stream::FutureResponse;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

pub(super) struct Subscription {
    pub registry: Arc<dyn Registry>,
    pub consumer: Url,
    pub id: ListenerId,
}

struct ProxyInner {
    service: ServiceIdentity,
    config: ClientConfig,
    cluster: Arc<dyn Cluster>,
    ctx: ClusterContext,
    serializer: Arc<dyn Serializer>,
    subscription: Option<Subscription>,
    call_id: AtomicU64,
}

/// Calls one remote service by method name.
///
/// Cheap to clone, every clone shares the sender pool.
#[derive(Clone)]
pub struct ServiceProxy(Arc<ProxyInner>);

impl ServiceProxy {
    pub(super) fn new(
        service: ServiceIdentity, config: ClientConfig, cluster: Arc<dyn Cluster>,
        ctx: ClusterContext, serializer: Arc<dyn Serializer>, subscription: Option<Subscription>,
    ) -> Self {
        Self(Arc::new(ProxyInner {
            service,
            config,
            cluster,
            ctx,
            serializer,
            subscription,
            call_id: AtomicU64::new(1),
        }))
    }

    #[inline]
    pub fn service(&self) -> &ServiceIdentity {
        &self.0.service
    }

    #[inline]
    pub fn config(&self) -> &ClientConfig {
        &self.0.config
    }

    #[inline]
    pub fn pool(&self) -> &Arc<SenderPool> {
        self.0.ctx.pool()
    }

    /// Call `method` and wait for its result.
    ///
    /// A strategy that swallowed the failure (failsafe) hands back no payload,
    /// the call then yields `R::default()`.
    pub async fn call<A, R>(&self, method: &str, args: &A) -> Result<R, RpcError>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Default,
    {
        let req = self.build_request(method, args)?;
        let resp = self.0.cluster.invoke(&self.0.ctx, &req).await?;
        Ok(decode_reply(&*self.0.serializer, &resp)?)
    }

    /// Call `method` without waiting, the result is delivered through the returned future
    pub fn call_async<A, R>(&self, method: &str, args: &A) -> ResponseFuture<R>
    where
        A: Serialize + ?Sized,
        R: DeserializeOwned + Default,
    {
        let fut = FutureResponse::new(self.0.call_id.fetch_add(1, Ordering::Relaxed));
        match self.build_request(method, args) {
            Ok(req) => {
                let inner = self.0.clone();
                let resolver = fut.clone();
                tokio::spawn(async move {
                    resolver.resolve(inner.cluster.invoke(&inner.ctx, &req).await);
                });
            }
            Err(e) => {
                fut.resolve(Err(e));
            }
        }
        ResponseFuture { fut, serializer: self.0.serializer.clone(), _phan: PhantomData }
    }

    /// Stop following the registry and close every sender
    pub async fn close(&self) {
        if let Some(sub) = &self.0.subscription {
            if let Err(e) = sub.registry.unsubscribe(&sub.consumer, sub.id).await {
                warn!("{}: unsubscribe failed: {}", self.0.service, e);
            }
        }
        self.pool().destroy().await;
    }

    fn build_request<A: Serialize + ?Sized>(
        &self, method: &str, args: &A,
    ) -> Result<Request, RpcError> {
        let args = encode_args(&*self.0.serializer, args)?;
        let req = Request::new(
            self.0.service.clone(),
            method,
            args,
            self.0.serializer.name(),
            self.0.config.timeout,
        );
        trace!("{}: {:?}", self.0.service, req);
        Ok(req)
    }
}

fn encode_args<A: Serialize + ?Sized>(
    serializer: &dyn Serializer, args: &A,
) -> Result<Vec<u8>, RpcIntErr> {
    let value =
        serde_json::to_value(args).map_err(|e| RpcIntErr::Serialization(e.to_string()))?;
    serializer.serialize(&value)
}

/// No serializer encodes a value as zero bytes, an empty payload means "no reply"
fn decode_reply<R: DeserializeOwned + Default>(
    serializer: &dyn Serializer, resp: &[u8],
) -> Result<R, RpcIntErr> {
    if resp.is_empty() { Ok(R::default()) } else { serializer.decode(resp) }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "proxy({}, {})", self.0.service, self.0.cluster.name())
    }
}

/// The typed result of [ServiceProxy::call_async]
pub struct ResponseFuture<R> {
    fut: FutureResponse,
    serializer: Arc<dyn Serializer>,
    _phan: PhantomData<fn() -> R>,
}

impl<R: DeserializeOwned + Default> ResponseFuture<R> {
    /// The untyped handle, to attach callbacks
    #[inline]
    pub fn inner(&self) -> &FutureResponse {
        &self.fut
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.fut.is_done()
    }

    pub async fn wait(self) -> Result<R, RpcError> {
        let resp = self.fut.wait().await?;
        Ok(decode_reply(&*self.serializer, &resp)?)
    }

    /// Run `cb` with the decoded result once the call completes
    pub fn on_complete<F>(&self, cb: F)
    where
        F: FnOnce(Result<R, RpcError>) + Send + 'static,
    {
        let serializer = self.serializer.clone();
        self.fut.add_callback(move |outcome| {
            let res = match outcome {
                Ok(resp) => decode_reply(&*serializer, resp).map_err(RpcError::from),
                Err(e) => Err(e.clone()),
            };
            cb(res)
        });
    }
}

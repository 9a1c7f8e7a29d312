use crate::channel::ChannelBackend;
use crate::server::InvocationHandler;
use async_trait::async_trait;
use razor_cluster_core::Url;
use razor_cluster_core::error::RpcIntErr;
use std::sync::Arc;

/// A way to reach providers and to expose services, picked by the url's protocol.
#[async_trait]
pub trait Protocol: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// Build the backend of a channel towards `url`. No I/O happens until the
    /// channel is opened.
    fn refer(&self, url: &Url) -> Result<Arc<dyn ChannelBackend>, RpcIntErr>;

    /// Start serving `handler` at `url`
    async fn export(
        &self, url: &Url, handler: Arc<dyn InvocationHandler>,
    ) -> Result<Box<dyn Exporter>, RpcIntErr>;
}

/// A running export, returned by [Protocol::export]
pub trait Exporter: Send + Sync {
    fn url(&self) -> &Url;

    /// Stop serving. Channels connected to it observe a disconnect.
    fn unexport(&self);
}

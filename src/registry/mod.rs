//! Provider availability, keyed by [ServiceIdentity](razor_cluster_core::ServiceIdentity).
//!
//! A provider is `register`ed once at startup and toggled with
//! `activate`/`deactivate` afterwards. Only `deregister` removes it, an
//! inactive provider still shows up in `discover` and in change events with
//! `active = false`.
//!
//! The implementations:
//!
//! - [MemoryRegistry]: complete in-process backend (`memory://`)
//! - [NoRegistry]: accepts everything and knows nothing (`none://`)
//!
//! Retrying on [RegistryConnection](razor_cluster_core::error::RpcIntErr::RegistryConnection)
//! is up to the caller, see [retry_registry](razor_cluster_core::backoff::retry_registry).

use crate::notify::NotifyListener;
use async_trait::async_trait;
use razor_cluster_core::Url;
use razor_cluster_core::error::RpcIntErr;
use std::fmt;
use std::sync::Arc;

mod memory;
pub use memory::{MemoryRegistry, MemoryRegistryFactory};
mod none;
pub use none::{NoRegistry, NoRegistryFactory};

/// One provider as the registry sees it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderEntry {
    pub url: Url,
    pub active: bool,
}

impl ProviderEntry {
    #[inline]
    pub fn new(url: Url, active: bool) -> Self {
        Self { url, active }
    }
}

/// Handle returned by [Registry::subscribe]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "listener#{}", self.0)
    }
}

#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Where this registry lives
    fn url(&self) -> &Url;

    /// Idempotent. A newly registered provider is inactive.
    async fn register(&self, provider: &Url) -> Result<(), RpcIntErr>;

    /// Idempotent
    async fn deregister(&self, provider: &Url) -> Result<(), RpcIntErr>;

    async fn activate(&self, provider: &Url) -> Result<(), RpcIntErr>;

    async fn deactivate(&self, provider: &Url) -> Result<(), RpcIntErr>;

    /// Snapshot of the providers of the service named by `consumer`, inactive ones included
    async fn discover(&self, consumer: &Url) -> Result<Vec<ProviderEntry>, RpcIntErr>;

    /// Watch the service named by `consumer`.
    ///
    /// Changes are delivered to `listener` in the order the registry applied them.
    async fn subscribe(
        &self, consumer: &Url, listener: Arc<dyn NotifyListener>,
    ) -> Result<ListenerId, RpcIntErr>;

    async fn unsubscribe(&self, consumer: &Url, id: ListenerId) -> Result<(), RpcIntErr>;
}

/// Builds the [Registry] for a registry url.
///
/// Implementations return the same instance for the same address, so every
/// party in a process naming one registry shares it.
pub trait RegistryFactory: Send + Sync + 'static {
    fn create(&self, url: &Url) -> Result<Arc<dyn Registry>, RpcIntErr>;
}

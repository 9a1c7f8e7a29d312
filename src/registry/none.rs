use super::{ListenerId, ProviderEntry, Registry, RegistryFactory};
use crate::notify::NotifyListener;
use async_trait::async_trait;
use razor_cluster_core::Url;
use razor_cluster_core::error::RpcIntErr;
use std::sync::Arc;

/// For deployments without distributed coordination: every write is accepted
/// and dropped, every read is empty, listeners are never called.
pub struct NoRegistry {
    url: Url,
}

impl NoRegistry {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

#[async_trait]
impl Registry for NoRegistry {
    fn url(&self) -> &Url {
        &self.url
    }

    async fn register(&self, _provider: &Url) -> Result<(), RpcIntErr> {
        Ok(())
    }

    async fn deregister(&self, _provider: &Url) -> Result<(), RpcIntErr> {
        Ok(())
    }

    async fn activate(&self, _provider: &Url) -> Result<(), RpcIntErr> {
        Ok(())
    }

    async fn deactivate(&self, _provider: &Url) -> Result<(), RpcIntErr> {
        Ok(())
    }

    async fn discover(&self, _consumer: &Url) -> Result<Vec<ProviderEntry>, RpcIntErr> {
        Ok(Vec::new())
    }

    async fn subscribe(
        &self, _consumer: &Url, _listener: Arc<dyn NotifyListener>,
    ) -> Result<ListenerId, RpcIntErr> {
        Ok(ListenerId(0))
    }

    async fn unsubscribe(&self, _consumer: &Url, _id: ListenerId) -> Result<(), RpcIntErr> {
        Ok(())
    }
}

#[derive(Default)]
pub struct NoRegistryFactory();

impl RegistryFactory for NoRegistryFactory {
    fn create(&self, url: &Url) -> Result<Arc<dyn Registry>, RpcIntErr> {
        Ok(Arc::new(NoRegistry::new(url.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_everything_is_empty() {
        let reg = NoRegistryFactory().create(&Url::registry("none", "0.0.0.0", 0)).unwrap();
        let provider = Url::provider("local", "127.0.0.1", 9000, "demo.Echo");
        reg.register(&provider).await.unwrap();
        reg.activate(&provider).await.unwrap();
        assert!(reg.discover(&Url::client("demo.Echo")).await.unwrap().is_empty());
        let id = reg
            .subscribe(&Url::client("demo.Echo"), Arc::new(|_: &crate::notify::ChangeEvent| {
                panic!("never notified")
            }))
            .await
            .unwrap();
        reg.deregister(&provider).await.unwrap();
        reg.unsubscribe(&Url::client("demo.Echo"), id).await.unwrap();
    }
}

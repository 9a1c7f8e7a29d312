use razor_cluster::error::{RemoteError, RpcError};
use razor_cluster::server::{RpcServer, ServiceBuilder, ServiceHandler};
use razor_cluster::{Extensions, ServerConfig, Url};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

pub const CALCULATOR: &str = "test.Calculator";

/// One provider of the calculator service
pub struct Provider {
    pub port: u16,
    pub calls: Arc<AtomicUsize>,
    pub server: RpcServer,
    pub url: Url,
}

impl Provider {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn address(&self) -> String {
        self.url.address()
    }
}

/// `whoami` and `sleep` answer with the provider port, so a test can tell who served it
pub fn calculator(port: u16, calls: Arc<AtomicUsize>) -> ServiceHandler {
    let counted = |calls: &Arc<AtomicUsize>| {
        let calls = calls.clone();
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
        }
    };
    let (on_add, on_whoami, on_sleep, on_fail) =
        (counted(&calls), counted(&calls), counted(&calls), counted(&calls));
    ServiceBuilder::new(CALCULATOR)
        .version("1.0")
        .method("add", move |(a, b): (i64, i64)| {
            on_add();
            async move { Ok(a + b) }
        })
        .method("whoami", move |_: ()| {
            on_whoami();
            async move { Ok(port) }
        })
        .method("sleep", move |(ms,): (u64,)| {
            on_sleep();
            async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(port)
            }
        })
        .method("fail", move |(msg,): (String,)| {
            on_fail();
            async move { Err::<(), _>(RemoteError::new("TestError", msg)) }
        })
        .build()
}

pub async fn start_provider(
    ext: &Arc<Extensions>, registry: Option<Url>, port: u16, weight: Option<u32>,
) -> Result<Provider, RpcError> {
    let mut base = Url::provider("local", "127.0.0.1", port, "");
    if let Some(weight) = weight {
        base = base.with_param(razor_cluster::keys::WEIGHT, weight);
    }
    let server = RpcServer::new(ext.clone(), ServerConfig::default(), base, registry)?;
    let calls = Arc::new(AtomicUsize::new(0));
    let url = server.export(calculator(port, calls.clone())).await?;
    Ok(Provider { port, calls, server, url })
}

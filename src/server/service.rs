use razor_cluster_codec::CodecPool;
use razor_cluster_core::error::{RemoteError, RpcError, RpcIntErr};
use razor_cluster_core::proto::Request;
use razor_cluster_core::url::keys;
use razor_cluster_core::{ServiceIdentity, Url};
use razor_cluster_stream::server::InvocationHandler;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

type MethodFn = Arc<dyn Fn(Value) -> BoxFuture<Result<Value, RpcError>> + Send + Sync>;

fn ser_err(e: serde_json::Error) -> RpcError {
    RpcIntErr::Serialization(e.to_string()).into()
}

/// Collects the methods of one service.
///
/// ```ignore
/// let handler = ServiceBuilder::new("demo.Calculator")
///     .version("1.0")
///     .method("add", |(a, b): (i64, i64)| async move { Ok(a + b) })
///     .build();
/// ```
pub struct ServiceBuilder {
    service: ServiceIdentity,
    methods: HashMap<String, MethodFn>,
}

impl ServiceBuilder {
    pub fn new(interface: impl Into<String>) -> Self {
        Self { service: ServiceIdentity::of(interface), methods: HashMap::new() }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.service.group = group.into();
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.service.version = version.into();
        self
    }

    /// Register `name`. The arguments arrive as the tuple the client sent.
    pub fn method<A, R, F, Fut>(mut self, name: &str, f: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, RemoteError>> + Send + 'static,
    {
        let f = Arc::new(f);
        let method: MethodFn = Arc::new(move |args: Value| -> BoxFuture<Result<Value, RpcError>> {
            let f = f.clone();
            Box::pin(async move {
                let args: A = serde_json::from_value(args).map_err(ser_err)?;
                let ret = f(args).await?;
                serde_json::to_value(ret).map_err(ser_err)
            })
        });
        self.methods.insert(name.to_string(), method);
        self
    }

    pub fn build(self) -> ServiceHandler {
        ServiceHandler { service: self.service, methods: self.methods }
    }
}

/// The methods of one service, looked up by name
pub struct ServiceHandler {
    service: ServiceIdentity,
    methods: HashMap<String, MethodFn>,
}

impl ServiceHandler {
    #[inline]
    pub fn service(&self) -> &ServiceIdentity {
        &self.service
    }

    /// Sorted method names
    pub fn methods(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(|s| s.as_str()).collect();
        names.sort_unstable();
        names
    }

    /// The provider url of this service under `base` (protocol, host, port and params)
    pub fn url(&self, base: &Url) -> Url {
        let mut url = base.with_path(self.service.interface.clone());
        if !self.service.group.is_empty() {
            url = url.with_param(keys::GROUP, &self.service.group);
        }
        if !self.service.version.is_empty() {
            url = url.with_param(keys::VERSION, &self.service.version);
        }
        url
    }

    pub async fn call(&self, method: &str, args: Value) -> Result<Value, RpcError> {
        let Some(f) = self.methods.get(method) else {
            return Err(RpcIntErr::Method(format!("{}.{}", self.service, method)).into());
        };
        f(args).await
    }
}

impl fmt::Debug for ServiceHandler {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "service({}, {:?})", self.service, self.methods())
    }
}

/// Routes a decoded request to its service, decoding arguments and encoding the
/// result with a serializer checked out of the pool named by the request.
pub struct ServiceMux {
    services: RwLock<HashMap<ServiceIdentity, Arc<ServiceHandler>>>,
    codecs: HashMap<String, CodecPool>,
}

impl ServiceMux {
    pub fn new(codecs: Vec<CodecPool>) -> Self {
        Self {
            services: RwLock::new(HashMap::new()),
            codecs: codecs.into_iter().map(|p| (p.name().to_string(), p)).collect(),
        }
    }

    pub fn add(&self, handler: Arc<ServiceHandler>) -> Option<Arc<ServiceHandler>> {
        self.services.write().insert(handler.service().clone(), handler)
    }

    pub fn remove(&self, service: &ServiceIdentity) -> Option<Arc<ServiceHandler>> {
        self.services.write().remove(service)
    }

    pub fn get(&self, service: &ServiceIdentity) -> Option<Arc<ServiceHandler>> {
        self.services.read().get(service).cloned()
    }

    pub fn services(&self) -> Vec<ServiceIdentity> {
        let mut services: Vec<_> = self.services.read().keys().cloned().collect();
        services.sort();
        services
    }

    fn codec(&self, name: &str) -> Result<&CodecPool, RpcError> {
        self.codecs
            .get(name)
            .ok_or_else(|| RpcIntErr::Serialization(format!("unsupported serializer {}", name)).into())
    }
}

#[async_trait]
impl InvocationHandler for ServiceMux {
    async fn invoke(&self, req: Request) -> Result<Vec<u8>, RpcError> {
        let Some(handler) = self.get(&req.service) else {
            return Err(RpcIntErr::Method(format!("no service {}", req.service)).into());
        };
        let pool = self.codec(&req.serializer)?;
        let args = if req.args.is_empty() {
            Value::Null
        } else {
            pool.checkout().deserialize(&req.args)?
        };
        let ret = handler.call(&req.method, args).await?;
        Ok(pool.checkout().serialize(&ret)?)
    }
}

impl fmt::Debug for ServiceMux {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "mux({:?})", self.services())
    }
}

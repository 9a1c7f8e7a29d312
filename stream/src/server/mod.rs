//! This module contains traits defined for the provider side
//!

use async_trait::async_trait;
use razor_cluster_core::error::RpcError;
use razor_cluster_core::proto::Request;

/// Given a decoded request, run the matching local method.
///
/// The result is the serialized return value; an `RpcError::User` carries a
/// business error raised by the method.
#[async_trait]
pub trait InvocationHandler: Send + Sync + 'static {
    async fn invoke(&self, req: Request) -> Result<Vec<u8>, RpcError>;
}

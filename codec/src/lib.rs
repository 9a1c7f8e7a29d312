#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # razor-cluster-codec
//!
//! This crate provides the serializer plugins for [`razor-cluster`](https://docs.rs/razor-cluster).
//!
//! [Codec] is the typed interface a serializer implements. Since the cluster
//! layer picks serializers by name at runtime, every Codec is also usable as a
//! [Serializer] trait object, which passes values through [serde_json::Value].
//!

/*
 *  Note that there's no unify output interface in each serde impl,
 *  whatever we want to serialize into (std::io::Write / Vec<u8>),
 *  require the codec implement to match.
 */

use razor_cluster_core::error::RpcIntErr;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;

mod pool;
pub use pool::{CodecPool, PooledCodec};

/// The codec is immutable, if need changing (like setting up cipher), should have inner
/// mutablilty
pub trait Codec: Default + Send + Sync + Sized + 'static {
    /// The name this codec is registered under
    const NAME: &'static str;

    fn encode<T: Serialize>(&self, task: &T) -> Result<Vec<u8>, RpcIntErr>;

    /// sererialized the msg into buf (with std::io::Writer), and return the size written
    fn encode_into<T: Serialize>(&self, task: &T, buf: &mut Vec<u8>) -> Result<usize, RpcIntErr>;

    /// Malformed input is an error, never a partially filled value
    fn decode<'a, T: Deserialize<'a>>(&self, buf: &'a [u8]) -> Result<T, RpcIntErr>;
}

/// Object-safe face of a [Codec], the form the extension loader hands out.
pub trait Serializer: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn serialize(&self, value: &Value) -> Result<Vec<u8>, RpcIntErr>;

    fn deserialize(&self, buf: &[u8]) -> Result<Value, RpcIntErr>;
}

impl<C: Codec> Serializer for C {
    #[inline]
    fn name(&self) -> &'static str {
        C::NAME
    }

    #[inline]
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, RpcIntErr> {
        self.encode(value)
    }

    #[inline]
    fn deserialize(&self, buf: &[u8]) -> Result<Value, RpcIntErr> {
        self.decode(buf)
    }
}

impl dyn Serializer {
    /// Serialize any value through this serializer
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, RpcIntErr> {
        let value = serde_json::to_value(value).map_err(ser_err)?;
        self.serialize(&value)
    }

    /// Deserialize into `T`. An empty buffer stands for "no value" and decodes as
    /// a null, which fits `()` and `Option<_>`.
    pub fn decode<T: DeserializeOwned>(&self, buf: &[u8]) -> Result<T, RpcIntErr> {
        let value = if buf.is_empty() { Value::Null } else { self.deserialize(buf)? };
        serde_json::from_value(value).map_err(ser_err)
    }
}

#[inline]
pub(crate) fn ser_err<E: std::fmt::Display>(e: E) -> RpcIntErr {
    RpcIntErr::Serialization(e.to_string())
}

#[cfg(feature = "msgpack")]
mod msgpack;
#[cfg(feature = "msgpack")]
pub use msgpack::*;

#[cfg(feature = "json")]
mod json;
#[cfg(feature = "json")]
pub use json::*;

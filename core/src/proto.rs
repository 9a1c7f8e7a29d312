//! Structural fields carried between proxy, channel and provider.
//!
//! No byte layout is implied here, a transport that crosses process
//! boundaries chooses its own framing for these structures.

use crate::error::RpcError;
use crate::service::ServiceIdentity;
use std::fmt;
use std::time::{Duration, Instant};

/// A business call as built by the proxy
#[derive(Clone)]
pub struct Request {
    pub service: ServiceIdentity,
    pub method: String,
    /// Arguments, already serialized by `serializer`
    pub args: Vec<u8>,
    /// Name of the serializer for both `args` and the result
    pub serializer: String,
    pub timeout: Duration,
    /// All attempts of one call share this deadline
    pub deadline: Instant,
}

impl Request {
    pub fn new(
        service: ServiceIdentity, method: impl Into<String>, args: Vec<u8>,
        serializer: impl Into<String>, timeout: Duration,
    ) -> Self {
        Self {
            service,
            method: method.into(),
            args,
            serializer: serializer.into(),
            timeout,
            deadline: Instant::now() + timeout,
        }
    }

    #[inline]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "req({}.{}, args={}B)", self.service, self.method, self.args.len())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcAction {
    Call,
    /// Health check, no business payload
    Ping,
}

/// What a channel hands to its transport
#[derive(Debug, Clone)]
pub struct RpcReqPacket {
    pub seq: u64,
    pub action: RpcAction,
    pub req: Option<Request>,
}

impl RpcReqPacket {
    #[inline]
    pub fn call(seq: u64, req: Request) -> Self {
        Self { seq, action: RpcAction::Call, req: Some(req) }
    }

    #[inline]
    pub fn ping(seq: u64) -> Self {
        Self { seq, action: RpcAction::Ping, req: None }
    }
}

/// What the transport hands back, matched to its request by `seq` only
#[derive(Debug, Clone)]
pub struct RpcRespPacket {
    pub seq: u64,
    /// Serialized result, empty for a ping
    pub res: Result<Vec<u8>, RpcError>,
}

impl RpcRespPacket {
    #[inline]
    pub fn ok(seq: u64, payload: Vec<u8>) -> Self {
        Self { seq, res: Ok(payload) }
    }

    #[inline]
    pub fn err(seq: u64, e: RpcError) -> Self {
        Self { seq, res: Err(e) }
    }
}

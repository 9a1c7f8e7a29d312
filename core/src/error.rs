//! Error types shared by every layer.
//!
//! A call resolves with [RpcError]. [RpcError::User] carries an error raised by
//! the remote method itself, every other variant means the call could not be
//! delivered or completed by the framework.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Failures of the extension loader, fatal to the operation asking for the extension
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtensionError {
    #[error("no {capability} extension named {name:?}")]
    NotFound { capability: &'static str, name: String },
    #[error("{capability} extension {name:?} misconfigured: {reason}")]
    Config { capability: &'static str, name: String, reason: String },
}

/// Framework-level failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcIntErr {
    #[error(transparent)]
    Extension(#[from] ExtensionError),
    #[error("registry unreachable: {0}")]
    RegistryConnection(String),
    #[error("no active sender for {0}")]
    NoActiveSender(String),
    #[error("channel closed")]
    ChannelClosed,
    #[error("channel not active")]
    ChannelInactive,
    #[error("timeout")]
    Timeout,
    #[error("serialization: {0}")]
    Serialization(String),
    #[error("transport: {0}")]
    Transport(String),
    #[error("no such method: {0}")]
    Method(String),
}

/// An error raised by the remote service implementation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self { kind: kind.into(), message: message.into() }
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for RemoteError {}

/// The outcome of a failed call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// The remote method ran and returned an error
    #[error("remote error {0}")]
    User(RemoteError),
    #[error(transparent)]
    Rpc(#[from] RpcIntErr),
    #[error("gave up after {attempts} attempts, last error: {last}")]
    RetryExhausted { attempts: usize, last: Box<RpcError> },
    #[error("all {} broadcast targets failed", .0.len())]
    BroadcastFailed(Vec<RpcError>),
}

impl RpcError {
    /// Whether another sender may succeed where this attempt failed.
    ///
    /// Remote business errors were delivered fine, and a payload that failed
    /// to (de)serialize will fail again.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::User(_) => false,
            Self::Rpc(RpcIntErr::Serialization(_)) => false,
            Self::Rpc(RpcIntErr::Extension(_)) => false,
            Self::Rpc(RpcIntErr::Method(_)) => false,
            Self::Rpc(_) => true,
            Self::RetryExhausted { .. } | Self::BroadcastFailed(_) => false,
        }
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Rpc(RpcIntErr::Timeout))
    }

    #[inline]
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, Self::Rpc(RpcIntErr::ChannelClosed))
    }

    /// The framework error at the root of this one, if any
    pub fn int_err(&self) -> Option<&RpcIntErr> {
        match self {
            Self::Rpc(e) => Some(e),
            Self::RetryExhausted { last, .. } => last.int_err(),
            _ => None,
        }
    }
}

impl From<ExtensionError> for RpcError {
    #[inline]
    fn from(e: ExtensionError) -> Self {
        Self::Rpc(RpcIntErr::Extension(e))
    }
}

impl From<RemoteError> for RpcError {
    #[inline]
    fn from(e: RemoteError) -> Self {
        Self::User(e)
    }
}

pub type Result<T> = std::result::Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(RpcError::from(RpcIntErr::Timeout).is_retryable());
        assert!(RpcError::from(RpcIntErr::ChannelClosed).is_retryable());
        assert!(!RpcError::from(RpcIntErr::Serialization("eof".into())).is_retryable());
        assert!(!RpcError::User(RemoteError::new("ArithmeticError", "divide by zero")).is_retryable());
    }

    #[test]
    fn test_display() {
        let e = RpcError::RetryExhausted { attempts: 2, last: Box::new(RpcIntErr::Timeout.into()) };
        assert_eq!(e.to_string(), "gave up after 2 attempts, last error: timeout");
        assert_eq!(e.int_err(), Some(&RpcIntErr::Timeout));
        let e: RpcError =
            ExtensionError::NotFound { capability: "cluster", name: "nope".into() }.into();
        assert_eq!(e.to_string(), "no cluster extension named \"nope\"");
    }
}

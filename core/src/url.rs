//! Endpoint descriptor shared by every layer.
//!
//! A [Url] names a registry, a provider or a consumer. It is a plain value:
//! cloning it is cheap enough, and it never owns a connection.
//!
//! The text form is `protocol://host:port/path?key=value&...`, the endpoint
//! type travels as the reserved `side` parameter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::time::Duration;

/// Well-known parameter keys
pub mod keys {
    pub const SIDE: &str = "side";
    pub const GROUP: &str = "group";
    pub const VERSION: &str = "version";
    pub const SERIALIZER: &str = "serializer";
    pub const TIMEOUT: &str = "timeout";
    pub const RETRIES: &str = "retries";
    pub const WEIGHT: &str = "weight";
    pub const HEARTBEAT: &str = "heartbeat";
    pub const APPLICATION: &str = "application";
    pub const CLUSTER: &str = "cluster";
    pub const LOADBALANCE: &str = "loadbalance";
}

pub const DEFAULT_WEIGHT: u32 = 100;

/// What an endpoint describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum EndpointKind {
    #[default]
    Provider,
    Registry,
    Client,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provider => "provider",
            Self::Registry => "registry",
            Self::Client => "client",
        }
    }
}

impl FromStr for EndpointKind {
    type Err = UrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "provider" => Ok(Self::Provider),
            "registry" => Ok(Self::Registry),
            "client" | "consumer" => Ok(Self::Client),
            _ => Err(UrlParseError(format!("unknown endpoint side {:?}", s))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid url: {0}")]
pub struct UrlParseError(pub String);

/// Canonical endpoint descriptor.
///
/// Equality and hashing cover protocol, host, port, path and the parameter
/// map. The [EndpointKind] is descriptive only.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Url {
    protocol: String,
    host: String,
    port: u16,
    path: String,
    kind: EndpointKind,
    params: BTreeMap<String, String>,
}

impl Url {
    pub fn new(
        protocol: impl Into<String>, host: impl Into<String>, port: u16, path: impl Into<String>,
        kind: EndpointKind,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            host: host.into(),
            port,
            path: path.into(),
            kind,
            params: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn provider(
        protocol: impl Into<String>, host: impl Into<String>, port: u16, path: impl Into<String>,
    ) -> Self {
        Self::new(protocol, host, port, path, EndpointKind::Provider)
    }

    #[inline]
    pub fn client(path: impl Into<String>) -> Self {
        Self::new("consumer", "127.0.0.1", 0, path, EndpointKind::Client)
    }

    #[inline]
    pub fn registry(protocol: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self::new(protocol, host, port, "", EndpointKind::Registry)
    }

    /// Return a copy with the parameter set
    pub fn with_param(&self, key: impl Into<String>, value: impl ToString) -> Self {
        let mut url = self.clone();
        url.params.insert(key.into(), value.to_string());
        url
    }

    /// Return a copy with the parameter removed
    pub fn without_param(&self, key: &str) -> Self {
        let mut url = self.clone();
        url.params.remove(key);
        url
    }

    /// Return a copy pointing at another path, used to derive per-service urls
    pub fn with_path(&self, path: impl Into<String>) -> Self {
        let mut url = self.clone();
        url.path = path.into();
        url
    }

    #[inline]
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    #[inline]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[inline]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[inline]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[inline]
    pub fn kind(&self) -> EndpointKind {
        self.kind
    }

    #[inline]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// `host:port`
    #[inline]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[inline]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(|s| s.as_str())
    }

    /// Parse a parameter, falling back to `default` when absent or malformed
    pub fn parse_param<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.param(key) {
            Some(v) => v.parse().unwrap_or(default),
            None => default,
        }
    }

    #[inline]
    pub fn group(&self) -> Option<&str> {
        self.param(keys::GROUP)
    }

    #[inline]
    pub fn version(&self) -> Option<&str> {
        self.param(keys::VERSION)
    }

    #[inline]
    pub fn application(&self) -> Option<&str> {
        self.param(keys::APPLICATION)
    }

    #[inline]
    pub fn serializer(&self) -> Option<&str> {
        self.param(keys::SERIALIZER)
    }

    /// Timeout in milliseconds
    pub fn timeout(&self) -> Option<Duration> {
        self.param(keys::TIMEOUT).and_then(|v| v.parse::<u64>().ok()).map(Duration::from_millis)
    }

    pub fn retries(&self) -> Option<usize> {
        self.param(keys::RETRIES).and_then(|v| v.parse().ok())
    }

    #[inline]
    pub fn weight(&self) -> u32 {
        self.parse_param(keys::WEIGHT, DEFAULT_WEIGHT)
    }
}

impl PartialEq for Url {
    fn eq(&self, other: &Self) -> bool {
        self.protocol == other.protocol
            && self.host == other.host
            && self.port == other.port
            && self.path == other.path
            && self.params == other.params
    }
}

impl Eq for Url {}

impl Hash for Url {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.protocol.hash(state);
        self.host.hash(state);
        self.port.hash(state);
        self.path.hash(state);
        self.params.hash(state);
    }
}

impl fmt::Display for Url {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}://{}:{}/{}", self.protocol, self.host, self.port, self.path)?;
        write!(f, "?{}={}", keys::SIDE, self.kind.as_str())?;
        for (k, v) in &self.params {
            write!(f, "&{}={}", escape(k), escape(v))?;
        }
        Ok(())
    }
}

impl FromStr for Url {
    type Err = UrlParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (protocol, rest) = s
            .split_once("://")
            .ok_or_else(|| UrlParseError(format!("missing scheme in {:?}", s)))?;
        if protocol.is_empty() {
            return Err(UrlParseError(format!("empty scheme in {:?}", s)));
        }
        let (location, query) = match rest.split_once('?') {
            Some((l, q)) => (l, Some(q)),
            None => (rest, None),
        };
        let (authority, path) = match location.split_once('/') {
            Some((a, p)) => (a, p),
            None => (location, ""),
        };
        let (host, port) = match authority.rsplit_once(':') {
            Some((h, p)) => {
                let port =
                    p.parse::<u16>().map_err(|_| UrlParseError(format!("bad port {:?}", p)))?;
                (h, port)
            }
            None => (authority, 0),
        };
        let mut kind = EndpointKind::Provider;
        let mut params = BTreeMap::new();
        if let Some(query) = query {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                let (k, v) = (unescape(k)?, unescape(v)?);
                if k == keys::SIDE {
                    kind = v.parse()?;
                } else {
                    params.insert(k, v);
                }
            }
        }
        Ok(Self {
            protocol: protocol.to_string(),
            host: host.to_string(),
            port,
            path: path.to_string(),
            kind,
            params,
        })
    }
}

/// Percent-encode the bytes that would break the query syntax
fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'&' | b'=' | b'?' | b'#' | b'%' | b'+' => out.push_str(&format!("%{:02X}", b)),
            b if b <= b' ' || b >= 0x7f => out.push_str(&format!("%{:02X}", b)),
            b => out.push(b as char),
        }
    }
    out
}

fn unescape(s: &str) -> Result<String, UrlParseError> {
    if !s.contains('%') {
        return Ok(s.to_string());
    }
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let b = s
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| UrlParseError(format!("bad escape in {:?}", s)))?;
            out.push(b);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| UrlParseError(format!("invalid utf-8 in {:?}", s)))
}

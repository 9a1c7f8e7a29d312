#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # razor-cluster
//!
//! The cluster control plane of the razor-rpc family: call a remote service by
//! interface name, and let the framework keep track of where its providers are,
//! which one to use and what to do when one fails.
//!
//! ## Components
//!
//! - [Extensions]: the composition root. Protocols, registries, fault tolerance
//!   strategies, load balancers and serializers are all picked by name from it.
//! - [registry]: provider availability per service, with change notification
//!   ([notify::ChangeEvent]).
//! - [cluster]: the sender pool of a service, load balancing (`random`,
//!   `roundrobin`, `leastactive`) and fault tolerance (`failover`, `failfast`,
//!   `failsafe`, `broadcast`).
//! - [client]: [Reference](client::Reference) resolves into a
//!   [ServiceProxy](client::ServiceProxy), or a typed client generated by [service_client!].
//! - [server]: [RpcServer](server::RpcServer) exports services and publishes them.
//!
//! The channel machinery (lifecycle state machine, in-flight table, futures) lives
//! in [razor-cluster-stream](razor_cluster_stream).
//!
//! ## Invocation path
//!
//! ```text
//! ServiceProxy::call -> Cluster::invoke -> LoadBalance::select -> Sender::send_request
//!                                                                   -> Channel -> ChannelBackend
//! ```

#[macro_use]
extern crate captains_log;

pub mod client;
pub mod cluster;
mod extension;
pub use extension::Extensions;
pub mod notify;
pub mod registry;
pub mod server;

pub use razor_cluster_codec as codec;
pub use razor_cluster_core::{
    BackoffConfig, ClientConfig, EndpointKind, ServerConfig, ServiceIdentity, Url, backoff, error,
    proto, url::keys,
};
pub use razor_cluster_stream as stream;

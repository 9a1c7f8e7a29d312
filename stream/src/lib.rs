#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(docsrs, allow(unused_attributes))]

//! # razor-cluster-stream
//!
//! This crate provides the channel-level machinery of [`razor-cluster`](https://docs.rs/razor-cluster):
//! everything between "a sender was picked" and "a response (or failure) came back".
//!
//! If you are looking for a high-level interface that calls a service by name, use
//! [`razor-cluster`](https://docs.rs/razor-cluster) instead.
//!
//! ## The Design
//!
//! A [Channel](channel::Channel) is a logical connection with a lifecycle
//! ([ChannelState](state::ChannelState)): `Created -> Initialized -> Active <-> Inactive -> Closed`.
//! The transport under it is a pluggable [ChannelBackend](channel::ChannelBackend), built by a
//! [Protocol](protocol::Protocol).
//!
//! There's a `seq` ID assigned to a packet to track a request and response, unique within the
//! lifetime of the channel. Responses are matched by `seq` only, so they may come back in any order.
//! Every request carries a deadline. When it passes, the request is removed from the in-flight
//! table and its [FutureResponse](future::FutureResponse) resolves with a timeout; a response
//! arriving after that is logged and dropped.
//!
//! Health checks are `Ping` packets without business payload. A failed one moves an `Active`
//! channel to `Inactive`, the next successful one brings it back.
//!
//! A [Sender](sender::Sender) wraps one channel for one provider and is what load balancers pick.
//!

#[macro_use]
extern crate captains_log;

pub mod channel;
pub mod future;
mod inflight;
pub use inflight::InflightTable;
pub mod protocol;
pub mod sender;
pub mod server;
pub mod state;

pub use channel::{Channel, ChannelBackend, ChannelConfig, ChannelEvents};
pub use future::{FutureResponse, Outcome};
pub use sender::{InflightGuard, Sender};
pub use state::ChannelState;

//! # razor-cluster-core
//!
//! This crate provides the core utilities for [`razor-cluster`](https://docs.rs/razor-cluster).
//! It includes the endpoint descriptor, the extension loader, common types, and error handling
//! used by other crates in the workspace.

#[macro_use]
extern crate captains_log;

pub mod backoff;
mod config;
pub use config::*;
pub mod error;
pub mod extension;
pub mod proto;
mod service;
pub use service::ServiceIdentity;
pub mod url;
pub use url::{EndpointKind, Url};

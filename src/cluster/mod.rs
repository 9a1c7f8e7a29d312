//! Client-side cluster layer: the sender pool of a service, the load balancers
//! choosing among its senders, and the fault tolerance strategies driving them.

pub mod balance;
mod pool;
pub use pool::SenderPool;
pub mod strategy;

pub use balance::LoadBalance;
pub use strategy::{Cluster, ClusterContext};

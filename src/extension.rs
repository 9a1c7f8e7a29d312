//! The composition root.
//!
//! [Extensions] owns one [ExtensionLoader] per capability and is the only
//! place a strategy is built from its name. It is created once at startup,
//! optionally customized, then shared by `Arc` with every reference and
//! server of the process.

use crate::cluster::balance::{LeastActiveBalance, LoadBalance, RandomBalance, RoundRobinBalance};
use crate::cluster::strategy::{Broadcast, Cluster, Failfast, Failover, Failsafe};
use crate::registry::{MemoryRegistryFactory, NoRegistryFactory, RegistryFactory};
use captains_log::filter::LogFilter;
use razor_cluster_codec::{JsonCodec, MsgpCodec, Serializer};
use razor_cluster_core::error::ExtensionError;
use razor_cluster_core::extension::{ExtensionLoader, ExtensionRow, Factory, Scope};
use razor_cluster_local::LocalProtocol;
use razor_cluster_stream::protocol::Protocol;
use std::fmt;
use std::sync::Arc;

fn local_protocol() -> Arc<dyn Protocol> {
    Arc::new(LocalProtocol::new())
}

fn none_registry() -> Arc<dyn RegistryFactory> {
    Arc::new(NoRegistryFactory())
}

fn memory_registry() -> Arc<dyn RegistryFactory> {
    Arc::new(MemoryRegistryFactory::default())
}

fn failover() -> Arc<dyn Cluster> {
    Arc::new(Failover())
}

fn failfast() -> Arc<dyn Cluster> {
    Arc::new(Failfast())
}

fn failsafe() -> Arc<dyn Cluster> {
    Arc::new(Failsafe())
}

fn broadcast() -> Arc<dyn Cluster> {
    Arc::new(Broadcast())
}

fn random() -> Arc<dyn LoadBalance> {
    Arc::new(RandomBalance())
}

fn round_robin() -> Arc<dyn LoadBalance> {
    Arc::new(RoundRobinBalance::default())
}

fn least_active() -> Arc<dyn LoadBalance> {
    Arc::new(LeastActiveBalance())
}

fn msgpack() -> Arc<dyn Serializer> {
    Arc::new(MsgpCodec::default())
}

fn json() -> Arc<dyn Serializer> {
    Arc::new(JsonCodec::default())
}

// The first row of each table is the default of its capability.

static PROTOCOLS: &[ExtensionRow<dyn Protocol>] = &[("local", Scope::Singleton, local_protocol)];

static REGISTRIES: &[ExtensionRow<dyn RegistryFactory>] = &[
    ("none", Scope::Singleton, none_registry),
    ("memory", Scope::Singleton, memory_registry),
];

static CLUSTERS: &[ExtensionRow<dyn Cluster>] = &[
    ("failover", Scope::Singleton, failover),
    ("failfast", Scope::Singleton, failfast),
    ("failsafe", Scope::Singleton, failsafe),
    ("broadcast", Scope::Singleton, broadcast),
];

// Balancers keep per-reference counters
static BALANCERS: &[ExtensionRow<dyn LoadBalance>] = &[
    ("random", Scope::Prototype, random),
    ("roundrobin", Scope::Prototype, round_robin),
    ("leastactive", Scope::Prototype, least_active),
];

static SERIALIZERS: &[ExtensionRow<dyn Serializer>] =
    &[("msgpack", Scope::Prototype, msgpack), ("json", Scope::Prototype, json)];

pub struct Extensions {
    protocols: ExtensionLoader<dyn Protocol>,
    registries: ExtensionLoader<dyn RegistryFactory>,
    clusters: ExtensionLoader<dyn Cluster>,
    balancers: ExtensionLoader<dyn LoadBalance>,
    serializers: ExtensionLoader<dyn Serializer>,
    logger: Arc<LogFilter>,
}

impl Extensions {
    /// Every built-in implementation registered under its usual name
    pub fn with_defaults() -> Result<Self, ExtensionError> {
        Ok(Self {
            protocols: ExtensionLoader::from_table("protocol", PROTOCOLS)?,
            registries: ExtensionLoader::from_table("registry", REGISTRIES)?,
            clusters: ExtensionLoader::from_table("cluster", CLUSTERS)?,
            balancers: ExtensionLoader::from_table("loadbalance", BALANCERS)?,
            serializers: ExtensionLoader::from_table("serializer", SERIALIZERS)?,
            logger: Arc::new(LogFilter::new()),
        })
    }

    #[inline]
    pub fn protocol(&self, name: &str) -> Result<Arc<dyn Protocol>, ExtensionError> {
        self.protocols.load(name)
    }

    #[inline]
    pub fn registry_factory(&self, name: &str) -> Result<Arc<dyn RegistryFactory>, ExtensionError> {
        self.registries.load(name)
    }

    #[inline]
    pub fn cluster(&self, name: &str) -> Result<Arc<dyn Cluster>, ExtensionError> {
        self.clusters.load(name)
    }

    #[inline]
    pub fn load_balance(&self, name: &str) -> Result<Arc<dyn LoadBalance>, ExtensionError> {
        self.balancers.load(name)
    }

    #[inline]
    pub fn serializer(&self, name: &str) -> Result<Arc<dyn Serializer>, ExtensionError> {
        self.serializers.load(name)
    }

    /// Constructor of a serializer, for pools that hold their own instances
    #[inline]
    pub fn serializer_factory(&self, name: &str) -> Result<Factory<dyn Serializer>, ExtensionError> {
        self.serializers.factory(name)
    }

    pub fn serializer_names(&self) -> Vec<&str> {
        self.serializers.names()
    }

    pub fn protocols_mut(&mut self) -> &mut ExtensionLoader<dyn Protocol> {
        &mut self.protocols
    }

    pub fn registries_mut(&mut self) -> &mut ExtensionLoader<dyn RegistryFactory> {
        &mut self.registries
    }

    pub fn clusters_mut(&mut self) -> &mut ExtensionLoader<dyn Cluster> {
        &mut self.clusters
    }

    pub fn balancers_mut(&mut self) -> &mut ExtensionLoader<dyn LoadBalance> {
        &mut self.balancers
    }

    pub fn serializers_mut(&mut self) -> &mut ExtensionLoader<dyn Serializer> {
        &mut self.serializers
    }

    /// Construct a [captains_log::filter::Filter](https://docs.rs/captains-log/latest/captains_log/filter/trait.Filter.html)
    /// shared by the channels built from this root
    #[inline]
    pub fn new_logger(&self) -> Arc<LogFilter> {
        self.logger.clone()
    }

    #[inline]
    pub fn set_log_level(&self, level: log::Level) {
        self.logger.set_level(level);
    }
}

impl fmt::Debug for Extensions {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Extensions")
            .field("protocols", &self.protocols)
            .field("registries", &self.registries)
            .field("clusters", &self.clusters)
            .field("balancers", &self.balancers)
            .field("serializers", &self.serializers)
            .finish()
    }
}

use crate::url::{Url, keys};
use std::time::Duration;

/// General config for client-side
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Deadline of a call, counted from the moment the proxy builds the request
    pub timeout: Duration,
    /// Max number of senders tried by the failover strategy
    pub retries: usize,
    /// Name of the fault tolerance strategy
    pub cluster: String,
    /// Name of the load balance algorithm
    pub loadbalance: String,
    pub serializer: String,
    /// Protocol used to reach providers when the provider url does not say
    pub protocol: String,
    /// Interval of channel health checks, zero to disable.
    pub health_check_interval: Duration,
    /// Time allowed to establish a channel and pass the first health check
    pub connect_timeout: Duration,
    /// Backoff when subscribing to an unreachable registry
    pub registry_retry: BackoffConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            retries: 3,
            cluster: "failover".to_string(),
            loadbalance: "random".to_string(),
            serializer: "msgpack".to_string(),
            protocol: "local".to_string(),
            health_check_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(3),
            registry_retry: BackoffConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Override fields with the parameters present in `url`
    pub fn overlay(mut self, url: &Url) -> Self {
        if let Some(timeout) = url.timeout() {
            self.timeout = timeout;
        }
        if let Some(retries) = url.retries() {
            self.retries = retries;
        }
        if let Some(cluster) = url.param(keys::CLUSTER) {
            self.cluster = cluster.to_string();
        }
        if let Some(lb) = url.param(keys::LOADBALANCE) {
            self.loadbalance = lb.to_string();
        }
        if let Some(serializer) = url.serializer() {
            self.serializer = serializer.to_string();
        }
        if let Some(ms) = url.param(keys::HEARTBEAT).and_then(|v| v.parse::<u64>().ok()) {
            self.health_check_interval = Duration::from_millis(ms);
        }
        self
    }
}

/// General config for server-side
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub serializer: String,
    /// Number of codec instances kept for decoding requests
    pub codec_pool_size: usize,
    /// Backoff when registering to an unreachable registry
    pub registry_retry: BackoffConfig,
    /// Time between deactivating the services and tearing them down on shutdown
    pub drain_wait: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            serializer: "msgpack".to_string(),
            codec_pool_size: 4,
            registry_retry: BackoffConfig::default(),
            drain_wait: Duration::from_secs(0),
        }
    }
}

/// Exponential backoff for operations whose retry is owned by the caller
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    pub max_attempts: u32,
    pub initial: Duration,
    pub max: Duration,
    pub multiplier: f64,
    /// Randomize each delay by up to this fraction, 0.0 to disable
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial: Duration::from_millis(100),
            max: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// A single attempt, no retry
    pub fn once() -> Self {
        Self { max_attempts: 1, ..Default::default() }
    }

    /// Delay before retry number `attempt` (starting from 1)
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.initial.as_millis() as f64 * self.multiplier.powi(attempt as i32 - 1);
        let base = base.min(self.max.as_millis() as f64);
        let delay = if self.jitter > 0.0 {
            base + base * self.jitter * (rand::random::<f64>() * 2.0 - 1.0)
        } else {
            base
        };
        Duration::from_millis(delay.max(1.0) as u64)
    }
}

//! Picking one sender among the routable candidates.
//!
//! A balancer is handed the candidates already filtered by the cluster layer
//! (active, not yet tried in this call), in the pool's insertion order.

use parking_lot::Mutex;
use rand::Rng;
use razor_cluster_core::proto::Request;
use razor_cluster_core::{ServiceIdentity, Url};
use razor_cluster_stream::Sender;
use std::collections::HashMap;
use std::sync::Arc;

pub trait LoadBalance: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    /// None only when `candidates` is empty
    fn select(&self, candidates: &[Arc<Sender>], req: &Request) -> Option<Arc<Sender>>;
}

/// Uniform, or proportional to the `weight` parameter when the weights differ
#[derive(Default)]
pub struct RandomBalance();

impl LoadBalance for RandomBalance {
    fn name(&self) -> &'static str {
        "random"
    }

    fn select(&self, candidates: &[Arc<Sender>], _req: &Request) -> Option<Arc<Sender>> {
        match candidates.len() {
            0 => return None,
            1 => return Some(candidates[0].clone()),
            _ => {}
        }
        let mut rng = rand::thread_rng();
        let first = candidates[0].weight();
        let total: u64 = candidates.iter().map(|s| s.weight() as u64).sum();
        if total == 0 || candidates.iter().all(|s| s.weight() == first) {
            return Some(candidates[rng.gen_range(0..candidates.len())].clone());
        }
        let mut offset = rng.gen_range(0..total);
        for sender in candidates {
            let weight = sender.weight() as u64;
            if offset < weight {
                return Some(sender.clone());
            }
            offset -= weight;
        }
        candidates.last().cloned()
    }
}

#[derive(Default)]
struct Cursor {
    last: Option<Url>,
    index: usize,
}

/// Cycle through the candidates in pool order.
///
/// The cursor remembers which sender went last. When it has left the pool,
/// the one that took its position goes next, so a removal never makes the
/// rotation skip or repeat a remaining sender.
#[derive(Default)]
pub struct RoundRobinBalance {
    cursors: Mutex<HashMap<ServiceIdentity, Cursor>>,
}

impl LoadBalance for RoundRobinBalance {
    fn name(&self) -> &'static str {
        "roundrobin"
    }

    fn select(&self, candidates: &[Arc<Sender>], req: &Request) -> Option<Arc<Sender>> {
        if candidates.is_empty() {
            return None;
        }
        let mut cursors = self.cursors.lock();
        let cursor = cursors.entry(req.service.clone()).or_default();
        let last = cursor.last.as_ref().and_then(|u| candidates.iter().position(|s| s.url() == u));
        let next = match last {
            Some(i) => (i + 1) % candidates.len(),
            None => cursor.index % candidates.len(),
        };
        let chosen = candidates[next].clone();
        cursor.last = Some(chosen.url().clone());
        cursor.index = next;
        Some(chosen)
    }
}

/// Fewest in-flight requests wins, ties broken at random
#[derive(Default)]
pub struct LeastActiveBalance();

impl LoadBalance for LeastActiveBalance {
    fn name(&self) -> &'static str {
        "leastactive"
    }

    fn select(&self, candidates: &[Arc<Sender>], _req: &Request) -> Option<Arc<Sender>> {
        let least = candidates.iter().map(|s| s.inflight()).min()?;
        let tied: Vec<&Arc<Sender>> = candidates.iter().filter(|s| s.inflight() == least).collect();
        let pick = match tied.len() {
            // inflight moved between the two scans
            0 => return candidates.first().cloned(),
            1 => 0,
            n => rand::thread_rng().gen_range(0..n),
        };
        Some(tied[pick].clone())
    }
}

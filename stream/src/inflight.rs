use crate::future::FutureResponse;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::task::AbortHandle;

struct Pending {
    fut: FutureResponse,
    timer: Option<AbortHandle>,
}

/// Requests sent on a channel and not yet answered, keyed by seq.
///
/// Removal is the only way to obtain the right to resolve a future: the
/// response path, the deadline timer and channel close all go through
/// [take](Self::take) or [drain](Self::drain), and at most one of them gets
/// the entry.
#[derive(Default)]
pub struct InflightTable {
    map: Mutex<HashMap<u64, Pending>>,
}

impl InflightTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, fut: FutureResponse) {
        let seq = fut.seq();
        self.map.lock().insert(seq, Pending { fut, timer: None });
    }

    /// Attach the deadline timer of `seq`, aborting it if the entry is already gone
    pub fn set_timer(&self, seq: u64, timer: AbortHandle) {
        let mut map = self.map.lock();
        match map.get_mut(&seq) {
            Some(pending) => pending.timer = Some(timer),
            None => timer.abort(),
        }
    }

    /// Remove `seq`, the caller becomes the one to resolve it
    pub fn take(&self, seq: u64) -> Option<FutureResponse> {
        let pending = self.map.lock().remove(&seq)?;
        if let Some(timer) = pending.timer {
            timer.abort();
        }
        Some(pending.fut)
    }

    /// Remove every entry, used on close
    pub fn drain(&self) -> Vec<FutureResponse> {
        let drained: Vec<Pending> = self.map.lock().drain().map(|(_, p)| p).collect();
        drained
            .into_iter()
            .map(|p| {
                if let Some(timer) = p.timer {
                    timer.abort();
                }
                p.fut
            })
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.map.lock().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

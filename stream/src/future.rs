//! The asynchronous handle of one call.
//!
//! A [FutureResponse] is resolved exactly once, either by the channel when the
//! response arrives, by the deadline timer, or by channel close. Whoever
//! removes the entry from the in-flight table owns the resolution, so a second
//! `resolve()` is a bug in the caller and is refused.

use parking_lot::Mutex;
use razor_cluster_core::error::RpcError;
use std::fmt;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::Notify;

/// Serialized result or the error of a call
pub type Outcome = Result<Vec<u8>, RpcError>;

type Callback = Box<dyn FnOnce(&Outcome) + Send>;

struct Callbacks {
    pending: Vec<Callback>,
    /// Set once the resolver has fired everything, later callbacks run inline
    drained: bool,
}

struct Inner {
    seq: u64,
    created_at: Instant,
    outcome: OnceLock<Outcome>,
    callbacks: Mutex<Callbacks>,
    notify: Notify,
}

#[derive(Clone)]
pub struct FutureResponse(Arc<Inner>);

impl FutureResponse {
    pub fn new(seq: u64) -> Self {
        Self(Arc::new(Inner {
            seq,
            created_at: Instant::now(),
            outcome: OnceLock::new(),
            callbacks: Mutex::new(Callbacks { pending: Vec::new(), drained: false }),
            notify: Notify::new(),
        }))
    }

    #[inline]
    pub fn seq(&self) -> u64 {
        self.0.seq
    }

    #[inline]
    pub fn created_at(&self) -> Instant {
        self.0.created_at
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.0.outcome.get().is_some()
    }

    /// The outcome, if already determined
    #[inline]
    pub fn try_get(&self) -> Option<&Outcome> {
        self.0.outcome.get()
    }

    /// Set the outcome and fire callbacks in registration order.
    ///
    /// Returns false (and drops `outcome`) when already resolved.
    pub fn resolve(&self, outcome: Outcome) -> bool {
        if self.0.outcome.set(outcome).is_err() {
            return false;
        }
        self.0.notify.notify_waiters();
        let Some(outcome) = self.0.outcome.get() else { return true };
        loop {
            let batch = {
                let mut cbs = self.0.callbacks.lock();
                if cbs.pending.is_empty() {
                    cbs.drained = true;
                    break;
                }
                std::mem::take(&mut cbs.pending)
            };
            for cb in batch {
                cb(outcome);
            }
        }
        true
    }

    /// Run `cb` with the outcome. Registered after resolution it runs at once.
    pub fn add_callback<F>(&self, cb: F)
    where
        F: FnOnce(&Outcome) + Send + 'static,
    {
        {
            let mut cbs = self.0.callbacks.lock();
            if !cbs.drained {
                cbs.pending.push(Box::new(cb));
                return;
            }
        }
        if let Some(outcome) = self.0.outcome.get() {
            cb(outcome);
        }
    }

    pub fn on_success<F>(&self, cb: F)
    where
        F: FnOnce(&[u8]) + Send + 'static,
    {
        self.add_callback(move |o| {
            if let Ok(payload) = o {
                cb(payload)
            }
        })
    }

    pub fn on_failure<F>(&self, cb: F)
    where
        F: FnOnce(&RpcError) + Send + 'static,
    {
        self.add_callback(move |o| {
            if let Err(e) = o {
                cb(e)
            }
        })
    }

    /// Wait for the outcome
    pub async fn wait(&self) -> Outcome {
        loop {
            let notified = self.0.notify.notified();
            if let Some(outcome) = self.0.outcome.get() {
                return outcome.clone();
            }
            notified.await;
        }
    }
}

impl fmt::Debug for FutureResponse {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "future(seq={}, done={})", self.0.seq, self.is_done())
    }
}

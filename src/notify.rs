//! Change notification between a registry and whoever watches it.
//!
//! A registry backend emits one [ChangeEvent] per change of a service's
//! provider list, always carrying the full list so a listener never has to
//! merge deltas. The sender pool re-emits the same type to its own listeners
//! when its membership changes.

use crate::registry::ProviderEntry;
use razor_cluster_core::{ServiceIdentity, Url};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    /// The registry that observed the change
    pub registry: Url,
    pub service: ServiceIdentity,
    /// Every known provider of `service`, in registration order
    pub providers: Vec<ProviderEntry>,
}

impl ChangeEvent {
    pub fn new(registry: Url, service: ServiceIdentity, providers: Vec<ProviderEntry>) -> Self {
        Self { registry, service, providers }
    }

    /// Providers currently open for traffic
    pub fn active(&self) -> impl Iterator<Item = &Url> {
        self.providers.iter().filter(|p| p.active).map(|p| &p.url)
    }
}

/// Receiver of [ChangeEvent].
///
/// Called synchronously on the notifying task, so it must not block and must
/// not call back into the registry that notifies it.
pub trait NotifyListener: Send + Sync + 'static {
    fn notify(&self, event: &ChangeEvent);
}

impl<F> NotifyListener for F
where
    F: Fn(&ChangeEvent) + Send + Sync + 'static,
{
    #[inline]
    fn notify(&self, event: &ChangeEvent) {
        self(event)
    }
}

/// Deliver `event` to every listener in order
pub fn dispatch<'a, I>(listeners: I, event: &ChangeEvent)
where
    I: IntoIterator<Item = &'a Arc<dyn NotifyListener>>,
{
    for listener in listeners {
        listener.notify(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_dispatch_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let listeners: Vec<Arc<dyn NotifyListener>> = (0..3)
            .map(|i| {
                let seen = seen.clone();
                Arc::new(move |e: &ChangeEvent| seen.lock().push((i, e.active().count())))
                    as Arc<dyn NotifyListener>
            })
            .collect();
        let a = Url::provider("local", "127.0.0.1", 1, "demo.Echo");
        let b = Url::provider("local", "127.0.0.1", 2, "demo.Echo");
        let event = ChangeEvent::new(
            Url::registry("memory", "127.0.0.1", 0),
            ServiceIdentity::of("demo.Echo"),
            vec![ProviderEntry::new(a, true), ProviderEntry::new(b, false)],
        );
        dispatch(&listeners, &event);
        assert_eq!(*seen.lock(), vec![(0, 1), (1, 1), (2, 1)]);
    }
}

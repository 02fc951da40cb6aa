//! Subscription registry shared by the thermal and memory monitors and the scheduler
//!
//! Registration hands back a [`ListenerId`] token that is the only way to
//! remove the listener again. Dispatch isolates listeners from each other:
//! a panicking listener is logged and skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Token returned when a listener is registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Shared callback type
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of listeners keyed by their registration token.
///
/// Not synchronised on its own; owners keep it inside their critical section
/// and call [`ListenerRegistry::snapshot`] before dispatching so no lock is
/// held while user code runs.
pub struct ListenerRegistry<T> {
    next_id: u64,
    listeners: BTreeMap<ListenerId, Listener<T>>,
}

impl<T> Default for ListenerRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ListenerRegistry<T> {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            listeners: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, listener: Listener<T>) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.listeners.insert(id, listener);
        id
    }

    /// Returns false when the token was unknown or already removed
    pub fn remove(&mut self, id: ListenerId) -> bool {
        self.listeners.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Clone the current listeners in registration order
    pub fn snapshot(&self) -> Vec<(ListenerId, Listener<T>)> {
        self.listeners
            .iter()
            .map(|(id, l)| (*id, Arc::clone(l)))
            .collect()
    }
}

/// Invoke every listener with `event`, catching panics per listener.
///
/// Returns the number of listeners that panicked.
pub fn dispatch<T>(listeners: &[(ListenerId, Listener<T>)], event: &T, kind: &str) -> usize {
    let mut failures = 0;
    for (id, listener) in listeners {
        if catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
            failures += 1;
            warn!(listener = %id, kind = %kind, "Listener panicked, continuing with remaining listeners");
        }
    }
    failures
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_ids_are_unique_and_removable() {
        let mut registry: ListenerRegistry<u32> = ListenerRegistry::new();
        let a = registry.add(Arc::new(|_| {}));
        let b = registry.add(Arc::new(|_| {}));

        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert!(registry.remove(a));
        assert!(!registry.remove(a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_others() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry: ListenerRegistry<u32> = ListenerRegistry::new();

        let c = calls.clone();
        registry.add(Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        registry.add(Arc::new(|_| panic!("listener failure")));
        let c = calls.clone();
        registry.add(Arc::new(move |v| {
            c.fetch_add(*v as usize, Ordering::SeqCst);
        }));

        let failures = dispatch(&registry.snapshot(), &10, "test");

        assert_eq!(failures, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 11);
    }
}

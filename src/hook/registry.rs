//! Per-thread observer registry.
//!
//! This module provides [`ObserverRegistry`], which keeps one ordered list of observers per
//! [`ObserverKind`]. Registration order is firing order. Removal keeps the relative order of
//! the remaining observers, so a failing observer never reshuffles its neighbours.

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use strum::EnumCount;

use crate::hook::types::{ObserverKind, SharedObserver};

static NEXT_OBSERVER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle identifying one registered observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    fn allocate() -> Self {
        ObserverId(NEXT_OBSERVER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ObserverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "observer#{}", self.0)
    }
}

/// Ordered observer lists, one per [`ObserverKind`].
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    lists: [Vec<(ObserverId, SharedObserver)>; ObserverKind::COUNT],
}

impl ObserverRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends an observer to the list for `kind`.
    pub(crate) fn register(&mut self, kind: ObserverKind, observer: SharedObserver) -> ObserverId {
        let id = ObserverId::allocate();
        self.lists[kind as usize].push((id, observer));
        id
    }

    /// Removes the observer with `id`, wherever it is registered.
    ///
    /// Returns `true` if it was found.
    pub(crate) fn unregister(&mut self, id: ObserverId) -> bool {
        for list in &mut self.lists {
            if let Some(position) = list.iter().position(|(known, _)| *known == id) {
                list.remove(position);
                return true;
            }
        }
        false
    }

    /// Returns `true` if `id` is still registered.
    pub(crate) fn contains(&self, id: ObserverId) -> bool {
        self.lists
            .iter()
            .any(|list| list.iter().any(|(known, _)| *known == id))
    }

    /// Returns a snapshot of the observers registered for `kind`, in firing order.
    ///
    /// Firing works on the snapshot so observers may register or unregister observers
    /// without holding the registry lock.
    pub(crate) fn snapshot(&self, kind: ObserverKind) -> Vec<(ObserverId, SharedObserver)> {
        self.lists[kind as usize].clone()
    }

    /// Number of observers registered for `kind`.
    #[cfg(test)]
    pub(crate) fn count(&self, kind: ObserverKind) -> usize {
        self.lists[kind as usize].len()
    }

    /// Returns `true` if no observer is registered for any kind.
    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<usize> = self.lists.iter().map(Vec::len).collect();
        f.debug_struct("ObserverRegistry")
            .field("counts", &counts)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::hook::types::TraceFlow;

    fn noop() -> SharedObserver {
        Arc::new(|_| Ok(TraceFlow::Continue))
    }

    #[test]
    fn registry_empty() {
        let registry = ObserverRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.count(ObserverKind::Step), 0);
    }

    #[test]
    fn registration_order_is_kept() {
        let mut registry = ObserverRegistry::new();
        let a = registry.register(ObserverKind::Step, noop());
        let b = registry.register(ObserverKind::Step, noop());
        let c = registry.register(ObserverKind::Step, noop());
        registry.register(ObserverKind::Any, noop());

        assert!(registry.unregister(b));
        let ids: Vec<_> = registry
            .snapshot(ObserverKind::Step)
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![a, c]);
        assert_eq!(registry.count(ObserverKind::Any), 1);
    }

    #[test]
    fn unregister_unknown_is_false() {
        let mut registry = ObserverRegistry::new();
        let id = registry.register(ObserverKind::Call, noop());
        assert!(registry.contains(id));
        assert!(registry.unregister(id));
        assert!(!registry.contains(id));
        assert!(!registry.unregister(id));
        assert!(registry.is_empty());
    }
}

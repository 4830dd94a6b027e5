//! Thread record registry.

use std::sync::Arc;

use dashmap::DashMap;

use crate::thread::{ThreadId, ThreadRecord};

/// Map from thread id to the live record of that thread.
///
/// The map is the only structure mutated by many threads at once. Shard locks are held
/// for single insert, lookup and remove operations only; no callback ever runs under one.
#[derive(Default)]
pub(crate) struct Registry {
    records: DashMap<ThreadId, Arc<ThreadRecord>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the record for `id`, creating it with `create` if absent.
    ///
    /// Returns the record and whether it was created by this call.
    pub(crate) fn get_or_create(
        &self,
        id: ThreadId,
        create: impl FnOnce() -> ThreadRecord,
    ) -> (Arc<ThreadRecord>, bool) {
        if let Some(record) = self.records.get(&id) {
            return (Arc::clone(record.value()), false);
        }

        let mut created = false;
        let record = self
            .records
            .entry(id)
            .or_insert_with(|| {
                created = true;
                Arc::new(create())
            })
            .value()
            .clone();
        (record, created)
    }

    pub(crate) fn get(&self, id: ThreadId) -> Option<Arc<ThreadRecord>> {
        self.records.get(&id).map(|record| Arc::clone(record.value()))
    }

    /// Ids of all live records.
    pub(crate) fn ids(&self) -> Vec<ThreadId> {
        self.records.iter().map(|entry| *entry.key()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Removes the record for `id`, retires it and abandons its remaining events.
    ///
    /// Idempotent; returns `false` if no record was present.
    pub(crate) fn finalize(&self, id: ThreadId, reason: &str) -> bool {
        let Some((_, record)) = self.records.remove(&id) else {
            return false;
        };

        let remaining = record.retire();
        if !remaining.is_empty() {
            tracing::warn!(
                thread = %id,
                discarded = remaining.len(),
                reason,
                "discarding queued events"
            );
            for event in remaining {
                event.discard(reason);
            }
        }
        tracing::debug!(thread = %id, reason, "thread record finalized");
        true
    }

    /// Finalizes the record of an OS thread that exited without leaving its root frame.
    pub(crate) fn reap(&self, id: ThreadId) {
        self.finalize(id, "thread exited");
    }

    /// Retires every record. Used on shutdown.
    pub(crate) fn clear(&self, reason: &str) {
        for id in self.ids() {
            self.finalize(id, reason);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Barrier, thread};

    use super::*;
    use crate::thread::RecordFlags;

    fn make(id: ThreadId) -> impl FnOnce() -> ThreadRecord {
        move || ThreadRecord::new(id, None, RecordFlags::all())
    }

    #[test]
    fn creation_is_idempotent() {
        let registry = Registry::new();
        let id = ThreadId::allocate();
        let (first, created) = registry.get_or_create(id, make(id));
        assert!(created);
        let (second, created) = registry.get_or_create(id, make(id));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn concurrent_creation_yields_one_record() {
        let registry = Arc::new(Registry::new());
        let id = ThreadId::allocate();
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    registry.get_or_create(id, make(id))
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        for (record, _) in &results {
            assert!(Arc::ptr_eq(record, &results[0].0));
        }
    }

    #[test]
    fn finalize_is_idempotent() {
        let registry = Registry::new();
        let id = ThreadId::allocate();
        let (record, _) = registry.get_or_create(id, make(id));

        assert!(registry.finalize(id, "done"));
        assert!(!registry.finalize(id, "done"));
        assert!(registry.get(id).is_none());
        assert!(!record.is_alive());
    }
}

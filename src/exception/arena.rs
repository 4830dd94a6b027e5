//! Side table associating propagating exceptions with their traceback chains.
//!
//! Chains are stored in generation-counted slots. An [`ExceptionToken`] names a slot *and*
//! the generation it was issued for, so once an exception is dropped and its slot is
//! recycled, a stale token can never read or extend the chain of the newer exception that
//! now occupies the slot.

use std::{borrow::Cow, sync::Mutex};

use crate::thread::{Frame, FrameId, Location, ThreadId};

/// Handle naming one exception's traceback chain inside a runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ExceptionToken {
    index: u32,
    generation: u32,
}

impl ExceptionToken {
    /// Returns the slot index.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Returns the slot generation this token was issued for.
    #[must_use]
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

/// One snapshot of a frame an exception unwound through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TraceEntry {
    /// Identity of the frame activation.
    pub frame: FrameId,
    /// Name the frame was entered under.
    pub function: Cow<'static, str>,
    /// Location in the frame when the snapshot was taken.
    pub location: Location,
}

impl From<&Frame> for TraceEntry {
    fn from(frame: &Frame) -> Self {
        TraceEntry {
            frame: frame.id(),
            function: Cow::Owned(frame.function().to_string()),
            location: frame.location(),
        }
    }
}

/// Recorded traceback of one exception.
#[derive(Clone, Debug, Default)]
pub struct TracebackChain {
    /// Thread the exception became active in.
    pub thread: Option<ThreadId>,
    /// Snapshots appended at exception checkpoints, innermost frame first.
    pub entries: Vec<TraceEntry>,
    /// The full frame chain at activation, innermost first, masks ignored.
    pub raw: Vec<TraceEntry>,
    /// Frame masks kept alive on behalf of this exception.
    pub(crate) retained_masks: Vec<(ThreadId, FrameId)>,
}

impl TracebackChain {
    /// Returns the trace to display: the recorded entries, or the raw chain if nothing
    /// was recorded.
    #[must_use]
    pub fn display_entries(&self) -> &[TraceEntry] {
        if self.entries.is_empty() {
            &self.raw
        } else {
            &self.entries
        }
    }
}

#[derive(Default)]
struct Slot {
    generation: u32,
    chain: Option<TracebackChain>,
}

#[derive(Default)]
struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
}

/// Generation-counted store of traceback chains.
#[derive(Default)]
pub(crate) struct ExceptionArena {
    inner: Mutex<Slots>,
}

impl ExceptionArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Stores `chain` and returns the token naming it.
    pub(crate) fn insert(&self, chain: TracebackChain) -> ExceptionToken {
        let mut inner = lock!(self.inner);
        if let Some(index) = inner.free.pop() {
            let slot = &mut inner.slots[index as usize];
            slot.chain = Some(chain);
            return ExceptionToken {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(inner.slots.len()).unwrap_or(u32::MAX);
        inner.slots.push(Slot {
            generation: 0,
            chain: Some(chain),
        });
        ExceptionToken {
            index,
            generation: 0,
        }
    }

    /// Runs `f` on the chain named by `token`, if the token is still current.
    pub(crate) fn with_chain<R>(
        &self,
        token: ExceptionToken,
        f: impl FnOnce(&mut TracebackChain) -> R,
    ) -> Option<R> {
        let mut inner = lock!(self.inner);
        let slot = inner.slots.get_mut(token.index as usize)?;
        if slot.generation != token.generation {
            return None;
        }
        slot.chain.as_mut().map(f)
    }

    /// Returns a copy of the chain named by `token`.
    pub(crate) fn get(&self, token: ExceptionToken) -> Option<TracebackChain> {
        self.with_chain(token, |chain| chain.clone())
    }

    /// Removes the chain named by `token` and retires the token.
    pub(crate) fn remove(&self, token: ExceptionToken) -> Option<TracebackChain> {
        let mut inner = lock!(self.inner);
        let slot = inner.slots.get_mut(token.index as usize)?;
        if slot.generation != token.generation {
            return None;
        }
        let chain = slot.chain.take();
        slot.generation = slot.generation.wrapping_add(1);
        inner.free.push(token.index);
        chain
    }

    /// Number of chains currently stored.
    pub(crate) fn len(&self) -> usize {
        lock!(self.inner)
            .slots
            .iter()
            .filter(|slot| slot.chain.is_some())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(function: &'static str) -> TraceEntry {
        TraceEntry::from(&Frame::new(function.into(), Location::caller()))
    }

    #[test]
    fn insert_and_append() {
        let arena = ExceptionArena::new();
        let token = arena.insert(TracebackChain::default());
        arena.with_chain(token, |chain| chain.entries.push(entry("inner")));
        arena.with_chain(token, |chain| chain.entries.push(entry("outer")));

        let chain = arena.get(token).unwrap();
        let names: Vec<_> = chain.entries.iter().map(|e| e.function.as_ref()).collect();
        assert_eq!(names, vec!["inner", "outer"]);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn recycled_slot_rejects_stale_token() {
        let arena = ExceptionArena::new();
        let stale = arena.insert(TracebackChain::default());
        assert!(arena.remove(stale).is_some());

        let fresh = arena.insert(TracebackChain::default());
        assert_eq!(fresh.index(), stale.index());
        assert_ne!(fresh.generation(), stale.generation());

        assert!(arena.with_chain(stale, |_| ()).is_none());
        assert!(arena.remove(stale).is_none());
        assert!(arena.get(fresh).is_some());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn display_falls_back_to_raw() {
        let mut chain = TracebackChain {
            raw: vec![entry("raw")],
            ..TracebackChain::default()
        };
        assert_eq!(chain.display_entries()[0].function, "raw");

        chain.entries.push(entry("recorded"));
        assert_eq!(chain.display_entries()[0].function, "recorded");
    }
}

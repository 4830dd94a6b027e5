//! Per-thread event queue.
//!
//! Foreign threads only append; the owning thread's checkpoint is the only consumer. Once
//! the owner starts leaving, the queue is closed: later appends are refused and handed
//! back to the producer, so no event can be stranded in a queue nobody drains.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Condvar, Mutex,
    },
    time::Duration,
};

use strum::{Display, IntoStaticStr};

use crate::{
    event::result::{Abandon, ScheduledResult},
    exception::Interrupt,
    thread::ThreadContext,
};

/// Body of an invoke event: runs the callee and stores its value in the result cell.
pub(crate) type InvokeFn = Box<dyn FnOnce(&ThreadContext) -> Result<(), Interrupt> + Send>;

/// A request scheduled onto a managed thread.
pub(crate) enum Event {
    /// Satisfies `done` when drained.
    Noop { done: ScheduledResult<()> },
    /// Runs a callee inside the target thread.
    Invoke {
        /// Callee name, used for its frame and in reports
        name: &'static str,
        call: InvokeFn,
        /// Result cell of the callee, abandoned if the event never runs or fails
        result: Box<dyn Abandon>,
    },
    /// Raises the interrupt at the draining checkpoint.
    Throw(Interrupt),
}

/// Discriminant of [`Event`], for diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Display, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum EventKind {
    /// Barrier event.
    Noop,
    /// Scheduled call.
    Invoke,
    /// Scheduled exception.
    Throw,
    /// Scheduled termination.
    Exit,
}

impl Event {
    pub(crate) fn kind(&self) -> EventKind {
        match self {
            Event::Noop { .. } => EventKind::Noop,
            Event::Invoke { .. } => EventKind::Invoke,
            Event::Throw(Interrupt::Raised(_)) => EventKind::Throw,
            Event::Throw(Interrupt::Exit(_)) => EventKind::Exit,
        }
    }

    /// Drops the event without running it, abandoning its result.
    pub(crate) fn discard(self, reason: &str) {
        match self {
            Event::Noop { done } => done.abandon(reason),
            Event::Invoke { result, .. } => result.abandon(reason.to_string()),
            Event::Throw(_) => {}
        }
    }
}

#[derive(Default)]
struct QueueState {
    events: VecDeque<Event>,
    closed: bool,
}

/// FIFO of pending events with a wakeup for idle owners.
#[derive(Default)]
pub(crate) struct EventQueue {
    state: Mutex<QueueState>,
    /// Number of queued events, readable without the lock
    pending: AtomicUsize,
    arrived: Condvar,
}

impl EventQueue {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends an event.
    ///
    /// # Errors
    ///
    /// Hands the event back if the queue is closed.
    pub(crate) fn push(&self, event: Event) -> std::result::Result<(), Event> {
        let mut state = lock!(self.state);
        if state.closed {
            return Err(event);
        }
        state.events.push_back(event);
        self.pending.fetch_add(1, Ordering::Release);
        self.arrived.notify_all();
        Ok(())
    }

    /// Pops the head event.
    pub(crate) fn pop(&self) -> Option<Event> {
        let mut state = lock!(self.state);
        let event = state.events.pop_front()?;
        self.pending.fetch_sub(1, Ordering::Release);
        Some(event)
    }

    /// Fast emptiness check used on every checkpoint.
    pub(crate) fn is_empty(&self) -> bool {
        self.pending.load(Ordering::Acquire) == 0
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Closes the queue and returns everything still queued, in order.
    pub(crate) fn close(&self) -> Vec<Event> {
        let mut state = lock!(self.state);
        state.closed = true;
        self.pending.store(0, Ordering::Release);
        self.arrived.notify_all();
        state.events.drain(..).collect()
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        lock!(self.state).closed
    }

    /// Parks the caller until an event is queued, the queue is closed, or `timeout`
    /// elapses.
    ///
    /// Returns `true` if events are pending.
    pub(crate) fn wait(&self, timeout: Duration) -> bool {
        let state = lock!(self.state);
        let (state, _) = self
            .arrived
            .wait_timeout_while(state, timeout, |state| {
                state.events.is_empty() && !state.closed
            })
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        !state.events.is_empty()
    }
}

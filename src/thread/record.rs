//! Per-thread state.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicI32, AtomicU8, Ordering},
        Mutex,
    },
};

use bitflags::bitflags;

use crate::{
    event::{Event, EventQueue},
    exception::Exception,
    hook::ObserverRegistry,
    thread::{Frame, FrameId, Location, ThreadId},
};

bitflags! {
    /// Gates and internal state bits of a [`ThreadRecord`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RecordFlags: u8 {
        /// Observers run at checkpoints.
        const TRACE = 0x01;
        /// Checkpoints drain queued events.
        const EVENTS = 0x02;
        /// A checkpoint is being processed; nested checkpoints are ignored.
        const IN_HOOK = 0x04;
        /// The thread is leaving; checkpoints are ignored.
        const LEAVING = 0x08;
        /// The thread is terminating because of an event.
        const EVENT_EXIT = 0x10;
        /// An event failure was already reported.
        const EVENT_FAILED = 0x20;
        /// A termination request waits for the next checkpoint.
        const PENDING_EXIT = 0x40;
    }
}

/// Everything the layer knows about one thread.
///
/// Records are created lazily by the [`Runtime`](crate::Runtime), shared as
/// `Arc<ThreadRecord>`, and removed when the thread leaves. Foreign threads only append to
/// the event queue; frames, masks and observers belong to the owner.
pub struct ThreadRecord {
    id: ThreadId,
    name: Option<String>,
    alive: AtomicBool,
    flags: AtomicU8,
    exit_code: AtomicI32,
    pub(crate) queue: EventQueue,
    pub(crate) observers: Mutex<ObserverRegistry>,
    masked: Mutex<HashMap<FrameId, u32>>,
    exception: Mutex<Option<Exception>>,
    stack: Mutex<Vec<Frame>>,
}

impl ThreadRecord {
    pub(crate) fn new(id: ThreadId, name: Option<String>, flags: RecordFlags) -> Self {
        ThreadRecord {
            id,
            name,
            alive: AtomicBool::new(true),
            flags: AtomicU8::new(flags.bits()),
            exit_code: AtomicI32::new(0),
            queue: EventQueue::new(),
            observers: Mutex::new(ObserverRegistry::new()),
            masked: Mutex::new(HashMap::new()),
            exception: Mutex::new(None),
            stack: Mutex::new(Vec::new()),
        }
    }

    /// Returns the thread id.
    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Returns the thread name, if one is known.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns `true` until the record is finalized.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Returns the current flag set.
    #[must_use]
    pub fn flags(&self) -> RecordFlags {
        RecordFlags::from_bits_truncate(self.flags.load(Ordering::Acquire))
    }

    pub(crate) fn insert_flags(&self, flags: RecordFlags) {
        self.flags.fetch_or(flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn remove_flags(&self, flags: RecordFlags) {
        self.flags.fetch_and(!flags.bits(), Ordering::AcqRel);
    }

    pub(crate) fn set_flags(&self, flags: RecordFlags, value: bool) {
        if value {
            self.insert_flags(flags);
        } else {
            self.remove_flags(flags);
        }
    }

    /// Number of events waiting to be drained.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.queue.len()
    }

    /// Asks the owner to terminate with `code` at its next checkpoint.
    pub(crate) fn request_exit(&self, code: i32) {
        self.exit_code.store(code, Ordering::Release);
        self.insert_flags(RecordFlags::PENDING_EXIT);
    }

    /// Consumes a pending termination request.
    pub(crate) fn take_exit(&self) -> Option<i32> {
        let previous = self
            .flags
            .fetch_and(!RecordFlags::PENDING_EXIT.bits(), Ordering::AcqRel);
        RecordFlags::from_bits_truncate(previous)
            .contains(RecordFlags::PENDING_EXIT)
            .then(|| self.exit_code.load(Ordering::Acquire))
    }

    /// Returns a snapshot of the frame chain, outermost first.
    #[must_use]
    pub fn frames(&self) -> Vec<Frame> {
        lock!(self.stack).clone()
    }

    /// Returns the innermost frame and its depth.
    pub(crate) fn top(&self) -> Option<(Frame, usize)> {
        let stack = lock!(self.stack);
        stack.last().map(|frame| (frame.clone(), stack.len()))
    }

    pub(crate) fn depth(&self) -> usize {
        lock!(self.stack).len()
    }

    /// Pushes a frame and returns its depth.
    pub(crate) fn push_frame(&self, frame: Frame) -> usize {
        let mut stack = lock!(self.stack);
        stack.push(frame);
        stack.len()
    }

    /// Pops every frame at `depth` and deeper.
    pub(crate) fn truncate(&self, depth: usize) {
        lock!(self.stack).truncate(depth.saturating_sub(1));
    }

    pub(crate) fn set_location(&self, location: Location) {
        if let Some(frame) = lock!(self.stack).last_mut() {
            frame.set_location(location);
        }
    }

    /// Returns `true` if `frame` is hidden from traceback recording.
    #[must_use]
    pub fn is_masked(&self, frame: FrameId) -> bool {
        lock!(self.masked).contains_key(&frame)
    }

    pub(crate) fn mask(&self, frame: FrameId) {
        *lock!(self.masked).entry(frame).or_insert(0) += 1;
    }

    pub(crate) fn unmask(&self, frame: FrameId) {
        let mut masked = lock!(self.masked);
        if let Some(count) = masked.get_mut(&frame) {
            *count -= 1;
            if *count == 0 {
                masked.remove(&frame);
            }
        }
    }

    /// Returns the exception currently propagating in the thread.
    #[must_use]
    pub fn exception(&self) -> Option<Exception> {
        lock!(self.exception).clone()
    }

    pub(crate) fn is_active(&self, exception: &Exception) -> bool {
        lock!(self.exception)
            .as_ref()
            .is_some_and(|active| active.same(exception))
    }

    pub(crate) fn set_exception(&self, exception: Exception) {
        // The previous exception may release its arena slot when dropped, which
        // touches other records; drop it outside the lock.
        let previous = lock!(self.exception).replace(exception);
        drop(previous);
    }

    pub(crate) fn clear_exception(&self) {
        let previous = lock!(self.exception).take();
        drop(previous);
    }

    /// Marks the record dead, closes its queue and returns the events left in it.
    pub(crate) fn retire(&self) -> Vec<Event> {
        self.alive.store(false, Ordering::Release);
        self.insert_flags(RecordFlags::LEAVING);
        self.remove_flags(RecordFlags::TRACE | RecordFlags::EVENTS);
        let remaining = self.queue.close();
        self.clear_exception();
        remaining
    }
}

impl fmt::Debug for ThreadRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("alive", &self.is_alive())
            .field("flags", &self.flags())
            .field("pending_events", &self.pending_events())
            .field("depth", &self.depth())
            .finish()
    }
}

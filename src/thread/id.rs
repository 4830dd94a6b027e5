//! Opaque thread identifiers.
//!
//! Every OS thread that touches the layer is assigned a process-unique [`ThreadId`] the
//! first time it asks for one. Managed threads started through
//! [`Runtime::spawn`](crate::Runtime::spawn) adopt an id allocated by the spawner instead,
//! so the spawner can schedule events on the thread before it has executed a single
//! instruction.

use std::{
    cell::{Cell, RefCell},
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Weak,
    },
};

use crate::runtime::RuntimeInner;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a thread known to the layer.
///
/// Identifiers are never reused within a process. They are unrelated to
/// [`std::thread::ThreadId`], which cannot be constructed or compared across runtimes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

impl ThreadId {
    /// Allocates a fresh identifier.
    pub(crate) fn allocate() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Wraps a raw identifier value.
    ///
    /// Mostly useful for tests and diagnostics; an id built this way only refers to a
    /// thread if some live thread was assigned the same value.
    #[must_use]
    pub const fn from_raw(value: u64) -> Self {
        ThreadId(value)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Returns the identifier of the calling thread, assigning one on first use.
    #[must_use]
    pub fn current() -> Self {
        LOCAL
            .try_with(LocalThread::id)
            // The thread-local is being torn down; hand out a fresh id that no record uses.
            .unwrap_or_else(|_| ThreadId::allocate())
    }

    /// Makes the calling thread adopt a pre-allocated identifier.
    ///
    /// Only valid as the first layer operation of a freshly spawned thread.
    pub(crate) fn adopt(id: ThreadId) {
        let _ = LOCAL.try_with(|local| local.id.set(Some(id)));
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// Per-OS-thread bookkeeping.
///
/// Holds the thread's identifier and the runtimes it is attached to. When the OS thread
/// exits, the destructor reaps the thread's record from every runtime still alive, which
/// is how a thread "disappears from the live-thread set" without returning through its
/// root frame.
struct LocalThread {
    id: Cell<Option<ThreadId>>,
    attached: RefCell<Vec<Weak<RuntimeInner>>>,
}

impl LocalThread {
    const fn new() -> Self {
        LocalThread {
            id: Cell::new(None),
            attached: RefCell::new(Vec::new()),
        }
    }

    fn id(&self) -> ThreadId {
        match self.id.get() {
            Some(id) => id,
            None => {
                let id = ThreadId::allocate();
                self.id.set(Some(id));
                id
            }
        }
    }
}

impl Drop for LocalThread {
    fn drop(&mut self) {
        let Some(id) = self.id.get() else {
            return;
        };
        for runtime in self.attached.get_mut().drain(..) {
            if let Some(runtime) = runtime.upgrade() {
                runtime.registry().reap(id);
            }
        }
    }
}

thread_local! {
    static LOCAL: LocalThread = const { LocalThread::new() };
}

/// Registers `runtime` to be notified when the calling OS thread exits.
///
/// Registering the same runtime twice is a no-op.
pub(crate) fn watch_exit(runtime: &Weak<RuntimeInner>) {
    let _ = LOCAL.try_with(|local| {
        let mut attached = local.attached.borrow_mut();
        attached.retain(|known| known.strong_count() > 0);
        if !attached.iter().any(|known| Weak::ptr_eq(known, runtime)) {
            attached.push(runtime.clone());
        }
    });
}

use thiserror::Error;

use crate::thread::ThreadId;

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// These are failures of the *control* surface: scheduling onto threads that do not exist,
/// reading results that are not there yet, or spawning threads the OS refuses to create.
/// Control flow *inside* a managed thread (raised exceptions, exit requests) travels as an
/// [`Interrupt`](crate::Interrupt) instead and never shows up here.
///
/// # Error Categories
///
/// ## Registry Errors
/// - [`Error::ThreadNotFound`] - The target thread has no live record
/// - [`Error::ShuttingDown`] - The runtime refuses new work during teardown
///
/// ## Result Errors
/// - [`Error::NotReady`] - A scheduled result was read before the callee returned
/// - [`Error::Abandoned`] - A scheduled result will never be produced
///
/// ## Thread Errors
/// - [`Error::Spawn`] - The OS failed to start a managed thread
/// - [`Error::ThreadPanicked`] - A managed thread died outside the layer's panic guard
///
/// # Examples
///
/// ```rust
/// use interlude::{Error, Runtime, ThreadId};
///
/// let runtime = Runtime::new();
/// let unknown = ThreadId::from_raw(u64::MAX);
///
/// match runtime.exit(unknown, 0) {
///     Err(Error::ThreadNotFound(id)) => println!("{id} is not running"),
///     other => panic!("unexpected: {other:?}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// No live record exists for the requested thread.
    ///
    /// Operations against unknown ids fail with this error rather than creating a record
    /// for a thread the runtime has never seen run.
    #[error("No live thread with id {0}")]
    ThreadNotFound(ThreadId),

    /// A scheduled result was read before the callee returned.
    #[error("Callee has not returned yet")]
    NotReady,

    /// A scheduled result will never be satisfied.
    ///
    /// Raised by [`ScheduledResult::wait`](crate::ScheduledResult::wait) when the event was
    /// discarded (the target thread terminated first) or its callee failed.
    #[error("Scheduled call was abandoned: {0}")]
    Abandoned(String),

    /// The runtime is shutting down and no longer accepts events.
    #[error("Runtime is shutting down")]
    ShuttingDown,

    /// The OS refused to spawn a managed thread.
    #[error("{0}")]
    Spawn(#[from] std::io::Error),

    /// A managed thread panicked outside the layer's panic guard.
    #[error("Thread panicked - {0}")]
    ThreadPanicked(String),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}

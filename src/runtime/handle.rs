//! Handles to threads started with [`Runtime::spawn`].

use std::thread::JoinHandle;

use crate::{
    event::ScheduledResult,
    exception::{Exception, Interrupt, PanicError},
    runtime::Runtime,
    thread::{ThreadContext, ThreadId},
    Error, Result,
};

/// How a managed thread ended.
#[derive(Debug)]
pub enum ThreadOutcome<R> {
    /// The root body returned a value.
    Completed(R),
    /// The thread terminated with an exit code.
    Exited(i32),
    /// An exception escaped the root body. It has already been reported.
    Raised(Exception),
}

impl<R> ThreadOutcome<R> {
    pub(crate) fn from_result(result: std::result::Result<R, Interrupt>) -> Self {
        match result {
            Ok(value) => ThreadOutcome::Completed(value),
            Err(Interrupt::Exit(code)) => ThreadOutcome::Exited(code),
            Err(Interrupt::Raised(exception)) => ThreadOutcome::Raised(exception),
        }
    }

    /// Returns the value of a completed thread.
    pub fn completed(self) -> Option<R> {
        match self {
            ThreadOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }

    /// Returns the exit code the thread ended with; `0` for a completed thread.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ThreadOutcome::Completed(_) => Some(0),
            ThreadOutcome::Exited(code) => Some(*code),
            ThreadOutcome::Raised(_) => None,
        }
    }
}

/// Owned handle to a managed thread.
///
/// Dropping the handle detaches the thread; it keeps running.
#[derive(Debug)]
pub struct ThreadHandle<R> {
    id: ThreadId,
    runtime: Runtime,
    join: JoinHandle<ThreadOutcome<R>>,
}

impl<R> ThreadHandle<R> {
    pub(crate) fn new(id: ThreadId, runtime: Runtime, join: JoinHandle<ThreadOutcome<R>>) -> Self {
        ThreadHandle { id, runtime, join }
    }

    /// Returns the id of the thread.
    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Schedules `f(args)` to run inside the thread. See [`Runtime::invoke`].
    ///
    /// # Errors
    ///
    /// See [`Runtime::invoke`].
    pub fn invoke<F, A, T>(&self, f: F, args: A) -> Result<ScheduledResult<T>>
    where
        F: FnOnce(&ThreadContext, A) -> std::result::Result<T, Interrupt> + Send + 'static,
        A: Send + 'static,
        T: Send + Sync + 'static,
    {
        self.runtime.invoke(self.id, f, args)
    }

    /// Schedules an exception to be raised inside the thread. See [`Runtime::throw`].
    ///
    /// # Errors
    ///
    /// See [`Runtime::throw`].
    pub fn throw(&self, exception: impl Into<Exception>) -> Result<()> {
        self.runtime.throw(self.id, exception)
    }

    /// Asks the thread to terminate with `code`. See [`Runtime::exit`].
    ///
    /// # Errors
    ///
    /// See [`Runtime::exit`].
    pub fn exit(&self, code: i32) -> Result<()> {
        self.runtime.exit(self.id, code)
    }

    /// Schedules a barrier event. See [`Runtime::ping`].
    ///
    /// # Errors
    ///
    /// See [`Runtime::ping`].
    pub fn ping(&self) -> Result<ScheduledResult<()>> {
        self.runtime.ping(self.id)
    }

    /// Returns `true` once the OS thread has finished.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Waits for the thread to end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadPanicked`] if the thread panicked with panic catching
    /// disabled.
    pub fn join(self) -> Result<ThreadOutcome<R>> {
        self.join
            .join()
            .map_err(|payload| Error::ThreadPanicked(PanicError::from_payload(payload.as_ref()).0))
    }
}

//! Write-once result cells handed back to the scheduler of an event.
//!
//! A [`ScheduledResult`] starts out pending. The target thread satisfies it when the
//! scheduled callee returns, or abandons it when the event is discarded or the callee
//! fails. Either transition wakes every waiter; a result never goes back to pending.

use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Condvar, Mutex, OnceLock,
    },
    time::Duration,
};

use crate::{Error, Result};

struct Shared<T> {
    /// The callee's return value, once produced
    value: OnceLock<T>,
    /// Whether the result will never be produced
    abandoned: AtomicBool,
    /// Why the result was abandoned; also the mutex the condvar waits on
    reason: Mutex<Option<String>>,
    /// Wakes waiters on satisfaction or abandonment
    condvar: Condvar,
}

/// The pending result of a call scheduled onto another thread.
///
/// Handles are cheap to clone and all clones observe the same cell. Reading the value
/// before the callee returned fails with [`Error::NotReady`] instead of yielding a stale
/// or default value.
///
/// Waiting on a result from the thread that is supposed to produce it deadlocks. This is
/// a caller error and is not detected.
///
/// # Examples
///
/// ```rust,no_run
/// use interlude::{Interrupt, Runtime, ThreadContext};
///
/// fn add(_cx: &ThreadContext, (a, b): (i32, i32)) -> Result<i32, Interrupt> {
///     Ok(a + b)
/// }
///
/// let runtime = Runtime::new();
/// let worker = runtime.spawn("worker", |cx| -> Result<(), Interrupt> {
///     loop {
///         cx.idle(None)?;
///     }
/// })?;
///
/// let sum = worker.invoke(add, (1, 2))?;
/// assert_eq!(*sum.wait()?, 3);
/// worker.exit(0)?;
/// # Ok::<(), interlude::Error>(())
/// ```
pub struct ScheduledResult<T> {
    shared: Arc<Shared<T>>,
}

impl<T> ScheduledResult<T> {
    pub(crate) fn new() -> Self {
        ScheduledResult {
            shared: Arc::new(Shared {
                value: OnceLock::new(),
                abandoned: AtomicBool::new(false),
                reason: Mutex::new(None),
                condvar: Condvar::new(),
            }),
        }
    }

    /// Stores the callee's value and wakes all waiters.
    ///
    /// Returns `false` if the cell was already satisfied or abandoned.
    pub(crate) fn satisfy(&self, value: T) -> bool {
        if self.shared.abandoned.load(Ordering::Acquire) {
            return false;
        }
        if self.shared.value.set(value).is_err() {
            return false;
        }
        let _guard = lock!(self.shared.reason);
        self.shared.condvar.notify_all();
        true
    }

    /// Marks the result as never going to be produced and wakes all waiters.
    pub(crate) fn abandon(&self, reason: impl Into<String>) {
        if self.shared.value.get().is_some() {
            return;
        }
        let mut guard = lock!(self.shared.reason);
        if guard.is_none() {
            *guard = Some(reason.into());
        }
        self.shared.abandoned.store(true, Ordering::Release);
        self.shared.condvar.notify_all();
    }

    /// Returns the value without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] while the callee has not returned, and
    /// [`Error::Abandoned`] if it never will.
    pub fn value(&self) -> Result<&T> {
        if let Some(value) = self.shared.value.get() {
            return Ok(value);
        }
        if self.shared.abandoned.load(Ordering::Acquire) {
            return Err(self.abandoned_error());
        }
        Err(Error::NotReady)
    }

    /// Blocks until the callee has returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Abandoned`] if the event was discarded or its callee failed.
    pub fn wait(&self) -> Result<&T> {
        let guard = lock!(self.shared.reason);
        let guard = self
            .shared
            .condvar
            .wait_while(guard, |_| self.is_pending())
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        drop(guard);

        self.value()
    }

    /// Blocks until the callee has returned or `timeout` elapsed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotReady`] on timeout and [`Error::Abandoned`] if the result will
    /// never be produced.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<&T> {
        let guard = lock!(self.shared.reason);
        let (guard, _) = self
            .shared
            .condvar
            .wait_timeout_while(guard, timeout, |_| self.is_pending())
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        drop(guard);

        self.value()
    }

    /// Returns `true` once the callee's value is available.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.shared.value.get().is_some()
    }

    /// Returns `true` if the result will never be produced.
    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.shared.abandoned.load(Ordering::Acquire)
    }

    fn is_pending(&self) -> bool {
        self.shared.value.get().is_none() && !self.shared.abandoned.load(Ordering::Acquire)
    }

    fn abandoned_error(&self) -> Error {
        let reason = lock!(self.shared.reason)
            .clone()
            .unwrap_or_else(|| "event was discarded".to_string());
        Error::Abandoned(reason)
    }
}

impl<T> Clone for ScheduledResult<T> {
    fn clone(&self) -> Self {
        ScheduledResult {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for ScheduledResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("ScheduledResult");
        match self.shared.value.get() {
            Some(value) => debug.field("value", value),
            None if self.is_abandoned() => debug.field("abandoned", &true),
            None => debug.field("pending", &true),
        };
        debug.finish()
    }
}

/// Type-erased view of a result cell, used to abandon the result of a discarded event
/// without knowing its value type.
pub(crate) trait Abandon: Send {
    fn abandon(&self, reason: String);
}

impl<T: Send + Sync> Abandon for ScheduledResult<T> {
    fn abandon(&self, reason: String) {
        ScheduledResult::abandon(self, reason);
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn value_before_satisfaction_is_not_ready() {
        let result = ScheduledResult::<i32>::new();
        assert!(matches!(result.value(), Err(Error::NotReady)));
        assert!(!result.is_ready());

        assert!(result.satisfy(7));
        assert_eq!(*result.value().unwrap(), 7);
        assert!(!result.satisfy(8));
        assert_eq!(*result.value().unwrap(), 7);
    }

    #[test]
    fn wait_wakes_on_satisfy() {
        let result = ScheduledResult::<String>::new();
        let producer = result.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            producer.satisfy("done".to_string());
        });

        assert_eq!(result.wait().unwrap(), "done");
        handle.join().unwrap();
    }

    #[test]
    fn abandon_releases_waiters() {
        let result = ScheduledResult::<()>::new();
        let discarder = result.clone();
        let handle = thread::spawn(move || discarder.abandon("thread exited"));

        match result.wait() {
            Err(Error::Abandoned(reason)) => assert_eq!(reason, "thread exited"),
            other => panic!("unexpected: {other:?}"),
        }
        handle.join().unwrap();
        assert!(!result.satisfy(()));
    }

    #[test]
    fn abandon_after_satisfy_is_ignored() {
        let result = ScheduledResult::new();
        result.satisfy(1u8);
        result.abandon("late");
        assert!(!result.is_abandoned());
        assert_eq!(*result.wait().unwrap(), 1);
    }

    #[test]
    fn wait_timeout_reports_not_ready() {
        let result = ScheduledResult::<u8>::new();
        assert!(matches!(
            result.wait_timeout(Duration::from_millis(5)),
            Err(Error::NotReady)
        ));
    }
}

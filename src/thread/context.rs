//! Owner-side handle of a managed thread.

use std::{borrow::Cow, fmt, marker::PhantomData, sync::Arc, time::Duration};

use crate::{
    exception::{Exception, FrameMask, Interrupt, TraceEntry, TracebackChain},
    hook::{
        dispatch, Checkpoint, CheckpointKind, ObserverId, ObserverKind, ObserverResult, Payload,
    },
    runtime::Runtime,
    thread::{Frame, FrameId, Location, RecordFlags, ThreadId, ThreadRecord},
};

/// Pops a frame when the call it belongs to ends, including by panic.
struct FrameScope<'a> {
    record: &'a ThreadRecord,
    depth: usize,
}

impl Drop for FrameScope<'_> {
    fn drop(&mut self) {
        self.record.truncate(self.depth);
    }
}

/// Handle through which managed code talks to the layer.
///
/// A context is bound to one OS thread and cannot leave it. Every method that fires a
/// checkpoint returns `Result<_, Interrupt>`; the interrupt must be propagated with `?` so
/// scheduled exceptions and termination requests unwind the thread.
///
/// Contexts are obtained from [`Runtime::attach`], [`Runtime::enter`] or as the argument
/// of a body passed to [`Runtime::spawn`].
pub struct ThreadContext {
    runtime: Runtime,
    record: Arc<ThreadRecord>,
    /// Base frame pushed by [`Runtime::attach`], popped by [`ThreadContext::detach`]
    base: Option<FrameId>,
    _not_send: PhantomData<*const ()>,
}

impl ThreadContext {
    pub(crate) fn new(runtime: Runtime, record: Arc<ThreadRecord>) -> Self {
        ThreadContext {
            runtime,
            record,
            base: None,
            _not_send: PhantomData,
        }
    }

    pub(crate) fn with_base(mut self, base: FrameId) -> Self {
        self.base = Some(base);
        self
    }

    /// Returns the id of the thread.
    #[must_use]
    pub fn id(&self) -> ThreadId {
        self.record.id()
    }

    /// Returns the runtime the thread belongs to.
    #[must_use]
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Returns the record of the thread.
    #[must_use]
    pub fn record(&self) -> &Arc<ThreadRecord> {
        &self.record
    }

    /// Runs `body` in a new frame named `name`.
    ///
    /// Fires a `call` checkpoint on entry and a `return` checkpoint on exit. If `body`
    /// fails with an exception that is not yet active in this thread, the exception
    /// becomes active in the new frame; once the frame is popped, an `exception`
    /// checkpoint fires in the caller's frame.
    ///
    /// # Errors
    ///
    /// Returns whatever interrupt `body` or one of the checkpoints produced.
    #[track_caller]
    pub fn call<R>(
        &self,
        name: impl Into<Cow<'static, str>>,
        body: impl FnOnce(&ThreadContext) -> Result<R, Interrupt>,
    ) -> Result<R, Interrupt> {
        let location = Location::caller();
        self.record.set_location(location);
        self.record.clear_exception();

        let depth = self.record.push_frame(Frame::new(name.into(), location));
        let scope = FrameScope {
            record: &self.record,
            depth,
        };

        let outcome = match self.fire(CheckpointKind::Call, Payload::None) {
            Ok(()) => body(self),
            Err(interrupt) => Err(interrupt),
        };
        let outcome = self.ensure_active(outcome);

        let returned = match &outcome {
            Ok(_) => self.fire(CheckpointKind::Return, Payload::None),
            Err(interrupt) => self.fire(CheckpointKind::Return, Payload::Unwinding(interrupt)),
        };
        let outcome = match returned {
            Ok(()) => outcome,
            Err(interrupt) => self.ensure_active(Err(interrupt)),
        };
        drop(scope);

        if depth > 1 {
            self.announce(outcome)
        } else {
            outcome
        }
    }

    /// Makes a raised exception active in the innermost frame unless it already is.
    fn ensure_active<R>(&self, outcome: Result<R, Interrupt>) -> Result<R, Interrupt> {
        match outcome {
            Err(Interrupt::Raised(exception)) if !self.record.is_active(&exception) => {
                match self.activate(&exception) {
                    Ok(()) => Err(Interrupt::Raised(exception)),
                    Err(interrupt) => Err(interrupt),
                }
            }
            other => other,
        }
    }

    /// Fires an `exception` checkpoint in the innermost frame for an exception that
    /// unwound into it.
    fn announce<R>(&self, outcome: Result<R, Interrupt>) -> Result<R, Interrupt> {
        let exception = match outcome {
            Err(Interrupt::Raised(exception)) => exception,
            other => return other,
        };
        let announced = if self.record.is_active(&exception) {
            self.fire(CheckpointKind::Exception, Payload::Exception(&exception))
        } else {
            self.activate(&exception)
        };
        match announced {
            Ok(()) => Err(Interrupt::Raised(exception)),
            Err(interrupt) => Err(interrupt),
        }
    }

    /// Marks a step in the innermost frame.
    ///
    /// Steps are where queued events run. A thread that never steps, calls or returns
    /// never sees its events.
    ///
    /// # Errors
    ///
    /// Returns the interrupt produced by a drained event or an observer.
    #[track_caller]
    pub fn step(&self) -> Result<(), Interrupt> {
        self.record.set_location(Location::caller());
        self.record.clear_exception();
        self.fire(CheckpointKind::Step, Payload::None)
    }

    /// Parks until an event is queued or `timeout` elapsed, then steps.
    ///
    /// With events disabled on this thread, parks for the whole `timeout`.
    ///
    /// `None` waits for the runtime's configured idle slice.
    ///
    /// # Errors
    ///
    /// Returns the interrupt produced by the step.
    #[track_caller]
    pub fn idle(&self, timeout: Option<Duration>) -> Result<(), Interrupt> {
        let timeout = timeout.unwrap_or(self.runtime.config().idle_slice);
        if self.record.flags().contains(RecordFlags::EVENTS) {
            self.record.queue.wait(timeout);
        } else {
            // Queued events cannot run, so they must not cut the park short.
            std::thread::sleep(timeout);
        }
        self.step()
    }

    /// Raises `error` in the innermost frame and returns the interrupt to propagate.
    ///
    /// The exception becomes active at the call site, so its traceback starts here and
    /// frame masks dropped while it unwinds are retained.
    ///
    /// ```rust,no_run
    /// use interlude::{Exception, Interrupt, ThreadContext};
    ///
    /// fn check(cx: &ThreadContext, value: i32) -> Result<i32, Interrupt> {
    ///     if value < 0 {
    ///         return Err(cx.raise(Exception::msg("negative")));
    ///     }
    ///     Ok(value)
    /// }
    /// ```
    #[track_caller]
    pub fn raise(&self, error: impl Into<Exception>) -> Interrupt {
        let exception = error.into();
        self.record.set_location(Location::caller());
        match self.activate(&exception) {
            Ok(()) => Interrupt::Raised(exception),
            Err(interrupt) => interrupt,
        }
    }

    /// Binds `exception` to a traceback chain, makes it the thread's active exception and
    /// fires an `exception` checkpoint.
    ///
    /// An exception thrown by an event drained at that checkpoint replaces `exception` and
    /// is activated in turn.
    fn activate(&self, exception: &Exception) -> Result<(), Interrupt> {
        self.bind(exception);
        match self.fire(CheckpointKind::Exception, Payload::Exception(exception)) {
            Err(Interrupt::Raised(replacement)) if !self.record.is_active(&replacement) => {
                match self.activate(&replacement) {
                    Ok(()) => Err(Interrupt::Raised(replacement)),
                    Err(interrupt) => Err(interrupt),
                }
            }
            other => other,
        }
    }

    /// Binds `exception` to a chain holding the current raw frames, if it has none yet, and
    /// makes it the thread's active exception.
    pub(crate) fn bind(&self, exception: &Exception) {
        if exception.token().is_none() {
            let raw: Vec<TraceEntry> = self
                .record
                .frames()
                .iter()
                .rev()
                .map(TraceEntry::from)
                .collect();
            let arena = self.runtime.arena();
            let token = arena.insert(TracebackChain {
                thread: Some(self.id()),
                raw,
                ..TracebackChain::default()
            });
            if !exception.bind(token, self.runtime.downgrade()) {
                arena.remove(token);
            }
        }
        self.record.set_exception(exception.clone());
    }

    pub(crate) fn fire(&self, kind: CheckpointKind, payload: Payload<'_>) -> Result<(), Interrupt> {
        dispatch::fire(self, kind, payload)
    }

    /// Returns the frame chain, outermost first.
    #[must_use]
    pub fn frames(&self) -> Vec<Frame> {
        self.record.frames()
    }

    /// Returns the innermost frame.
    #[must_use]
    pub fn current_frame(&self) -> Option<Frame> {
        self.record.top().map(|(frame, _)| frame)
    }

    /// Returns the exception currently propagating in this thread.
    #[must_use]
    pub fn exception(&self) -> Option<Exception> {
        self.record.exception()
    }

    /// Registers an observer for checkpoints of `kind`.
    pub fn observe<F>(&self, kind: ObserverKind, observer: F) -> ObserverId
    where
        F: Fn(&Checkpoint<'_>) -> ObserverResult + Send + Sync + 'static,
    {
        lock!(self.record.observers).register(kind, Arc::new(observer))
    }

    /// Unregisters an observer. Returns `false` if it was not registered.
    pub fn unobserve(&self, id: ObserverId) -> bool {
        lock!(self.record.observers).unregister(id)
    }

    /// Enables or disables observers on this thread.
    pub fn set_tracing(&self, enabled: bool) {
        self.record.set_flags(RecordFlags::TRACE, enabled);
    }

    /// Enables or disables event draining on this thread.
    pub fn set_events(&self, enabled: bool) {
        self.record.set_flags(RecordFlags::EVENTS, enabled);
    }

    /// Hides `frame` from traceback recording while the guard is held.
    pub fn mask_frame(&self, frame: FrameId) -> FrameMask {
        FrameMask::new(Arc::clone(&self.record), self.runtime.downgrade(), frame)
    }

    /// Hides the innermost frame from traceback recording while the guard is held.
    pub fn mask_current(&self) -> Option<FrameMask> {
        self.current_frame()
            .map(|frame| self.mask_frame(frame.id()))
    }

    /// Returns `true` if `frame` is hidden from traceback recording.
    #[must_use]
    pub fn is_masked(&self, frame: FrameId) -> bool {
        self.record.is_masked(frame)
    }

    /// Runs `body` in a new frame that is hidden from traceback recording.
    ///
    /// # Errors
    ///
    /// Returns whatever interrupt `body` or one of the checkpoints produced.
    #[track_caller]
    pub fn hidden<R>(
        &self,
        name: impl Into<Cow<'static, str>>,
        body: impl FnOnce(&ThreadContext) -> Result<R, Interrupt>,
    ) -> Result<R, Interrupt> {
        self.call(name, |cx| {
            let mask = cx.mask_current();
            // Activate before the mask drops so it is retained for the exception.
            let outcome = cx.ensure_active(body(cx));
            drop(mask);
            outcome
        })
    }

    /// Leaves the thread: fires the `return` checkpoint of the base frame pushed by
    /// [`Runtime::attach`], which reports, drains the remaining events and finalizes
    /// the record.
    ///
    /// Does nothing beyond dropping the context if it did not push a base frame.
    ///
    /// # Errors
    ///
    /// Returns the interrupt produced by the final checkpoint.
    pub fn detach(self) -> Result<(), Interrupt> {
        let Some(base) = self.base else {
            return Ok(());
        };
        let Some((frame, depth)) = self.record.top() else {
            return Ok(());
        };
        if frame.id() != base || depth != 1 {
            tracing::warn!(
                thread = %self.id(),
                depth,
                "detach called with frames still active"
            );
            self.record.truncate(2);
        }

        let outcome = self.fire(CheckpointKind::Return, Payload::None);
        self.record.truncate(1);
        if self.record.is_alive() {
            self.runtime.finalize(self.id());
        }
        outcome
    }
}

impl fmt::Debug for ThreadContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadContext")
            .field("record", &self.record)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{hook::TraceFlow, Runtime, RuntimeConfig};

    #[test]
    fn call_pushes_and_pops_frames() {
        let runtime = Runtime::new();
        let cx = runtime.attach();
        assert_eq!(cx.frames().len(), 1);

        let depth = cx
            .call("outer", |cx| {
                cx.call("inner", |cx| {
                    let names: Vec<_> = cx
                        .frames()
                        .iter()
                        .map(|frame| frame.function().to_string())
                        .collect();
                    assert_eq!(names, vec!["<thread>", "outer", "inner"]);
                    Ok(cx.frames().len())
                })
            })
            .unwrap();
        assert_eq!(depth, 3);
        assert_eq!(cx.frames().len(), 1);
        cx.detach().unwrap();
    }

    #[test]
    fn checkpoint_sequence() {
        let runtime = Runtime::new();
        let cx = runtime.attach();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cx.observe(ObserverKind::Any, move |checkpoint| {
            sink.lock().unwrap().push(format!(
                "{}:{}",
                checkpoint.kind(),
                checkpoint.frame().function()
            ));
            Ok(TraceFlow::Continue)
        });

        cx.call("work", |cx| cx.step()).unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            vec!["call:work", "step:work", "return:work"]
        );
        cx.detach().unwrap();
    }

    #[test]
    fn exception_fires_in_each_frame() {
        let runtime = Runtime::new();
        let cx = runtime.attach();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cx.observe(ObserverKind::Exception, move |checkpoint| {
            sink.lock()
                .unwrap()
                .push(checkpoint.frame().function().to_string());
            Ok(TraceFlow::Continue)
        });

        let outcome: Result<(), Interrupt> = cx.call("outer", |cx| {
            cx.call("inner", |cx| Err(cx.raise(Exception::msg("bad"))))
        });
        let exception = outcome.unwrap_err().exception().unwrap().clone();
        assert_eq!(*seen.lock().unwrap(), vec!["inner", "outer", "<thread>"]);
        assert!(cx.exception().unwrap().same(&exception));

        cx.step().unwrap();
        assert!(cx.exception().is_none());
        cx.detach().unwrap();
    }

    #[test]
    fn question_mark_errors_activate_in_their_frame() {
        let runtime = Runtime::new();
        let cx = runtime.attach();

        let outcome: Result<i32, Interrupt> = cx.call("parse", |_| Ok("x".parse::<i32>()?));
        let exception = outcome.unwrap_err().exception().unwrap().clone();
        let names: Vec<_> = runtime
            .traceback(&exception)
            .iter()
            .map(|entry| entry.function.to_string())
            .collect();
        assert_eq!(names, vec!["parse", "<thread>"]);
        cx.detach().unwrap();
    }

    #[test]
    fn disabled_tracing_skips_observers() {
        let runtime = Runtime::with_config(RuntimeConfig::default().with_tracing(false));
        let cx = runtime.attach();
        let fired = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&fired);
        cx.observe(ObserverKind::Step, move |_| {
            *counter.lock().unwrap() += 1;
            Ok(TraceFlow::Continue)
        });

        cx.step().unwrap();
        assert_eq!(*fired.lock().unwrap(), 0);
        cx.set_tracing(true);
        cx.step().unwrap();
        assert_eq!(*fired.lock().unwrap(), 1);
        cx.detach().unwrap();
    }

    #[test]
    fn detach_finalizes_the_record() {
        let runtime = Runtime::new();
        let cx = runtime.attach();
        let id = cx.id();
        assert!(runtime.lookup(id).is_ok());
        cx.detach().unwrap();
        assert!(runtime.lookup(id).is_err());
    }

    #[test]
    fn idle_parks_the_whole_slice_with_events_disabled() {
        let runtime = Runtime::new();
        let cx = runtime.attach();
        cx.set_events(false);

        let producer = runtime.clone();
        let target = cx.id();
        let pending = std::thread::spawn(move || producer.ping(target))
            .join()
            .unwrap()
            .unwrap();

        let slice = Duration::from_millis(30);
        let started = std::time::Instant::now();
        cx.idle(Some(slice)).unwrap();
        assert!(started.elapsed() >= slice);
        assert!(!pending.is_ready());

        cx.set_events(true);
        cx.idle(Some(slice)).unwrap();
        assert!(pending.is_ready());
        cx.detach().unwrap();
    }
}

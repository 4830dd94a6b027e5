//! The runtime: thread registry, event scheduling and failure reporting.
//!
//! A [`Runtime`] owns everything shared between the threads it manages: the registry of
//! thread records, the exception arena holding traceback chains, the reporting hook and
//! the configuration. It is an explicit object rather than process-wide state, cheap to
//! clone, and passed to every thread that takes part.
//!
//! # Example
//!
//! ```rust,no_run
//! use interlude::{Interrupt, Runtime, ThreadContext, ThreadOutcome};
//!
//! fn scale(_cx: &ThreadContext, (value, factor): (i64, i64)) -> Result<i64, Interrupt> {
//!     Ok(value * factor)
//! }
//!
//! let runtime = Runtime::new();
//! let worker = runtime.spawn("worker", |cx| -> Result<(), Interrupt> {
//!     loop {
//!         cx.idle(None)?;
//!     }
//! })?;
//!
//! let scaled = runtime.invoke(worker.id(), scale, (21, 2))?;
//! assert_eq!(*scaled.wait()?, 42);
//!
//! runtime.exit(worker.id(), 0)?;
//! assert!(matches!(worker.join()?, ThreadOutcome::Exited(0)));
//! # Ok::<(), interlude::Error>(())
//! ```

mod config;
mod handle;
mod registry;

use std::{
    borrow::Cow,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock, Weak,
    },
};

pub use config::RuntimeConfig;
pub use handle::{ThreadHandle, ThreadOutcome};
pub(crate) use registry::Registry;

use crate::{
    event::{Event, ScheduledResult},
    exception::{
        catch_panics, default_excepthook, recorder, ExceptHook, Exception, ExceptionArena,
        ExceptionToken, Interrupt, PanicError, Report, TraceEntry, TracebackChain,
    },
    hook::ObserverKind,
    thread::{watch_exit, Frame, Location, RecordFlags, ThreadContext, ThreadId, ThreadRecord},
    Error, Result,
};

/// State shared by all clones of a [`Runtime`].
pub(crate) struct RuntimeInner {
    config: RuntimeConfig,
    registry: Registry,
    arena: ExceptionArena,
    excepthook: RwLock<Arc<ExceptHook>>,
    shutting_down: AtomicBool,
}

impl RuntimeInner {
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn arena(&self) -> &ExceptionArena {
        &self.arena
    }

    /// Drops the traceback chain of an exception and releases the frame masks it kept.
    pub(crate) fn release_exception(&self, token: ExceptionToken) {
        let Some(chain) = self.arena.remove(token) else {
            return;
        };
        for (thread, frame) in chain.retained_masks {
            if let Some(record) = self.registry.get(thread) {
                record.unmask(frame);
            }
        }
    }
}

/// Handle to a runtime. Clones share the same state.
#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime {
    /// Creates a runtime with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// Creates a runtime with `config`.
    #[must_use]
    pub fn with_config(config: RuntimeConfig) -> Self {
        let default_hook: Arc<ExceptHook> = Arc::new(default_excepthook);
        Runtime {
            inner: Arc::new(RuntimeInner {
                config,
                registry: Registry::new(),
                arena: ExceptionArena::new(),
                excepthook: RwLock::new(default_hook),
                shutting_down: AtomicBool::new(false),
            }),
        }
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn arena(&self) -> &ExceptionArena {
        &self.inner.arena
    }

    pub(crate) fn downgrade(&self) -> Weak<RuntimeInner> {
        Arc::downgrade(&self.inner)
    }

    /// Returns `true` once [`Runtime::shutdown`] was called.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.load(Ordering::Acquire)
    }

    fn create_record(&self, id: ThreadId, name: Option<String>) -> (Arc<ThreadRecord>, bool) {
        let config = &self.inner.config;
        let (record, created) = self.inner.registry.get_or_create(id, || {
            let record = ThreadRecord::new(id, name, config.initial_flags());
            if config.record_tracebacks {
                lock!(record.observers)
                    .register(ObserverKind::Exception, Arc::new(recorder::record));
            }
            record
        });
        if created {
            tracing::debug!(thread = %id, name = record.name(), "thread record created");
        }
        (record, created)
    }

    /// Returns the record of the calling thread, creating it on first use.
    ///
    /// Never fails. A record created here is finalized when the OS thread exits, unless it
    /// leaves earlier through its outermost frame.
    #[must_use]
    pub fn current(&self) -> Arc<ThreadRecord> {
        let id = ThreadId::current();
        let (record, created) =
            self.create_record(id, std::thread::current().name().map(str::to_string));
        if created {
            watch_exit(&self.downgrade());
        }
        record
    }

    /// Returns the live record of thread `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] if no live record exists. Never creates one.
    pub fn lookup(&self, id: ThreadId) -> Result<Arc<ThreadRecord>> {
        self.inner
            .registry
            .get(id)
            .filter(|record| record.is_alive())
            .ok_or(Error::ThreadNotFound(id))
    }

    /// Removes the record of thread `id`, abandoning any events still queued. Idempotent.
    pub fn finalize(&self, id: ThreadId) {
        self.inner.registry.finalize(id, "thread finished");
    }

    /// Ids of all live threads.
    #[must_use]
    pub fn threads(&self) -> Vec<ThreadId> {
        self.inner.registry.ids()
    }

    /// Snapshot of the frame chain of thread `id`, outermost first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] if the thread has no live record.
    pub fn stack(&self, id: ThreadId) -> Result<Vec<Frame>> {
        Ok(self.lookup(id)?.frames())
    }

    /// Attaches the calling thread and returns its context.
    ///
    /// If the thread has no frames yet, a base frame named `<thread>` is pushed;
    /// [`ThreadContext::detach`] pops it and finalizes the record.
    #[track_caller]
    pub fn attach(&self) -> ThreadContext {
        let location = Location::caller();
        let record = self.current();
        let cx = ThreadContext::new(self.clone(), Arc::clone(&record));
        if record.depth() > 0 {
            return cx;
        }
        let frame = Frame::new(Cow::Borrowed("<thread>"), location);
        let base = frame.id();
        record.push_frame(frame);
        cx.with_base(base)
    }

    /// Runs `body` as the outermost frame of the calling thread.
    ///
    /// When `body` returns, the thread leaves: an escaping exception is reported,
    /// remaining events are drained or discarded, and the record is finalized. On a thread
    /// that already has frames, this is a plain [`ThreadContext::call`].
    ///
    /// # Errors
    ///
    /// Returns the interrupt that escaped `body`.
    #[track_caller]
    pub fn enter<R>(
        &self,
        name: impl Into<Cow<'static, str>>,
        body: impl FnOnce(&ThreadContext) -> std::result::Result<R, Interrupt>,
    ) -> std::result::Result<R, Interrupt> {
        let cx = ThreadContext::new(self.clone(), self.current());
        let catch = self.inner.config.catch_panics;
        cx.call(name, |cx| catch_panics(catch, || body(cx)))
    }

    /// Starts a managed OS thread running `body` as its outermost frame.
    ///
    /// The thread's record exists before this returns, so events can be scheduled onto it
    /// right away; they run once the thread reaches its first checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] during shutdown and [`Error::Spawn`] if the OS
    /// refuses to start the thread.
    pub fn spawn<F, R>(&self, name: impl Into<String>, body: F) -> Result<ThreadHandle<R>>
    where
        F: FnOnce(&ThreadContext) -> std::result::Result<R, Interrupt> + Send + 'static,
        R: Send + 'static,
    {
        if self.is_shutting_down() {
            return Err(Error::ShuttingDown);
        }

        let name = name.into();
        let id = ThreadId::allocate();
        let (record, _) = self.create_record(id, Some(name.clone()));

        let mut builder = std::thread::Builder::new().name(name.clone());
        if let Some(size) = self.inner.config.stack_size {
            builder = builder.stack_size(size);
        }

        let runtime = self.clone();
        let spawned = builder.spawn(move || {
            ThreadId::adopt(id);
            watch_exit(&runtime.downgrade());
            let cx = ThreadContext::new(runtime.clone(), record);
            let catch = runtime.inner.config.catch_panics;
            ThreadOutcome::from_result(cx.call(name, |cx| catch_panics(catch, || body(cx))))
        });

        match spawned {
            Ok(join) => {
                tracing::debug!(thread = %id, "managed thread spawned");
                Ok(ThreadHandle::new(id, self.clone(), join))
            }
            Err(error) => {
                self.inner.registry.finalize(id, "thread failed to start");
                Err(Error::Spawn(error))
            }
        }
    }

    fn enqueue(&self, target: ThreadId, event: Event) -> Result<()> {
        let kind = event.kind();
        if self.is_shutting_down() {
            event.discard("runtime is shutting down");
            return Err(Error::ShuttingDown);
        }
        let record = match self.lookup(target) {
            Ok(record) => record,
            Err(error) => {
                event.discard("target thread is not running");
                return Err(error);
            }
        };
        if let Err(event) = record.queue.push(event) {
            event.discard("target thread is leaving");
            return Err(Error::ThreadNotFound(target));
        }
        tracing::trace!(thread = %target, event = %kind, "event enqueued");
        Ok(())
    }

    /// Schedules `f(args)` to run inside thread `target` at its next checkpoint.
    ///
    /// Never blocks. The returned result is satisfied with `f`'s value, or abandoned if
    /// the event is discarded or `f` fails. A failing `f` is reported and terminates the
    /// target with exit code 1.
    ///
    /// If `target` is the calling thread, `f` runs synchronously before this returns; if
    /// it fails, the calling thread terminates at its next checkpoint.
    ///
    /// Waiting on the result from inside `target` deadlocks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] if `target` has no live record, and
    /// [`Error::ShuttingDown`] during shutdown.
    pub fn invoke<F, A, R>(&self, target: ThreadId, f: F, args: A) -> Result<ScheduledResult<R>>
    where
        F: FnOnce(&ThreadContext, A) -> std::result::Result<R, Interrupt> + Send + 'static,
        A: Send + 'static,
        R: Send + Sync + 'static,
    {
        let name = std::any::type_name::<F>();
        let result = ScheduledResult::new();

        if target == ThreadId::current() {
            if self.is_shutting_down() {
                return Err(Error::ShuttingDown);
            }
            let record = self.lookup(target)?;
            self.invoke_local(&record, name, f, args, &result);
            return Ok(result);
        }

        let cell = result.clone();
        let event = Event::Invoke {
            name,
            call: Box::new(move |cx| {
                let value = f(cx, args)?;
                cell.satisfy(value);
                Ok(())
            }),
            result: Box::new(result.clone()),
        };
        self.enqueue(target, event)?;
        Ok(result)
    }

    fn invoke_local<F, A, R>(
        &self,
        record: &Arc<ThreadRecord>,
        name: &'static str,
        f: F,
        args: A,
        result: &ScheduledResult<R>,
    ) where
        F: FnOnce(&ThreadContext, A) -> std::result::Result<R, Interrupt>,
    {
        let cx = ThreadContext::new(self.clone(), Arc::clone(record));
        match catch_panics(self.inner.config.catch_panics, || f(&cx, args)) {
            Ok(value) => {
                result.satisfy(value);
            }
            Err(Interrupt::Exit(code)) => {
                result.abandon(format!("{name} requested exit({code})"));
                record.insert_flags(RecordFlags::EVENT_EXIT);
                record.request_exit(code);
            }
            Err(Interrupt::Raised(exception)) => {
                result.abandon(format!("{name} failed: {exception}"));
                self.event_failed(record, name, exception);
                record.request_exit(1);
            }
        }
    }

    /// Schedules `exception` to be raised inside thread `target` at its next checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] if `target` has no live record, and
    /// [`Error::ShuttingDown`] during shutdown.
    pub fn throw(&self, target: ThreadId, exception: impl Into<Exception>) -> Result<()> {
        self.enqueue(target, Event::Throw(Interrupt::Raised(exception.into())))
    }

    /// Asks thread `target` to terminate with `code` at its next checkpoint.
    ///
    /// Exit code `0` terminates silently; any other code is reported.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] if `target` has no live record, and
    /// [`Error::ShuttingDown`] during shutdown.
    pub fn exit(&self, target: ThreadId, code: i32) -> Result<()> {
        self.enqueue(target, Event::Throw(Interrupt::Exit(code)))
    }

    /// Schedules a barrier event on thread `target`.
    ///
    /// The result is satisfied once every event queued before it has run.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ThreadNotFound`] if `target` has no live record, and
    /// [`Error::ShuttingDown`] during shutdown.
    pub fn ping(&self, target: ThreadId) -> Result<ScheduledResult<()>> {
        let done = ScheduledResult::new();
        self.enqueue(target, Event::Noop { done: done.clone() })?;
        Ok(done)
    }

    /// Returns the traceback of `exception`, innermost frame first.
    ///
    /// Uses the recorded chain when frames were recorded, and the raw frame chain captured
    /// when the exception became active otherwise. Empty if the exception never became
    /// active in this runtime.
    #[must_use]
    pub fn traceback(&self, exception: &Exception) -> Vec<TraceEntry> {
        self.chain(exception)
            .map(|chain| chain.display_entries().to_vec())
            .unwrap_or_default()
    }

    /// Returns a copy of the full traceback chain of `exception`.
    #[must_use]
    pub fn chain(&self, exception: &Exception) -> Option<TracebackChain> {
        exception
            .token()
            .and_then(|token| self.inner.arena.get(token))
    }

    /// Replaces the reporting hook.
    pub fn set_excepthook<F>(&self, hook: F)
    where
        F: Fn(&Report) + Send + Sync + 'static,
    {
        let hook: Arc<ExceptHook> = Arc::new(hook);
        *write_lock!(self.inner.excepthook) = hook;
    }

    /// Restores the default reporting hook.
    pub fn reset_excepthook(&self) {
        let hook: Arc<ExceptHook> = Arc::new(default_excepthook);
        *write_lock!(self.inner.excepthook) = hook;
    }

    /// Hands `report` to the reporting hook.
    ///
    /// A panicking hook is logged and the report rendered by the default hook instead.
    pub fn report(&self, report: &Report) {
        let hook = Arc::clone(&*read_lock!(self.inner.excepthook));
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| hook(report)));
        if let Err(payload) = outcome {
            tracing::error!(
                error = %PanicError::from_payload(payload.as_ref()),
                "excepthook panicked"
            );
            default_excepthook(report);
        }
    }

    pub(crate) fn uncaught(&self, record: &ThreadRecord, exception: &Exception) {
        tracing::debug!(thread = %record.id(), error = %exception, "uncaught exception");
        self.report(&Report::Uncaught {
            thread: record.id(),
            exception: exception.clone(),
            trace: self.traceback(exception),
        });
    }

    pub(crate) fn event_failed(
        &self,
        record: &ThreadRecord,
        callee: &'static str,
        exception: Exception,
    ) {
        tracing::error!(
            thread = %record.id(),
            callee,
            error = %exception,
            "scheduled call failed"
        );
        record.insert_flags(RecordFlags::EVENT_FAILED | RecordFlags::EVENT_EXIT);
        let trace = self.traceback(&exception);
        self.report(&Report::EventFailed {
            thread: record.id(),
            callee,
            exception,
            trace,
        });
    }

    pub(crate) fn exited(&self, record: &ThreadRecord, code: i32) {
        self.report(&Report::Exited {
            thread: record.id(),
            code,
        });
    }

    /// Stops the runtime: checkpoints stop doing anything, new events are refused, and
    /// every record is finalized with its queued events abandoned.
    ///
    /// Threads keep running; their checkpoints become no-ops.
    pub fn shutdown(&self) {
        if self.inner.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        tracing::debug!(threads = self.inner.registry.len(), "runtime shutting down");
        self.inner.registry.clear("runtime is shutting down");
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("threads", &self.inner.registry.len())
            .field("exceptions", &self.inner.arena.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

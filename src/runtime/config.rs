//! Runtime configuration.
//!
//! [`RuntimeConfig`] sets the initial gates of every thread record and the behaviour of
//! the exit path.
//!
//! # Configuration Presets
//!
//! - [`RuntimeConfig::full()`] - Tracing, events and traceback recording (the default)
//! - [`RuntimeConfig::events_only()`] - Cross-thread events without observers
//! - [`RuntimeConfig::minimal()`] - Everything off; threads only keep their frames
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use interlude::{Runtime, RuntimeConfig};
//!
//! let config = RuntimeConfig::events_only()
//!     .with_idle_slice(Duration::from_millis(5))
//!     .with_stack_size(256 * 1024);
//! let runtime = Runtime::with_config(config);
//! assert!(!runtime.config().trace_enabled);
//! ```

use std::time::Duration;

use crate::thread::RecordFlags;

/// Configuration of a [`Runtime`](crate::Runtime).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Whether observers run on new threads.
    ///
    /// Threads can toggle this later with
    /// [`ThreadContext::set_tracing`](crate::ThreadContext::set_tracing).
    pub trace_enabled: bool,

    /// Whether checkpoints drain queued events on new threads.
    pub events_enabled: bool,

    /// Whether the traceback recorder is registered on new threads.
    ///
    /// Without it, tracebacks fall back to the raw frame chain captured when the
    /// exception became active.
    pub record_tracebacks: bool,

    /// Whether events still queued when a thread leaves normally are run before the
    /// record is finalized.
    ///
    /// Events queued behind an event that terminated the thread are always discarded.
    pub drain_on_exit: bool,

    /// Whether panics in observers, scheduled callees and spawned bodies are caught and
    /// turned into exceptions.
    pub catch_panics: bool,

    /// Stack size of threads started with [`Runtime::spawn`](crate::Runtime::spawn).
    ///
    /// `None` uses the platform default.
    pub stack_size: Option<usize>,

    /// How long [`ThreadContext::idle`](crate::ThreadContext::idle) parks when no
    /// timeout is given.
    pub idle_slice: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::full()
    }
}

impl RuntimeConfig {
    /// Tracing, events and traceback recording enabled.
    #[must_use]
    pub fn full() -> Self {
        RuntimeConfig {
            trace_enabled: true,
            events_enabled: true,
            record_tracebacks: true,
            drain_on_exit: true,
            catch_panics: true,
            stack_size: None,
            idle_slice: Duration::from_millis(10),
        }
    }

    /// Cross-thread events without observers or traceback recording.
    #[must_use]
    pub fn events_only() -> Self {
        RuntimeConfig {
            trace_enabled: false,
            record_tracebacks: false,
            ..Self::full()
        }
    }

    /// Everything disabled.
    #[must_use]
    pub fn minimal() -> Self {
        RuntimeConfig {
            trace_enabled: false,
            events_enabled: false,
            record_tracebacks: false,
            drain_on_exit: false,
            ..Self::full()
        }
    }

    /// Sets whether observers run on new threads.
    #[must_use]
    pub fn with_tracing(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    /// Sets whether checkpoints drain events on new threads.
    #[must_use]
    pub fn with_events(mut self, enabled: bool) -> Self {
        self.events_enabled = enabled;
        self
    }

    /// Sets whether tracebacks are recorded.
    #[must_use]
    pub fn with_tracebacks(mut self, enabled: bool) -> Self {
        self.record_tracebacks = enabled;
        self
    }

    /// Sets whether remaining events run when a thread leaves normally.
    #[must_use]
    pub fn with_drain_on_exit(mut self, enabled: bool) -> Self {
        self.drain_on_exit = enabled;
        self
    }

    /// Sets whether panics are caught.
    #[must_use]
    pub fn with_catch_panics(mut self, enabled: bool) -> Self {
        self.catch_panics = enabled;
        self
    }

    /// Sets the stack size of spawned threads.
    #[must_use]
    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }

    /// Sets the default idle slice.
    #[must_use]
    pub fn with_idle_slice(mut self, slice: Duration) -> Self {
        self.idle_slice = slice;
        self
    }

    /// Initial flags of a new thread record.
    pub(crate) fn initial_flags(&self) -> RecordFlags {
        let mut flags = RecordFlags::empty();
        flags.set(RecordFlags::TRACE, self.trace_enabled);
        flags.set(RecordFlags::EVENTS, self.events_enabled);
        flags
    }
}

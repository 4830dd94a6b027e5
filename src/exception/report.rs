//! Failure reports and the overridable reporting hook.
//!
//! Every failure the layer cannot hand back to a caller ends up here: exceptions nobody
//! caught, scheduled calls that failed, observers that failed, and threads that exited
//! with a non-zero code. The active [`ExceptHook`] receives each report once. The default
//! hook renders it to stderr, using the recorded traceback when one exists.

use std::fmt;

use crate::{
    exception::{arena::TraceEntry, Exception},
    hook::{CheckpointKind, ObserverId},
    thread::ThreadId,
};

/// A failure reported through the runtime's [`ExceptHook`].
#[derive(Clone, Debug)]
pub enum Report {
    /// An exception reached the outermost frame of its thread.
    Uncaught {
        /// Thread the exception escaped from.
        thread: ThreadId,
        /// The exception.
        exception: Exception,
        /// Reconstructed traceback, innermost first.
        trace: Vec<TraceEntry>,
    },
    /// A scheduled call failed inside its target thread, which terminates with code 1.
    EventFailed {
        /// Target thread of the event.
        thread: ThreadId,
        /// Name of the scheduled callee.
        callee: &'static str,
        /// The exception the callee raised.
        exception: Exception,
        /// Reconstructed traceback, innermost first.
        trace: Vec<TraceEntry>,
    },
    /// An observer failed and was unregistered.
    ObserverFailed {
        /// Thread the observer was registered on.
        thread: ThreadId,
        /// The unregistered observer.
        observer: ObserverId,
        /// Checkpoint the observer failed on.
        checkpoint: CheckpointKind,
        /// The exception the observer raised.
        exception: Exception,
    },
    /// A thread terminated with a non-zero exit code.
    Exited {
        /// The terminated thread.
        thread: ThreadId,
        /// Its exit code.
        code: i32,
    },
}

impl Report {
    /// Returns the thread the report is about.
    #[must_use]
    pub fn thread(&self) -> ThreadId {
        match self {
            Report::Uncaught { thread, .. }
            | Report::EventFailed { thread, .. }
            | Report::ObserverFailed { thread, .. }
            | Report::Exited { thread, .. } => *thread,
        }
    }

    /// Returns the exception being reported, if any.
    #[must_use]
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            Report::Uncaught { exception, .. }
            | Report::EventFailed { exception, .. }
            | Report::ObserverFailed { exception, .. } => Some(exception),
            Report::Exited { .. } => None,
        }
    }

    /// Returns the traceback carried by the report, innermost first.
    #[must_use]
    pub fn trace(&self) -> &[TraceEntry] {
        match self {
            Report::Uncaught { trace, .. } | Report::EventFailed { trace, .. } => trace,
            Report::ObserverFailed { .. } | Report::Exited { .. } => &[],
        }
    }
}

fn write_exception(
    f: &mut fmt::Formatter<'_>,
    exception: &Exception,
    trace: &[TraceEntry],
) -> fmt::Result {
    if !trace.is_empty() {
        writeln!(f, "Traceback (most recent call last):")?;
        for entry in trace.iter().rev() {
            writeln!(f, "  in {} at {}", entry.function, entry.location)?;
        }
    }
    writeln!(f, "{}: {}", exception.type_name(), exception)
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Report::Uncaught {
                thread,
                exception,
                trace,
            } => {
                writeln!(f, "Exception in thread {thread}:")?;
                write_exception(f, exception, trace)
            }
            Report::EventFailed {
                thread,
                callee,
                exception,
                trace,
            } => {
                writeln!(f, "Scheduled call {callee} failed in thread {thread}:")?;
                write_exception(f, exception, trace)
            }
            Report::ObserverFailed {
                thread,
                observer,
                checkpoint,
                exception,
            } => {
                writeln!(
                    f,
                    "Removed {observer} from thread {thread} after it failed on a {checkpoint} checkpoint:"
                )?;
                write_exception(f, exception, &[])
            }
            Report::Exited { thread, code } => {
                writeln!(f, "Thread {thread} exited with code {code}")
            }
        }
    }
}

/// Signature of the reporting hook.
pub type ExceptHook = dyn Fn(&Report) + Send + Sync;

/// Default reporting hook: renders the report to stderr.
pub fn default_excepthook(report: &Report) {
    eprint!("{report}");
}

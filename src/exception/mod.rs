//! Exceptions, traceback recording and failure reporting.
//!
//! # Key Components
//!
//! - [`Exception`] / [`Interrupt`] - In-thread control flow, propagated with `?`
//! - [`TracebackChain`] - Frames an exception unwound through, stored in a generation-counted
//!   arena keyed by [`ExceptionToken`]
//! - [`FrameMask`] - Scoped guard hiding a frame from recorded tracebacks
//! - [`Report`] / [`ExceptHook`] - Overridable reporting of failures nobody caught
//!
//! # Trace order
//!
//! Chains are kept innermost first, in the order the exception unwound. Renderers that
//! want the conventional "most recent call last" layout reverse them.

mod arena;
mod mask;
pub(crate) mod recorder;
mod report;
mod types;

pub(crate) use arena::ExceptionArena;
pub use arena::{ExceptionToken, TraceEntry, TracebackChain};
pub use mask::FrameMask;
pub use report::{default_excepthook, ExceptHook, Report};
pub(crate) use types::catch_panics;
pub use types::{Exception, ExceptionOrigin, Interrupt, Message, PanicError};

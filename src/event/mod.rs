//! Cross-thread events.
//!
//! Any thread may schedule work onto a managed thread: a call ([`Runtime::invoke`]), an
//! exception ([`Runtime::throw`]), a termination request ([`Runtime::exit`]) or a barrier
//! ([`Runtime::ping`]). Events are queued per target in FIFO order and run at the target's
//! next checkpoint. Calls and barriers hand back a [`ScheduledResult`].
//!
//! [`Runtime::invoke`]: crate::Runtime::invoke
//! [`Runtime::throw`]: crate::Runtime::throw
//! [`Runtime::exit`]: crate::Runtime::exit
//! [`Runtime::ping`]: crate::Runtime::ping

mod queue;
mod result;

pub use queue::EventKind;
pub(crate) use queue::{Event, EventQueue};
pub use result::ScheduledResult;

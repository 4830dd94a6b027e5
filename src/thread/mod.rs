//! Managed threads: identifiers, shadow frames, records and contexts.
//!
//! # Key Components
//!
//! - [`ThreadId`] - Process-unique thread identifier, assigned on first use
//! - [`Frame`] / [`FrameId`] / [`Location`] - Shadow call stack entries
//! - [`ThreadRecord`] - All per-thread state: event queue, observers, masks, frames
//! - [`ThreadContext`] - Owner-side handle that drives checkpoints
//!
//! # Checkpoints
//!
//! The layer cannot interrupt a thread. Instead, managed code passes through
//! checkpoints, and every checkpoint is a place where queued events may run:
//!
//! | Method | Checkpoint |
//! |--------|------------|
//! | [`ThreadContext::call`] | `call` on entry, `return` on exit |
//! | [`ThreadContext::step`] / [`ThreadContext::idle`] | `step` |
//! | [`ThreadContext::raise`] | `exception` |

mod context;
mod frame;
mod id;
mod record;

pub use context::ThreadContext;
pub use frame::{Frame, FrameId, Location};
pub use id::ThreadId;
pub(crate) use id::watch_exit;
pub use record::{RecordFlags, ThreadRecord};

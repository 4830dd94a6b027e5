// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![deny(unsafe_code)]

//! # interlude
//!
//! Cooperative cross-thread control and checkpoint instrumentation for Rust threads.
//!
//! Any thread can schedule work onto another managed thread: a call, an exception or a
//! termination request. Nothing is preempted. The target runs the work the next time it
//! passes a checkpoint, in the order the work was scheduled. A companion tracing layer
//! observes every checkpoint, records where exceptions unwound, and lets plumbing frames
//! be hidden from the resulting tracebacks.
//!
//! ## Features
//!
//! - **Cross-thread events** - `invoke`, `throw`, `exit` and `ping` onto any managed thread,
//!   strictly FIFO per target
//! - **Write-once results** - [`ScheduledResult`] with non-blocking reads and blocking waits
//! - **Checkpoint observers** - per-thread, per-kind observer lists with safe removal
//! - **Traceback recording** - per-exception chains in a generation-counted arena, with
//!   scoped [`FrameMask`]s hiding frames
//! - **Overridable reporting** - every uncaught failure is handed once to the
//!   [`ExceptHook`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use interlude::prelude::*;
//!
//! fn greet(cx: &ThreadContext, name: String) -> Result<String, Interrupt> {
//!     Ok(format!("hello {name} from {}", cx.id()))
//! }
//!
//! let runtime = Runtime::new();
//! let worker = runtime.spawn("worker", |cx| -> Result<(), Interrupt> {
//!     loop {
//!         cx.idle(None)?;
//!     }
//! })?;
//!
//! let greeting = worker.invoke(greet, "world".to_string())?;
//! println!("{}", greeting.wait()?);
//!
//! worker.exit(0)?;
//! worker.join()?;
//! # Ok::<(), interlude::Error>(())
//! ```
//!
//! ## Checkpoints
//!
//! Rust exposes no step hook, so managed code reaches checkpoints explicitly through its
//! [`ThreadContext`]: entering a frame with [`ThreadContext::call`], marking progress with
//! [`ThreadContext::step`] or [`ThreadContext::idle`], and raising with
//! [`ThreadContext::raise`]. Every checkpoint returns `Result<_, Interrupt>`, and
//! propagating the [`Interrupt`] with `?` is what lets a scheduled exception or exit unwind
//! the thread.
//!
//! ## Architecture
//!
//! - [`runtime`] - [`Runtime`], the thread registry, spawning and event scheduling
//! - [`thread`] - Thread ids, shadow frames, records and [`ThreadContext`]
//! - [`event`] - Event kinds and [`ScheduledResult`]
//! - [`hook`] - Checkpoint kinds, observers and the dispatch order
//! - [`exception`] - [`Exception`], [`Interrupt`], traceback chains, masks and reports
//! - [`Error`] and [`Result`] - Errors of the control surface
//!
//! ## Logging
//!
//! The crate logs through [`tracing`] and installs no subscriber. Record lifecycle is
//! logged at `debug`, enqueues at `trace`, discarded events and failed observers at
//! `warn`, failed scheduled calls at `error`.
#[macro_use]
pub(crate) mod macros;

pub(crate) mod error;

/// Shared functionality which is used in unit- and integration-tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use interlude::prelude::*;
///
/// let runtime = Runtime::new();
/// let cx = runtime.attach();
/// cx.call("work", |cx| cx.step())?;
/// cx.detach()?;
/// # Ok::<(), interlude::Interrupt>(())
/// ```
pub mod prelude;

pub mod event;
pub mod exception;
pub mod hook;
pub mod runtime;
pub mod thread;

/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
///
/// Used for every operation of the control surface. Code running inside a managed thread
/// uses `std::result::Result<T, Interrupt>` instead.
pub type Result<T> = std::result::Result<T, Error>;

/// `interlude` Error type
///
/// # Examples
///
/// ```rust
/// use interlude::{Error, Runtime, ThreadId};
///
/// let runtime = Runtime::new();
/// match runtime.ping(ThreadId::from_raw(u64::MAX)) {
///     Err(Error::ThreadNotFound(id)) => println!("{id} is not running"),
///     Err(e) => println!("Error: {}", e),
///     Ok(_) => unreachable!(),
/// }
/// ```
pub use error::Error;

pub use event::{EventKind, ScheduledResult};
pub use exception::{
    default_excepthook, ExceptHook, Exception, ExceptionOrigin, ExceptionToken, FrameMask,
    Interrupt, Message, PanicError, Report, TraceEntry, TracebackChain,
};
pub use hook::{
    Checkpoint, CheckpointKind, ObserverId, ObserverKind, ObserverResult, Payload, TraceFlow,
};
pub use runtime::{Runtime, RuntimeConfig, ThreadHandle, ThreadOutcome};
pub use thread::{Frame, FrameId, Location, ThreadContext, ThreadId, ThreadRecord};

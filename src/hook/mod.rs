//! Checkpoint hook and observer registry.
//!
//! Managed code passes through checkpoints whenever it enters a frame, marks a step,
//! returns, or raises. At each checkpoint the hook drains one queued event and then runs
//! the thread's observers.
//!
//! # Observers
//!
//! Observers are registered per thread and per [`ObserverKind`] and run in registration
//! order, the kind-specific ones before the `Any` ones. They steer the firing through
//! [`TraceFlow`]:
//!
//! - `Continue` runs the remaining observers
//! - `Break` skips the remaining observers for this firing only
//! - `Detach` unregisters the observer
//!
//! An observer returning a raised exception, or panicking, is unregistered and reported.
//! An observer returning [`Interrupt::Exit`](crate::Interrupt::Exit) terminates the thread.
//!
//! # Examples
//!
//! ```rust,no_run
//! use interlude::{ObserverKind, Runtime, TraceFlow};
//!
//! let runtime = Runtime::new();
//! let cx = runtime.attach();
//! let id = cx.observe(ObserverKind::Call, |checkpoint| {
//!     println!("enter {} at depth {}", checkpoint.frame().function(), checkpoint.depth());
//!     Ok(TraceFlow::Continue)
//! });
//! cx.call("work", |cx| cx.step())?;
//! cx.unobserve(id);
//! # Ok::<(), interlude::Interrupt>(())
//! ```

pub(crate) mod dispatch;
mod registry;
mod types;

pub use registry::ObserverId;
pub(crate) use registry::ObserverRegistry;
pub use types::{
    Checkpoint, CheckpointKind, ObserverFn, ObserverKind, ObserverResult, Payload,
    SharedObserver, TraceFlow,
};

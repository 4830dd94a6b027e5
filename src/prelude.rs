//! # interlude Prelude
//!
//! The types needed to run managed threads, schedule events onto them and observe their
//! checkpoints. Import with `use interlude::prelude::*;`.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type of the control surface
pub use crate::Error;

/// In-thread control flow
pub use crate::{Exception, Interrupt};

// ================================================================================================
// Runtime and Threads
// ================================================================================================

/// Runtime entry points
pub use crate::{Runtime, RuntimeConfig, ThreadHandle, ThreadOutcome};

/// Managed thread handles and identifiers
pub use crate::{Frame, FrameId, ThreadContext, ThreadId};

// ================================================================================================
// Events
// ================================================================================================

/// Result of a scheduled call
pub use crate::ScheduledResult;

// ================================================================================================
// Observers and Tracebacks
// ================================================================================================

/// Checkpoint observation
pub use crate::{Checkpoint, CheckpointKind, ObserverId, ObserverKind, Payload, TraceFlow};

/// Traceback inspection and reporting
pub use crate::{FrameMask, Report, TraceEntry};

/// Raise an error inside a managed thread
pub use crate::raise;

//! Core checkpoint and observer types.

use std::sync::Arc;

use strum::{Display, EnumCount, EnumIter, IntoStaticStr};

use crate::{
    exception::{Exception, Interrupt},
    thread::{Frame, ThreadContext, ThreadId},
};

/// The kind of checkpoint being fired.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum CheckpointKind {
    /// A frame was entered.
    Call,
    /// Managed code reached a step inside a frame.
    Step,
    /// A frame is returning, normally or while unwinding.
    Return,
    /// An exception became active in a frame.
    Exception,
}

/// Which checkpoints an observer is registered for.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumCount, EnumIter, IntoStaticStr,
)]
#[strum(serialize_all = "lowercase")]
pub enum ObserverKind {
    /// Only `call` checkpoints.
    Call,
    /// Only `step` checkpoints.
    Step,
    /// Only `return` checkpoints.
    Return,
    /// Only `exception` checkpoints.
    Exception,
    /// Every checkpoint, after the kind-specific observers.
    Any,
}

impl From<CheckpointKind> for ObserverKind {
    fn from(kind: CheckpointKind) -> Self {
        match kind {
            CheckpointKind::Call => ObserverKind::Call,
            CheckpointKind::Step => ObserverKind::Step,
            CheckpointKind::Return => ObserverKind::Return,
            CheckpointKind::Exception => ObserverKind::Exception,
        }
    }
}

/// Event-specific data delivered with a checkpoint.
#[derive(Clone, Copy, Debug)]
pub enum Payload<'a> {
    /// Nothing beyond the frame.
    None,
    /// The frame is returning because this interrupt is unwinding through it.
    Unwinding(&'a Interrupt),
    /// The exception that just became active in the frame.
    Exception(&'a Exception),
}

/// What the checkpoint hook hands to observers.
pub struct Checkpoint<'a> {
    pub(crate) context: &'a ThreadContext,
    pub(crate) kind: CheckpointKind,
    pub(crate) frame: &'a Frame,
    pub(crate) depth: usize,
    pub(crate) payload: Payload<'a>,
}

impl<'a> Checkpoint<'a> {
    /// Returns the context of the thread the checkpoint fired on.
    #[must_use]
    pub fn context(&self) -> &'a ThreadContext {
        self.context
    }

    /// Returns the id of the thread the checkpoint fired on.
    #[must_use]
    pub fn thread(&self) -> ThreadId {
        self.context.id()
    }

    /// Returns the checkpoint kind.
    #[must_use]
    pub fn kind(&self) -> CheckpointKind {
        self.kind
    }

    /// Returns the frame the checkpoint fired in.
    #[must_use]
    pub fn frame(&self) -> &'a Frame {
        self.frame
    }

    /// Returns the 1-based depth of the frame; `1` is the outermost frame.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the event-specific payload.
    #[must_use]
    pub fn payload(&self) -> Payload<'a> {
        self.payload
    }
}

/// How the hook should proceed after an observer returns.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TraceFlow {
    /// Run the remaining observers.
    #[default]
    Continue,
    /// Skip the remaining observers for this firing only.
    Break,
    /// Unregister this observer and run the remaining ones.
    Detach,
}

/// Result returned by observers.
///
/// `Err(Interrupt::Raised(_))` marks the observer as failed: it is reported and
/// unregistered. `Err(Interrupt::Exit(_))` propagates into the instrumented thread.
pub type ObserverResult = Result<TraceFlow, Interrupt>;

/// Observer callback signature.
pub type ObserverFn = dyn Fn(&Checkpoint<'_>) -> ObserverResult + Send + Sync;

/// Shared handle to an observer callback.
pub type SharedObserver = Arc<ObserverFn>;

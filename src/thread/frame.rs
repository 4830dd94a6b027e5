//! Shadow call frames.
//!
//! Rust does not expose its own activation records, so the layer keeps a shadow chain of
//! [`Frame`]s per managed thread. A frame is pushed by
//! [`ThreadContext::call`](crate::ThreadContext::call) and popped when the call returns;
//! its [`Location`] is refreshed at every step checkpoint from the caller location captured
//! with `#[track_caller]`.

use std::{
    borrow::Cow,
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of one frame activation.
///
/// Unique for the lifetime of the process, so a masked or recorded id can never be
/// confused with a later activation of the same function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    pub(crate) fn allocate() -> Self {
        FrameId(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub const fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A program location inside managed code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    /// Source file.
    pub file: &'static str,
    /// 1-based line.
    pub line: u32,
    /// 1-based column.
    pub column: u32,
}

impl Location {
    /// Location of the caller of the enclosing `#[track_caller]` function.
    #[track_caller]
    #[must_use]
    pub fn caller() -> Self {
        std::panic::Location::caller().into()
    }
}

impl From<&'static std::panic::Location<'static>> for Location {
    fn from(location: &'static std::panic::Location<'static>) -> Self {
        Location {
            file: location.file(),
            line: location.line(),
            column: location.column(),
        }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// One activation on a managed thread's shadow call stack.
#[derive(Clone, Debug)]
pub struct Frame {
    id: FrameId,
    function: Cow<'static, str>,
    location: Location,
}

impl Frame {
    pub(crate) fn new(function: Cow<'static, str>, location: Location) -> Self {
        Frame {
            id: FrameId::allocate(),
            function,
            location,
        }
    }

    /// Returns the identity of this activation.
    #[must_use]
    pub fn id(&self) -> FrameId {
        self.id
    }

    /// Returns the name the frame was entered under.
    #[must_use]
    pub fn function(&self) -> &str {
        &self.function
    }

    /// Returns the last location observed in this frame.
    #[must_use]
    pub fn location(&self) -> Location {
        self.location
    }

    pub(crate) fn set_location(&mut self, location: Location) {
        self.location = location;
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.function, self.location)
    }
}

//! Scoped frame masks.

use std::sync::{Arc, Weak};

use crate::{
    runtime::RuntimeInner,
    thread::{FrameId, ThreadRecord},
};

/// Hides a frame from traceback recording while held.
///
/// Dropping the guard unmasks the frame, unless an exception is propagating in the
/// masked thread. In that case the mask is handed to the exception and released when the
/// exception is dropped, so the frame stays hidden in its final traceback. Guards may be
/// dropped on any thread.
#[must_use = "the frame is unmasked as soon as the guard is dropped"]
pub struct FrameMask {
    record: Arc<ThreadRecord>,
    runtime: Weak<RuntimeInner>,
    frame: FrameId,
}

impl FrameMask {
    pub(crate) fn new(
        record: Arc<ThreadRecord>,
        runtime: Weak<RuntimeInner>,
        frame: FrameId,
    ) -> Self {
        record.mask(frame);
        FrameMask {
            record,
            runtime,
            frame,
        }
    }

    /// Returns the masked frame.
    #[must_use]
    pub fn frame(&self) -> FrameId {
        self.frame
    }
}

impl Drop for FrameMask {
    fn drop(&mut self) {
        let retained = match (self.record.exception(), self.runtime.upgrade()) {
            (Some(exception), Some(runtime)) => exception
                .token()
                .and_then(|token| {
                    runtime.arena().with_chain(token, |chain| {
                        chain.retained_masks.push((self.record.id(), self.frame));
                    })
                })
                .is_some(),
            _ => false,
        };

        if retained {
            tracing::trace!(
                thread = %self.record.id(),
                frame = %self.frame,
                "frame mask retained by propagating exception"
            );
        } else {
            self.record.unmask(self.frame);
        }
    }
}

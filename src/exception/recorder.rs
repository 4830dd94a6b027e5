//! Traceback recorder.
//!
//! Registered as the first `exception` observer of every record when
//! [`RuntimeConfig::record_tracebacks`](crate::RuntimeConfig::record_tracebacks) is set.
//! Each time an exception becomes active in a frame, the frame is appended to the
//! exception's chain unless it is masked. Masked frames are skipped at recording time and
//! never purged afterwards.

use crate::{
    exception::arena::TraceEntry,
    hook::{Checkpoint, ObserverResult, Payload, TraceFlow},
};

/// Appends the checkpoint's frame to the active exception's chain.
pub(crate) fn record(checkpoint: &Checkpoint<'_>) -> ObserverResult {
    let Payload::Exception(exception) = checkpoint.payload() else {
        return Ok(TraceFlow::Continue);
    };
    let Some(token) = exception.token() else {
        return Ok(TraceFlow::Continue);
    };

    let frame = checkpoint.frame();
    if checkpoint.context().is_masked(frame.id()) {
        return Ok(TraceFlow::Continue);
    }

    checkpoint.context().runtime().arena().with_chain(token, |chain| {
        if chain.entries.last().is_some_and(|last| last.frame == frame.id()) {
            return;
        }
        chain.entries.push(TraceEntry::from(frame));
    });
    Ok(TraceFlow::Continue)
}

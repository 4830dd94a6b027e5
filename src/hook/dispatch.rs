//! Checkpoint dispatch.
//!
//! [`fire`] is the single entry point every checkpoint goes through. Per firing it:
//!
//! 1. does nothing while the runtime shuts down, while the thread leaves, or when nested
//!    inside another firing on the same thread
//! 2. delivers a pending termination request
//! 3. drains one queued event, if events are enabled and no earlier event forced the
//!    thread to terminate
//! 4. runs the observers for the checkpoint kind, then the `Any` observers, if tracing
//!    is enabled
//! 5. on the return of the outermost frame, reports the outcome, drains or discards the
//!    remaining events and finalizes the record

use crate::{
    event::Event,
    exception::{catch_panics, Interrupt, Report},
    hook::{
        types::{Checkpoint, CheckpointKind, ObserverKind, Payload, SharedObserver, TraceFlow},
        ObserverId,
    },
    thread::{Frame, RecordFlags, ThreadContext, ThreadRecord},
};

/// Clears `IN_HOOK` when the firing ends, including by panic.
struct HookScope<'a> {
    record: &'a ThreadRecord,
}

impl<'a> HookScope<'a> {
    fn enter(record: &'a ThreadRecord) -> Self {
        record.insert_flags(RecordFlags::IN_HOOK);
        HookScope { record }
    }
}

impl Drop for HookScope<'_> {
    fn drop(&mut self) {
        self.record.remove_flags(RecordFlags::IN_HOOK);
    }
}

/// Fires a checkpoint of `kind` in the innermost frame of `cx`'s thread.
pub(crate) fn fire(
    cx: &ThreadContext,
    kind: CheckpointKind,
    payload: Payload<'_>,
) -> Result<(), Interrupt> {
    let record = cx.record();
    let flags = record.flags();
    if cx.runtime().is_shutting_down()
        || flags.intersects(RecordFlags::IN_HOOK | RecordFlags::LEAVING)
    {
        return Ok(());
    }
    let Some((frame, depth)) = record.top() else {
        return Ok(());
    };

    let scope = HookScope::enter(record);

    let mut outcome = match record.take_exit() {
        Some(code) => Err(Interrupt::Exit(code)),
        None => Ok(()),
    };

    // Once an event forced termination, the events behind it are skipped.
    let drain = flags.contains(RecordFlags::EVENTS) && !flags.contains(RecordFlags::EVENT_EXIT);
    if outcome.is_ok() && drain && !record.queue.is_empty() {
        if let Some(event) = record.queue.pop() {
            outcome = run_event(cx, event);
        }
    }

    if outcome.is_ok() && flags.contains(RecordFlags::TRACE) {
        outcome = notify(cx, kind, &frame, depth, payload);
    }

    if kind == CheckpointKind::Return && depth == 1 {
        let escaping = match (&outcome, payload) {
            (Err(interrupt), _) | (Ok(()), Payload::Unwinding(interrupt)) => {
                Some(interrupt.clone())
            }
            _ => None,
        };
        leave(cx, escaping.as_ref());
    }

    drop(scope);
    outcome
}

/// Runs the observers registered for `kind`, then the `Any` observers.
fn notify(
    cx: &ThreadContext,
    kind: CheckpointKind,
    frame: &Frame,
    depth: usize,
    payload: Payload<'_>,
) -> Result<(), Interrupt> {
    let checkpoint = Checkpoint {
        context: cx,
        kind,
        frame,
        depth,
        payload,
    };
    let catch = cx.runtime().config().catch_panics;

    for observer_kind in [ObserverKind::from(kind), ObserverKind::Any] {
        let observers = lock!(cx.record().observers).snapshot(observer_kind);
        for (id, observer) in observers {
            // An earlier observer of this firing may have removed it.
            if !lock!(cx.record().observers).contains(id) {
                continue;
            }
            match call_observer(catch, &observer, &checkpoint) {
                Ok(TraceFlow::Continue) => {}
                Ok(TraceFlow::Break) => return Ok(()),
                Ok(TraceFlow::Detach) => {
                    lock!(cx.record().observers).unregister(id);
                }
                Err(Interrupt::Exit(code)) => return Err(Interrupt::Exit(code)),
                Err(Interrupt::Raised(exception)) => {
                    lock!(cx.record().observers).unregister(id);
                    observer_failed(cx, id, kind, exception);
                }
            }
        }
    }
    Ok(())
}

fn call_observer(
    catch: bool,
    observer: &SharedObserver,
    checkpoint: &Checkpoint<'_>,
) -> Result<TraceFlow, Interrupt> {
    catch_panics(catch, || observer(checkpoint))
}

fn observer_failed(
    cx: &ThreadContext,
    observer: ObserverId,
    checkpoint: CheckpointKind,
    exception: crate::exception::Exception,
) {
    tracing::warn!(
        thread = %cx.id(),
        %observer,
        %checkpoint,
        error = %exception,
        "observer failed and was unregistered"
    );
    cx.runtime().report(&Report::ObserverFailed {
        thread: cx.id(),
        observer,
        checkpoint,
        exception,
    });
}

/// Runs one drained event.
///
/// A failing invoke is reported and turned into `Exit(1)`; a callee asking to exit
/// terminates the thread with its code. Both mark the thread as exiting because of an
/// event.
pub(crate) fn run_event(cx: &ThreadContext, event: Event) -> Result<(), Interrupt> {
    let record = cx.record();
    let kind = event.kind();
    tracing::trace!(thread = %cx.id(), event = %kind, "running event");

    match event {
        Event::Noop { done } => {
            done.satisfy(());
            Ok(())
        }
        Event::Invoke { name, call, result } => {
            let catch = cx.runtime().config().catch_panics;
            // Entering the callee's frame clears the exception that may be unwinding.
            let in_flight = record.exception();
            match catch_panics(catch, || cx.call(name, call)) {
                Ok(()) => {
                    if let Some(exception) = in_flight {
                        record.set_exception(exception);
                    }
                    Ok(())
                }
                Err(Interrupt::Exit(code)) => {
                    result.abandon(format!("{name} requested exit({code})"));
                    record.insert_flags(RecordFlags::EVENT_EXIT);
                    Err(Interrupt::Exit(code))
                }
                Err(Interrupt::Raised(exception)) => {
                    result.abandon(format!("{name} failed: {exception}"));
                    cx.runtime().event_failed(record, name, exception);
                    record.clear_exception();
                    Err(Interrupt::Exit(1))
                }
            }
        }
        Event::Throw(Interrupt::Raised(exception)) => {
            exception.mark_delivered_by_event();
            Err(Interrupt::Raised(exception))
        }
        Event::Throw(Interrupt::Exit(code)) => {
            record.insert_flags(RecordFlags::EVENT_EXIT);
            Err(Interrupt::Exit(code))
        }
    }
}

/// Handles the return of the outermost frame.
fn leave(cx: &ThreadContext, escaping: Option<&Interrupt>) {
    let record = cx.record();
    record.insert_flags(RecordFlags::LEAVING);
    record.remove_flags(RecordFlags::TRACE | RecordFlags::EVENTS);
    let flags = record.flags();

    // A throw drained by this very checkpoint has not been activated yet.
    if let Some(Interrupt::Raised(exception)) = escaping {
        if !record.is_active(exception) {
            cx.bind(exception);
        }
    }

    let forced = match escaping {
        Some(Interrupt::Raised(exception)) => exception.delivered_by_event(),
        Some(Interrupt::Exit(_)) => flags.contains(RecordFlags::EVENT_EXIT),
        None => false,
    };

    match escaping {
        Some(Interrupt::Raised(exception)) => cx.runtime().uncaught(record, exception),
        Some(Interrupt::Exit(code))
            if *code != 0 && !flags.contains(RecordFlags::EVENT_FAILED) =>
        {
            cx.runtime().exited(record, *code);
        }
        _ => {}
    }

    if forced || !cx.runtime().config().drain_on_exit {
        discard(record, "thread terminated before the event ran");
    } else {
        drain_remaining(cx);
    }

    cx.runtime().finalize(record.id());
}

/// Runs the queued events in order, stopping at the first one that terminates the thread.
fn drain_remaining(cx: &ThreadContext) {
    let record = cx.record();
    while let Some(event) = record.queue.pop() {
        match run_event(cx, event) {
            Ok(()) => {}
            Err(Interrupt::Raised(exception)) => {
                cx.runtime().uncaught(record, &exception);
                break;
            }
            Err(Interrupt::Exit(code)) => {
                if code != 0 && !record.flags().contains(RecordFlags::EVENT_FAILED) {
                    cx.runtime().exited(record, code);
                }
                break;
            }
        }
    }
    discard(record, "an earlier event terminated the thread");
}

/// Closes the queue and abandons everything left in it.
pub(crate) fn discard(record: &ThreadRecord, reason: &str) {
    let remaining = record.queue.close();
    if remaining.is_empty() {
        return;
    }
    tracing::warn!(
        thread = %record.id(),
        discarded = remaining.len(),
        reason,
        "discarding queued events"
    );
    for event in remaining {
        event.discard(reason);
    }
}

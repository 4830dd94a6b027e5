//! Integration tests for cross-thread events.
//!
//! Workers in these tests block on a channel inside their root frame until every event of
//! the scenario is queued, so the order in which the worker reaches its checkpoints does
//! not depend on scheduling.

use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc, Mutex,
    },
    thread,
    time::Duration,
};

use interlude::{
    Error, Exception, Interrupt, Report, Result, Runtime, RuntimeConfig, ThreadContext,
    ThreadHandle, ThreadOutcome,
};

fn capture_reports(runtime: &Runtime) -> Arc<Mutex<Vec<Report>>> {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    runtime.set_excepthook(move |report| sink.lock().unwrap().push(report.clone()));
    reports
}

fn spawn_idle(runtime: &Runtime) -> ThreadHandle<()> {
    runtime
        .spawn("worker", |cx| -> std::result::Result<(), Interrupt> {
            loop {
                cx.idle(Some(Duration::from_millis(5)))?;
            }
        })
        .unwrap()
}

/// Worker that parks inside its root frame until released, then idles.
fn spawn_gated(runtime: &Runtime) -> (ThreadHandle<()>, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel::<()>();
    let handle = runtime
        .spawn("gated", move |cx| -> std::result::Result<(), Interrupt> {
            let _ = gate.recv();
            loop {
                cx.idle(Some(Duration::from_millis(5)))?;
            }
        })
        .unwrap();
    (handle, release)
}

/// Worker that parks inside its root frame until released, then returns normally.
fn spawn_gated_returning(runtime: &Runtime) -> (ThreadHandle<()>, mpsc::Sender<()>) {
    let (release, gate) = mpsc::channel::<()>();
    let handle = runtime
        .spawn("returning", move |_| {
            let _ = gate.recv();
            Ok(())
        })
        .unwrap();
    (handle, release)
}

#[test]
fn test_fifo_across_producers() -> Result<()> {
    const PRODUCERS: usize = 4;
    const PER_PRODUCER: usize = 50;

    let runtime = Runtime::new();
    let worker = spawn_idle(&runtime);
    let target = worker.id();

    let executed = Arc::new(Mutex::new(Vec::new()));
    // Taking a ticket and enqueueing happen under one lock, so ticket order is call order.
    let tickets = Arc::new(Mutex::new(0usize));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let runtime = runtime.clone();
            let executed = Arc::clone(&executed);
            let tickets = Arc::clone(&tickets);
            thread::spawn(move || {
                for _ in 0..PER_PRODUCER {
                    let mut next = tickets.lock().unwrap();
                    let ticket = *next;
                    *next += 1;
                    let executed = Arc::clone(&executed);
                    runtime
                        .invoke(
                            target,
                            move |_, ticket: usize| {
                                executed.lock().unwrap().push(ticket);
                                Ok(())
                            },
                            ticket,
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }

    runtime.ping(target)?.wait()?;
    let executed = executed.lock().unwrap().clone();
    assert_eq!(executed, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());

    worker.exit(0)?;
    assert!(matches!(worker.join()?, ThreadOutcome::Exited(0)));
    Ok(())
}

#[test]
fn test_invokes_run_in_order_with_real_values() -> Result<()> {
    let runtime = Runtime::new();
    let worker = spawn_idle(&runtime);
    let calls = Arc::new(Mutex::new(Vec::new()));

    let log = Arc::clone(&calls);
    let f = worker.invoke(
        move |cx: &ThreadContext, (a, b): (i32, i32)| {
            log.lock().unwrap().push(format!("f({a},{b})"));
            assert!(cx.current_frame().is_some());
            Ok(a + b)
        },
        (1, 2),
    )?;
    let log = Arc::clone(&calls);
    let g = worker.invoke(
        move |_, (x,): (i32,)| {
            log.lock().unwrap().push(format!("g({x})"));
            Ok(x * 10)
        },
        (3,),
    )?;

    assert_eq!(*g.wait()?, 30);
    assert_eq!(*f.value()?, 3);
    assert_eq!(*calls.lock().unwrap(), vec!["f(1,2)", "g(3)"]);

    worker.exit(0)?;
    worker.join()?;
    Ok(())
}

#[test]
fn test_failed_invoke_discards_later_events() -> Result<()> {
    let runtime = Runtime::new();
    let reports = capture_reports(&runtime);
    let (worker, release) = spawn_gated(&runtime);
    let counter = Arc::new(AtomicUsize::new(0));

    let count = Arc::clone(&counter);
    let first = worker.invoke(
        move |_, ()| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        (),
    )?;
    let second = worker.invoke(
        |_, ()| -> std::result::Result<(), Interrupt> { Err(Exception::msg("x").into()) },
        (),
    )?;
    let count = Arc::clone(&counter);
    let third = worker.invoke(
        move |_, ()| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        (),
    )?;
    let _ = release.send(());

    assert!(matches!(worker.join()?, ThreadOutcome::Exited(1)));
    assert_eq!(counter.load(Ordering::SeqCst), 1);
    assert!(first.is_ready());
    assert!(matches!(second.wait(), Err(Error::Abandoned(_))));
    assert!(matches!(third.wait(), Err(Error::Abandoned(_))));

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    match &reports[0] {
        Report::EventFailed { exception, .. } => assert_eq!(exception.to_string(), "x"),
        other => panic!("unexpected report: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_remaining_events_drain_on_normal_exit() -> Result<()> {
    let runtime = Runtime::new();
    let (worker, release) = spawn_gated_returning(&runtime);
    let counter = Arc::new(AtomicUsize::new(0));

    let results: Vec<_> = (0..3)
        .map(|expected| {
            let count = Arc::clone(&counter);
            worker.invoke(
                move |_, ()| Ok(count.fetch_add(1, Ordering::SeqCst) == expected),
                (),
            )
        })
        .collect::<Result<_>>()?;
    let _ = release.send(());

    assert!(matches!(worker.join()?, ThreadOutcome::Completed(())));
    assert_eq!(counter.load(Ordering::SeqCst), 3);
    for result in &results {
        assert!(*result.value()?);
    }
    Ok(())
}

#[test]
fn test_exit_path_honours_drain_on_exit() -> Result<()> {
    // Events are never drained at checkpoints here, only on the exit path.
    let draining = Runtime::with_config(RuntimeConfig::default().with_events(false));
    let (worker, release) = spawn_gated_returning(&draining);
    let pending = worker.ping()?;
    let _ = release.send(());
    worker.join()?;
    assert!(pending.is_ready());

    let discarding = Runtime::with_config(
        RuntimeConfig::default()
            .with_events(false)
            .with_drain_on_exit(false),
    );
    let (worker, release) = spawn_gated_returning(&discarding);
    let pending = worker.ping()?;
    let _ = release.send(());
    worker.join()?;
    assert!(matches!(pending.wait(), Err(Error::Abandoned(_))));
    Ok(())
}

#[test]
fn test_throw_raises_inside_target() -> Result<()> {
    let runtime = Runtime::new();
    let reports = capture_reports(&runtime);
    let (worker, release) = spawn_gated(&runtime);

    worker.throw(Exception::msg("stop"))?;
    // The root frame's exception and return checkpoints drain one event each while the
    // exception unwinds; whatever is left when the thread leaves is discarded.
    let during_exception = worker.ping()?;
    let during_return = worker.ping()?;
    let late = worker.ping()?;
    let _ = release.send(());

    let exception = match worker.join()? {
        ThreadOutcome::Raised(exception) => exception,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert!(exception.delivered_by_event());
    assert_eq!(exception.to_string(), "stop");
    assert!(during_exception.is_ready());
    assert!(during_return.is_ready());
    assert!(matches!(late.wait(), Err(Error::Abandoned(_))));

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    assert!(matches!(&reports[0], Report::Uncaught { exception: e, .. } if e.same(&exception)));
    Ok(())
}

#[test]
fn test_exit_codes() -> Result<()> {
    let runtime = Runtime::new();
    let reports = capture_reports(&runtime);

    let quiet = spawn_idle(&runtime);
    quiet.exit(0)?;
    assert!(matches!(quiet.join()?, ThreadOutcome::Exited(0)));
    assert!(reports.lock().unwrap().is_empty());

    let loud = spawn_idle(&runtime);
    let id = loud.id();
    loud.exit(3)?;
    assert!(matches!(loud.join()?, ThreadOutcome::Exited(3)));
    let reports = reports.lock().unwrap();
    assert!(matches!(
        reports.as_slice(),
        [Report::Exited { thread, code: 3 }] if *thread == id
    ));
    Ok(())
}

#[test]
fn test_value_is_not_ready_while_target_is_busy() -> Result<()> {
    let runtime = Runtime::new();
    let worker = spawn_idle(&runtime);
    let (started_tx, started) = mpsc::channel::<()>();
    let (release, gate) = mpsc::channel::<()>();

    let blocker = worker.invoke(
        move |_, ()| {
            started_tx.send(()).unwrap();
            let _ = gate.recv();
            Ok(())
        },
        (),
    )?;
    started.recv().unwrap();

    let answer = worker.invoke(|_, ()| Ok(42u32), ())?;
    assert!(matches!(answer.value(), Err(Error::NotReady)));
    assert!(matches!(
        answer.wait_timeout(Duration::from_millis(10)),
        Err(Error::NotReady)
    ));

    let _ = release.send(());
    assert_eq!(*answer.wait()?, 42);
    assert!(blocker.is_ready());

    worker.exit(0)?;
    worker.join()?;
    Ok(())
}

#[test]
fn test_panicking_callee_is_reported() -> Result<()> {
    let runtime = Runtime::new();
    let reports = capture_reports(&runtime);
    let worker = spawn_idle(&runtime);

    let result = worker.invoke(
        |_, ()| -> std::result::Result<(), Interrupt> { panic!("kaboom") },
        (),
    )?;
    assert!(matches!(result.wait(), Err(Error::Abandoned(_))));
    assert!(matches!(worker.join()?, ThreadOutcome::Exited(1)));

    let reports = reports.lock().unwrap();
    match reports.as_slice() {
        [Report::EventFailed { exception, .. }] => {
            assert_eq!(exception.to_string(), "panicked: kaboom");
        }
        other => panic!("unexpected reports: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_finished_threads_refuse_events() -> Result<()> {
    let runtime = Runtime::new();
    let worker = runtime.spawn("short", |_| Ok(7))?;
    let id = worker.id();
    assert!(matches!(worker.join()?, ThreadOutcome::Completed(7)));

    assert!(matches!(runtime.exit(id, 0), Err(Error::ThreadNotFound(_))));
    assert!(matches!(
        runtime.invoke(id, |_, ()| Ok(()), ()),
        Err(Error::ThreadNotFound(_))
    ));
    assert!(runtime.threads().is_empty());
    Ok(())
}

#[test]
fn test_exit_event_skips_later_events() -> Result<()> {
    let runtime = Runtime::new();
    let reports = capture_reports(&runtime);
    let (worker, release) = spawn_gated(&runtime);
    let counter = Arc::new(AtomicUsize::new(0));

    worker.exit(4)?;
    let count = Arc::clone(&counter);
    let skipped = worker.invoke(
        move |_, ()| {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        (),
    )?;
    let pending = worker.ping()?;
    let _ = release.send(());

    assert!(matches!(worker.join()?, ThreadOutcome::Exited(4)));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(matches!(skipped.wait(), Err(Error::Abandoned(_))));
    assert!(matches!(pending.wait(), Err(Error::Abandoned(_))));
    let reports = reports.lock().unwrap();
    assert!(matches!(reports.as_slice(), [Report::Exited { code: 4, .. }]));
    Ok(())
}

#[test]
fn test_failed_invoke_on_exit_path_discards_the_rest() -> Result<()> {
    // Events are never drained at checkpoints here, only on the exit path.
    let runtime = Runtime::with_config(RuntimeConfig::default().with_events(false));
    let reports = capture_reports(&runtime);
    let (worker, release) = spawn_gated_returning(&runtime);
    let counter = Arc::new(AtomicUsize::new(0));

    let count = Arc::clone(&counter);
    let first = worker.invoke(
        move |_, ()| Ok(count.fetch_add(1, Ordering::SeqCst)),
        (),
    )?;
    let failing = worker.invoke(
        |_, ()| -> std::result::Result<usize, Interrupt> { Err(Exception::msg("broken").into()) },
        (),
    )?;
    let count = Arc::clone(&counter);
    let third = worker.invoke(
        move |_, ()| Ok(count.fetch_add(1, Ordering::SeqCst)),
        (),
    )?;
    let _ = release.send(());
    worker.join()?;

    assert_eq!(*first.value()?, 0);
    assert!(matches!(failing.wait(), Err(Error::Abandoned(_))));
    assert!(matches!(third.wait(), Err(Error::Abandoned(_))));
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    let reports = reports.lock().unwrap();
    assert_eq!(reports.len(), 1);
    match &reports[0] {
        Report::EventFailed { exception, .. } => assert_eq!(exception.to_string(), "broken"),
        other => panic!("unexpected report: {other:?}"),
    }
    Ok(())
}

#[test]
fn test_events_run_at_exception_checkpoints() {
    let runtime = Runtime::new();
    let cx = runtime.attach();
    let target = cx.id();

    let outcome = cx.call("work", |cx| {
        let producer = runtime.clone();
        let scheduled = thread::spawn(move || producer.invoke(target, |_, ()| Ok(7), ()))
            .join()
            .unwrap()
            .unwrap();
        assert!(!scheduled.is_ready());

        let interrupt = cx.raise(Exception::msg("boom"));
        assert!(scheduled.is_ready());
        assert_eq!(*scheduled.value().unwrap(), 7);
        // The callee ran in its own frame without clearing the unwinding exception.
        assert!(cx.exception().is_some());
        Err::<(), _>(interrupt)
    });

    let interrupt = outcome.unwrap_err();
    assert_eq!(interrupt.exception().unwrap().to_string(), "boom");
    cx.step().unwrap();
    cx.detach().unwrap();
}

#[test]
fn test_throw_at_exception_checkpoint_replaces_the_exception() {
    let runtime = Runtime::new();
    let cx = runtime.attach();
    let target = cx.id();

    let outcome = cx.call("work", |cx| {
        let producer = runtime.clone();
        thread::spawn(move || producer.throw(target, Exception::msg("replacement")))
            .join()
            .unwrap()
            .unwrap();
        Err::<(), _>(cx.raise(Exception::msg("original")))
    });

    let exception = outcome.unwrap_err().exception().cloned().unwrap();
    assert_eq!(exception.to_string(), "replacement");
    assert!(exception.delivered_by_event());
    let frames: Vec<String> = runtime
        .traceback(&exception)
        .iter()
        .map(|entry| entry.function.to_string())
        .collect();
    assert_eq!(frames, vec!["work", "<thread>"]);

    cx.step().unwrap();
    cx.detach().unwrap();
}

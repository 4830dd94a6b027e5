//! Helpers shared by the unit tests.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use crate::{Interrupt, Report, Runtime, RuntimeConfig, ThreadHandle};

/// Installs an excepthook that collects every report.
pub fn capture_reports(runtime: &Runtime) -> Arc<Mutex<Vec<Report>>> {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&reports);
    runtime.set_excepthook(move |report| sink.lock().unwrap().push(report.clone()));
    reports
}

/// Runtime with a short idle slice so parked threads notice shutdown quickly.
pub fn fast_runtime() -> Runtime {
    Runtime::with_config(RuntimeConfig::default().with_idle_slice(Duration::from_millis(1)))
}

/// Spawns a thread that does nothing but idle until an event terminates it.
pub fn spawn_idle(runtime: &Runtime, name: &str) -> ThreadHandle<()> {
    runtime
        .spawn(name, |cx| -> Result<(), Interrupt> {
            loop {
                cx.idle(None)?;
            }
        })
        .unwrap()
}

#![allow(unused_macros)]

/// Helper macro for locking items
///
/// Observers and scheduled callees are user code running underneath the layer,
/// so a panic while one of our mutexes is held must not wedge the thread. The
/// guard is recovered from a poisoned lock instead of propagating the poison.
///
/// ```rust, ignore
///  let mut queue = lock!(self.events);
///  queue.push_back(event);
/// ```
macro_rules! lock {
    ($lock:expr) => {
        $lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for reading locked items
///
/// ```rust, ignore
///  let hook = read_lock!(self.excepthook);
///  hook(&report);
/// ```
macro_rules! read_lock {
    ($rwlock:expr) => {
        $rwlock
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Helper macro for writing to locked items
///
/// ```rust, ignore
///  *write_lock!(self.excepthook) = Arc::new(hook);
/// ```
macro_rules! write_lock {
    ($rwlock:expr) => {
        $rwlock
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    };
}

/// Raises an error inside a managed thread and returns from the enclosing function.
///
/// Expands to `return Err(cx.raise(error))`, so the exception becomes active at
/// the macro invocation site and its traceback starts there.
///
/// ```rust, ignore
/// cx.call("parse", |cx| {
///     if input.is_empty() {
///         raise!(cx, ParseError::Empty);
///     }
///     Ok(())
/// })
/// ```
#[macro_export]
macro_rules! raise {
    ($cx:expr, $error:expr) => {
        return Err($cx.raise($error))
    };
}

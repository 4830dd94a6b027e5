//! Exceptions and interrupts.
//!
//! Managed code propagates failures as `Result<T, Interrupt>`. An [`Interrupt`] is either a
//! raised [`Exception`] or a termination request carrying an exit code. Exceptions are cheap
//! to clone (`Arc`), so the thread record can keep the in-flight exception while the value
//! itself travels up the call chain through `?`.
//!
//! The traceback of an exception does not live inside the exception. Once the exception
//! becomes active in a runtime it is bound to an [`ExceptionToken`] in that runtime's
//! exception arena; dropping the last clone releases the token and everything recorded
//! against it.

use std::{
    any::Any,
    error::Error as StdError,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, OnceLock, Weak,
    },
};

use thiserror::Error;

use crate::{exception::arena::ExceptionToken, runtime::RuntimeInner};

/// Error carried by exceptions created from a caught panic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("panicked: {0}")]
pub struct PanicError(pub String);

impl PanicError {
    /// Extracts the panic message from a `catch_unwind` payload.
    #[must_use]
    pub fn from_payload(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "<non-string panic payload>".to_string()
        };
        PanicError(message)
    }
}

/// Runs `body`, converting a panic into a raised [`PanicError`] exception when `catch` is
/// set.
pub(crate) fn catch_panics<R>(
    catch: bool,
    body: impl FnOnce() -> Result<R, Interrupt>,
) -> Result<R, Interrupt> {
    if !catch {
        return body();
    }
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(body)) {
        Ok(outcome) => outcome,
        Err(payload) => Err(Interrupt::Raised(Exception::from_panic(payload.as_ref()))),
    }
}

/// Plain-text error used by [`Exception::msg`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct Message(pub String);

/// Where an exception came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExceptionOrigin {
    /// Raised by managed code.
    Raised,
    /// Converted from a panic caught by the layer.
    Panic,
}

struct Binding {
    token: ExceptionToken,
    runtime: Weak<RuntimeInner>,
}

struct ExceptionInner {
    error: Box<dyn StdError + Send + Sync>,
    type_name: &'static str,
    origin: ExceptionOrigin,
    delivered_by_event: AtomicBool,
    binding: OnceLock<Binding>,
}

impl Drop for ExceptionInner {
    fn drop(&mut self) {
        if let Some(binding) = self.binding.get() {
            if let Some(runtime) = binding.runtime.upgrade() {
                runtime.release_exception(binding.token);
            }
        }
    }
}

/// A raised error travelling through a managed thread.
///
/// Clones share identity: [`Exception::same`] compares instances, not error values, so two
/// unrelated exceptions carrying equal errors never share a traceback.
#[derive(Clone)]
pub struct Exception {
    inner: Arc<ExceptionInner>,
}

impl Exception {
    /// Wraps an error into a new exception instance.
    pub fn new<E>(error: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self::build(Box::new(error), std::any::type_name::<E>(), ExceptionOrigin::Raised)
    }

    /// Creates an exception carrying a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Creates an exception from a `catch_unwind` payload.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::build(
            Box::new(PanicError::from_payload(payload)),
            std::any::type_name::<PanicError>(),
            ExceptionOrigin::Panic,
        )
    }

    fn build(
        error: Box<dyn StdError + Send + Sync>,
        type_name: &'static str,
        origin: ExceptionOrigin,
    ) -> Self {
        Exception {
            inner: Arc::new(ExceptionInner {
                error,
                type_name,
                origin,
                delivered_by_event: AtomicBool::new(false),
                binding: OnceLock::new(),
            }),
        }
    }

    /// Returns the wrapped error.
    #[must_use]
    pub fn error(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.inner.error.as_ref()
    }

    /// Attempts to downcast the wrapped error.
    #[must_use]
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.inner.error.downcast_ref::<E>()
    }

    /// Returns the Rust type name of the wrapped error.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.inner.type_name
    }

    /// Returns how the exception was created.
    #[must_use]
    pub fn origin(&self) -> ExceptionOrigin {
        self.inner.origin
    }

    /// Returns `true` if the exception was delivered into its thread by a throw event.
    #[must_use]
    pub fn delivered_by_event(&self) -> bool {
        self.inner.delivered_by_event.load(Ordering::Acquire)
    }

    pub(crate) fn mark_delivered_by_event(&self) {
        self.inner.delivered_by_event.store(true, Ordering::Release);
    }

    /// Returns the arena token, once the exception has become active in a runtime.
    #[must_use]
    pub fn token(&self) -> Option<ExceptionToken> {
        self.inner.binding.get().map(|binding| binding.token)
    }

    /// Binds the exception to `token`.
    ///
    /// Returns `false` if it was already bound, in which case the caller must release
    /// `token` itself.
    pub(crate) fn bind(&self, token: ExceptionToken, runtime: Weak<RuntimeInner>) -> bool {
        self.inner.binding.set(Binding { token, runtime }).is_ok()
    }

    /// Returns `true` if both handles refer to the same exception instance.
    #[must_use]
    pub fn same(&self, other: &Exception) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exception")
            .field("type", &self.inner.type_name)
            .field("error", &self.inner.error)
            .field("origin", &self.inner.origin)
            .field("token", &self.token())
            .finish()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.error)
    }
}

impl<E> From<E> for Exception
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Exception::new(error)
    }
}

/// Non-local control flow inside a managed thread.
///
/// Every checkpoint can hand one of these back to managed code, which must propagate it
/// with `?`. Any `std::error::Error` converts into [`Interrupt::Raised`], so ordinary
/// fallible calls compose with the layer.
#[derive(Clone, Debug)]
pub enum Interrupt {
    /// An exception is propagating.
    Raised(Exception),
    /// The thread was asked to terminate with the given exit code.
    Exit(i32),
}

impl Interrupt {
    /// Returns the exception, if this interrupt is one.
    #[must_use]
    pub fn exception(&self) -> Option<&Exception> {
        match self {
            Interrupt::Raised(exception) => Some(exception),
            Interrupt::Exit(_) => None,
        }
    }

    /// Returns the exit code, if this interrupt is a termination request.
    #[must_use]
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Interrupt::Raised(_) => None,
            Interrupt::Exit(code) => Some(*code),
        }
    }
}

impl fmt::Display for Interrupt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interrupt::Raised(exception) => write!(f, "{}: {}", exception.type_name(), exception),
            Interrupt::Exit(code) => write!(f, "exit({code})"),
        }
    }
}

impl From<Exception> for Interrupt {
    fn from(exception: Exception) -> Self {
        Interrupt::Raised(exception)
    }
}

impl<E> From<E> for Interrupt
where
    E: StdError + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Interrupt::Raised(Exception::new(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Error, Debug)]
    #[error("bad value {0}")]
    struct ValueError(i32);

    #[test]
    fn question_mark_wraps_errors() {
        fn parse() -> Result<i32, Interrupt> {
            let value: i32 = "nope".parse()?;
            Ok(value)
        }

        let interrupt = parse().unwrap_err();
        let exception = interrupt.exception().unwrap();
        assert!(exception
            .downcast_ref::<std::num::ParseIntError>()
            .is_some());
        assert_eq!(exception.origin(), ExceptionOrigin::Raised);
    }

    #[test]
    fn clones_share_identity() {
        let a = Exception::new(ValueError(1));
        let b = a.clone();
        let c = Exception::new(ValueError(1));
        assert!(a.same(&b));
        assert!(!a.same(&c));
        assert_eq!(a.to_string(), "bad value 1");
        assert!(a.type_name().ends_with("ValueError"));
    }

    #[test]
    fn panic_payloads_become_messages() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        let exception = Exception::from_panic(payload.as_ref());
        assert_eq!(exception.origin(), ExceptionOrigin::Panic);
        assert_eq!(exception.downcast_ref::<PanicError>().unwrap().0, "boom");
    }

    #[test]
    fn caught_panics_become_interrupts() {
        let outcome: Result<(), Interrupt> = catch_panics(true, || panic!("observer broke"));
        let interrupt = outcome.unwrap_err();
        let exception = interrupt.exception().unwrap();
        assert_eq!(exception.origin(), ExceptionOrigin::Panic);
        assert_eq!(exception.to_string(), "panicked: observer broke");

        assert_eq!(catch_panics(true, || Ok(5)).unwrap(), 5);
    }

    #[test]
    fn interrupt_accessors() {
        let raised = Interrupt::from(Exception::msg("x"));
        assert!(raised.exception().is_some());
        assert_eq!(raised.exit_code(), None);
        assert_eq!(Interrupt::Exit(3).exit_code(), Some(3));
        assert_eq!(Interrupt::Exit(3).to_string(), "exit(3)");
    }
}

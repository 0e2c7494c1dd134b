//! Error types and error-handling strategy.
//!
//! The kernel distinguishes four failure channels:
//!
//! - **Operation**: an error raised by a task body. It terminates the task as
//!   `errored` and propagates to the parent unless masked by spawn options.
//! - **Halted**: the synthetic error delivered to consumers awaiting a halted
//!   task. Halt is not an error *to the halted body*; `catch_halt` swallows
//!   this kind on the consumer side.
//! - **Teardown**: a sub-frame's destroy itself failed; aggregated into the
//!   owner's error.
//! - **Programmer**: misuse of the kernel API, such as spawning from a task
//!   that is not running or triggering an illegal state transition.
//!
//! Errors are cheap to clone (the source chain is behind an `Arc`) because a
//! child's error may be observed both by its parent's trap and by any number
//! of joiners.

use crate::types::HaltReason;
use core::fmt;
use std::sync::Arc;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An error raised from a task body.
    Operation,
    /// The awaited task was halted.
    Halted,
    /// Teardown of a sub-frame failed.
    Teardown,
    /// Kernel API misuse.
    Programmer,
    /// A `with_timeout` deadline elapsed.
    Timeout,
    /// Spawn admission was denied by the configured task limit.
    Admission,
    /// The schedule went quiescent with live tasks.
    Deadlock,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation => write!(f, "operation error"),
            Self::Halted => write!(f, "halted"),
            Self::Teardown => write!(f, "teardown error"),
            Self::Programmer => write!(f, "programmer error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Admission => write!(f, "admission denied"),
            Self::Deadlock => write!(f, "deadlock"),
        }
    }
}

/// The error type for kernel operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    context: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates an error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the context string, if any.
    #[must_use]
    pub fn context_str(&self) -> Option<&str> {
        self.context.as_deref()
    }

    /// Returns true if this error stands for a halted task.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        matches!(self.kind, ErrorKind::Halted)
    }

    /// Attaches deterministic context text.
    #[must_use]
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        self.context = Some(ctx.into());
        self
    }

    /// Attaches a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates an operation error from a message.
    #[must_use]
    pub fn operation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Operation).with_context(message)
    }

    /// Creates the synthetic error surfaced to awaiters of a halted task.
    #[must_use]
    pub fn halted() -> Self {
        Self::new(ErrorKind::Halted)
    }

    /// Creates a halt error that records why the halt was issued.
    #[must_use]
    pub fn halted_because(reason: HaltReason) -> Self {
        Self::new(ErrorKind::Halted).with_context(reason.to_string())
    }

    /// Creates a programmer error from a message.
    #[must_use]
    pub fn programmer(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Programmer).with_context(message)
    }

    /// Aggregates teardown failures into a single error.
    #[must_use]
    pub fn teardown(errors: &[Self]) -> Self {
        let summary = errors
            .iter()
            .map(Self::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Self::new(ErrorKind::Teardown).with_context(summary)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ctx) = &self.context {
            write!(f, ": {ctx}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for attaching context to results.
pub trait ResultExt<T> {
    /// Attaches a context string on error.
    fn context(self, ctx: impl Into<String>) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, ctx: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_context(ctx))
    }
}

/// A specialized `Result` for kernel operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_context() {
        assert_eq!(Error::new(ErrorKind::Deadlock).to_string(), "deadlock");
    }

    #[test]
    fn display_with_context() {
        let err = Error::operation("boom");
        assert_eq!(err.to_string(), "operation error: boom");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::new(ErrorKind::Operation)
            .with_context("outer")
            .with_source(Underlying);
        assert_eq!(err.source().expect("source").to_string(), "underlying");
    }

    #[test]
    fn halt_error_is_distinguishable() {
        assert!(Error::halted().is_halted());
        assert!(!Error::operation("x").is_halted());
    }

    #[test]
    fn teardown_aggregates_summaries() {
        let agg = Error::teardown(&[Error::operation("a"), Error::operation("b")]);
        assert_eq!(agg.kind(), ErrorKind::Teardown);
        let ctx = agg.context_str().unwrap();
        assert!(ctx.contains('a') && ctx.contains('b'));
    }

    #[test]
    fn result_ext_attaches_context() {
        let res: core::result::Result<(), Error> = Err(Error::new(ErrorKind::Operation));
        let err = res.context("while testing").unwrap_err();
        assert_eq!(err.context_str(), Some("while testing"));
    }
}

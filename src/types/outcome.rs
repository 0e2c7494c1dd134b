//! Terminal outcomes for tasks and frames.
//!
//! [`Outcome`] is the three-valued result a consumer observes for a task:
//! completed with a value, errored, or halted. Halt is deliberately not an
//! `Error` here so callers cannot confuse cooperative cancellation with
//! failure.
//!
//! [`Exit`] is the kernel-internal classification of how an evaluator frame
//! ended: normal completion, body failure, clean abort, or abort with a
//! crash reason.

use crate::error::Error;
use crate::op::OpValue;
use core::fmt;

/// The outcome of a task as observed by `Kernel::run` or a joiner.
#[derive(Debug, Clone)]
pub enum Outcome<T> {
    /// The task completed with a value.
    Completed(T),
    /// The task failed with an error.
    Errored(Error),
    /// The task was halted before settling.
    Halted,
}

impl<T> Outcome<T> {
    /// Returns true if the outcome is `Completed`.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// Returns true if the outcome is `Errored`.
    #[must_use]
    pub const fn is_errored(&self) -> bool {
        matches!(self, Self::Errored(_))
    }

    /// Returns true if the outcome is `Halted`.
    #[must_use]
    pub const fn is_halted(&self) -> bool {
        matches!(self, Self::Halted)
    }

    /// Converts into a `Result`, mapping halt onto the synthetic halt error.
    pub fn into_result(self) -> Result<T, Error> {
        match self {
            Self::Completed(v) => Ok(v),
            Self::Errored(e) => Err(e),
            Self::Halted => Err(Error::halted()),
        }
    }

    /// Maps the completion value.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Completed(v) => Outcome::Completed(f(v)),
            Self::Errored(e) => Outcome::Errored(e),
            Self::Halted => Outcome::Halted,
        }
    }

    /// Returns the completion value or panics.
    ///
    /// # Panics
    ///
    /// Panics if the outcome is not `Completed`.
    #[track_caller]
    pub fn unwrap(self) -> T {
        match self {
            Self::Completed(v) => v,
            Self::Errored(e) => panic!("called `Outcome::unwrap()` on an `Errored` value: {e}"),
            Self::Halted => panic!("called `Outcome::unwrap()` on a `Halted` value"),
        }
    }
}

impl<T> fmt::Display for Outcome<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed(_) => write!(f, "completed"),
            Self::Errored(e) => write!(f, "errored: {e}"),
            Self::Halted => write!(f, "halted"),
        }
    }
}

/// How an evaluator frame ended.
///
/// Produced after the body has returned and every sub-frame has been drained.
pub enum Exit {
    /// Body returned a value and teardown was clean.
    Ok(OpValue),
    /// Body raised, or teardown of a sub-frame failed after a clean body.
    Err(Error),
    /// Destroyed without a crash reason (halt path).
    Aborted,
    /// Destroyed with a reason, or teardown failed on the abort path.
    Crashed(Error),
}

impl Exit {
    /// Returns true for the two teardown exits.
    #[must_use]
    pub const fn is_teardown(&self) -> bool {
        matches!(self, Self::Aborted | Self::Crashed(_))
    }
}

impl fmt::Debug for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok(_) => write!(f, "Exit::Ok"),
            Self::Err(e) => write!(f, "Exit::Err({e})"),
            Self::Aborted => write!(f, "Exit::Aborted"),
            Self::Crashed(e) => write!(f, "Exit::Crashed({e})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn predicates() {
        let done: Outcome<i32> = Outcome::Completed(3);
        assert!(done.is_completed() && !done.is_errored() && !done.is_halted());
        let halted: Outcome<i32> = Outcome::Halted;
        assert!(halted.is_halted());
    }

    #[test]
    fn halt_converts_to_halt_error() {
        let halted: Outcome<i32> = Outcome::Halted;
        let err = halted.into_result().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Halted);
    }

    #[test]
    fn map_preserves_shape() {
        let done: Outcome<i32> = Outcome::Completed(21);
        assert_eq!(done.map(|v| v * 2).unwrap(), 42);
        assert!(Outcome::<i32>::Halted.map(|v| v * 2).is_halted());
    }

    #[test]
    #[should_panic(expected = "on a `Halted` value")]
    fn unwrap_panics_on_halted() {
        let halted: Outcome<i32> = Outcome::Halted;
        let _ = halted.unwrap();
    }
}

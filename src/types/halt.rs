//! Halt reason types.
//!
//! Halting is cooperative cancellation, distinct from failure: the halted
//! body observes an abort and unwinds through its cleanup, and no error is
//! recorded on the task itself. The reason says *why* the halt was issued and
//! travels into logs and into the synthetic error shown to awaiters.

use core::fmt;

/// The kind of halt request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HaltKind {
    /// Explicit halt requested through a task handle or combinator.
    Explicit,
    /// Halted by the parent's cascade (parent resolved, failed, or halted).
    Cascade,
    /// Halted by the kernel after the schedule went quiescent with the root
    /// still live.
    Deadlock,
}

impl fmt::Display for HaltKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Explicit => write!(f, "explicit"),
            Self::Cascade => write!(f, "cascade"),
            Self::Deadlock => write!(f, "deadlock"),
        }
    }
}

/// Why a task was halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HaltReason {
    /// The kind of halt.
    pub kind: HaltKind,
    /// Optional static message for diagnostics.
    pub message: Option<&'static str>,
}

impl HaltReason {
    /// Creates a reason with the given kind and no message.
    #[must_use]
    pub const fn new(kind: HaltKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }

    /// An explicit halt, with a message.
    #[must_use]
    pub const fn explicit(message: &'static str) -> Self {
        Self {
            kind: HaltKind::Explicit,
            message: Some(message),
        }
    }

    /// A parent-cascade halt.
    #[must_use]
    pub const fn cascade() -> Self {
        Self::new(HaltKind::Cascade)
    }

    /// A deadlock-recovery halt.
    #[must_use]
    pub const fn deadlock() -> Self {
        Self::new(HaltKind::Deadlock)
    }
}

impl Default for HaltReason {
    fn default() -> Self {
        Self::new(HaltKind::Explicit)
    }
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_message() {
        let reason = HaltReason::explicit("shutdown requested");
        assert_eq!(reason.to_string(), "explicit: shutdown requested");
        assert_eq!(HaltReason::cascade().to_string(), "cascade");
    }
}

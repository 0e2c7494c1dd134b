//! Kernel configuration.
//!
//! Construct a kernel through [`Kernel::builder`](super::Kernel::builder)
//! rather than filling a [`KernelConfig`] by hand.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `max_tasks` | `None` (unbounded) |
//! | `deadlock` | [`DeadlockPolicy::HaltRoot`] |

use crate::runtime::Kernel;

/// What the kernel does when the run queue and timer heap are both empty
/// while the root task is still live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeadlockPolicy {
    /// Force-halt the root so every ensure hook and cleanup path still runs,
    /// then report the root as halted.
    #[default]
    HaltRoot,
    /// Fail the run with a `Deadlock` error, leaving the tree unwound only
    /// as far as it got.
    Fail,
}

/// Configuration for a kernel instance.
#[derive(Debug, Clone, Default)]
pub struct KernelConfig {
    /// Admission limit on live tasks. Spawns beyond it are rejected with an
    /// admission error on the spawning body.
    pub max_tasks: Option<usize>,
    /// Quiescence handling.
    pub deadlock: DeadlockPolicy,
}

/// Builder for [`Kernel`].
#[derive(Debug, Default)]
pub struct KernelBuilder {
    config: KernelConfig,
}

impl KernelBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of live tasks.
    #[must_use]
    pub const fn max_tasks(mut self, limit: usize) -> Self {
        self.config.max_tasks = Some(limit);
        self
    }

    /// Sets the quiescence policy.
    #[must_use]
    pub const fn deadlock(mut self, policy: DeadlockPolicy) -> Self {
        self.config.deadlock = policy;
        self
    }

    /// Builds the kernel.
    #[must_use]
    pub fn build(self) -> Kernel {
        Kernel::with_config(self.config)
    }
}

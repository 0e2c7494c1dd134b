//! Spawn options.

use crate::types::TaskId;

/// Options controlling how a child task relates to its parent.
///
/// The defaults give fully structured behavior: the child blocks its parent's
/// normal completion, and its errors propagate upward.
#[derive(Debug, Clone, Copy)]
pub struct SpawnOptions {
    /// When true (the default), the parent's *normal* completion waits for
    /// this child instead of halting it. Forced cascades (error, explicit
    /// halt) ignore this flag.
    pub block_parent: bool,
    /// When true, this child's error does not reject the parent.
    pub ignore_error: bool,
    /// When true on the *parent*, no child error rejects it.
    pub ignore_child_errors: bool,
    /// Task whose lifetime bounds resources acquired by this child.
    /// Defaults to the child itself.
    pub resource_scope: Option<TaskId>,
}

impl SpawnOptions {
    /// Returns the default options.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            block_parent: true,
            ignore_error: false,
            ignore_child_errors: false,
            resource_scope: None,
        }
    }

    /// Sets whether the child blocks the parent's normal completion.
    #[must_use]
    pub const fn block_parent(mut self, value: bool) -> Self {
        self.block_parent = value;
        self
    }

    /// Keeps this child's error from rejecting the parent.
    #[must_use]
    pub const fn ignore_error(mut self, value: bool) -> Self {
        self.ignore_error = value;
        self
    }

    /// Keeps any child error from rejecting this task.
    #[must_use]
    pub const fn ignore_child_errors(mut self, value: bool) -> Self {
        self.ignore_child_errors = value;
        self
    }

    /// Ties resources acquired by the child to `scope`'s lifetime instead
    /// of the child's own.
    #[must_use]
    pub fn scoped_to<T>(mut self, scope: &crate::runtime::TaskHandle<T>) -> Self
    where
        T: 'static,
    {
        self.resource_scope = Some(scope.task_ref());
        self
    }
}

impl Default for SpawnOptions {
    fn default() -> Self {
        Self::new()
    }
}

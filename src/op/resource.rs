//! Resources: values whose cleanup is bound to an outer scope.
//!
//! A resource is an `init` operation that produces the user-visible value
//! after tying its cleanup — and any ongoing work — to a *scope*: a task
//! whose lifetime bounds the resource. `init` runs in a dedicated frame
//! rooted at the caller's resource scope (the caller's own task unless the
//! caller was spawned with an explicit `resource_scope`), so a short-lived
//! operation can acquire something that survives until a longer-lived owner
//! exits.
//!
//! Contract:
//!
//! - `init` errors become the caller's error.
//! - The returned value must be usable after `init` returns; ongoing work is
//!   spawned into the scope with [`Scope::spawn`].
//! - Cleanup registered with [`Scope::ensure`] runs on every exit path of
//!   the scope, before the scope's trappers.

use crate::op::body::{InstrBody, ThenBody};
use crate::op::instruction::{InitFn, Instruction};
use crate::op::Op;
use crate::types::{SpawnOptions, TaskId};
use core::fmt;

/// A task acting as the lifetime bound for resources and ensure hooks.
#[derive(Clone, Copy)]
pub struct Scope {
    pub(crate) task: TaskId,
    pub(crate) id: u64,
}

impl Scope {
    /// Returns the scope task's id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Spawns `op` as a linked child of the scope task with default options.
    ///
    /// Fails with a programmer error if the scope task is not running.
    pub fn spawn<T: 'static>(&self, op: Op<T>) -> Op<crate::runtime::handle::TaskHandle<T>> {
        self.spawn_with(op, SpawnOptions::default())
    }

    /// Spawns `op` as a linked child of the scope task.
    pub fn spawn_with<T: 'static>(
        &self,
        op: Op<T>,
        options: SpawnOptions,
    ) -> Op<crate::runtime::handle::TaskHandle<T>> {
        Op::from_body(ThenBody::new(
            Box::new(InstrBody::new(Instruction::spawn_raw(
                Some(self.task),
                op.raw,
                options,
            ))),
            Box::new(crate::runtime::handle::TaskHandle::<T>::chain_from_raw),
        ))
    }

    /// Registers `hook` to run once when the scope task reaches its terminal
    /// state, before any trappers.
    pub fn ensure(&self, hook: impl FnOnce() + 'static) -> Op<()> {
        Op::from_body(InstrBody::new(Instruction::ensure_on(
            Some(self.task),
            hook,
        )))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Scope(T{})", self.id)
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.id)
    }
}

/// An initializable value whose cleanup is tied to a scope.
pub struct Resource<T> {
    init: Box<dyn FnOnce(Scope) -> Op<T>>,
}

impl<T: 'static> Resource<T> {
    /// Creates a resource from its `init` operation.
    pub fn new(init: impl FnOnce(Scope) -> Op<T> + 'static) -> Self {
        Self {
            init: Box::new(init),
        }
    }

    pub(crate) fn into_init(self) -> InitFn {
        let init = self.init;
        Box::new(move |scope| init(scope).raw)
    }
}

impl<T> fmt::Debug for Resource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resource").finish_non_exhaustive()
    }
}

impl<T: 'static> From<Resource<T>> for Op<T> {
    fn from(resource: Resource<T>) -> Self {
        crate::op::use_resource(resource)
    }
}

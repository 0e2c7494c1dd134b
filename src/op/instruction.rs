//! The closed instruction set dispatched by the kernel.
//!
//! An instruction is the atomic request a body yields to the evaluator. The
//! set is closed in the kernel — user-facing sugar (`spawn`, `sleep`,
//! `use_resource`, awaiting a task) is built from these variants rather than
//! extending them. Variant payloads are opaque records so kernel handles
//! never leak through the public enum.

use crate::deferred::DeferredCell;
use crate::error::Error;
use crate::op::resource::Scope;
use crate::op::{OpValue, RawOp};
use crate::runtime::kernel::FrameView;
use crate::runtime::queue::Waker;
use crate::types::{SpawnOptions, TaskId};
use core::fmt;
use std::time::Duration;

pub(crate) type EnsureFn = Box<dyn FnOnce()>;
pub(crate) type CancelFn = Box<dyn FnOnce()>;
pub(crate) type InstallFn = Box<dyn FnOnce(Waker) -> Option<CancelFn>>;
pub(crate) type ActionFn = Box<dyn FnOnce(&mut FrameView<'_>) -> Result<OpValue, Error>>;
pub(crate) type InitFn = Box<dyn FnOnce(Scope) -> RawOp>;

/// An atomic request interpreted by the evaluator.
pub enum Instruction {
    /// Create, start, and link a child task; settles with its handle.
    Spawn(SpawnInstr),
    /// Register a terminal-state hook on a task; settles immediately.
    Ensure(EnsureInstr),
    /// Park until an external event wakes the frame.
    Suspend(SuspendInstr),
    /// Run a synchronous action against the frame; settles with its result.
    Action(ActionInstr),
    /// Run a sub-operation inline in a child frame.
    Call(CallInstr),
    /// Run a resource's init in a frame rooted at the resource scope.
    Resource(ResourceInstr),
    /// Settle immediately with the given result.
    Settle(SettleInstr),
    /// Park until a deferred settles.
    AwaitDeferred(AwaitInstr),
    /// Halt a task and park until it terminates.
    HaltTask(HaltInstr),
    /// Park until the virtual clock reaches now + duration.
    Sleep(SleepInstr),
}

/// Payload for [`Instruction::Spawn`].
pub struct SpawnInstr {
    pub(crate) parent: Option<TaskId>,
    pub(crate) op: RawOp,
    pub(crate) options: SpawnOptions,
}

/// Payload for [`Instruction::Ensure`].
pub struct EnsureInstr {
    pub(crate) task: Option<TaskId>,
    pub(crate) hook: EnsureFn,
}

/// Payload for [`Instruction::Suspend`].
pub struct SuspendInstr {
    pub(crate) install: InstallFn,
}

/// Payload for [`Instruction::Action`].
pub struct ActionInstr {
    pub(crate) run: ActionFn,
}

/// Payload for [`Instruction::Call`].
pub struct CallInstr {
    pub(crate) op: RawOp,
}

/// Payload for [`Instruction::Resource`].
pub struct ResourceInstr {
    pub(crate) init: InitFn,
}

/// Payload for [`Instruction::Settle`].
pub struct SettleInstr {
    pub(crate) result: Result<OpValue, Error>,
}

/// Payload for [`Instruction::AwaitDeferred`].
pub struct AwaitInstr {
    pub(crate) cell: DeferredCell,
    pub(crate) cancel: Option<CancelFn>,
}

/// Payload for [`Instruction::HaltTask`].
pub struct HaltInstr {
    pub(crate) task: TaskId,
    pub(crate) outcome: DeferredCell,
}

/// Payload for [`Instruction::Sleep`].
pub struct SleepInstr {
    pub(crate) duration: Duration,
}

impl Instruction {
    /// Spawns `op` as a linked child of the current task.
    #[must_use]
    pub(crate) fn spawn_raw(parent: Option<TaskId>, op: RawOp, options: SpawnOptions) -> Self {
        Self::Spawn(SpawnInstr {
            parent,
            op,
            options,
        })
    }

    /// Registers `hook` to run when the target task reaches terminal state.
    /// `None` targets the current task.
    #[must_use]
    pub(crate) fn ensure_on(task: Option<TaskId>, hook: impl FnOnce() + 'static) -> Self {
        Self::Ensure(EnsureInstr {
            task,
            hook: Box::new(hook),
        })
    }

    /// Parks the frame; `install` receives the waker that resumes it and may
    /// return a best-effort cancel hook, invoked if the wait is interrupted.
    #[must_use]
    pub fn suspend(
        install: impl FnOnce(Waker) -> Option<Box<dyn FnOnce()>> + 'static,
    ) -> Self {
        Self::Suspend(SuspendInstr {
            install: Box::new(install),
        })
    }

    /// Runs a synchronous action against the frame.
    #[must_use]
    pub fn action(
        run: impl FnOnce(&mut FrameView<'_>) -> Result<OpValue, Error> + 'static,
    ) -> Self {
        Self::Action(ActionInstr { run: Box::new(run) })
    }

    /// Settles immediately with `result`.
    #[must_use]
    pub fn settle(result: Result<OpValue, Error>) -> Self {
        Self::Settle(SettleInstr { result })
    }

    #[must_use]
    pub(crate) fn call_raw(op: RawOp) -> Self {
        Self::Call(CallInstr { op })
    }

    #[must_use]
    pub(crate) fn resource_raw(init: InitFn) -> Self {
        Self::Resource(ResourceInstr { init })
    }

    #[must_use]
    pub(crate) fn await_deferred(cell: DeferredCell, cancel: Option<CancelFn>) -> Self {
        Self::AwaitDeferred(AwaitInstr { cell, cancel })
    }

    #[must_use]
    pub(crate) fn halt_task(task: TaskId, outcome: DeferredCell) -> Self {
        Self::HaltTask(HaltInstr { task, outcome })
    }

    #[must_use]
    pub(crate) fn sleep(duration: Duration) -> Self {
        Self::Sleep(SleepInstr { duration })
    }
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Spawn(_) => "Spawn",
            Self::Ensure(_) => "Ensure",
            Self::Suspend(_) => "Suspend",
            Self::Action(_) => "Action",
            Self::Call(_) => "Call",
            Self::Resource(_) => "Resource",
            Self::Settle(_) => "Settle",
            Self::AwaitDeferred(_) => "AwaitDeferred",
            Self::HaltTask(_) => "HaltTask",
            Self::Sleep(_) => "Sleep",
        };
        f.debug_tuple(name).finish()
    }
}

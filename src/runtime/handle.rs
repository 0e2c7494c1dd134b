//! Task handles.
//!
//! A [`TaskHandle`] is returned by `spawn` and names a task without owning
//! it: dropping the handle does not affect the task, and the handle stays
//! valid after the task's record is destroyed (its outcome cell outlives the
//! record). Everything a handle does — joining, halting — is itself an
//! operation yielded back to the kernel.

use crate::deferred::DeferredCell;
use crate::error::Error;
use crate::op::body::{InstrBody, MapDoneBody};
use crate::op::instruction::Instruction;
use crate::op::{downcast_value, Op, OpValue, RawOp};
use crate::record::TaskState;
use crate::types::TaskId;
use core::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

/// Untyped handle payload carried through the evaluator by spawn
/// instructions.
#[derive(Clone)]
pub(crate) struct RawHandle {
    pub task: TaskId,
    pub id: u64,
    pub outcome: DeferredCell,
}

impl fmt::Debug for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawHandle(T{})", self.id)
    }
}

/// A non-owning reference to a spawned task settling with `T`.
pub struct TaskHandle<T> {
    raw: RawHandle,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            raw: self.raw.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T: 'static> TaskHandle<T> {
    pub(crate) fn from_raw(raw: RawHandle) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Continuation used by spawn ops to type a settled raw handle.
    pub(crate) fn chain_from_raw(value: OpValue) -> Result<RawOp, Error> {
        let raw = downcast_value::<RawHandle>(value)?;
        Ok(RawOp::Value(Rc::new(Self::from_raw(raw))))
    }

    /// The task's public monotonic id.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.raw.id
    }

    pub(crate) const fn task_ref(&self) -> TaskId {
        self.raw.task
    }

    /// Awaits the task's outcome: yields its result, throws its error, or
    /// throws the synthetic halt error if the task was halted.
    pub fn join(&self) -> Op<T> {
        Op::from_body(InstrBody::new(Instruction::await_deferred(
            self.raw.outcome.clone(),
            None,
        )))
    }

    /// Like [`join`](Self::join), but a halted task settles as `None`
    /// instead of throwing.
    pub fn catch_halt(&self) -> Op<Option<T>>
    where
        T: Clone,
    {
        let join = InstrBody::new(Instruction::await_deferred(self.raw.outcome.clone(), None));
        Op::from_body(MapDoneBody::new(
            Box::new(join),
            Box::new(|result| match result {
                Ok(v) => Ok(Rc::new(Some(downcast_value::<T>(v)?)) as OpValue),
                Err(e) if e.is_halted() => Ok(Rc::new(None::<T>) as OpValue),
                Err(e) => Err(e),
            }),
        ))
    }

    /// Requests a halt and awaits termination. Settles once the task is
    /// terminal, whatever the terminal state turned out to be; idempotent.
    pub fn halt(&self) -> Op<()> {
        Op::from_body(InstrBody::new(Instruction::halt_task(
            self.raw.task,
            self.raw.outcome.clone(),
        )))
    }

    /// Reads the task's current state, or `None` once the record is gone.
    ///
    /// Terminal outcomes are better observed through [`join`](Self::join) or
    /// the event bus; this is an inspection hook.
    pub fn state(&self) -> Op<Option<TaskState>> {
        let task = self.raw.task;
        Op::from_body(InstrBody::new(Instruction::action(move |view| {
            Ok(Rc::new(view.state_of(task)) as OpValue)
        })))
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle(T{})", self.raw.id)
    }
}

impl<T> fmt::Display for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "T{}", self.raw.id)
    }
}

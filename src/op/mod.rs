//! Operations: the author-facing surface of the kernel.
//!
//! An [`Op<T>`] is a description of work that settles with a `T` once a task
//! runs it. Ops are inert values — nothing happens until one is handed to
//! [`Kernel::run`](crate::runtime::Kernel::run), spawned, or yielded from
//! another op's body.
//!
//! Values flow through the evaluator type-erased as [`OpValue`]. A settled
//! value may be observed by several consumers (every joiner of a task sees
//! the same outcome), so extraction surfaces require `T: Clone`; share
//! non-clonable values behind `Rc`.

pub mod body;
pub mod call;
pub mod instruction;
pub mod resource;

use crate::deferred::{Deferred, DeferredCell};
use crate::error::Error;
use crate::op::body::{
    Body, FinallyBody, ImmediateBody, InstrBody, LazyBody, Signal, Step, ThenBody,
};
use crate::op::instruction::{CancelFn, Instruction};
use crate::runtime::handle::TaskHandle;
use crate::runtime::kernel::FrameView;
use crate::runtime::queue::Waker;
use crate::types::SpawnOptions;
use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;
use std::time::Duration;

pub use call::{call, IntoOp};
pub use resource::{Resource, Scope};

/// A type-erased value flowing through the evaluator.
pub type OpValue = Rc<dyn Any>;

/// The unit value delivered by instructions that settle with nothing.
#[must_use]
pub fn nil() -> OpValue {
    Rc::new(())
}

/// Extracts a typed value from an [`OpValue`].
pub(crate) fn downcast_value<T: Clone + 'static>(value: OpValue) -> Result<T, Error> {
    value
        .downcast::<T>()
        .map(|rc| (*rc).clone())
        .map_err(|_| Error::programmer("operation value has an unexpected type"))
}

/// The untyped payload of an op, classified by the controller at task start.
pub(crate) enum RawOp {
    /// A plain value; resolves immediately.
    Value(OpValue),
    /// A foreign settled-later value with an optional cancel hook.
    Deferred {
        cell: DeferredCell,
        cancel: Option<Rc<dyn Fn()>>,
    },
    /// A step body driven by an evaluator frame.
    Body(Box<dyn Body>),
}

impl RawOp {
    /// Converts any payload into a steppable body.
    pub(crate) fn into_body(self) -> Box<dyn Body> {
        match self {
            Self::Value(v) => Box::new(ImmediateBody::new(Ok(v))),
            Self::Deferred { cell, cancel } => {
                let cancel: Option<CancelFn> =
                    cancel.map(|hook| Box::new(move || hook()) as CancelFn);
                Box::new(InstrBody::new(Instruction::await_deferred(cell, cancel)))
            }
            Self::Body(body) => body,
        }
    }
}

impl std::fmt::Debug for RawOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(_) => write!(f, "RawOp::Value"),
            Self::Deferred { .. } => write!(f, "RawOp::Deferred"),
            Self::Body(_) => write!(f, "RawOp::Body"),
        }
    }
}

/// A suspendable operation that settles with a `T`.
#[must_use = "ops are inert until run or spawned"]
pub struct Op<T> {
    pub(crate) raw: RawOp,
    _out: PhantomData<fn() -> T>,
}

impl<T> std::fmt::Debug for Op<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Op").field(&self.raw).finish()
    }
}

impl<T: 'static> Op<T> {
    pub(crate) fn from_raw(raw: RawOp) -> Self {
        Self {
            raw,
            _out: PhantomData,
        }
    }

    pub(crate) fn from_body(body: impl Body) -> Self {
        Self::from_raw(RawOp::Body(Box::new(body)))
    }

    /// An op that resolves immediately with `value`.
    pub fn value(value: T) -> Self {
        Self::from_raw(RawOp::Value(Rc::new(value)))
    }

    /// An op that rejects immediately with `error`.
    pub fn fail(error: Error) -> Self {
        Self::from_body(ImmediateBody::new(Err(error)))
    }

    /// An op driven by a hand-written body state machine.
    ///
    /// The closure receives the evaluator [`Signal`]s and returns [`Step`]s;
    /// see the body-protocol rules in [`body`].
    pub fn from_fn(f: impl FnMut(Signal) -> Step + 'static) -> Self {
        Self::from_body(f)
    }

    /// Chains `f` over this op's value.
    pub fn then<U: 'static>(self, f: impl FnOnce(T) -> Op<U> + 'static) -> Op<U>
    where
        T: Clone,
    {
        Op::from_body(ThenBody::new(
            self.raw.into_body(),
            Box::new(move |v| Ok(f(downcast_value::<T>(v)?).raw)),
        ))
    }

    /// Maps this op's value through `f`.
    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Op<U>
    where
        T: Clone,
    {
        Op::from_body(ThenBody::new(
            self.raw.into_body(),
            Box::new(move |v| Ok(RawOp::Value(Rc::new(f(downcast_value::<T>(v)?))))),
        ))
    }

    /// Runs `cleanup` after this op settles, on every exit path including
    /// halt. The op's own result is reinstated after a clean cleanup.
    pub fn and_finally(self, cleanup: Op<()>) -> Self {
        Self::from_body(FinallyBody::new(
            self.raw.into_body(),
            Box::new(move || cleanup.raw),
        ))
    }
}

impl<T: 'static> From<Deferred<T>> for Op<T> {
    fn from(deferred: Deferred<T>) -> Self {
        Self::from_raw(RawOp::Deferred {
            cell: deferred.cell,
            cancel: deferred.cancel,
        })
    }
}

/// An op that resolves immediately with `value`.
pub fn value<T: 'static>(value: T) -> Op<T> {
    Op::value(value)
}

/// An op that rejects immediately with `error`.
pub fn fail<T: 'static>(error: Error) -> Op<T> {
    Op::fail(error)
}

/// An op that runs a synchronous action against the current frame.
pub fn action<T: 'static>(
    f: impl FnOnce(&mut FrameView<'_>) -> Result<T, Error> + 'static,
) -> Op<T> {
    Op::from_body(InstrBody::new(Instruction::action(move |view| {
        f(view).map(|v| Rc::new(v) as OpValue)
    })))
}

/// An op that parks until an external event settles its [`Waker`].
///
/// `install` runs at suspension time; the cancel hook it returns (if any) is
/// invoked when the wait is interrupted by halt.
pub fn suspend<T: 'static>(
    install: impl FnOnce(Waker) -> Option<Box<dyn FnOnce()>> + 'static,
) -> Op<T> {
    Op::from_body(InstrBody::new(Instruction::suspend(install)))
}

/// An op that never settles. It still aborts promptly when halted.
pub fn never<T: 'static>() -> Op<T> {
    suspend(|_waker| None)
}

/// An op that parks until the virtual clock advances by `duration`.
pub fn sleep(duration: Duration) -> Op<()> {
    Op::from_body(InstrBody::new(Instruction::sleep(duration)))
}

/// Spawns `op` as a linked child of the current task with default options.
///
/// Settles with the child's handle once the child is created and started.
/// Fails with a programmer error if the current task is not running.
pub fn spawn<T: 'static>(op: Op<T>) -> Op<TaskHandle<T>> {
    spawn_with(op, SpawnOptions::default())
}

/// Spawns `op` as a linked child of the current task.
pub fn spawn_with<T: 'static>(op: Op<T>, options: SpawnOptions) -> Op<TaskHandle<T>> {
    Op::from_body(ThenBody::new(
        Box::new(InstrBody::new(Instruction::spawn_raw(
            None, op.raw, options,
        ))),
        Box::new(TaskHandle::<T>::chain_from_raw),
    ))
}

/// Registers `hook` to run once when the current task reaches its terminal
/// state, before any trappers.
pub fn ensure(hook: impl FnOnce() + 'static) -> Op<()> {
    Op::from_body(InstrBody::new(Instruction::ensure_on(None, hook)))
}

/// Runs a resource's `init` in a frame rooted at the current resource scope
/// and settles with the initialized value.
pub fn use_resource<T: 'static>(resource: Resource<T>) -> Op<T> {
    Op::from_body(InstrBody::new(Instruction::resource_raw(
        resource.into_init(),
    )))
}

/// An op built from a closure, evaluated lazily when the op runs.
pub fn lazy<T: 'static>(f: impl FnOnce() -> Op<T> + 'static) -> Op<T> {
    Op::from_body(LazyBody::new(Box::new(move || f().raw)))
}

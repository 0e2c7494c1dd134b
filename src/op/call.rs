//! Uniform adaptation of foreign values into operations.
//!
//! `call` is the single integration point for running "something async-ish"
//! inside an operation: an op, a deferred, or a thunk producing either. The
//! adapted operation runs in a child frame of the caller, so its teardown is
//! bounded by the caller's frame.

use crate::deferred::Deferred;
use crate::op::body::InstrBody;
use crate::op::instruction::Instruction;
use crate::op::{Op, RawOp};

/// Conversion into an operation, used by [`call`].
pub trait IntoOp<T> {
    /// Converts `self` into an op settling with `T`.
    fn into_op(self) -> Op<T>;
}

impl<T: 'static> IntoOp<T> for Op<T> {
    fn into_op(self) -> Op<T> {
        self
    }
}

impl<T: 'static> IntoOp<T> for Deferred<T> {
    fn into_op(self) -> Op<T> {
        self.into()
    }
}

impl<T: 'static, F> IntoOp<T> for F
where
    F: FnOnce() -> Op<T> + 'static,
{
    fn into_op(self) -> Op<T> {
        crate::op::lazy(self)
    }
}

/// Adapts `x` into an op and runs it in a child frame of the caller.
///
/// - `call(op)` runs the op; its value resolves, its error throws.
/// - `call(deferred)` suspends until the deferred settles.
/// - `call(|| op)` builds the op lazily inside the child frame.
pub fn call<T: 'static>(x: impl IntoOp<T>) -> Op<T> {
    let inner: RawOp = x.into_op().raw;
    Op::from_body(InstrBody::new(Instruction::call_raw(inner)))
}

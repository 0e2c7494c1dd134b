//! Join-all: every operation must succeed.
//!
//! All operations are spawned into a dedicated task; each records its value
//! into an indexed slot and the last one to finish resolves a shared cell.
//! Results come back in input order regardless of completion order. Any
//! error propagates through the parent trap, which force-halts the
//! remaining operations in reverse spawn order and rethrows at the call
//! site.

use crate::deferred::{DeferredCell, DeferredState};
use crate::error::Error;
use crate::op::body::{Body, MapDoneBody, Signal, Step, ThenBody};
use crate::op::instruction::Instruction;
use crate::op::{downcast_value, nil, spawn_with, Op, OpValue, RawOp};
use crate::types::SpawnOptions;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

type Slots = Rc<RefCell<Vec<Option<OpValue>>>>;

/// Wires one operation to record its value into `slots[index]` and resolve
/// `cell` when it is the last one standing.
fn member(op: RawOp, index: usize, slots: Slots, remaining: Rc<Cell<usize>>, cell: DeferredCell) -> RawOp {
    RawOp::Body(Box::new(ThenBody::new(
        op.into_body(),
        Box::new(move |value| {
            slots.borrow_mut()[index] = Some(value);
            let left = remaining.get() - 1;
            remaining.set(left);
            if left == 0 {
                let _ = DeferredState::settle(&cell, Ok(nil()));
            }
            Ok(RawOp::Value(nil()))
        }),
    )))
}

/// The join task's body: spawn every member, then await the last one.
struct AllBody {
    /// Members in reverse order; popping restores input order.
    pending: Vec<(usize, RawOp)>,
    slots: Slots,
    remaining: Rc<Cell<usize>>,
    cell: DeferredCell,
    awaiting: bool,
}

impl Body for AllBody {
    fn resume(&mut self, signal: Signal) -> Step {
        match signal {
            Signal::Abort => return Step::done_nil(),
            Signal::Throw(e) => return Step::Done(Err(e)),
            Signal::Resume(_) => {}
        }
        if self.awaiting {
            return Step::done_nil();
        }
        match self.pending.pop() {
            Some((index, op)) => Step::Yield(Instruction::spawn_raw(
                None,
                member(
                    op,
                    index,
                    self.slots.clone(),
                    self.remaining.clone(),
                    self.cell.clone(),
                ),
                SpawnOptions::new(),
            )),
            None => {
                self.awaiting = true;
                Step::Yield(Instruction::await_deferred(self.cell.clone(), None))
            }
        }
    }
}

/// Runs `ops` concurrently. Resolves with every value in input order once
/// all succeed; on the first error, halts the rest and rethrows it.
pub fn all<T: Clone + 'static>(ops: Vec<Op<T>>) -> Op<Vec<T>> {
    if ops.is_empty() {
        return Op::value(Vec::new());
    }
    let n = ops.len();
    let slots: Slots = Rc::new(RefCell::new(vec![None; n]));
    let remaining = Rc::new(Cell::new(n));
    let cell = DeferredState::new_cell();
    let body = AllBody {
        pending: ops
            .into_iter()
            .map(|op| op.raw)
            .enumerate()
            .rev()
            .collect(),
        slots: slots.clone(),
        remaining,
        cell,
        awaiting: false,
    };
    let gatherer = MapDoneBody::new(
        Box::new(body),
        Box::new(move |result| {
            result.and_then(|_| {
                let taken = std::mem::take(&mut *slots.borrow_mut());
                let mut values = Vec::with_capacity(taken.len());
                for slot in taken {
                    let value =
                        slot.ok_or_else(|| Error::programmer("join finished with a missing slot"))?;
                    values.push(downcast_value::<T>(value)?);
                }
                Ok(Rc::new(values) as OpValue)
            })
        }),
    );
    spawn_with(
        Op::<Vec<T>>::from_body(gatherer),
        SpawnOptions::new().ignore_error(true),
    )
    .then(|handle| handle.join())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Kernel;
    use crate::types::Outcome;
    use std::time::Duration;

    #[test]
    fn resolves_in_input_order() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(all(vec![
            crate::op::sleep(Duration::from_millis(5)).map(|()| 1_i32),
            Op::value(2_i32),
            crate::op::sleep(Duration::from_millis(1)).map(|()| 3_i32),
        ]));
        assert_eq!(outcome.unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn empty_input_resolves_immediately() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(all::<i32>(vec![]));
        assert_eq!(outcome.unwrap(), Vec::<i32>::new());
    }

    #[test]
    fn first_error_halts_the_rest() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(all(vec![
            crate::op::never::<i32>(),
            Op::fail(Error::operation("spoiled")),
        ]));
        match outcome {
            Outcome::Errored(e) => assert_eq!(e.context_str(), Some("spoiled")),
            other => panic!("expected error, got {other}"),
        }
        assert_eq!(kernel.live_tasks(), 0);
    }
}

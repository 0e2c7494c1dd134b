//! Race: first settle wins, losers are halted.
//!
//! The race runs inside a task of its own. Every contestant is spawned with
//! `block_parent = false` and wired to resolve a shared one-shot cell with
//! its value; the racer awaits the cell. The first resolution wins, and the
//! racer's normal completion then cascades a halt over the remaining
//! contestants in reverse spawn order — losers are torn down, not abandoned.
//!
//! A contestant *error* needs no wiring at all: it propagates to the racer
//! through the ordinary parent trap, which forces the cascade and rethrows
//! at the call site.

use crate::deferred::{DeferredCell, DeferredState};
use crate::op::body::{Body, Signal, Step, ThenBody};
use crate::op::instruction::Instruction;
use crate::op::{nil, spawn_with, Op, RawOp};
use crate::types::SpawnOptions;

/// Wires a contestant to resolve `cell` with its value when it completes.
pub(crate) fn contestant(op: RawOp, cell: DeferredCell) -> RawOp {
    RawOp::Body(Box::new(ThenBody::new(
        op.into_body(),
        Box::new(move |value| {
            let _ = DeferredState::settle(&cell, Ok(value));
            Ok(RawOp::Value(nil()))
        }),
    )))
}

/// The racer task's body: spawn every contestant, then await the cell.
struct RaceBody {
    /// Contestants in reverse order; popping restores input order.
    pending: Vec<RawOp>,
    cell: DeferredCell,
    awaiting: bool,
}

impl RaceBody {
    fn new(ops: Vec<RawOp>) -> Self {
        Self {
            pending: ops.into_iter().rev().collect(),
            cell: DeferredState::new_cell(),
            awaiting: false,
        }
    }
}

impl Body for RaceBody {
    fn resume(&mut self, signal: Signal) -> Step {
        let value = match signal {
            Signal::Abort => return Step::done_nil(),
            Signal::Throw(e) => return Step::Done(Err(e)),
            Signal::Resume(v) => v,
        };
        if self.awaiting {
            return Step::Done(Ok(value));
        }
        match self.pending.pop() {
            Some(op) => Step::Yield(Instruction::spawn_raw(
                None,
                contestant(op, self.cell.clone()),
                SpawnOptions::new().block_parent(false),
            )),
            None => {
                self.awaiting = true;
                Step::Yield(Instruction::await_deferred(self.cell.clone(), None))
            }
        }
    }
}

/// Runs `ops` concurrently; the first to settle — with a value or an error —
/// wins, and the rest are halted with no error surfaced.
///
/// An empty race never settles.
pub fn race<T: Clone + 'static>(ops: Vec<Op<T>>) -> Op<T> {
    let raws: Vec<RawOp> = ops.into_iter().map(|op| op.raw).collect();
    let racer = Op::<T>::from_body(RaceBody::new(raws));
    spawn_with(racer, SpawnOptions::new().ignore_error(true)).then(|handle| handle.join())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Kernel;
    use crate::types::Outcome;
    use std::time::Duration;

    #[test]
    fn first_completion_wins() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(race(vec![
            crate::op::sleep(Duration::from_millis(10)).map(|()| "slow"),
            crate::op::sleep(Duration::from_millis(1)).map(|()| "fast"),
        ]));
        assert_eq!(outcome.unwrap(), "fast");
    }

    #[test]
    fn single_contestant_resolves() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(race(vec![Op::value(7_i32)]));
        assert_eq!(outcome.unwrap(), 7);
    }

    #[test]
    fn contestant_error_rejects_the_race() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(race(vec![
            crate::op::never::<&str>(),
            crate::op::sleep(Duration::from_millis(1))
                .then(|()| Op::fail(crate::error::Error::operation("lost wheel"))),
        ]));
        match outcome {
            Outcome::Errored(e) => assert_eq!(e.context_str(), Some("lost wheel")),
            other => panic!("expected race error, got {other}"),
        }
    }

    #[test]
    fn losers_are_halted_without_surfacing() {
        let mut kernel = Kernel::new();
        let outcome = kernel.run(race(vec![
            crate::op::never::<i32>(),
            Op::value(1_i32),
        ]));
        assert_eq!(outcome.unwrap(), 1);
        assert_eq!(kernel.live_tasks(), 0);
    }
}

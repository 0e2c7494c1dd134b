//! Timeout: an operation raced against the clock.
//!
//! There is no wall-clock in the kernel, so a timeout is nothing special: it
//! is a race between the operation and a sleeper that fails with a timeout
//! error when it wakes. Whichever settles first wins and the loser is
//! halted.

use crate::combinator::race;
use crate::error::{Error, ErrorKind};
use crate::op::{sleep, Op};
use std::time::Duration;

/// Runs `op` with a deadline. If the virtual clock reaches `duration`
/// first, `op` is halted and the call site observes a `Timeout` error.
pub fn with_timeout<T: Clone + 'static>(duration: Duration, op: Op<T>) -> Op<T> {
    let timer: Op<T> = sleep(duration).then(move |()| {
        Op::fail(Error::new(ErrorKind::Timeout).with_context(format!("deadline of {duration:?} elapsed")))
    });
    race(vec![op, timer])
}

//! Shared helpers for unit and integration tests.
//!
//! - Phase/section macros for readable test output
//! - Outcome assertion macros
//! - An event recorder that captures the supervision event stream
//!
//! Logging goes through [`tracing_compat`](crate::tracing_compat), so these
//! helpers are no-ops in builds without the `tracing-integration` feature
//! while the assertions still run.

use crate::runtime::{Event, Kernel};
use std::cell::RefCell;
use std::rc::Rc;

/// Records every supervision event a kernel emits.
///
/// Subscribe before `run`; inspect the captured stream afterwards.
#[must_use]
pub fn observe(kernel: &Kernel) -> Rc<RefCell<Vec<Event>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    kernel.subscribe(move |event| sink.borrow_mut().push(*event));
    events
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        $crate::tracing_compat::info!(phase = %$name, "========================================");
        $crate::tracing_compat::info!(phase = %$name, "TEST PHASE: {}", $name);
        $crate::tracing_compat::info!(phase = %$name, "========================================");
    };
}

/// Log test completion.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        $crate::tracing_compat::info!(test = %$name, "test completed successfully: {}", $name);
    };
}

/// Log before asserting, so a failure sits next to its context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        $crate::tracing_compat::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that an outcome is `Completed` with a specific value.
#[macro_export]
macro_rules! assert_outcome_completed {
    ($outcome:expr, $expected:expr) => {
        match $outcome {
            $crate::types::Outcome::Completed(v) => assert_eq!(v, $expected),
            other => panic!("expected Outcome::Completed({:?}), got {}", $expected, other),
        }
    };
}

/// Assert that an outcome is `Errored`, binding the error.
#[macro_export]
macro_rules! assert_outcome_errored {
    ($outcome:expr) => {
        match $outcome {
            $crate::types::Outcome::Errored(e) => e,
            other => panic!("expected Outcome::Errored, got {}", other),
        }
    };
}

/// Assert that an outcome is `Halted`.
#[macro_export]
macro_rules! assert_outcome_halted {
    ($outcome:expr) => {
        match $outcome {
            $crate::types::Outcome::Halted => {}
            other => panic!("expected Outcome::Halted, got {}", other),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Op;
    use crate::record::TaskState;

    #[test]
    fn observer_captures_root_lifecycle() {
        let mut kernel = Kernel::new();
        let events = observe(&kernel);
        let outcome = kernel.run(Op::value(1_i32));
        assert_outcome_completed!(outcome, 1);

        let events = events.borrow();
        assert!(events.iter().any(|e| matches!(
            e,
            Event::State {
                task: 1,
                to: TaskState::Completed,
                ..
            }
        )));
    }

    #[test]
    fn assertion_macros_accept_outcomes() {
        let mut kernel = Kernel::new();
        let err = assert_outcome_errored!(
            kernel.run(Op::<i32>::fail(crate::error::Error::operation("x")))
        );
        assert_eq!(err.context_str(), Some("x"));
    }
}

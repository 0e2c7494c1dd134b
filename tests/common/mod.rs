//! Shared harness for the integration suite.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Once;
use weft::{Event, Kernel, TaskState};

static INIT: Once = Once::new();

/// Initialize test logging once per binary. Safe to call repeatedly.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_ansi(false)
            .try_init();
    });
}

/// A shared marker log for observing side-effect ordering.
pub type Log = Rc<RefCell<Vec<String>>>;

pub fn log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn push(log: &Log, entry: &str) {
    log.borrow_mut().push(entry.to_string());
}

pub fn entries(log: &Log) -> Vec<String> {
    log.borrow().clone()
}

/// Returns the state-transition events for one task, in emission order.
pub fn transitions_of(events: &[Event], id: u64) -> Vec<(TaskState, TaskState)> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::State { task, from, to } if *task == id => Some((*from, *to)),
            _ => None,
        })
        .collect()
}

/// Returns the position of the first event matching `pred`.
pub fn position_of(events: &[Event], pred: impl Fn(&Event) -> bool) -> Option<usize> {
    events.iter().position(pred)
}

/// True if the stream contains a transition of `task` into `to`.
pub fn reached(events: &[Event], task: u64, to: TaskState) -> bool {
    events
        .iter()
        .any(|e| matches!(e, Event::State { task: t, to: s, .. } if *t == task && *s == to))
}

/// Every legal edge of the task state machine.
pub fn is_legal_edge(from: TaskState, to: TaskState) -> bool {
    use TaskState::{
        Completed, Completing, Errored, Erroring, Halted, Halting, Pending, Running,
    };
    matches!(
        (from, to),
        (Pending, Running)
            | (Running, Completing | Erroring | Halting)
            | (Completing, Completed | Erroring | Halting)
            | (Erroring, Errored | Halting)
            | (Halting, Halted)
    )
}

/// Runs a kernel over `op` while recording the event stream.
pub fn run_recorded<T: Clone + 'static>(
    op: weft::Op<T>,
) -> (weft::Outcome<T>, Vec<Event>, usize) {
    init_test_logging();
    let mut kernel = Kernel::new();
    let events = weft::test_utils::observe(&kernel);
    let outcome = kernel.run(op);
    let live = kernel.live_tasks();
    let events = events.borrow().clone();
    (outcome, events, live)
}

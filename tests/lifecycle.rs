//! Lifecycle conformance: completion, halting, teardown ordering, and the
//! legality of every observed state transition.

mod common;

use common::{entries, is_legal_edge, log, push, run_recorded, transitions_of};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use weft::{op, Error, ErrorKind, Event, Kernel, Op, Outcome, TaskState};

#[test]
fn root_value_completes_and_awaiters_observe_it() {
    // S1: root body returns 42.
    let (outcome, events, live) = run_recorded(Op::value(42_i32));
    assert_eq!(outcome.unwrap(), 42);
    assert_eq!(live, 0);

    let root = transitions_of(&events, 1);
    assert_eq!(
        root,
        vec![
            (TaskState::Pending, TaskState::Running),
            (TaskState::Running, TaskState::Completing),
            (TaskState::Completing, TaskState::Completed),
        ]
    );
}

#[test]
fn every_observed_transition_is_a_legal_edge() {
    // Exercise completion, error propagation, and halting in one tree, then
    // check each emitted edge against the state machine table.
    let body = op::spawn_with(
        op::never::<i32>(),
        weft::SpawnOptions::new().block_parent(false),
    )
    .then(|_long| {
        op::spawn_with(
            op::sleep(Duration::from_millis(1)).then(|()| Op::<i32>::fail(Error::operation("pop"))),
            weft::SpawnOptions::new().ignore_error(true),
        )
    })
    .then(|failing| failing.catch_halt())
    .then(|_| Op::value("done"));

    let (outcome, events, live) = run_recorded(body);
    assert_eq!(live, 0);
    assert!(matches!(outcome, Outcome::Completed(_) | Outcome::Errored(_)));

    for event in &events {
        if let Event::State { task, from, to } = event {
            assert!(
                is_legal_edge(*from, *to),
                "illegal transition for T{task}: {from} -> {to}"
            );
        }
    }
}

#[test]
fn halt_is_idempotent_and_eventually_terminal() {
    let body = op::spawn(op::never::<i32>()).then(|child| {
        let again = child.clone();
        let last = child.clone();
        child
            .halt()
            .then(move |()| again.halt())
            .then(move |()| last.catch_halt())
    });

    let (outcome, events, live) = run_recorded(body);
    assert!(matches!(outcome, Outcome::Completed(None)));
    assert_eq!(live, 0);

    // One halting entry and one halted entry; the second halt is a no-op.
    let child = transitions_of(&events, 2);
    let halting = child
        .iter()
        .filter(|(_, to)| *to == TaskState::Halting)
        .count();
    let halted = child
        .iter()
        .filter(|(_, to)| *to == TaskState::Halted)
        .count();
    assert_eq!((halting, halted), (1, 1));
}

#[test]
fn finally_cleanup_runs_before_terminal_state_on_halt() {
    // S6: a halted body unwinds through its finally steps before the task
    // enters its terminal state; ensure hooks follow at terminal entry.
    let markers = log();
    let in_finally = markers.clone();
    let in_ensure = markers.clone();

    let guarded = op::ensure(move || push(&in_ensure, "ensure"))
        .then(|()| op::never::<i32>())
        .and_finally(op::action(move |_| {
            push(&in_finally, "finally");
            Ok(())
        }));

    let body = op::spawn(guarded).then(|child| {
        let joined = child.clone();
        child.halt().then(move |()| joined.catch_halt())
    });

    let (outcome, events, live) = run_recorded(body);
    assert!(matches!(outcome, Outcome::Completed(None)));
    assert_eq!(live, 0);
    assert_eq!(entries(&markers), vec!["finally", "ensure"]);

    let child = transitions_of(&events, 2);
    assert!(child.contains(&(TaskState::Running, TaskState::Halting)));
    assert!(child.contains(&(TaskState::Halting, TaskState::Halted)));
}

#[test]
fn call_adapts_deferreds_ops_and_thunks() {
    // P8: the call adapter round-trips values, errors, and lazy operations.
    let (resolver, settled) = weft::deferred::<i32>();
    resolver.resolve(5).unwrap();
    let (outcome, _, _) = run_recorded(op::call(settled));
    assert_eq!(outcome.unwrap(), 5);

    let (resolver, rejected) = weft::deferred::<i32>();
    resolver.reject(Error::operation("no dice")).unwrap();
    let (outcome, _, _) = run_recorded(op::call(rejected));
    match outcome {
        Outcome::Errored(e) => assert_eq!(e.context_str(), Some("no dice")),
        other => panic!("expected error, got {other}"),
    }

    let (outcome, _, _) = run_recorded(op::call(|| Op::value("lazy")));
    assert_eq!(outcome.unwrap(), "lazy");
}

#[test]
fn deferred_resolved_by_a_sibling_task_resumes_the_waiter() {
    let (resolver, deferred) = weft::deferred::<&str>();
    let body = op::spawn_with(
        op::sleep(Duration::from_millis(2)).then(move |()| {
            op::action(move |_| {
                let _ = resolver.resolve("handed over");
                Ok(())
            })
        }),
        weft::SpawnOptions::new().block_parent(false),
    )
    .then(move |_worker| op::call(deferred));

    let (outcome, _, live) = run_recorded(body);
    assert_eq!(outcome.unwrap(), "handed over");
    assert_eq!(live, 0);
}

#[test]
fn suspend_installer_receives_a_working_waker() {
    let parked: Rc<RefCell<Option<weft::Waker>>> = Rc::new(RefCell::new(None));
    let slot = parked.clone();

    let body = op::spawn_with(
        op::sleep(Duration::from_millis(1)).then(move |()| {
            op::action(move |_| {
                if let Some(waker) = slot.borrow_mut().take() {
                    waker.wake_with(11_i32);
                }
                Ok(())
            })
        }),
        weft::SpawnOptions::new().block_parent(false),
    )
    .then(move |_| {
        op::suspend::<i32>(move |waker| {
            *parked.borrow_mut() = Some(waker);
            None
        })
    });

    let (outcome, _, live) = run_recorded(body);
    assert_eq!(outcome.unwrap(), 11);
    assert_eq!(live, 0);
}

#[test]
fn deferred_cancel_hook_fires_when_the_waiter_is_halted() {
    common::init_test_logging();
    let cancelled = Rc::new(RefCell::new(0_u32));
    let hits = cancelled.clone();
    let (_resolver, deferred) = weft::deferred::<i32>();
    let deferred = deferred.with_cancel(move || *hits.borrow_mut() += 1);

    let mut kernel = Kernel::new();
    let outcome = kernel.run(
        op::spawn(op::call(deferred)).then(|child| {
            let joined = child.clone();
            child.halt().then(move |()| joined.catch_halt())
        }),
    );
    assert!(matches!(outcome, Outcome::Completed(None)));
    assert_eq!(*cancelled.borrow(), 1);
}

#[test]
fn run_surfaces_programmer_error_on_type_mismatch() {
    // A suspension that wakes with the wrong value type is a programmer
    // error at the extraction point, not a panic.
    common::init_test_logging();
    let mut kernel = Kernel::new();
    let mismatched: Op<String> = op::suspend(|waker| {
        waker.wake_with(1_i32);
        None
    });
    let outcome = kernel.run(mismatched);
    match outcome {
        Outcome::Errored(e) => assert_eq!(e.kind(), ErrorKind::Programmer),
        other => panic!("expected programmer error, got {other}"),
    }
}

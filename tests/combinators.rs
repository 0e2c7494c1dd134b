//! Combinator conformance: race, all, and timeout built on the halt
//! cascade, observed end-to-end through the event stream.

mod common;

use common::{run_recorded, transitions_of};
use std::time::Duration;
use weft::{all, op, race, with_timeout, Error, ErrorKind, Event, Op, Outcome, TaskState};

#[test]
fn race_resolves_with_the_fastest_and_halts_the_slow_branch() {
    // S5: the slow branch is halted with no error surfaced.
    let (outcome, events, live) = run_recorded(race(vec![
        op::sleep(Duration::from_millis(10)).map(|()| "slow"),
        op::sleep(Duration::from_millis(1)).map(|()| "fast"),
    ]));
    assert_eq!(outcome.unwrap(), "fast");
    assert_eq!(live, 0);

    let halted = events
        .iter()
        .filter(|e| matches!(e, Event::State { to: TaskState::Halted, .. }))
        .count();
    assert!(halted >= 1, "the losing branch must be halted");
    let errored = events
        .iter()
        .any(|e| matches!(e, Event::State { to: TaskState::Errored, .. }));
    assert!(!errored, "no branch may surface an error");
}

#[test]
fn race_rethrows_the_first_error() {
    let (outcome, _, live) = run_recorded(race(vec![
        op::never::<i32>(),
        op::sleep(Duration::from_millis(1)).then(|()| Op::fail(Error::operation("crashed"))),
    ]));
    match outcome {
        Outcome::Errored(e) => assert_eq!(e.context_str(), Some("crashed")),
        other => panic!("expected the branch error, got {other}"),
    }
    assert_eq!(live, 0);
}

#[test]
fn all_preserves_input_order_across_completion_order() {
    let (outcome, _, live) = run_recorded(all(vec![
        op::sleep(Duration::from_millis(9)).map(|()| "first"),
        op::sleep(Duration::from_millis(3)).map(|()| "second"),
        Op::value("third"),
    ]));
    assert_eq!(outcome.unwrap(), vec!["first", "second", "third"]);
    assert_eq!(live, 0);
}

#[test]
fn all_rejects_on_the_first_error_and_halts_the_rest() {
    let (outcome, events, live) = run_recorded(all(vec![
        op::never::<&str>(),
        op::sleep(Duration::from_millis(1)).then(|()| Op::fail(Error::operation("one bad apple"))),
    ]));
    match outcome {
        Outcome::Errored(e) => assert_eq!(e.context_str(), Some("one bad apple")),
        other => panic!("expected error, got {other}"),
    }
    assert_eq!(live, 0);
    let halted = events
        .iter()
        .any(|e| matches!(e, Event::State { to: TaskState::Halted, .. }));
    assert!(halted, "the pending branch must be halted");
}

#[test]
fn timeout_wins_against_a_stalled_operation() {
    let (outcome, _, live) = run_recorded(with_timeout(
        Duration::from_millis(5),
        op::never::<&str>(),
    ));
    match outcome {
        Outcome::Errored(e) => assert_eq!(e.kind(), ErrorKind::Timeout),
        other => panic!("expected timeout, got {other}"),
    }
    assert_eq!(live, 0);
}

#[test]
fn timeout_is_invisible_when_the_operation_is_fast() {
    let (outcome, events, live) = run_recorded(with_timeout(
        Duration::from_millis(50),
        op::sleep(Duration::from_millis(2)).map(|()| 27_i32),
    ));
    assert_eq!(outcome.unwrap(), 27);
    assert_eq!(live, 0);
    // The sleeper branch is torn down, not left to fire.
    let halted = events
        .iter()
        .any(|e| matches!(e, Event::State { to: TaskState::Halted, .. }));
    assert!(halted);
}

#[test]
fn combinators_nest() {
    // A race of an `all` against a timeout-guarded sleeper.
    let gather = all(vec![
        op::sleep(Duration::from_millis(1)).map(|()| 1_i32),
        op::sleep(Duration::from_millis(2)).map(|()| 2_i32),
    ])
    .map(|values| values.iter().sum::<i32>());
    let guarded = with_timeout(Duration::from_millis(30), op::never::<i32>());

    let (outcome, _, live) = run_recorded(race(vec![gather, guarded]));
    assert_eq!(outcome.unwrap(), 3);
    assert_eq!(live, 0);
}

#[test]
fn racer_tasks_terminate_with_their_caller() {
    // The race runs in its own supervised task; nothing leaks when the
    // caller is itself part of a larger tree.
    let body = op::spawn(race(vec![
        op::sleep(Duration::from_millis(1)).map(|()| 1_i32),
        op::never::<i32>(),
    ]))
    .then(|racer| racer.join());

    let (outcome, events, live) = run_recorded(body);
    assert_eq!(outcome.unwrap(), 1);
    assert_eq!(live, 0);

    // The root completes last.
    let root = transitions_of(&events, 1);
    assert_eq!(root.last().copied(), Some((TaskState::Completing, TaskState::Completed)));
}

//! Resource and scope conformance: init frames, scope-tied cleanup, and
//! ensure-hook ordering on every exit path.

mod common;

use common::{entries, log, push, run_recorded};
use weft::{op, Error, Op, Outcome, Resource, SpawnOptions};

#[test]
fn resource_cleanup_waits_for_the_owning_scope() {
    // S4: the caller finishes with the resource value; cleanup registered in
    // the outer scope fires only when that scope terminates.
    let markers = log();
    let in_init = markers.clone();
    let in_close = markers.clone();
    let after_caller = markers.clone();
    let after_scope = markers.clone();

    let resource = Resource::new(move |scope| {
        push(&in_init, "init");
        scope
            .ensure(move || push(&in_close, "close"))
            .then(|()| Op::value("handle"))
    });

    let body = op::spawn_with(op::never::<i32>(), SpawnOptions::new().block_parent(false))
        .then(move |scope_task| {
            let caller = op::use_resource(resource).then(|value: &str| Op::value(value.len()));
            op::spawn_with(
                caller,
                SpawnOptions::new().scoped_to(&scope_task),
            )
            .then(|c| c.join())
            .then(move |len| {
                assert_eq!(len, 6);
                push(&after_caller, "caller-done");
                scope_task.halt()
            })
            .then(move |()| {
                push(&after_scope, "scope-done");
                Op::value(())
            })
        });

    let (outcome, _, live) = run_recorded(body);
    assert!(outcome.is_completed());
    assert_eq!(live, 0);
    assert_eq!(
        entries(&markers),
        vec!["init", "caller-done", "close", "scope-done"]
    );
}

#[test]
fn ensure_hooks_fire_in_registration_order_on_completion() {
    // P2/P6, completion path.
    let markers = log();
    let (one, two, three) = (markers.clone(), markers.clone(), markers.clone());

    let body = op::ensure(move || push(&one, "one"))
        .then(|()| op::ensure(move || push(&two, "two")))
        .then(|()| op::ensure(move || push(&three, "three")))
        .then(|()| Op::value(0_i32));

    let (outcome, _, _) = run_recorded(body);
    assert_eq!(outcome.unwrap(), 0);
    assert_eq!(entries(&markers), vec!["one", "two", "three"]);
}

#[test]
fn ensure_hooks_fire_on_error_and_halt_paths() {
    // Error path.
    let markers = log();
    let hook = markers.clone();
    let body = op::ensure(move || push(&hook, "error-path"))
        .then(|()| Op::<i32>::fail(Error::operation("down")));
    let (outcome, _, _) = run_recorded(body);
    assert!(outcome.is_errored());
    assert_eq!(entries(&markers), vec!["error-path"]);

    // Halt path.
    let markers = log();
    let hook = markers.clone();
    let guarded = op::ensure(move || push(&hook, "halt-path")).then(|()| op::never::<i32>());
    let body = op::spawn(guarded).then(|child| child.halt());
    let (outcome, _, _) = run_recorded(body);
    assert!(outcome.is_completed());
    assert_eq!(entries(&markers), vec!["halt-path"]);
}

#[test]
fn resource_init_error_becomes_the_callers_error() {
    // Already-registered cleanup still runs when the scope exits.
    let markers = log();
    let cleanup = markers.clone();

    let resource: Resource<i32> = Resource::new(move |scope| {
        scope
            .ensure(move || push(&cleanup, "cleanup"))
            .then(|()| Op::fail(Error::operation("init failed")))
    });

    let body = op::use_resource(resource).then(|n: i32| Op::value(n));
    let (outcome, _, live) = run_recorded(body);
    match outcome {
        Outcome::Errored(e) => assert_eq!(e.context_str(), Some("init failed")),
        other => panic!("expected init failure, got {other}"),
    }
    assert_eq!(live, 0);
    // The default scope is the caller itself, which has now terminated.
    assert_eq!(entries(&markers), vec!["cleanup"]);
}

#[test]
fn resource_work_spawned_into_the_scope_outlives_the_caller() {
    let markers = log();
    let stopped = markers.clone();
    let after_caller = markers.clone();

    let resource = Resource::new(move |scope| {
        let worker = op::never::<i32>().and_finally(op::action(move |_| {
            push(&stopped, "worker-stopped");
            Ok(())
        }));
        scope
            .spawn_with(worker, SpawnOptions::new().block_parent(false))
            .then(|_handle| Op::value("pumping"))
    });

    let body = op::spawn_with(op::never::<i32>(), SpawnOptions::new().block_parent(false))
        .then(move |scope_task| {
            op::spawn_with(
                op::use_resource(resource).then(|v: &str| Op::value(v.to_string())),
                SpawnOptions::new().scoped_to(&scope_task),
            )
            .then(|caller| caller.join())
            .then(move |value| {
                assert_eq!(value, "pumping");
                push(&after_caller, "caller-done");
                scope_task.halt()
            })
        });

    let (outcome, _, live) = run_recorded(body);
    assert!(outcome.is_completed());
    assert_eq!(live, 0);
    // The worker kept running after the caller finished and stopped only
    // when its scope was halted.
    assert_eq!(entries(&markers), vec!["caller-done", "worker-stopped"]);
}

#[test]
fn resource_on_a_finished_scope_is_a_programmer_error() {
    let resource: Resource<i32> = Resource::new(|_scope| Op::value(1));
    let body = op::spawn_with(op::never::<i32>(), SpawnOptions::new().block_parent(false))
        .then(move |scope_task| {
            let halted = scope_task.clone();
            scope_task.halt().then(move |()| {
                op::spawn_with(
                    op::use_resource(resource),
                    SpawnOptions::new().scoped_to(&halted).ignore_error(true),
                )
                .then(|caller| caller.join())
            })
        });

    let (outcome, _, _) = run_recorded(body);
    match outcome {
        Outcome::Errored(e) => {
            assert_eq!(e.kind(), weft::ErrorKind::Programmer);
        }
        other => panic!("expected programmer error, got {other}"),
    }
}

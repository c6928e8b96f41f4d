//! Payload failure capture and propagation to dependents.

use weft_core::{AccessMode, LifetimeClass, TaskError};
use weft_sched::Task;
use weft_test_utils::fixtures::{erroring_task, failing_task};
use weft_test_utils::strict_scheduler;

#[test]
fn panics_are_aggregated_per_batch_and_other_batches_run() {
    let scheduler = strict_scheduler(3);
    let flags = scheduler
        .registry()
        .create::<u8>(10, LifetimeClass::Persistent)
        .unwrap();
    let view = flags.view_all(AccessMode::WriteOnly).unwrap();
    let task = Task::parallel_for("flag", 10, view, |i, v| {
        if i == 4 || i == 9 {
            panic!("bad index {i}");
        }
        v.set(i, 1);
    });
    let handle = scheduler.schedule(task, 3, &[]).unwrap();

    let err = handle.complete().unwrap_err();
    let TaskError::PayloadFailed { label, failures, .. } = &err else {
        panic!("expected payload failure, got {err:?}");
    };
    assert_eq!(label, "flag");
    assert_eq!(failures.len(), 2);
    assert_eq!((failures[0].batch_index, failures[0].index), (1, 4));
    assert_eq!(failures[0].range, 3..6);
    assert_eq!(failures[0].message, "bad index 4");
    assert_eq!((failures[1].batch_index, failures[1].index), (3, 9));

    // Batch [3, 6) stopped at 4; every other batch ran to its end.
    assert_eq!(flags.to_vec().unwrap(), vec![1, 1, 1, 1, 0, 0, 1, 1, 1, 0]);

    // Completing again re-raises the same failure.
    assert_eq!(handle.complete().unwrap_err(), err);
    let metrics = scheduler.metrics();
    assert_eq!(metrics.tasks_failed, 1);
    assert_eq!(metrics.batch_failures, 2);
}

#[test]
fn returned_errors_are_reported_like_panics() {
    let scheduler = strict_scheduler(2);
    let handle = scheduler
        .schedule(erroring_task("validate", 6, &[5]), 2, &[])
        .unwrap();
    let err = handle.complete().unwrap_err();
    let roots = err.root_failures();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].index, 5);
    assert_eq!(roots[0].batch_index, 2);
    assert_eq!(roots[0].message, "rejected index 5");
}

#[test]
fn dependents_of_a_failed_task_never_run() {
    let scheduler = strict_scheduler(2);
    let out = scheduler
        .registry()
        .create::<u32>(4, LifetimeClass::Persistent)
        .unwrap();
    let a = scheduler
        .schedule(failing_task("a", 4, &[2]), 4, &[])
        .unwrap();
    let b = scheduler
        .schedule(
            Task::parallel_for("b", 4, out.view_all(AccessMode::WriteOnly).unwrap(), |i, v| {
                v.set(i, 7)
            }),
            1,
            &[a.clone()],
        )
        .unwrap();
    let c = scheduler
        .schedule(Task::single("c", (), |_| {}), 1, &[b.clone()])
        .unwrap();

    let err = c.complete().unwrap_err();
    let TaskError::PrerequisiteFailed { task, upstream, .. } = &err else {
        panic!("expected prerequisite failure, got {err:?}");
    };
    assert_eq!(*task, c.id());
    assert_eq!(upstream.len(), 1);
    assert_eq!(upstream[0].task(), b.id());
    assert!(matches!(upstream[0], TaskError::PrerequisiteFailed { .. }));

    let roots = err.root_failures();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].task, a.id());
    assert_eq!(roots[0].index, 2);

    assert_eq!(out.to_vec().unwrap(), vec![0; 4]);
    let metrics = scheduler.metrics();
    assert_eq!(metrics.tasks_failed, 1);
    assert_eq!(metrics.tasks_skipped, 2);
}

#[test]
fn linking_after_an_already_failed_task_fails_immediately() {
    let scheduler = strict_scheduler(2);
    let a = scheduler
        .schedule(failing_task("a", 1, &[0]), 1, &[])
        .unwrap();
    assert!(a.complete().is_err());

    let b = scheduler
        .schedule(Task::single("b", (), |_| panic!("must not run")), 1, &[a])
        .unwrap();
    assert!(b.is_completed());
    assert!(matches!(
        b.complete(),
        Err(TaskError::PrerequisiteFailed { .. })
    ));
}

#[test]
fn combine_fails_when_any_input_fails() {
    let scheduler = strict_scheduler(2);
    let ok = scheduler
        .schedule(Task::single("ok", (), |_| {}), 1, &[])
        .unwrap();
    let bad = scheduler
        .schedule(failing_task("bad", 3, &[1]), 1, &[])
        .unwrap();
    let both = scheduler.combine(&[ok.clone(), bad.clone()]).unwrap();

    let err = both.complete().unwrap_err();
    let TaskError::PrerequisiteFailed { upstream, .. } = &err else {
        panic!("expected prerequisite failure");
    };
    assert_eq!(upstream.len(), 1);
    assert_eq!(upstream[0].task(), bad.id());
    assert!(ok.complete().is_ok());
}

#[test]
fn complete_all_returns_the_first_failure_in_argument_order() {
    let scheduler = strict_scheduler(2);
    let handles: Vec<_> = ["x", "y", "z"]
        .into_iter()
        .enumerate()
        .map(|(n, label)| {
            let fail_at: &[usize] = if n == 0 { &[] } else { &[0] };
            scheduler
                .schedule(failing_task(label, 1, fail_at), 1, &[])
                .unwrap()
        })
        .collect();
    let err = scheduler.complete_all(&handles).unwrap_err();
    assert_eq!(err.label(), "y");
}

#[test]
fn a_failed_payload_does_not_poison_the_scheduler() {
    let scheduler = strict_scheduler(2);
    for round in 0..5 {
        let bad = scheduler
            .schedule(failing_task("bad", 8, &[round]), 2, &[])
            .unwrap();
        assert!(bad.complete().is_err());
        let good = scheduler
            .schedule(Task::parallel_for("good", 8, (), |_, _| {}), 2, &[])
            .unwrap();
        good.complete().unwrap();
    }
    assert_eq!(scheduler.live_tasks(), 0);
}

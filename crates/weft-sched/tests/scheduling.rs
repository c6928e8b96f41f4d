//! Batch partitioning, dependency ordering, and aliasing validation.

use weft_buffer::BufferRegistry;
use weft_core::{AccessMode, LifetimeClass, ScheduleError};
use weft_sched::{CompletionState, Task};
use weft_test_utils::fixtures::Gate;
use weft_test_utils::{lenient_scheduler, seeded_i32, strict_scheduler};

fn negate_with_width(width: usize) -> Vec<i32> {
    let scheduler = strict_scheduler(4);
    let input: Vec<i32> = (1..=10).collect();
    let buf = scheduler
        .registry()
        .create_from_slice(&input, LifetimeClass::Persistent)
        .unwrap();
    let view = buf.view_all(AccessMode::ReadWrite).unwrap();
    let task = Task::parallel_for("negate", view.len(), view, |i, v| v.update(i, |x: i32| -x));
    let handle = scheduler.schedule(task, width, &[]).unwrap();
    assert_eq!(handle.batch_count(), 10usize.div_ceil(width));
    handle.complete().unwrap();
    buf.to_vec().unwrap()
}

#[test]
fn batch_width_does_not_change_output() {
    let expected: Vec<i32> = (1..=10).map(|x| -x).collect();
    for width in [1, 3, 7, 10, 64] {
        assert_eq!(negate_with_width(width), expected, "width {width}");
    }
}

#[test]
fn batch_width_beyond_domain_runs_one_batch() {
    assert_eq!(negate_with_width(usize::MAX), (1..=10).map(|x| -x).collect::<Vec<i32>>());
}

#[test]
fn zero_batch_width_is_rejected() {
    let scheduler = strict_scheduler(2);
    let err = scheduler
        .schedule(Task::single("noop", (), |_| {}), 0, &[])
        .unwrap_err();
    assert_eq!(err, ScheduleError::InvalidBatchWidth);
}

#[test]
fn zero_domain_completes_at_schedule_time() {
    let scheduler = strict_scheduler(2);
    let handle = scheduler
        .schedule(Task::parallel_for("empty", 0, (), |_, _| {}), 8, &[])
        .unwrap();
    assert!(handle.is_completed());
    assert_eq!(handle.state(), CompletionState::Complete);
    assert_eq!(handle.batch_count(), 0);
    handle.complete().unwrap();
}

#[test]
fn chained_reader_sees_writer_output_every_cycle() {
    let scheduler = strict_scheduler(4);
    let reg = scheduler.registry();
    let counter = reg.create::<u64>(64, LifetimeClass::Persistent).unwrap();
    let seen = reg.create::<u64>(64, LifetimeClass::Persistent).unwrap();

    for cycle in 0..50u64 {
        scheduler.begin_cycle().unwrap();
        let write = counter.view_all(AccessMode::WriteOnly).unwrap();
        let a = scheduler
            .schedule(
                Task::parallel_for("count", 64, write, move |i, v| v.set(i, cycle * 1000 + i as u64)),
                5,
                &[],
            )
            .unwrap();
        let views = (
            counter.view_all(AccessMode::ReadOnly).unwrap(),
            seen.view_all(AccessMode::WriteOnly).unwrap(),
        );
        let b = scheduler
            .schedule(
                Task::parallel_for("check", 64, views, move |i, (src, dst)| {
                    let value = src.get(i);
                    assert_eq!(value, cycle * 1000 + i as u64);
                    dst.set(i, value);
                }),
                3,
                &[a],
            )
            .unwrap();
        b.complete().unwrap();
    }
    let last = seen.to_vec().unwrap();
    assert_eq!(last[63], 49 * 1000 + 63);
}

#[test]
fn disjoint_stride_lanes_run_concurrently() {
    let scheduler = strict_scheduler(4);
    let input = seeded_i32(11, 30);
    let buf = scheduler
        .registry()
        .create_from_slice(&input, LifetimeClass::Persistent)
        .unwrap();
    let ops: [fn(i32) -> i32; 3] = [|x| x + 1, |x| x * 2, |x| -x];
    let gate = Gate::new();
    let hold = scheduler.schedule(gate.task("hold"), 1, &[]).unwrap();

    let handles: Vec<_> = (0..3)
        .map(|lane| {
            let view = buf
                .view::<i32>(lane * 4, 12, 10, AccessMode::ReadWrite)
                .unwrap();
            let op = ops[lane];
            let task = Task::parallel_for(format!("lane{lane}"), 10, view, move |i, v| v.update(i, op));
            scheduler.schedule(task, 3, &[hold.clone()]).unwrap()
        })
        .collect();
    assert!(handles.iter().all(|h| !h.is_completed()));
    assert_eq!(scheduler.live_tasks(), 4);

    let peek = Task::parallel_for(
        "peek-lane0",
        10,
        buf.view::<i32>(0, 12, 10, AccessMode::ReadOnly).unwrap(),
        |i, v| {
            let _ = v.get(i);
        },
    );
    let err = scheduler.schedule(peek, 5, &[]).unwrap_err();
    let ScheduleError::DataRace(report) = err else {
        panic!("expected data race, got {err:?}");
    };
    assert_eq!(report.existing_task, handles[0].id());

    gate.open();
    scheduler.complete_all(&handles).unwrap();

    let expected: Vec<i32> = input
        .iter()
        .enumerate()
        .map(|(i, &x)| ops[i % 3](x))
        .collect();
    assert_eq!(buf.to_vec().unwrap(), expected);
}

#[test]
fn buffers_from_separate_registries_never_race() {
    let scheduler = strict_scheduler(2);
    let own = scheduler
        .registry()
        .create::<u32>(8, LifetimeClass::Persistent)
        .unwrap();
    let foreign = BufferRegistry::default()
        .create::<u32>(8, LifetimeClass::Persistent)
        .unwrap();
    assert_eq!(own.id().index, foreign.id().index);

    let gate = Gate::new();
    let hold = scheduler.schedule(gate.task("hold"), 1, &[]).unwrap();
    let first = Task::parallel_for("own", 8, own.view_all(AccessMode::WriteOnly).unwrap(), |i, v| {
        v.set(i, 1)
    });
    let first = scheduler.schedule(first, 4, &[hold]).unwrap();
    let second = Task::parallel_for(
        "foreign",
        8,
        foreign.view_all(AccessMode::WriteOnly).unwrap(),
        |i, v| v.set(i, 2),
    );
    let second = scheduler.schedule(second, 4, &[]).unwrap();

    gate.open();
    scheduler.complete_all(&[first, second]).unwrap();
    assert_eq!(own.to_vec().unwrap(), vec![1; 8]);
    assert_eq!(foreign.to_vec().unwrap(), vec![2; 8]);
}

#[test]
fn overlapping_writers_without_ordering_are_a_data_race() {
    let scheduler = strict_scheduler(2);
    let buf = scheduler
        .registry()
        .create::<f32>(10, LifetimeClass::Persistent)
        .unwrap();
    let gate = Gate::new();
    let hold = scheduler.schedule(gate.task("hold"), 1, &[]).unwrap();

    let first = Task::parallel_for("first", 10, buf.view_all(AccessMode::ReadWrite).unwrap(), |i, v| {
        v.set(i, 1.0)
    });
    let first = scheduler.schedule(first, 4, &[hold.clone()]).unwrap();

    let second = Task::parallel_for("second", 10, buf.view_all(AccessMode::ReadWrite).unwrap(), |i, v| {
        v.set(i, 2.0)
    });
    let err = scheduler.schedule(second, 4, &[]).unwrap_err();
    let ScheduleError::DataRace(report) = err else {
        panic!("expected data race, got {err:?}");
    };
    assert_eq!(report.buffer, buf.id());
    assert_eq!(report.existing_task, first.id());
    assert_eq!(report.existing_label, "first");
    assert_eq!(scheduler.metrics().data_races_detected, 1);

    gate.open();
    first.complete().unwrap();
    assert_eq!(buf.to_vec().unwrap(), vec![1.0; 10]);
}

#[test]
fn ordered_writers_and_concurrent_readers_are_accepted() {
    let scheduler = strict_scheduler(2);
    let buf = scheduler
        .registry()
        .create::<u32>(8, LifetimeClass::Persistent)
        .unwrap();
    let gate = Gate::new();
    let hold = scheduler.schedule(gate.task("hold"), 1, &[]).unwrap();
    let write = |label: &str, value: u32| {
        Task::parallel_for(label, 8, buf.view_all(AccessMode::WriteOnly).unwrap(), move |i, v| {
            v.set(i, value)
        })
    };
    let read = |label: &str| {
        Task::parallel_for(label, 8, buf.view_all(AccessMode::ReadOnly).unwrap(), |i, v| {
            let _ = v.get(i);
        })
    };

    let w1 = scheduler.schedule(write("w1", 1), 2, &[hold]).unwrap();
    let r1 = scheduler.schedule(read("r1"), 2, &[w1.clone()]).unwrap();
    let r2 = scheduler.schedule(read("r2"), 2, &[w1.clone()]).unwrap();
    // Ancestors through r1 and r2 cover every live writer and reader.
    let w2 = scheduler.schedule(write("w2", 2), 2, &[r1, r2]).unwrap();
    // A reader unordered with w2 is a race.
    assert!(matches!(
        scheduler.schedule(read("r3"), 2, &[w1]),
        Err(ScheduleError::DataRace(_))
    ));

    gate.open();
    w2.complete().unwrap();
    assert_eq!(buf.to_vec().unwrap(), vec![2; 8]);
}

#[test]
fn overlapping_writes_inside_one_task_are_a_data_race() {
    let scheduler = strict_scheduler(2);
    let buf = scheduler
        .registry()
        .create::<u8>(16, LifetimeClass::Persistent)
        .unwrap();
    let views = (
        buf.view::<u8>(0, 1, 16, AccessMode::WriteOnly).unwrap(),
        buf.view::<u8>(3, 4, 4, AccessMode::ReadWrite).unwrap(),
    );
    let task = Task::parallel_for("self-overlap", 4, views, |_, _| {});
    let id = task.id();
    let err = scheduler.schedule(task, 1, &[]).unwrap_err();
    let ScheduleError::DataRace(report) = err else {
        panic!("expected data race");
    };
    assert_eq!(report.new_task, id);
    assert_eq!(report.existing_task, id);
}

#[test]
fn warn_policy_logs_and_proceeds() {
    let scheduler = lenient_scheduler(2);
    let buf = scheduler
        .registry()
        .create::<u8>(4, LifetimeClass::Persistent)
        .unwrap();
    let gate = Gate::new();
    let hold = scheduler.schedule(gate.task("hold"), 1, &[]).unwrap();
    let a = scheduler
        .schedule(
            Task::single("a", buf.view_all(AccessMode::WriteOnly).unwrap(), |v| v.set(0, 1)),
            1,
            &[hold],
        )
        .unwrap();
    let b = scheduler
        .schedule(
            Task::single("b", buf.view_all(AccessMode::WriteOnly).unwrap(), |v| v.set(1, 1)),
            1,
            &[],
        )
        .unwrap();
    gate.open();
    scheduler.complete_all(&[a, b]).unwrap();
    assert_eq!(scheduler.metrics().data_races_detected, 1);
}

#[test]
fn duplicate_prerequisites_are_deduplicated() {
    let scheduler = strict_scheduler(2);
    let a = scheduler.schedule(Task::single("a", (), |_| {}), 1, &[]).unwrap();
    let b = scheduler
        .schedule(Task::single("b", (), |_| {}), 1, &[a.clone(), a.clone(), a])
        .unwrap();
    b.complete().unwrap();
}

#[test]
fn view_of_released_buffer_is_rejected() {
    let scheduler = strict_scheduler(2);
    let mut buf = scheduler
        .registry()
        .create::<u8>(4, LifetimeClass::Persistent)
        .unwrap();
    let view = buf.view_all(AccessMode::ReadOnly).unwrap();
    buf.release().unwrap();
    let err = scheduler
        .schedule(Task::single("late", view, |_| {}), 1, &[])
        .unwrap_err();
    assert!(matches!(
        err,
        ScheduleError::Buffer(weft_core::BufferError::UseAfterRelease { .. })
    ));
}

use weft_core::{LifetimeClass, ScheduleError};
use weft_kernels::motion::{accelerate_task, integrate_task};
use weft_kernels::point_cloud::{
    average_height_task, change_points_task, random_points, schedule_slice_frame,
    schedule_slice_stats,
};
use weft_kernels::{Acceleration, DistanceStats, MotionSystem, PointChange, PointCloud, Vec3};
use weft_test_utils::strict_scheduler;

fn close(a: f32, b: f32) -> bool {
    (a - b).abs() <= 1e-4 * (1.0 + a.abs().max(b.abs()))
}

#[test]
fn motion_steps_match_sequential_integration() {
    let scheduler = strict_scheduler(4);
    let initial: Vec<Vec3> = (0..300).map(|i| Vec3::new(i as f32, 0.0, -(i as f32))).collect();
    let accel = Acceleration {
        base: Vec3::new(1.0, 2.0, 3.0),
        per_index: Vec3::new(0.01, 0.0, 0.02),
    };
    let mut system = MotionSystem::new(scheduler.registry(), &initial, accel)
        .unwrap()
        .with_batch_width(17);

    let dt = 0.5;
    for _ in 0..3 {
        system.step(&scheduler, dt).unwrap();
    }
    system.complete().unwrap();

    let mut pos = initial.clone();
    let mut vel = vec![Vec3::ZERO; initial.len()];
    for _ in 0..3 {
        for (i, v) in vel.iter_mut().enumerate() {
            *v += (accel.base + accel.per_index * i as f32) * dt;
        }
        for (p, v) in pos.iter_mut().zip(&vel) {
            *p += *v * dt;
        }
    }
    let got = system.positions().unwrap();
    for (g, e) in got.iter().zip(&pos) {
        assert!(close(g.x, e.x) && close(g.y, e.y) && close(g.z, e.z), "{g:?} vs {e:?}");
    }
}

#[test]
fn integrate_without_ordering_races_with_accelerate() {
    let scheduler = strict_scheduler(2);
    let registry = scheduler.registry();
    let pos = registry.create::<Vec3>(8, LifetimeClass::Persistent).unwrap();
    let vel = registry.create::<Vec3>(8, LifetimeClass::Persistent).unwrap();
    let gate = weft_test_utils::fixtures::Gate::new();
    let hold = scheduler.schedule(gate.task("hold"), 1, &[]).unwrap();
    let accel = scheduler
        .schedule(accelerate_task(&vel, Acceleration::default(), 1.0).unwrap(), 4, &[hold])
        .unwrap();
    let unordered = scheduler.schedule(integrate_task(&pos, &vel, 1.0).unwrap(), 4, &[]);
    assert!(unordered.is_err());
    gate.open();
    accel.complete().unwrap();
}

#[test]
fn point_cloud_cycle_fills_both_derived_arrays() {
    let scheduler = strict_scheduler(4);
    let mut cloud = PointCloud::new(scheduler.registry(), 1000, 42).unwrap();
    for _ in 0..3 {
        cloud.schedule_cycle(&scheduler, 64).unwrap().complete().unwrap();
    }
    let points = cloud.points().unwrap();
    let normalized = cloud.normalized().unwrap();
    let magnitudes = cloud.square_magnitudes().unwrap();
    // Points 0..100 share the center; the step is radius 5.
    assert_eq!(points[0], points[99]);
    assert!(close((points[100] - points[0]).x, 5.0));
    for i in 0..points.len() {
        assert!(close(magnitudes[i], points[i].length_squared()));
        assert_eq!(normalized[i], points[i].normalized());
    }
}

#[test]
fn strided_lane_statistics() {
    let scheduler = strict_scheduler(4);
    let registry = scheduler.registry();
    let input = random_points(17, 1000);
    let points = registry.create_from_slice(&input, LifetimeClass::Persistent).unwrap();
    let distances = registry.create::<f32>(input.len(), LifetimeClass::Persistent).unwrap();
    let confidence = registry.create::<f32>(1, LifetimeClass::Persistent).unwrap();
    let stats = registry.create::<DistanceStats>(1, LifetimeClass::Persistent).unwrap();

    let (conf, st) =
        schedule_slice_stats(&scheduler, &points, &distances, &confidence, &stats, &[]).unwrap();
    scheduler.complete_all(&[conf, st]).unwrap();

    let expected_conf = 2.0 * input.iter().step_by(2).map(|p| p.w).sum::<f32>() / input.len() as f32;
    assert!(close(confidence.to_vec().unwrap()[0], expected_conf));

    let d: Vec<f32> = input.iter().map(|p| (p.x.abs() + p.z.abs()).sqrt()).collect();
    assert_eq!(distances.to_vec().unwrap(), d);
    let s = stats.to_vec().unwrap()[0];
    assert_eq!(s.min, d.iter().copied().fold(f32::MAX, f32::min));
    assert_eq!(s.max, d.iter().copied().fold(f32::MIN, f32::max));
    assert!(close(s.mean, d.iter().sum::<f32>() / d.len() as f32));
}

#[test]
fn changed_points_feed_slice_statistics() {
    let scheduler = strict_scheduler(4);
    let registry = scheduler.registry();
    let input = random_points(23, 1000);
    let points = registry.create_from_slice(&input, LifetimeClass::Persistent).unwrap();
    let distances = registry.create::<f32>(input.len(), LifetimeClass::Persistent).unwrap();
    let confidence = registry.create::<f32>(1, LifetimeClass::Persistent).unwrap();
    let stats = registry.create::<DistanceStats>(1, LifetimeClass::Persistent).unwrap();

    // sin(0.2) * 0.5 is below 0.3, so even points keep their values.
    let change = PointChange::at(0.2, 0.4);
    assert!(change.sin_noise < 0.3);
    let (conf, st) = schedule_slice_frame(
        &scheduler,
        &points,
        change,
        &distances,
        &confidence,
        &stats,
        &[],
    )
    .unwrap();
    scheduler.complete_all(&[conf, st]).unwrap();

    let expected: Vec<_> = input
        .iter()
        .enumerate()
        .map(|(i, &p)| if i % 2 == 0 { p } else { change.point(i) })
        .collect();
    assert_eq!(points.to_vec().unwrap(), expected);
    assert!(close(expected[1].x, 0.5 + 0.001 - change.sin_noise));
    assert!(close(expected[1].w, 0.60001));

    let d: Vec<f32> = expected.iter().map(|p| (p.x.abs() + p.z.abs()).sqrt()).collect();
    assert_eq!(distances.to_vec().unwrap(), d);
    let expected_conf =
        2.0 * expected.iter().step_by(2).map(|p| p.w).sum::<f32>() / expected.len() as f32;
    assert!(close(confidence.to_vec().unwrap()[0], expected_conf));
    assert_eq!(stats.to_vec().unwrap()[0].max, d.iter().copied().fold(f32::MIN, f32::max));
}

#[test]
fn statistics_without_ordering_race_with_point_changes() {
    let scheduler = strict_scheduler(2);
    let registry = scheduler.registry();
    let points = registry
        .create_from_slice(&random_points(3, 64), LifetimeClass::Persistent)
        .unwrap();
    let distances = registry.create::<f32>(64, LifetimeClass::Persistent).unwrap();
    let confidence = registry.create::<f32>(1, LifetimeClass::Persistent).unwrap();
    let stats = registry.create::<DistanceStats>(1, LifetimeClass::Persistent).unwrap();

    let gate = weft_test_utils::fixtures::Gate::new();
    let hold = scheduler.schedule(gate.task("hold"), 1, &[]).unwrap();
    let change = scheduler
        .schedule(change_points_task(&points, PointChange::at(1.0, 0.5)).unwrap(), 16, &[hold])
        .unwrap();
    let err = schedule_slice_stats(&scheduler, &points, &distances, &confidence, &stats, &[])
        .unwrap_err();
    assert!(matches!(err, ScheduleError::DataRace(_)), "{err:?}");
    gate.open();
    change.complete().unwrap();
}

#[test]
fn average_height_over_the_y_lane() {
    let scheduler = strict_scheduler(2);
    let registry = scheduler.registry();
    let input = random_points(8, 257);
    let points = registry.create_from_slice(&input, LifetimeClass::Persistent).unwrap();
    let average = registry.create::<f32>(1, LifetimeClass::Persistent).unwrap();
    scheduler
        .schedule(average_height_task(&points, 0.25, &average).unwrap(), 1, &[])
        .unwrap()
        .complete()
        .unwrap();
    let expected = input.iter().map(|p| (0.25 - p.y).abs()).sum::<f32>() / input.len() as f32;
    assert!(close(average.to_vec().unwrap()[0], expected));
}

//! Weft frame loop: several per-frame workloads sharing one scheduler.
//!
//! Demonstrates:
//!   1. Building a scheduler and allocating persistent and scoped buffers
//!   2. Chained stages (motion, mesh), fan-out/fan-in (point cloud),
//!      concurrent disjoint strided views (RGB channels), and a perturbed
//!      cloud feeding strided lane statistics
//!   3. The two-phase cycle: `begin_cycle` + schedule, then `complete`
//!   4. Metrics and the shutdown report
//!
//! Run with:
//!   RUST_LOG=weft_sched=debug cargo run --example frame_loop

use std::time::Instant;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing_subscriber::EnvFilter;
use weft_core::LifetimeClass;
use weft_kernels::channel::schedule_rgb;
use weft_kernels::motion::Acceleration;
use weft_kernels::point_cloud::{random_points, schedule_slice_frame};
use weft_kernels::{
    ChannelEffect, ChannelOrder, ChannelParams, DeformingMesh, DistanceStats, ImageSize,
    MotionSystem, PointChange, PointCloud, Rgba32, Vec3,
};
use weft_sched::{Scheduler, SchedulerConfig};

// ─── Frame parameters ───────────────────────────────────────────

const FRAMES: u64 = 120;
const DT: f32 = 1.0 / 60.0;
const OBJECTS: usize = 10_000;
const IMAGE: ImageSize = ImageSize {
    width: 320,
    height: 240,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    let mut scheduler = Scheduler::new(SchedulerConfig::default())?;
    let registry = scheduler.registry().clone();
    tracing::info!(workers = scheduler.worker_count(), "scheduler ready");

    // ─── Persistent state ───────────────────────────────────────

    let initial: Vec<Vec3> = (0..OBJECTS).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
    let mut motion = MotionSystem::new(&registry, &initial, Acceleration::default())?;
    let mut cloud = PointCloud::new(&registry, OBJECTS, 7)?;

    let frame: Vec<Rgba32> = (0..IMAGE.pixels())
        .map(|i| Rgba32::new(i as u8, (i / 3) as u8, (i / 7) as u8, 255))
        .collect();
    let pixels = registry.create_from_slice(&frame, LifetimeClass::Persistent)?;
    let effect = ChannelParams {
        line_skip: 2,
        ..ChannelParams::new(ChannelEffect::Complement, Rgba32::new(40, 80, 120, 0), IMAGE)
    };

    let slice_points = registry.create_from_slice(&random_points(11, OBJECTS), LifetimeClass::Persistent)?;
    let distances = registry.create::<f32>(OBJECTS, LifetimeClass::Persistent)?;
    let mut rng = ChaCha8Rng::seed_from_u64(5);

    let normals: Vec<Vec3> = initial.iter().map(|v| v.normalized()).collect();
    let mut mesh = DeformingMesh::new(&registry, &initial, &normals, 0.1)?;
    let start = Instant::now();

    for n in 0..FRAMES {
        scheduler.begin_cycle()?;

        // Scoped per-frame outputs, released before the next boundary.
        let mut confidence = registry.create::<f32>(1, LifetimeClass::scoped(1))?;
        let mut stats = registry.create::<DistanceStats>(1, LifetimeClass::scoped(1))?;

        let time = n as f32 * DT;
        motion.step(&scheduler, DT)?;
        mesh.deform(&scheduler, time)?;
        let points = cloud.schedule_cycle(&scheduler, 64)?;
        let channels = schedule_rgb(&scheduler, &pixels, &effect, ChannelOrder::Concurrent, &[])?;
        let change = PointChange::at(time, rng.random_range(0.0..1.0));
        let (conf, dist) = schedule_slice_frame(
            &scheduler,
            &slice_points,
            change,
            &distances,
            &confidence,
            &stats,
            &[],
        )?;

        motion.complete()?;
        mesh.complete()?;
        scheduler.complete_all(&[points, channels, conf, dist])?;

        if n % 30 == 0 {
            let s = stats.to_vec()?[0];
            tracing::info!(
                frame = n,
                confidence = confidence.to_vec()?[0],
                distance_mean = s.mean,
                distance_min = s.min,
                distance_max = s.max,
                "frame complete"
            );
        }
        confidence.release()?;
        stats.release()?;
    }

    let elapsed = start.elapsed();
    let last = motion.positions()?[OBJECTS - 1];
    tracing::info!(
        frames = FRAMES,
        ms_per_frame = elapsed.as_secs_f64() * 1000.0 / FRAMES as f64,
        last_x = last.x,
        "loop finished"
    );

    let metrics = scheduler.metrics();
    tracing::info!(?metrics, "scheduler metrics");
    let report = scheduler.shutdown();
    tracing::info!(?report, "shutdown");
    Ok(())
}

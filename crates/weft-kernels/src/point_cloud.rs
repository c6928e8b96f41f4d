//! Point-cloud stages: generation, normalisation, magnitudes, and strided
//! statistics over `Vec4` clouds whose `w` lane holds a confidence. Those
//! clouds are perturbed each cycle by [`change_points_task`] ahead of the
//! statistics.

use bytemuck::{Pod, Zeroable};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use weft_buffer::{Buffer, BufferRegistry};
use weft_core::{AccessMode, BufferError, LifetimeClass, ScheduleError};
use weft_sched::{Scheduler, Task, TaskHandle};

use crate::math::{Vec3, Vec4};

/// Radius the generator spreads points over.
pub const DEFAULT_RADIUS: f32 = 5.0;

/// `points[i] = center + ONE * (i / 100) * radius`, with integer division.
pub fn generate_task(points: &Buffer<Vec3>, center: Vec3, radius: f32) -> Result<Task, BufferError> {
    let view = points.view_all(AccessMode::WriteOnly)?;
    Ok(Task::parallel_for("generate", view.len(), view, move |i, v| {
        v.set(i, center + Vec3::ONE * ((i / 100) as f32 * radius));
    }))
}

/// `normalized[i] = points[i].normalized()`.
pub fn normalize_task(points: &Buffer<Vec3>, normalized: &Buffer<Vec3>) -> Result<Task, BufferError> {
    let views = (
        points.view_all(AccessMode::ReadOnly)?,
        normalized.view_all(AccessMode::WriteOnly)?,
    );
    Ok(Task::parallel_for("normalize", points.len(), views, |i, (src, dst)| {
        dst.set(i, src.get(i).normalized());
    }))
}

/// `magnitudes[i] = |points[i]|^2`.
pub fn square_magnitude_task(
    points: &Buffer<Vec3>,
    magnitudes: &Buffer<f32>,
) -> Result<Task, BufferError> {
    let views = (
        points.view_all(AccessMode::ReadOnly)?,
        magnitudes.view_all(AccessMode::WriteOnly)?,
    );
    Ok(Task::parallel_for("square-magnitude", points.len(), views, |i, (src, dst)| {
        dst.set(i, src.get(i).length_squared());
    }))
}

/// A regenerated point cloud with two derived arrays.
///
/// Each cycle the generator runs first; normalisation and magnitudes then
/// run side by side, both reading the generated points.
pub struct PointCloud {
    points: Buffer<Vec3>,
    normalized: Buffer<Vec3>,
    magnitudes: Buffer<f32>,
    radius: f32,
    rng: ChaCha8Rng,
}

impl PointCloud {
    /// Allocate a cloud of `count` points with a seeded center sequence.
    pub fn new(registry: &BufferRegistry, count: usize, seed: u64) -> Result<Self, BufferError> {
        Ok(Self {
            points: registry.create(count, LifetimeClass::Persistent)?,
            normalized: registry.create(count, LifetimeClass::Persistent)?,
            magnitudes: registry.create(count, LifetimeClass::Persistent)?,
            radius: DEFAULT_RADIUS,
            rng: ChaCha8Rng::seed_from_u64(seed),
        })
    }

    /// Schedule generate → {normalize, square-magnitude}. The returned
    /// handle completes when both derived arrays are ready.
    pub fn schedule_cycle(&mut self, scheduler: &Scheduler, batch_width: usize) -> Result<TaskHandle, ScheduleError> {
        let center = Vec3::random_in_unit_sphere(&mut self.rng) * 2.0;
        tracing::trace!(points = self.points.len(), ?center, "point cloud cycle");
        let generate = scheduler.schedule(
            generate_task(&self.points, center, self.radius)?,
            batch_width,
            &[],
        )?;
        let after = std::slice::from_ref(&generate);
        let magnitudes = scheduler.schedule(
            square_magnitude_task(&self.points, &self.magnitudes)?,
            batch_width,
            after,
        )?;
        let normalized = scheduler.schedule(
            normalize_task(&self.points, &self.normalized)?,
            batch_width,
            after,
        )?;
        scheduler.combine(&[magnitudes, normalized])
    }

    /// Generated points.
    pub fn points(&self) -> Result<Vec<Vec3>, BufferError> {
        self.points.to_vec()
    }

    /// Unit-length copies of the points.
    pub fn normalized(&self) -> Result<Vec<Vec3>, BufferError> {
        self.normalized.to_vec()
    }

    /// Squared magnitudes of the points.
    pub fn square_magnitudes(&self) -> Result<Vec<f32>, BufferError> {
        self.magnitudes.to_vec()
    }
}

// ── Strided statistics over Vec4 clouds ────────────────────────────

/// A point inside the unit sphere with a confidence in `[0, 1)`.
pub fn random_point<R: Rng + ?Sized>(rng: &mut R) -> Vec4 {
    let p = Vec3::random_in_unit_sphere(rng);
    Vec4::new(p.x, p.y, p.z, rng.random_range(0.0..1.0))
}

/// `count` seeded [`random_point`]s.
pub fn random_points(seed: u64, count: usize) -> Vec<Vec4> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count).map(|_| random_point(&mut rng)).collect()
}

/// Per-cycle perturbation applied by [`change_points_task`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointChange {
    /// `sin(time) * noise`.
    pub sin_noise: f32,
    /// `cos(time) * noise`.
    pub cos_noise: f32,
    /// Noise level in `[0, 1]`.
    pub noise: f32,
}

impl PointChange {
    /// Perturbation at `time` seconds for a uniform sample `random` in
    /// `[0, 1)`. The noise level is `clamp(random + 0.1, 0, 1)`.
    pub fn at(time: f32, random: f32) -> Self {
        let noise = (random + 0.1).clamp(0.0, 1.0);
        Self {
            sin_noise: time.sin() * noise,
            cos_noise: time.cos() * noise,
            noise,
        }
    }

    /// Whether point `i` keeps its value this cycle.
    pub fn skips(&self, i: usize) -> bool {
        (i % 2 == 0 && self.sin_noise < 0.3) || self.sin_noise > 0.9
    }

    /// The value written to point `i` when it is not skipped.
    pub fn point(&self, i: usize) -> Vec4 {
        Vec4::new(
            self.noise + i as f32 * 0.001 - self.sin_noise,
            self.cos_noise,
            self.sin_noise,
            (0.1 + self.noise + 0.00001 * i as f32).clamp(0.0, 1.0),
        )
    }
}

/// Overwrite the points that [`PointChange::skips`] does not exclude.
pub fn change_points_task(points: &Buffer<Vec4>, change: PointChange) -> Result<Task, BufferError> {
    let view = points.view_all(AccessMode::WriteOnly)?;
    Ok(Task::parallel_for("change-points", view.len(), view, move |i, v| {
        if !change.skips(i) {
            v.set(i, change.point(i));
        }
    }))
}

/// Single task writing the mean `|reference - y|` over the `y` lane to
/// `average[0]`.
pub fn average_height_task(
    points: &Buffer<Vec4>,
    reference: f32,
    average: &Buffer<f32>,
) -> Result<Task, BufferError> {
    let views = (
        points.field_view::<f32>(Vec4::Y_OFFSET, AccessMode::ReadOnly)?,
        average.view::<f32>(0, 4, 1, AccessMode::WriteOnly)?,
    );
    Ok(Task::single("average-height", views, move |(y, out)| {
        let sum: f32 = (0..y.len()).map(|i| (reference - y.get(i)).abs()).sum();
        out.set(0, sum / y.len() as f32);
    }))
}

/// Estimate the mean confidence from every `sample_stride`-th `w` value.
///
/// Single task; writes `sample_stride * sum / len` to `average[0]`. A
/// stride of 0 is treated as 1.
pub fn confidence_average_task(
    points: &Buffer<Vec4>,
    sample_stride: usize,
    average: &Buffer<f32>,
) -> Result<Task, BufferError> {
    let step = sample_stride.max(1);
    let views = (
        points.field_view::<f32>(Vec4::W_OFFSET, AccessMode::ReadOnly)?,
        average.view::<f32>(0, 4, 1, AccessMode::WriteOnly)?,
    );
    Ok(Task::single("confidence-average", views, move |(confidence, out)| {
        let len = confidence.len();
        let end = (len + 1).saturating_sub(step);
        let total: f32 = (0..end).step_by(step).map(|i| confidence.get(i)).sum();
        out.set(0, step as f32 * total / len as f32);
    }))
}

/// Per point, the square root of the summed absolute `x` and `z` offsets
/// from `reference`: `sqrt(|rx - x| + |rz - z|)`.
pub fn horizontal_distance_task(
    points: &Buffer<Vec4>,
    reference: [f32; 2],
    distances: &Buffer<f32>,
) -> Result<Task, BufferError> {
    let views = (
        points.field_view::<f32>(Vec4::X_OFFSET, AccessMode::ReadOnly)?,
        points.field_view::<f32>(Vec4::Z_OFFSET, AccessMode::ReadOnly)?,
        distances.view_all(AccessMode::WriteOnly)?,
    );
    let [rx, rz] = reference;
    Ok(Task::parallel_for("horizontal-distance", points.len(), views, move |i, (x, z, out)| {
        let dx = (rx - x.get(i)).abs();
        let dz = (rz - z.get(i)).abs();
        out.set(i, (dx + dz).sqrt());
    }))
}

/// Mean, minimum and maximum of a distance array.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct DistanceStats {
    /// Arithmetic mean.
    pub mean: f32,
    /// Smallest value.
    pub min: f32,
    /// Largest value.
    pub max: f32,
}

/// Single task reducing `distances` into `stats[0]`.
pub fn distance_stats_task(
    distances: &Buffer<f32>,
    stats: &Buffer<DistanceStats>,
) -> Result<Task, BufferError> {
    let views = (
        distances.view_all(AccessMode::ReadOnly)?,
        stats.view::<DistanceStats>(0, size_of::<DistanceStats>(), 1, AccessMode::WriteOnly)?,
    );
    Ok(Task::single("distance-stats", views, |(distances, out)| {
        let mut stats = DistanceStats {
            mean: 0.0,
            min: f32::MAX,
            max: f32::MIN,
        };
        let mut sum = 0.0;
        for i in 0..distances.len() {
            let d = distances.get(i);
            stats.min = stats.min.min(d);
            stats.max = stats.max.max(d);
            sum += d;
        }
        stats.mean = sum / distances.len() as f32;
        out.set(0, stats);
    }))
}

/// Schedule horizontal distances then their statistics, and the confidence
/// average alongside, all after `prerequisites`. Returns
/// `(confidence, stats)` handles.
pub fn schedule_slice_stats(
    scheduler: &Scheduler,
    points: &Buffer<Vec4>,
    distances: &Buffer<f32>,
    confidence: &Buffer<f32>,
    stats: &Buffer<DistanceStats>,
    prerequisites: &[TaskHandle],
) -> Result<(TaskHandle, TaskHandle), ScheduleError> {
    let confidence = scheduler.schedule(
        confidence_average_task(points, 2, confidence)?,
        1,
        prerequisites,
    )?;
    let distance = scheduler.schedule(
        horizontal_distance_task(points, [0.0, 0.0], distances)?,
        128,
        prerequisites,
    )?;
    let stats = scheduler.schedule(distance_stats_task(distances, stats)?, 1, &[distance])?;
    Ok((confidence, stats))
}

/// Perturb the cloud with `change`, then schedule
/// [`schedule_slice_stats`] after it. Returns `(confidence, stats)`.
pub fn schedule_slice_frame(
    scheduler: &Scheduler,
    points: &Buffer<Vec4>,
    change: PointChange,
    distances: &Buffer<f32>,
    confidence: &Buffer<f32>,
    stats: &Buffer<DistanceStats>,
    prerequisites: &[TaskHandle],
) -> Result<(TaskHandle, TaskHandle), ScheduleError> {
    let changed = scheduler.schedule(change_points_task(points, change)?, 64, prerequisites)?;
    schedule_slice_stats(scheduler, points, distances, confidence, stats, &[changed])
}

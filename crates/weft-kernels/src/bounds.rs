//! Axis-aligned bounds queries: ray hits, point containment, box overlap.

use bytemuck::{Pod, Zeroable};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use weft_buffer::Buffer;
use weft_core::{AccessMode, BufferError, ScheduleError};
use weft_sched::{Scheduler, Task, TaskHandle};

use crate::math::Vec3;

/// An axis-aligned box stored as center and half-size.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Aabb {
    /// Box center.
    pub center: Vec3,
    /// Half the size along each axis.
    pub extents: Vec3,
}

impl Aabb {
    /// A box of `size` centred on `center`.
    pub fn new(center: Vec3, size: Vec3) -> Self {
        Self {
            center,
            extents: size * 0.5,
        }
    }

    /// Smallest corner.
    pub fn min(&self) -> Vec3 {
        self.center - self.extents
    }

    /// Largest corner.
    pub fn max(&self) -> Vec3 {
        self.center + self.extents
    }

    /// Whether `point` lies inside or on the surface.
    pub fn contains(&self, point: Vec3) -> bool {
        let (lo, hi) = (self.min(), self.max());
        (lo.x..=hi.x).contains(&point.x)
            && (lo.y..=hi.y).contains(&point.y)
            && (lo.z..=hi.z).contains(&point.z)
    }

    /// Whether the two boxes touch or overlap.
    pub fn intersects(&self, other: &Aabb) -> bool {
        let (a_lo, a_hi) = (self.min(), self.max());
        let (b_lo, b_hi) = (other.min(), other.max());
        a_lo.x <= b_hi.x
            && a_hi.x >= b_lo.x
            && a_lo.y <= b_hi.y
            && a_hi.y >= b_lo.y
            && a_lo.z <= b_hi.z
            && a_hi.z >= b_lo.z
    }

    /// Slab test: whether the ray hits the box at some `t >= 0`. A ray that
    /// starts inside the box hits it.
    pub fn intersects_ray(&self, ray: &Ray) -> bool {
        let (lo, hi) = (self.min(), self.max());
        let mut t_near = 0.0f32;
        let mut t_far = f32::INFINITY;
        for (origin, dir, lo, hi) in [
            (ray.origin.x, ray.direction.x, lo.x, hi.x),
            (ray.origin.y, ray.direction.y, lo.y, hi.y),
            (ray.origin.z, ray.direction.z, lo.z, hi.z),
        ] {
            if dir.abs() < f32::EPSILON {
                if origin < lo || origin > hi {
                    return false;
                }
                continue;
            }
            let inv = 1.0 / dir;
            let (t0, t1) = ((lo - origin) * inv, (hi - origin) * inv);
            t_near = t_near.max(t0.min(t1));
            t_far = t_far.min(t0.max(t1));
            if t_near > t_far {
                return false;
            }
        }
        true
    }
}

/// A half-line from `origin` along `direction`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Ray {
    /// Start point.
    pub origin: Vec3,
    /// Direction; need not be normalised.
    pub direction: Vec3,
}

/// `count` unit cubes placed uniformly inside a sphere of `radius`.
pub fn random_cubes(seed: u64, count: usize, radius: f32) -> Vec<Aabb> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    (0..count)
        .map(|_| Aabb::new(Vec3::random_in_unit_sphere(&mut rng) * radius, Vec3::ONE))
        .collect()
}

/// `hits[i] = 1` if `ray` hits `bounds[i]`, else 0.
pub fn ray_hits_task(bounds: &Buffer<Aabb>, ray: Ray, hits: &Buffer<u32>) -> Result<Task, BufferError> {
    let views = (
        bounds.view_all(AccessMode::ReadOnly)?,
        hits.view_all(AccessMode::WriteOnly)?,
    );
    Ok(Task::parallel_for("ray-hits", bounds.len(), views, move |i, (b, out)| {
        out.set(i, u32::from(b.get(i).intersects_ray(&ray)));
    }))
}

/// `hits[i] = 1` if `bounds[i]` contains `point`, else 0.
pub fn contains_point_task(
    bounds: &Buffer<Aabb>,
    point: Vec3,
    hits: &Buffer<u32>,
) -> Result<Task, BufferError> {
    let views = (
        bounds.view_all(AccessMode::ReadOnly)?,
        hits.view_all(AccessMode::WriteOnly)?,
    );
    Ok(Task::parallel_for("contains-point", bounds.len(), views, move |i, (b, out)| {
        out.set(i, u32::from(b.get(i).contains(point)));
    }))
}

/// `hits[i] = 1` if `bounds[i]` intersects `query`, else 0.
pub fn overlap_task(bounds: &Buffer<Aabb>, query: Aabb, hits: &Buffer<u32>) -> Result<Task, BufferError> {
    let views = (
        bounds.view_all(AccessMode::ReadOnly)?,
        hits.view_all(AccessMode::WriteOnly)?,
    );
    Ok(Task::parallel_for("overlap", bounds.len(), views, move |i, (b, out)| {
        out.set(i, u32::from(b.get(i).intersects(&query)));
    }))
}

/// Single task compacting the flagged boxes into `out`, in index order,
/// stopping when `out` is full. Writes the number copied to `count[0]`.
pub fn collect_hits_task(
    bounds: &Buffer<Aabb>,
    hits: &Buffer<u32>,
    out: &Buffer<Aabb>,
    count: &Buffer<u32>,
) -> Result<Task, BufferError> {
    let views = (
        bounds.view_all(AccessMode::ReadOnly)?,
        hits.view_all(AccessMode::ReadOnly)?,
        out.view_all(AccessMode::WriteOnly)?,
        count.view::<u32>(0, 4, 1, AccessMode::WriteOnly)?,
    );
    Ok(Task::single("collect-hits", views, |(bounds, hits, out, count)| {
        let mut written = 0;
        for i in 0..bounds.len() {
            if written == out.len() {
                break;
            }
            if hits.get(i) == 1 {
                out.set(written, bounds.get(i));
                written += 1;
            }
        }
        count.set(0, written as u32);
    }))
}

/// Schedule ray flags then compaction. The returned handle completes once
/// `out` and `count` hold the result.
pub fn schedule_ray_query(
    scheduler: &Scheduler,
    bounds: &Buffer<Aabb>,
    ray: Ray,
    hits: &Buffer<u32>,
    out: &Buffer<Aabb>,
    count: &Buffer<u32>,
) -> Result<TaskHandle, ScheduleError> {
    let flags = scheduler.schedule(ray_hits_task(bounds, ray, hits)?, 64, &[])?;
    scheduler.schedule(collect_hits_task(bounds, hits, out, count)?, 1, &[flags])
}

//! Velocity and position integration for a set of moving objects.
//!
//! Two chained stages per cycle: [`accelerate_task`] writes velocities,
//! [`integrate_task`] reads them and writes positions.

use weft_buffer::{Buffer, BufferRegistry};
use weft_core::{AccessMode, BufferError, LifetimeClass, ScheduleError, TaskError};
use weft_sched::{Chain, Scheduler, Task, TaskHandle};

use crate::math::Vec3;

/// Acceleration applied per cycle. Object `i` receives
/// `base + per_index * i`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Acceleration {
    /// Shared term.
    pub base: Vec3,
    /// Term scaled by the object index.
    pub per_index: Vec3,
}

impl Default for Acceleration {
    fn default() -> Self {
        Self {
            base: Vec3::new(0.0002, 0.0001, 0.0002),
            per_index: Vec3::new(0.0001, 0.0001, 0.0001),
        }
    }
}

/// `velocity[i] += (base + per_index * i) * dt`.
pub fn accelerate_task(
    velocities: &Buffer<Vec3>,
    acceleration: Acceleration,
    dt: f32,
) -> Result<Task, BufferError> {
    let view = velocities.view_all(AccessMode::ReadWrite)?;
    Ok(Task::parallel_for("accelerate", view.len(), view, move |i, v| {
        let a = acceleration.base + acceleration.per_index * i as f32;
        v.update(i, |vel| vel + a * dt);
    }))
}

/// `position[i] += velocity[i] * dt`.
pub fn integrate_task(
    positions: &Buffer<Vec3>,
    velocities: &Buffer<Vec3>,
    dt: f32,
) -> Result<Task, BufferError> {
    let views = (
        velocities.view_all(AccessMode::ReadOnly)?,
        positions.view_all(AccessMode::ReadWrite)?,
    );
    Ok(Task::parallel_for("integrate", positions.len(), views, move |i, (vel, pos)| {
        let v = vel.get(i);
        pos.update(i, |p| p + v * dt);
    }))
}

/// Positions and velocities of `count` objects, stepped once per cycle.
pub struct MotionSystem {
    positions: Buffer<Vec3>,
    velocities: Buffer<Vec3>,
    acceleration: Acceleration,
    batch_width: usize,
    chain: Chain,
}

impl MotionSystem {
    /// Default objects per batch.
    pub const DEFAULT_BATCH_WIDTH: usize = 64;

    /// Allocate state for objects starting at `initial` with zero velocity.
    pub fn new(
        registry: &BufferRegistry,
        initial: &[Vec3],
        acceleration: Acceleration,
    ) -> Result<Self, BufferError> {
        Ok(Self {
            positions: registry.create_from_slice(initial, LifetimeClass::Persistent)?,
            velocities: registry.create(initial.len(), LifetimeClass::Persistent)?,
            acceleration,
            batch_width: Self::DEFAULT_BATCH_WIDTH,
            chain: Chain::new(),
        })
    }

    /// Override the objects-per-batch tuning knob.
    pub fn with_batch_width(mut self, batch_width: usize) -> Self {
        self.batch_width = batch_width;
        self
    }

    /// Schedule one accelerate + integrate step after the previous step.
    pub fn step(&mut self, scheduler: &Scheduler, dt: f32) -> Result<TaskHandle, ScheduleError> {
        let accelerate = accelerate_task(&self.velocities, self.acceleration, dt)?;
        self.chain.schedule(scheduler, accelerate, self.batch_width)?;
        let integrate = integrate_task(&self.positions, &self.velocities, dt)?;
        self.chain.schedule(scheduler, integrate, self.batch_width)
    }

    /// Wait for the last scheduled step.
    pub fn complete(&mut self) -> Result<(), TaskError> {
        self.chain.complete()
    }

    /// Current positions. Fails while a step is outstanding.
    pub fn positions(&self) -> Result<Vec<Vec3>, BufferError> {
        self.positions.to_vec()
    }

    /// Current velocities. Fails while a step is outstanding.
    pub fn velocities(&self) -> Result<Vec<Vec3>, BufferError> {
        self.velocities.to_vec()
    }
}

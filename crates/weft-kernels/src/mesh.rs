//! Per-vertex mesh deformation.
//!
//! [`displace_vertices_task`] shifts every vertex by a sine sway plus a
//! noise offset along the diagonal. [`deform_along_normals_task`] pushes
//! vertices along their normals and bends the normals with the same noise.
//! Both are one parallel-for over the vertex array.

use weft_buffer::{Buffer, BufferRegistry};
use weft_core::{AccessMode, BufferError, LifetimeClass, ScheduleError, TaskError};
use weft_sched::{Chain, Scheduler, Task, TaskHandle};

use crate::math::{perlin, Vec3};

/// Time-dependent parameters of one deformation pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Wave {
    /// `sin(time)`.
    pub sin_time: f32,
    /// `cos(time)`.
    pub cos_time: f32,
    /// Effective strength.
    pub strength: f32,
}

impl Wave {
    /// Divisor mapping a user-facing strength in `0.05..=1` to the
    /// displacement actually applied.
    pub const STRENGTH_SCALE: f32 = 5.0;

    /// Parameters at `time` seconds for a user-facing `strength`.
    pub fn at(time: f32, strength: f32) -> Self {
        Self {
            sin_time: time.sin(),
            cos_time: time.cos(),
            strength: strength / Self::STRENGTH_SCALE,
        }
    }
}

/// `v = v - ONE * sin * s + ONE * perlin(v.z, v.y) * s`.
pub fn displace_vertices_task(vertices: &Buffer<Vec3>, wave: Wave) -> Result<Task, BufferError> {
    let view = vertices.view_all(AccessMode::ReadWrite)?;
    Ok(Task::parallel_for("displace-vertices", view.len(), view, move |i, v| {
        v.update(i, |p| {
            let noise = perlin(p.z, p.y) * wave.strength;
            p - Vec3::ONE * (wave.sin_time * wave.strength) + Vec3::ONE * noise
        });
    }))
}

/// Push each vertex along its normal and tilt the normal:
///
/// - `n = perlin(v.z, v.y * v.x) * 2s`
/// - `v = v - normal * sin * s + normal * n`
/// - `normal += ONE * cos * n`
pub fn deform_along_normals_task(
    vertices: &Buffer<Vec3>,
    normals: &Buffer<Vec3>,
    wave: Wave,
) -> Result<Task, BufferError> {
    let views = (
        vertices.view_all(AccessMode::ReadWrite)?,
        normals.view_all(AccessMode::ReadWrite)?,
    );
    Ok(Task::parallel_for(
        "deform-along-normals",
        vertices.len(),
        views,
        move |i, (vertices, normals)| {
            let vertex = vertices.get(i);
            let normal = normals.get(i);
            let noise = perlin(vertex.z, vertex.y * vertex.x) * wave.strength * 2.0;
            let sway = normal * (wave.sin_time * wave.strength);
            vertices.set(i, vertex - sway + normal * noise);
            normals.set(i, normal + Vec3::ONE * (wave.cos_time * noise));
        },
    ))
}

/// A mesh whose vertices and normals are deformed once per cycle.
pub struct DeformingMesh {
    vertices: Buffer<Vec3>,
    normals: Buffer<Vec3>,
    strength: f32,
    batch_width: usize,
    chain: Chain,
}

impl DeformingMesh {
    /// Default vertices per batch.
    pub const DEFAULT_BATCH_WIDTH: usize = 64;

    /// Copy `vertices` and `normals` into persistent buffers.
    ///
    /// Fails with [`BufferError::LengthMismatch`] when the arrays differ in
    /// length.
    pub fn new(
        registry: &BufferRegistry,
        vertices: &[Vec3],
        normals: &[Vec3],
        strength: f32,
    ) -> Result<Self, BufferError> {
        let vertices = registry.create_from_slice(vertices, LifetimeClass::Persistent)?;
        let mut normal_buffer = registry.create(vertices.len(), LifetimeClass::Persistent)?;
        normal_buffer.copy_from(normals)?;
        Ok(Self {
            vertices,
            normals: normal_buffer,
            strength,
            batch_width: Self::DEFAULT_BATCH_WIDTH,
            chain: Chain::new(),
        })
    }

    /// Override the vertices-per-batch tuning knob.
    pub fn with_batch_width(mut self, batch_width: usize) -> Self {
        self.batch_width = batch_width;
        self
    }

    /// Schedule one deformation at `time` seconds after the previous one.
    pub fn deform(&mut self, scheduler: &Scheduler, time: f32) -> Result<TaskHandle, ScheduleError> {
        let wave = Wave::at(time, self.strength);
        let task = deform_along_normals_task(&self.vertices, &self.normals, wave)?;
        self.chain.schedule(scheduler, task, self.batch_width)
    }

    /// Wait for the last scheduled deformation.
    pub fn complete(&mut self) -> Result<(), TaskError> {
        self.chain.complete()
    }

    /// Current vertices. Fails while a deformation is outstanding.
    pub fn vertices(&self) -> Result<Vec<Vec3>, BufferError> {
        self.vertices.to_vec()
    }

    /// Current normals. Fails while a deformation is outstanding.
    pub fn normals(&self) -> Result<Vec<Vec3>, BufferError> {
        self.normals.to_vec()
    }
}

//! Reference payloads for the Weft job scheduler.
//!
//! Realistic per-frame workloads that exercise buffers, strided views and
//! dependency chains end to end:
//!
//! - [`channel`]: per-channel RGB effects over stride-4 byte views.
//! - [`motion`]: chained velocity and position integration.
//! - [`point_cloud`]: generation with fan-out stages, plus strided lane
//!   statistics over `Vec4` clouds.
//! - [`bounds`]: parallel ray and box queries followed by a compaction task.
//! - [`mesh`]: per-vertex deformation of vertices and normals.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bounds;
pub mod channel;
pub mod math;
pub mod mesh;
pub mod motion;
pub mod point_cloud;

pub use bounds::{Aabb, Ray};
pub use channel::{Channel, ChannelEffect, ChannelOrder, ChannelParams, ImageSize, Rgba32};
pub use math::{Vec3, Vec4};
pub use mesh::{DeformingMesh, Wave};
pub use motion::{Acceleration, MotionSystem};
pub use point_cloud::{DistanceStats, PointChange, PointCloud};

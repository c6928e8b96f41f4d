//! Plain-old-data vector types and gradient noise shared by the kernels.

use std::ops::{Add, AddAssign, Mul, Sub};

use bytemuck::{Pod, Zeroable};
use rand::Rng;

/// A 3-component `f32` vector, laid out as `[x, y, z]`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vec3 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
}

impl Vec3 {
    /// All zeros.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);
    /// All ones.
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Build from components.
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Squared Euclidean length.
    pub fn length_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    /// Euclidean length.
    pub fn length(self) -> f32 {
        self.length_squared().sqrt()
    }

    /// Unit vector in the same direction; vectors too short to normalise
    /// map to zero.
    pub fn normalized(self) -> Self {
        let len = self.length();
        if len > 1e-5 {
            self * (1.0 / len)
        } else {
            Self::ZERO
        }
    }

    /// Component-wise absolute value.
    pub fn abs(self) -> Self {
        Self::new(self.x.abs(), self.y.abs(), self.z.abs())
    }

    /// Uniform sample from the solid unit sphere (rejection sampling).
    pub fn random_in_unit_sphere<R: Rng + ?Sized>(rng: &mut R) -> Self {
        loop {
            let v = Self::new(
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
                rng.random_range(-1.0..1.0),
            );
            if v.length_squared() <= 1.0 {
                return v;
            }
        }
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// A 4-component `f32` vector, laid out as `[x, y, z, w]`.
///
/// Point clouds store a position in `xyz` and a confidence in `w`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vec4 {
    /// X component.
    pub x: f32,
    /// Y component.
    pub y: f32,
    /// Z component.
    pub z: f32,
    /// W component.
    pub w: f32,
}

impl Vec4 {
    /// Byte offset of `x` within the struct.
    pub const X_OFFSET: usize = 0;
    /// Byte offset of `y` within the struct.
    pub const Y_OFFSET: usize = 4;
    /// Byte offset of `z` within the struct.
    pub const Z_OFFSET: usize = 8;
    /// Byte offset of `w` within the struct.
    pub const W_OFFSET: usize = 12;

    /// Build from components.
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }
}

/// Lattice hash picking one of eight gradient directions.
fn gradient(ix: i32, iy: i32, dx: f32, dy: f32) -> f32 {
    let mut h = (ix as u32).wrapping_mul(0x27d4_eb2d) ^ (iy as u32).wrapping_mul(0x1656_67b1);
    h ^= h >> 15;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    match h & 7 {
        0 => dx + dy,
        1 => dx - dy,
        2 => -dx + dy,
        3 => -dx - dy,
        4 => dx,
        5 => -dx,
        6 => dy,
        _ => -dy,
    }
}

fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Two-dimensional gradient noise in `[0, 1]`.
///
/// Deterministic and continuous; exactly `0.5` on integer lattice points.
pub fn perlin(x: f32, y: f32) -> f32 {
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (ix, iy) = (x0 as i32, y0 as i32);
    let (u, v) = (fade(fx), fade(fy));
    let bottom = lerp(
        gradient(ix, iy, fx, fy),
        gradient(ix.wrapping_add(1), iy, fx - 1.0, fy),
        u,
    );
    let top = lerp(
        gradient(ix, iy.wrapping_add(1), fx, fy - 1.0),
        gradient(ix.wrapping_add(1), iy.wrapping_add(1), fx - 1.0, fy - 1.0),
        u,
    );
    (lerp(bottom, top, v) * 0.5 + 0.5).clamp(0.0, 1.0)
}

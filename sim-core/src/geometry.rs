//! Toroidal geometry helpers.
//!
//! The world's edges are identified (left = right, top = bottom), so every
//! displacement is reduced to its minimal wrapped form before use.

use glam::Vec2;

use crate::error::ConfigError;
use crate::particle::SubParticle;

/// Signed minimal displacement along one axis of length `len`.
///
/// Returns `d - len * round(d / len)`, whose magnitude never exceeds `len / 2`.
#[inline]
pub fn toroidal_delta(d: f32, len: f32) -> f32 {
    d - len * (d / len).round()
}

/// Dimensions of the toroidal domain `[0, width) x [0, height)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct World {
    pub width: f32,
    pub height: f32,
}

impl World {
    pub fn new(width: f32, height: f32) -> Result<Self, ConfigError> {
        if !(width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0) {
            return Err(ConfigError::InvalidConfig(
                "world dimensions must be positive",
            ));
        }
        Ok(Self { width, height })
    }

    /// Minimal wrapped displacement pointing from `from` to `to`.
    #[inline]
    pub fn delta(&self, from: Vec2, to: Vec2) -> Vec2 {
        Vec2::new(
            toroidal_delta(to.x - from.x, self.width),
            toroidal_delta(to.y - from.y, self.height),
        )
    }

    #[inline]
    pub fn distance(&self, a: Vec2, b: Vec2) -> f32 {
        self.delta(a, b).length()
    }

    /// Wraps a position into `[0, width) x [0, height)`.
    #[inline]
    pub fn wrap(&self, p: Vec2) -> Vec2 {
        Vec2::new(wrap_axis(p.x, self.width), wrap_axis(p.y, self.height))
    }

    #[inline]
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }
}

#[inline]
fn wrap_axis(v: f32, len: f32) -> f32 {
    let w = v.rem_euclid(len);
    // rem_euclid of a tiny negative value can round up to exactly `len`.
    if w >= len { 0.0 } else { w }
}

/// Cheap enclosing circle used as a broad-phase reject.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingCircle {
    pub center: Vec2,
    pub radius: f32,
}

impl BoundingCircle {
    /// Computes the bounding circle of a particle set.
    ///
    /// The center is the wrapped mean position, averaged as offsets from the
    /// first particle so that clusters straddling an edge are not torn apart.
    /// The radius reaches the far edge of the outermost particle.
    ///
    /// Returns `None` for an empty slice.
    pub fn of(particles: &[SubParticle], world: &World) -> Option<Self> {
        let anchor = particles.first()?.pos;
        let sum: Vec2 = particles
            .iter()
            .map(|p| world.delta(anchor, p.pos))
            .sum();
        let center = world.wrap(anchor + sum / particles.len() as f32);
        let radius = particles
            .iter()
            .map(|p| world.distance(center, p.pos) + p.radius)
            .fold(0.0_f32, f32::max);
        Some(Self { center, radius })
    }

    #[inline]
    pub fn overlaps(&self, other: &BoundingCircle, world: &World) -> bool {
        world.distance(self.center, other.center) < self.radius + other.radius
    }

    #[inline]
    pub fn contains(&self, p: Vec2, world: &World) -> bool {
        world.distance(self.center, p) < self.radius
    }
}

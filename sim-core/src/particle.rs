use glam::{Vec2, Vec3};
use rand::Rng;

use crate::geometry::World;
use crate::types::Rgb;

/// The indivisible circular unit of the simulation.
///
/// Radius is fixed for the particle's lifetime; color channels are kept
/// inside the configured `[color_min, color_max]` range by every mutation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubParticle {
    pub pos: Vec2,
    pub radius: f32,
    pub color: Rgb,
}

impl SubParticle {
    pub fn new(pos: Vec2, radius: f32, color: Rgb) -> Self {
        Self { pos, radius, color }
    }

    /// Spawns a particle at a uniform position with a uniform color in range.
    pub fn random(
        world: &World,
        radius: f32,
        color_min: u8,
        color_max: u8,
        rng: &mut impl Rng,
    ) -> Self {
        let pos = Vec2::new(
            rng.random_range(0.0..world.width),
            rng.random_range(0.0..world.height),
        );
        let color = [
            rng.random_range(color_min..=color_max),
            rng.random_range(color_min..=color_max),
            rng.random_range(color_min..=color_max),
        ];
        Self::new(pos, radius, color)
    }

    /// True when the two circles overlap under toroidal distance.
    #[inline]
    pub fn overlaps(&self, other: &SubParticle, world: &World) -> bool {
        world.distance(self.pos, other.pos) < self.radius + other.radius
    }
}

#[inline]
pub fn color_vec(c: Rgb) -> Vec3 {
    Vec3::new(c[0] as f32, c[1] as f32, c[2] as f32)
}

/// Euclidean distance between two colors in RGB space.
#[inline]
pub fn color_distance(a: Rgb, b: Rgb) -> f32 {
    color_vec(a).distance(color_vec(b))
}

/// Mean color of a particle set, `Vec3::ZERO` when empty.
pub fn mean_color(particles: &[SubParticle]) -> Vec3 {
    if particles.is_empty() {
        return Vec3::ZERO;
    }
    let sum: Vec3 = particles.iter().map(|p| color_vec(p.color)).sum();
    sum / particles.len() as f32
}

#[inline]
pub fn clamp_channel(value: i32, min: u8, max: u8) -> u8 {
    value.clamp(i32::from(min), i32::from(max)) as u8
}

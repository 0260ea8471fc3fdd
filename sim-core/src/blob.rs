use std::collections::{BTreeMap, BTreeSet};

use glam::{Vec2, Vec3};
use rand::Rng;

use crate::config::Config;
use crate::geometry::{BoundingCircle, World};
use crate::particle::{SubParticle, mean_color};
use crate::types::BlobId;

/// An aggregate ("blob"): one or more sub-particles sharing a velocity.
///
/// A blob with no particles is not a valid entity; the driver prunes such
/// blobs in the same frame they become empty.
#[derive(Clone, Debug, Default)]
pub struct Blob {
    pub particles: Vec<SubParticle>,
    pub velocity: Vec2,
    /// Aggregates this one has been attracted to before. Kept symmetric by
    /// [`crate::population::Population`].
    pub bonded: BTreeSet<BlobId>,
    /// Frames left before this blob may merge again.
    pub merge_cooldown: u32,
    /// Escalating bounce intensity per partner, used in flock mode.
    pub collision_memory: BTreeMap<BlobId, f32>,
}

impl Blob {
    pub fn new(particles: Vec<SubParticle>, velocity: Vec2) -> Self {
        Self {
            particles,
            velocity,
            ..Self::default()
        }
    }

    pub fn singleton(particle: SubParticle, velocity: Vec2) -> Self {
        Self::new(vec![particle], velocity)
    }

    /// Spawns a singleton at a random position with a random color and a
    /// velocity drawn uniformly from `[-normal_speed, normal_speed]` per axis.
    pub fn random(world: &World, cfg: &Config, rng: &mut impl Rng) -> Self {
        let particle = SubParticle::random(
            world,
            cfg.blob_radius,
            cfg.color_min,
            cfg.color_max,
            rng,
        );
        let velocity = random_kick(cfg.normal_speed, rng);
        Self::singleton(particle, velocity)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    #[inline]
    pub fn speed(&self) -> f32 {
        self.velocity.length()
    }

    pub fn mean_color(&self) -> Vec3 {
        mean_color(&self.particles)
    }

    pub fn bounding_circle(&self, world: &World) -> Option<BoundingCircle> {
        BoundingCircle::of(&self.particles, world)
    }

    /// Moves every particle by `offset`, wrapping into the world.
    pub fn translate(&mut self, offset: Vec2, world: &World) {
        for p in &mut self.particles {
            p.pos = world.wrap(p.pos + offset);
        }
    }

    /// Builds a blob descended from `self`: same bonded set and cooldown,
    /// velocity perturbed by up to `kick` per axis.
    pub fn offspring(&self, particles: Vec<SubParticle>, kick: f32, rng: &mut impl Rng) -> Self {
        Self {
            particles,
            velocity: self.velocity + random_kick(kick, rng),
            bonded: self.bonded.clone(),
            merge_cooldown: self.merge_cooldown,
            collision_memory: BTreeMap::new(),
        }
    }

    pub fn tick_cooldown(&mut self) {
        self.merge_cooldown = self.merge_cooldown.saturating_sub(1);
    }

    /// Decays every collision-memory entry, forgetting those below 0.1.
    pub fn decay_collision_memory(&mut self, decay: f32) {
        self.collision_memory.retain(|_, m| {
            *m *= decay;
            *m >= 0.1
        });
    }
}

/// Uniform per-axis velocity perturbation in `[-bound, bound]`.
pub fn random_kick(bound: f32, rng: &mut impl Rng) -> Vec2 {
    if bound <= 0.0 {
        return Vec2::ZERO;
    }
    Vec2::new(
        rng.random_range(-bound..=bound),
        rng.random_range(-bound..=bound),
    )
}

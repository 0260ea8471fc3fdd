//! Per-frame motion of aggregates.
//!
//! Each frame is split into `substeps`. In every substep a particle moves by
//! its share of the aggregate velocity plus a repulsion term pushing it away
//! from crowded siblings, the total is clamped to `radius * max_step_fraction`,
//! a small jitter is added and the result is wrapped into the world.

use glam::Vec2;
use rand::Rng;

use crate::blob::Blob;
use crate::config::Config;
use crate::displacement::DisplacementBuffer;
use crate::error::ConfigError;
use crate::geometry::World;
use crate::population::Population;
use crate::spatial_grid::SpatialGrid;
use crate::types::ParticleRef;

/// Reusable scratch state for moving aggregates.
///
/// Holds a grid for intra-aggregate neighbor lookups and a displacement
/// buffer, both reused across aggregates and frames.
#[derive(Debug)]
pub struct Integrator {
    grid: SpatialGrid,
    repulsion: DisplacementBuffer,
}

impl Integrator {
    pub fn new(cfg: &Config, world: &World) -> Result<Self, ConfigError> {
        Ok(Self {
            grid: SpatialGrid::new(cfg.cell_size, world)?,
            repulsion: DisplacementBuffer::default(),
        })
    }

    /// Advances one aggregate through all substeps of a frame.
    ///
    /// Only particle positions change; velocity, colors and radii are left
    /// untouched.
    pub fn move_blob(&mut self, blob: &mut Blob, world: &World, cfg: &Config, rng: &mut impl Rng) {
        let substeps = cfg.substeps.max(1);
        let base = blob.velocity / substeps as f32;
        let n = blob.particles.len();
        if n == 0 {
            return;
        }
        // Larger aggregates push gentler per particle; faster ones harder.
        let strength = cfg.repulsion_strength / (n as f32).sqrt()
            * (1.0 + blob.speed() / cfg.repulsion_speed_scale);

        for _ in 0..substeps {
            self.accumulate_repulsion(blob, world, cfg.buffer_factor, strength);

            for (i, p) in blob.particles.iter_mut().enumerate() {
                let limit = p.radius * cfg.max_step_fraction;
                let step = (base + self.repulsion.total(i)).clamp_length_max(limit);
                let jitter = if cfg.jitter > 0.0 {
                    Vec2::new(
                        rng.random_range(-cfg.jitter..=cfg.jitter),
                        rng.random_range(-cfg.jitter..=cfg.jitter),
                    )
                } else {
                    Vec2::ZERO
                };
                p.pos = world.wrap(p.pos + step + jitter);
            }
        }
    }

    /// Fills the repulsion buffer from the aggregate's current positions.
    ///
    /// A neighbor inside the zone `(r1 + r2) * buffer_factor` contributes
    /// `strength * (zone - d) / zone` along the direction away from it.
    /// Coincident particles contribute nothing.
    fn accumulate_repulsion(&mut self, blob: &Blob, world: &World, buffer_factor: f32, strength: f32) {
        let particles = &blob.particles;
        self.repulsion.ensure_len(particles.len());
        if particles.len() < 2 || strength <= 0.0 {
            return;
        }

        self.grid.clear();
        for (i, p) in particles.iter().enumerate() {
            self.grid.insert(p.pos, ParticleRef::new(0, i));
        }

        let grid = &self.grid;
        let repulsion = &mut self.repulsion;
        for (i, p) in particles.iter().enumerate() {
            grid.for_each_nearby(p.pos, |other| {
                if other.particle == i {
                    return;
                }
                let q = &particles[other.particle];
                let zone = (p.radius + q.radius) * buffer_factor;
                let away = world.delta(q.pos, p.pos);
                let d = away.length();
                if d <= 0.0 || d >= zone {
                    return;
                }
                repulsion.add(i, away / d * ((zone - d) / zone) * strength);
            });
        }
    }
}

/// Moves every aggregate in the population by one frame.
pub fn movement_phase(
    population: &mut Population,
    integrator: &mut Integrator,
    world: &World,
    cfg: &Config,
    rng: &mut impl Rng,
) {
    for blob in population.blobs_mut() {
        integrator.move_blob(blob, world, cfg, rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::SubParticle;
    use rand::{SeedableRng, rngs::SmallRng};

    fn still_cfg() -> Config {
        Config {
            jitter: 0.0,
            substeps: 1,
            ..Config::default()
        }
    }

    #[test]
    fn singleton_moves_by_velocity_and_wraps() {
        let world = World::new(100.0, 100.0).expect("world");
        let cfg = still_cfg();
        let mut integrator = Integrator::new(&cfg, &world).expect("integrator");
        let mut rng = SmallRng::seed_from_u64(0);
        let mut blob = Blob::singleton(
            SubParticle::new(Vec2::new(99.5, 0.2), 10.0, [0; 3]),
            Vec2::new(1.0, -0.5),
        );
        integrator.move_blob(&mut blob, &world, &cfg, &mut rng);
        let p = blob.particles[0].pos;
        assert!((p.x - 0.5).abs() < 1e-4, "{p:?}");
        assert!((p.y - 99.7).abs() < 1e-4, "{p:?}");
    }

    #[test]
    fn step_is_clamped_to_fraction_of_radius() {
        let world = World::new(1000.0, 1000.0).expect("world");
        let cfg = still_cfg();
        let mut integrator = Integrator::new(&cfg, &world).expect("integrator");
        let mut rng = SmallRng::seed_from_u64(0);
        let start = Vec2::new(500.0, 500.0);
        let mut blob = Blob::singleton(SubParticle::new(start, 4.0, [0; 3]), Vec2::new(50.0, 0.0));
        integrator.move_blob(&mut blob, &world, &cfg, &mut rng);
        let moved = world.distance(start, blob.particles[0].pos);
        assert!((moved - 4.0 * cfg.max_step_fraction).abs() < 1e-4, "moved {moved}");
    }

    #[test]
    fn crowded_siblings_are_pushed_apart() {
        let world = World::new(200.0, 200.0).expect("world");
        let cfg = still_cfg();
        let mut integrator = Integrator::new(&cfg, &world).expect("integrator");
        let mut rng = SmallRng::seed_from_u64(0);
        let mut blob = Blob::new(
            vec![
                SubParticle::new(Vec2::new(100.0, 100.0), 10.0, [0; 3]),
                SubParticle::new(Vec2::new(105.0, 100.0), 10.0, [0; 3]),
            ],
            Vec2::ZERO,
        );
        integrator.move_blob(&mut blob, &world, &cfg, &mut rng);
        let a = blob.particles[0].pos;
        let b = blob.particles[1].pos;
        assert!(a.x < 100.0 && b.x > 105.0, "{a:?} {b:?}");
        assert!((a.y - 100.0).abs() < 1e-5 && (b.y - 100.0).abs() < 1e-5);
        // Symmetric push.
        assert!(((100.0 - a.x) - (b.x - 105.0)).abs() < 1e-4);
    }

    #[test]
    fn coincident_particles_are_left_alone() {
        let world = World::new(200.0, 200.0).expect("world");
        let cfg = still_cfg();
        let mut integrator = Integrator::new(&cfg, &world).expect("integrator");
        let mut rng = SmallRng::seed_from_u64(0);
        let spot = Vec2::new(50.0, 50.0);
        let mut blob = Blob::new(
            vec![
                SubParticle::new(spot, 5.0, [0; 3]),
                SubParticle::new(spot, 5.0, [0; 3]),
            ],
            Vec2::ZERO,
        );
        integrator.move_blob(&mut blob, &world, &cfg, &mut rng);
        assert!(blob.particles.iter().all(|p| p.pos == spot));
    }
}

//! Frame driver tying the phases together.
//!
//! A frame runs, in order:
//! 1. cooldown tick and collision-memory decay,
//! 2. speed regulation, target search (flock mode) and [`movement_phase`],
//! 3. a grid rebuild over a snapshot of aggregate ids,
//! 4. [`scan_phase`] followed by [`apply_phase`],
//! 5. outlier ejection, disconnected split and oversize split (composite
//!    mode only),
//! 6. removal of empty aggregates and stale bonds,
//! 7. the overlap separation post-pass.

use glam::{Vec2, Vec3};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::{debug, info};

use crate::blob::Blob;
use crate::config::Config;
use crate::displacement::DisplacementBuffer;
use crate::error::ConfigError;
use crate::geometry::{BoundingCircle, World};
use crate::integrator::{Integrator, movement_phase};
use crate::interaction::{apply_phase, scan_phase};
use crate::maintenance::{
    drop_empty_phase, eject_outliers_phase, oversize_split_phase, separation_phase,
};
use crate::particle::SubParticle;
use crate::population::Population;
use crate::spatial_grid::SpatialGrid;
use crate::steering::{regulate_speed, target_search_phase};
use crate::topology::split_phase;
use crate::types::BlobId;

/// Counters describing one completed frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Number of frames completed, including this one.
    pub frame: u64,
    pub merges: usize,
    pub flocks: usize,
    pub bounces: usize,
    /// Attracted pairs held back by the per-frame merge budget.
    pub deferred: usize,
    pub ejected: usize,
    pub split: usize,
    pub chunked: usize,
    pub dropped: usize,
    pub separated: usize,
    pub blobs: usize,
    pub particles: usize,
}

/// Read-only view of one aggregate for renderers and loggers.
#[derive(Clone, Copy, Debug)]
pub struct BlobView<'a> {
    pub id: BlobId,
    pub velocity: Vec2,
    pub particles: &'a [SubParticle],
}

impl BlobView<'_> {
    pub fn bounding_circle(&self, world: &World) -> Option<BoundingCircle> {
        BoundingCircle::of(self.particles, world)
    }

    pub fn mean_color(&self) -> Vec3 {
        crate::particle::mean_color(self.particles)
    }
}

/// Owns the population and every piece of scratch state a frame needs.
#[derive(Debug)]
pub struct Simulation {
    config: Config,
    world: World,
    rng: SmallRng,
    seed: u64,
    population: Population,
    integrator: Integrator,
    /// Particle grid used by the interaction scan.
    grid: SpatialGrid,
    /// First-particle grid used by overlap separation.
    scratch: SpatialGrid,
    buffer: DisplacementBuffer,
    frame: u64,
    last: FrameStats,
}

impl Simulation {
    /// Validates `config` and spawns `num_blobs` random singletons.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let mut sim = Self::with_blobs(config, Vec::new())?;
        sim.populate();
        info!(
            seed = sim.seed,
            blobs = sim.population.len(),
            mode = ?sim.config.mode,
            width = sim.world.width,
            height = sim.world.height,
            "simulation initialized"
        );
        Ok(sim)
    }

    /// Validates `config` and starts from the given aggregates instead of a
    /// random population. `num_blobs` is ignored.
    pub fn with_blobs(config: Config, blobs: Vec<Blob>) -> Result<Self, ConfigError> {
        config.validate()?;
        let world = World::new(config.world_width, config.world_height)?;
        let (rng, seed) = config.seeded_rng();
        Ok(Self {
            integrator: Integrator::new(&config, &world)?,
            grid: SpatialGrid::new(config.cell_size, &world)?,
            scratch: SpatialGrid::new(config.cell_size, &world)?,
            population: Population::from_blobs(blobs),
            buffer: DisplacementBuffer::default(),
            config,
            world,
            rng,
            seed,
            frame: 0,
            last: FrameStats::default(),
        })
    }

    fn populate(&mut self) {
        for _ in 0..self.config.num_blobs {
            let blob = Blob::random(&self.world, &self.config, &mut self.rng);
            self.population.insert(blob);
        }
    }

    /// Restarts from a fresh random population drawn from the original seed,
    /// so a reset run replays the same opening.
    pub fn reset(&mut self) {
        self.rng = SmallRng::seed_from_u64(self.seed);
        self.population = Population::new();
        self.frame = 0;
        self.last = FrameStats::default();
        self.populate();
        debug!(seed = self.seed, "simulation reset");
    }

    /// Advances the world by one frame and returns its counters.
    pub fn step(&mut self) -> FrameStats {
        let Self {
            config: cfg,
            world,
            rng,
            population,
            integrator,
            grid,
            scratch,
            buffer,
            frame,
            ..
        } = self;

        for blob in population.blobs_mut() {
            blob.tick_cooldown();
            blob.decay_collision_memory(cfg.collision_memory_decay);
        }

        if cfg.regulate_speed {
            for blob in population.blobs_mut() {
                regulate_speed(blob, cfg, rng);
            }
        }
        if cfg.mode.flocks() {
            target_search_phase(population, world, cfg, rng);
        }
        movement_phase(population, integrator, world, cfg, rng);

        let order = population.ids();
        grid.rebuild(order.iter().map(|&id| &population[id]));
        let scan = scan_phase(population, &order, grid, world, cfg, *frame);
        let report = apply_phase(population, &scan.events, world, cfg, rng);

        let mut stats = FrameStats {
            merges: report.merges,
            flocks: report.flocks,
            bounces: report.bounces,
            deferred: scan.deferred,
            ..FrameStats::default()
        };

        if cfg.mode.merges() {
            stats.ejected = eject_outliers_phase(population, cfg, rng);
            stats.split = split_phase(population, world, cfg, rng);
            stats.chunked = oversize_split_phase(population, cfg, rng);
        }
        stats.dropped = drop_empty_phase(population);
        stats.separated = separation_phase(population, world, scratch, buffer);

        *frame += 1;
        stats.frame = *frame;
        stats.blobs = population.len();
        stats.particles = population.particle_count();

        debug!(
            frame = stats.frame,
            merges = stats.merges,
            flocks = stats.flocks,
            bounces = stats.bounces,
            deferred = stats.deferred,
            ejected = stats.ejected,
            split = stats.split,
            chunked = stats.chunked,
            blobs = stats.blobs,
            particles = stats.particles,
            "frame complete"
        );
        self.last = stats;
        stats
    }

    /// Inserts an extra aggregate, e.g. from a user click.
    pub fn spawn(&mut self, blob: Blob) -> BlobId {
        self.population.insert(blob)
    }

    /// Read-only per-aggregate view of the current state.
    pub fn snapshot(&self) -> impl Iterator<Item = BlobView<'_>> {
        self.population.iter().map(|(id, blob)| BlobView {
            id,
            velocity: blob.velocity,
            particles: &blob.particles,
        })
    }

    #[inline]
    pub fn frame(&self) -> u64 {
        self.frame
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn world(&self) -> &World {
        &self.world
    }

    #[inline]
    pub fn population(&self) -> &Population {
        &self.population
    }

    #[inline]
    pub fn last_stats(&self) -> FrameStats {
        self.last
    }
}

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ConfigError;

/// Selects which interaction stages the engine runs.
///
/// The three modes share one frame pipeline; simpler modes just leave the
/// aggregate-specific stages switched off.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorMode {
    /// Every contact bounces: velocity inversion plus color push.
    Bounce,
    /// Similar or bonded blobs flock (shared velocity); others bounce with
    /// an impulse that escalates with repeated contact.
    Flock,
    /// Full aggregate model: merge, split, outlier ejection, oversize split.
    #[default]
    Composite,
}

impl BehaviorMode {
    /// Whether attracted pairs fuse into one aggregate.
    #[inline]
    pub const fn merges(self) -> bool {
        matches!(self, Self::Composite)
    }

    /// Whether attracted pairs flock instead of merging.
    #[inline]
    pub const fn flocks(self) -> bool {
        matches!(self, Self::Flock)
    }

    /// Whether attraction is evaluated at all.
    #[inline]
    pub const fn attracts(self) -> bool {
        !matches!(self, Self::Bounce)
    }
}

/// Tunable parameters for a simulation run.
///
/// Deserializes from partial documents: any missing key falls back to the
/// value in [`Config::default`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Width of the toroidal world.
    pub world_width: f32,
    /// Height of the toroidal world.
    pub world_height: f32,
    /// Number of singleton blobs spawned at initialization.
    pub num_blobs: usize,
    /// Radius of each spawned sub-particle.
    pub blob_radius: f32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    pub mode: BehaviorMode,

    /// Edge length of a spatial grid cell. Should be at least the largest
    /// particle diameter.
    pub cell_size: f32,
    /// Motion substeps per frame (>= 1).
    pub substeps: u32,
    /// Repulsion zone as a multiple of the radii sum.
    pub buffer_factor: f32,
    /// Base intra-aggregate repulsion strength.
    pub repulsion_strength: f32,
    /// Speed at which repulsion doubles (`1 + speed / k`).
    pub repulsion_speed_scale: f32,
    /// Per-substep displacement cap as a fraction of the particle radius.
    pub max_step_fraction: f32,
    /// Per-axis jitter bound applied every substep.
    pub jitter: f32,

    /// Apply speed damping / minimum speed before motion.
    pub regulate_speed: bool,
    pub normal_speed: f32,
    pub max_speed: f32,
    pub speed_damping: f32,
    /// Velocity added toward a color-matched target (flock mode).
    pub velocity_kick_strength: f32,
    /// Per-frame probability of a target search (flock mode).
    pub target_search_chance: f32,
    /// Multiplicative per-frame decay of collision memory (flock mode).
    pub collision_memory_decay: f32,

    /// Lower bound for every color channel.
    pub color_min: u8,
    /// Upper bound for every color channel.
    pub color_max: u8,
    /// Mean-color distance below which two blobs attract.
    pub attraction_threshold: f32,
    /// Nominal color shift applied on bounce; actual shift is drawn from
    /// `[strength / 2, strength * 3 / 2]`.
    pub color_bounce_strength: u8,

    /// Frames a freshly merged blob must wait before merging again.
    pub merge_cooldown: u32,
    /// Combined speed above which the merge cooldown is scaled up.
    pub fast_merge_speed: f32,
    pub fast_merge_cooldown_scale: f32,
    /// Spread distance on merge, as a fraction of the two largest radii.
    pub spread_factor: f32,

    pub max_subblobs_per_blob: usize,
    /// Color distance from the aggregate mean beyond which a particle is ejected.
    pub outlier_threshold: f32,
    /// Per-axis velocity kick bound given to ejected particles.
    pub eject_kick: f32,
    /// Per-axis velocity perturbation bound given to split products.
    pub split_kick: f32,

    /// Merge events processed per frame; excess pairs wait for later frames.
    pub max_collisions_per_frame: usize,
    /// Only blobs with `index % divisor == frame % divisor` are scanned.
    pub stagger_divisor: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            world_width: 800.0,
            world_height: 600.0,
            num_blobs: 100,
            blob_radius: 10.0,
            rng_seed: None,
            mode: BehaviorMode::Composite,

            cell_size: 20.0,
            substeps: 2,
            buffer_factor: 0.9,
            repulsion_strength: 0.5,
            repulsion_speed_scale: 2.0,
            max_step_fraction: 0.5,
            jitter: 0.1,

            regulate_speed: true,
            normal_speed: 0.5,
            max_speed: 2.0,
            speed_damping: 0.98,
            velocity_kick_strength: 0.1,
            target_search_chance: 1.0,
            collision_memory_decay: 0.9,

            color_min: 100,
            color_max: 200,
            attraction_threshold: 50.0,
            color_bounce_strength: 20,

            merge_cooldown: 30,
            fast_merge_speed: 3.0,
            fast_merge_cooldown_scale: 2.0,
            spread_factor: 0.1,

            max_subblobs_per_blob: 12,
            outlier_threshold: 60.0,
            eject_kick: 1.0,
            split_kick: 0.3,

            max_collisions_per_frame: 8,
            stagger_divisor: 1,
        }
    }
}

impl Config {
    /// Checks every parameter, failing fast on values the engine cannot run with.
    ///
    /// Grid sizing is checked separately by [`crate::spatial_grid::SpatialGrid::new`],
    /// which reports [`ConfigError::EmptyGrid`] or [`ConfigError::GridTooLarge`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite_positive = |v: f32| v.is_finite() && v > 0.0;
        let finite_non_negative = |v: f32| v.is_finite() && v >= 0.0;

        if !finite_positive(self.world_width) || !finite_positive(self.world_height) {
            return Err(ConfigError::InvalidConfig(
                "world dimensions must be positive",
            ));
        }
        if !finite_positive(self.cell_size) {
            return Err(ConfigError::InvalidConfig("cell_size must be positive"));
        }
        if !finite_positive(self.blob_radius) {
            return Err(ConfigError::InvalidConfig("blob_radius must be positive"));
        }
        if self.substeps == 0 {
            return Err(ConfigError::InvalidConfig("substeps must be at least 1"));
        }
        if !finite_positive(self.buffer_factor)
            || !finite_positive(self.max_step_fraction)
            || !finite_positive(self.repulsion_speed_scale)
        {
            return Err(ConfigError::InvalidConfig(
                "buffer_factor, max_step_fraction and repulsion_speed_scale must be positive",
            ));
        }
        if !finite_non_negative(self.repulsion_strength)
            || !finite_non_negative(self.jitter)
            || !finite_non_negative(self.spread_factor)
            || !finite_non_negative(self.eject_kick)
            || !finite_non_negative(self.split_kick)
            || !finite_non_negative(self.velocity_kick_strength)
        {
            return Err(ConfigError::InvalidConfig(
                "strengths, jitter and kicks must be non-negative",
            ));
        }
        if !finite_non_negative(self.normal_speed)
            || !finite_positive(self.max_speed)
            || self.normal_speed > self.max_speed
        {
            return Err(ConfigError::InvalidConfig(
                "speeds must satisfy 0 <= normal_speed <= max_speed",
            ));
        }
        if !(0.0..=1.0).contains(&self.speed_damping)
            || !(0.0..=1.0).contains(&self.collision_memory_decay)
        {
            return Err(ConfigError::InvalidConfig(
                "speed_damping and collision_memory_decay must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.target_search_chance) {
            return Err(ConfigError::InvalidConfig(
                "target_search_chance must be a probability",
            ));
        }
        if self.color_min > self.color_max {
            return Err(ConfigError::InvalidConfig(
                "color_min cannot exceed color_max",
            ));
        }
        if !finite_non_negative(self.attraction_threshold)
            || !finite_positive(self.outlier_threshold)
        {
            return Err(ConfigError::InvalidConfig(
                "attraction_threshold must be non-negative and outlier_threshold positive",
            ));
        }
        if !finite_positive(self.fast_merge_cooldown_scale) || !self.fast_merge_speed.is_finite() {
            return Err(ConfigError::InvalidConfig(
                "fast merge parameters must be finite and the scale positive",
            ));
        }
        if self.max_subblobs_per_blob == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_subblobs_per_blob must be at least 1",
            ));
        }
        if self.stagger_divisor == 0 {
            return Err(ConfigError::InvalidConfig(
                "stagger_divisor must be at least 1",
            ));
        }

        let reach = 2.0 * self.blob_radius * self.buffer_factor.max(1.0);
        if self.cell_size < reach {
            warn!(
                cell_size = self.cell_size,
                required = reach,
                "cell_size below particle reach; neighbor queries may miss contacts"
            );
        }
        Ok(())
    }

    /// Returns an RNG seeded from `rng_seed`, drawing a fresh seed when absent.
    ///
    /// The seed actually used is returned alongside so callers can log it.
    pub fn seeded_rng(&self) -> (SmallRng, u64) {
        let seed = self.rng_seed.unwrap_or_else(rand::random);
        (SmallRng::seed_from_u64(seed), seed)
    }

    /// Inclusive range a bounce color shift is drawn from.
    pub fn color_shift_range(&self) -> (u8, u8) {
        let s = self.color_bounce_strength;
        let lo = (s / 2).max(1);
        let hi = s.saturating_add(s / 2).max(lo);
        (lo, hi)
    }
}

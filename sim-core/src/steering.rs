//! Velocity adjustments applied before motion: speed regulation for every
//! mode and color-driven target search for flock mode.

use std::f32::consts::TAU;

use glam::{Vec2, Vec3};
use rand::{Rng, seq::SliceRandom};

use crate::blob::Blob;
use crate::config::Config;
use crate::geometry::World;
use crate::population::Population;
use crate::types::BlobId;

/// Keeps a blob's speed inside a lively band.
///
/// Above `max_speed` the velocity is damped by `speed_damping`; below
/// `normal_speed` it is rescaled up to `normal_speed` along its heading,
/// or along a random heading when the blob is at rest.
pub fn regulate_speed(blob: &mut Blob, cfg: &Config, rng: &mut impl Rng) {
    let speed = blob.speed();
    if speed > cfg.max_speed {
        blob.velocity *= cfg.speed_damping;
    } else if speed < cfg.normal_speed {
        let heading = if speed > 0.0 {
            blob.velocity / speed
        } else {
            Vec2::from_angle(rng.random_range(0.0..TAU))
        };
        blob.velocity = heading * cfg.normal_speed;
    }
}

/// Nudges blobs toward a color-matched partner.
///
/// Each blob, with probability `target_search_chance`, visits the others in
/// random order and takes the first whose mean color lies within
/// `attraction_threshold`, gaining `velocity_kick_strength` along the
/// wrapped direction toward it. Kicks are computed against the population
/// as it stood when the phase began and applied afterwards.
///
/// ### Returns
/// The number of blobs that received a kick.
pub fn target_search_phase(
    population: &mut Population,
    world: &World,
    cfg: &Config,
    rng: &mut impl Rng,
) -> usize {
    let ids = population.ids();
    let colors: Vec<Vec3> = ids.iter().map(|&id| population[id].mean_color()).collect();
    let centers: Vec<Option<Vec2>> = ids
        .iter()
        .map(|&id| population[id].bounding_circle(world).map(|bc| bc.center))
        .collect();

    let mut order: Vec<usize> = (0..ids.len()).collect();
    let mut kicks: Vec<(BlobId, Vec2)> = Vec::new();
    let chance = f64::from(cfg.target_search_chance);

    for i in 0..ids.len() {
        if !rng.random_bool(chance) {
            continue;
        }
        order.shuffle(rng);
        let target = order
            .iter()
            .copied()
            .find(|&j| j != i && colors[i].distance(colors[j]) < cfg.attraction_threshold);
        if let Some(j) = target
            && let (Some(from), Some(to)) = (centers[i], centers[j])
        {
            let dir = world.delta(from, to).normalize_or_zero();
            kicks.push((ids[i], dir * cfg.velocity_kick_strength));
        }
    }

    let kicked = kicks.len();
    for (id, kick) in kicks {
        population[id].velocity += kick;
    }
    kicked
}

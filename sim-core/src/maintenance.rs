//! Post-interaction housekeeping on the population.
//!
//! Runs after collisions have been resolved: color outliers are spun off,
//! oversized aggregates are chunked, empty aggregates and stale bonds are
//! dropped, and finally overlapping aggregates are nudged apart.

use glam::Vec2;
use rand::Rng;
use tracing::trace;

use crate::blob::{Blob, random_kick};
use crate::config::Config;
use crate::displacement::DisplacementBuffer;
use crate::geometry::{BoundingCircle, World};
use crate::particle::color_vec;
use crate::population::Population;
use crate::spatial_grid::SpatialGrid;
use crate::types::ParticleRef;

/// Spins off particles whose color strays too far from their aggregate.
///
/// For every aggregate with more than one particle, particles whose color
/// lies further than `outlier_threshold` from the aggregate's mean color
/// become new singletons moving at the parent's velocity plus a kick of up
/// to `eject_kick` per axis. Ejected singletons start with no bonds. The
/// particle closest to the mean always stays, so a source is never emptied
/// by ejection alone.
///
/// ### Returns
/// The number of particles ejected.
pub fn eject_outliers_phase(
    population: &mut Population,
    cfg: &Config,
    rng: &mut impl Rng,
) -> usize {
    let mut spawned = Vec::new();

    for (id, blob) in population.iter_mut() {
        if blob.len() < 2 {
            continue;
        }
        let mean = blob.mean_color();
        let distances: Vec<f32> = blob
            .particles
            .iter()
            .map(|p| color_vec(p.color).distance(mean))
            .collect();
        let keeper = distances
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i);

        let before = spawned.len();
        let velocity = blob.velocity;
        let mut index = 0;
        blob.particles.retain(|p| {
            let i = index;
            index += 1;
            if Some(i) == keeper || distances[i] <= cfg.outlier_threshold {
                return true;
            }
            spawned.push(Blob::singleton(*p, velocity + random_kick(cfg.eject_kick, rng)));
            false
        });
        if spawned.len() > before {
            trace!(?id, ejected = spawned.len() - before, "ejected outliers");
        }
    }

    let ejected = spawned.len();
    for blob in spawned {
        population.insert(blob);
    }
    ejected
}

/// Chunks aggregates larger than `max_subblobs_per_blob`.
///
/// Particles are cut in order into chunks of at most that size; each chunk
/// keeps the parent's bonded set and cooldown and gets a velocity
/// perturbed by up to `split_kick` per axis.
///
/// ### Returns
/// The number of aggregates that were chunked.
pub fn oversize_split_phase(
    population: &mut Population,
    cfg: &Config,
    rng: &mut impl Rng,
) -> usize {
    let max = cfg.max_subblobs_per_blob.max(1);
    let mut chunked = 0;
    for id in population.ids() {
        if population[id].len() <= max {
            continue;
        }
        let Some(parent) = population.remove(id) else {
            continue;
        };
        let new_ids: Vec<_> = parent
            .particles
            .chunks(max)
            .map(|chunk| population.insert(parent.offspring(chunk.to_vec(), cfg.split_kick, rng)))
            .collect();
        population.retarget_bonds(&[id], &new_ids);
        trace!(?id, chunks = new_ids.len(), "chunked oversized aggregate");
        chunked += 1;
    }
    chunked
}

/// Removes empty aggregates and forgets bonds to ids that no longer exist.
///
/// ### Returns
/// The number of aggregates dropped.
pub fn drop_empty_phase(population: &mut Population) -> usize {
    let dropped = population.drop_empty();
    let pruned = population.prune_stale_bonds();
    if dropped > 0 || pruned > 0 {
        trace!(dropped, pruned, "dropped empty aggregates");
    }
    dropped
}

/// Pushes overlapping aggregates apart.
///
/// Pairs whose first particles overlap are each moved by half the overlap
/// along the line between those particles. Displacements are gathered
/// first and applied afterwards, translating the whole aggregate. A second
/// pass moves any singleton lying inside a multi-particle aggregate's
/// bounding circle out to just touch its edge. Coincident centers are
/// left where they are.
///
/// ### Parameters
/// - `grid` - Scratch grid, rebuilt here from first particles.
/// - `buffer` - Scratch per-aggregate displacement buffer.
///
/// ### Returns
/// The number of aggregates moved.
pub fn separation_phase(
    population: &mut Population,
    world: &World,
    grid: &mut SpatialGrid,
    buffer: &mut DisplacementBuffer,
) -> usize {
    let ids = population.ids();
    let firsts: Vec<_> = ids
        .iter()
        .map(|&id| population[id].particles.first().copied())
        .collect();
    buffer.ensure_len(ids.len());

    grid.clear();
    for (i, first) in firsts.iter().enumerate() {
        if let Some(p) = first {
            grid.insert(p.pos, ParticleRef::new(i, 0));
        }
    }

    for (i, first) in firsts.iter().enumerate() {
        let Some(a) = first else {
            continue;
        };
        grid.for_each_nearby(a.pos, |other| {
            let j = other.blob;
            if j <= i {
                return;
            }
            let Some(b) = &firsts[j] else {
                return;
            };
            let offset = world.delta(a.pos, b.pos);
            let d = offset.length();
            let overlap = a.radius + b.radius - d;
            if d <= 0.0 || overlap <= 0.0 {
                return;
            }
            let push = offset / d * (overlap * 0.5);
            buffer.add(i, -push);
            buffer.add(j, push);
        });
    }

    let mut moved = 0;
    for i in buffer.displaced_indices() {
        population[ids[i]].translate(buffer.total(i), world);
        moved += 1;
    }
    moved + free_trapped_singletons(population, world)
}

/// Moves singletons out of multi-particle aggregates they sit inside.
fn free_trapped_singletons(population: &mut Population, world: &World) -> usize {
    let containers: Vec<BoundingCircle> = population
        .blobs()
        .filter(|b| b.len() > 1)
        .filter_map(|b| b.bounding_circle(world))
        .collect();
    if containers.is_empty() {
        return 0;
    }

    let mut freed = 0;
    for blob in population.blobs_mut() {
        let [p] = blob.particles.as_slice() else {
            continue;
        };
        let (pos, radius) = (p.pos, p.radius);
        if let Some(nudge) = containers
            .iter()
            .find_map(|bc| escape_offset(bc, pos, radius, world))
        {
            blob.translate(nudge, world);
            freed += 1;
        }
    }
    freed
}

/// Offset that moves a particle of `radius` at `pos` from inside `bc` to
/// just outside its edge, or `None` if it is outside or at the center.
pub fn escape_offset(bc: &BoundingCircle, pos: Vec2, radius: f32, world: &World) -> Option<Vec2> {
    let offset = world.delta(bc.center, pos);
    let d = offset.length();
    (d > 0.0 && d < bc.radius).then(|| offset / d * (bc.radius + radius - d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::SubParticle;
    use rand::{SeedableRng, rngs::SmallRng};

    fn world() -> World {
        World::new(200.0, 200.0).expect("world")
    }

    fn p(x: f32, y: f32, color: [u8; 3]) -> SubParticle {
        SubParticle::new(Vec2::new(x, y), 5.0, color)
    }

    #[test]
    fn outliers_become_unbonded_singletons() {
        let cfg = Config {
            outlier_threshold: 40.0,
            eject_kick: 0.0,
            ..Config::default()
        };
        let mut rng = SmallRng::seed_from_u64(4);
        let mut pop = Population::new();
        let other = pop.insert(Blob::singleton(p(150.0, 150.0, [120; 3]), Vec2::ZERO));
        let source = pop.insert(Blob::new(
            vec![
                p(10.0, 10.0, [120; 3]),
                p(12.0, 10.0, [122; 3]),
                p(14.0, 10.0, [121; 3]),
                p(16.0, 10.0, [200; 3]),
            ],
            Vec2::new(0.5, 0.0),
        ));
        pop.bond(source, other);

        assert_eq!(eject_outliers_phase(&mut pop, &cfg, &mut rng), 1);
        assert_eq!(pop.len(), 3);
        assert_eq!(pop[source].len(), 3);

        let ejected = pop
            .ids()
            .into_iter()
            .find(|&id| id != source && id != other)
            .expect("ejected singleton");
        assert_eq!(pop[ejected].particles[0].color, [200; 3]);
        assert_eq!(pop[ejected].velocity, Vec2::new(0.5, 0.0));
        assert!(pop[ejected].bonded.is_empty());
        assert!(pop.are_bonded(source, other));
    }

    #[test]
    fn singletons_are_never_ejected() {
        let cfg = Config {
            outlier_threshold: 1.0,
            ..Config::default()
        };
        let mut rng = SmallRng::seed_from_u64(4);
        let mut pop = Population::new();
        pop.insert(Blob::singleton(p(10.0, 10.0, [0; 3]), Vec2::ZERO));
        assert_eq!(eject_outliers_phase(&mut pop, &cfg, &mut rng), 0);
        assert_eq!(pop.len(), 1);
    }

    #[test]
    fn two_way_outliers_keep_one_particle_home() {
        let cfg = Config {
            outlier_threshold: 10.0,
            ..Config::default()
        };
        let mut rng = SmallRng::seed_from_u64(4);
        let mut pop = Population::new();
        let source = pop.insert(Blob::new(
            vec![p(10.0, 10.0, [100; 3]), p(12.0, 10.0, [200; 3])],
            Vec2::ZERO,
        ));
        assert_eq!(eject_outliers_phase(&mut pop, &cfg, &mut rng), 1);
        assert_eq!(pop[source].len(), 1);
        assert_eq!(pop.particle_count(), 2);
    }

    #[test]
    fn oversized_blob_is_chunked_keeping_bonds() {
        let cfg = Config {
            max_subblobs_per_blob: 4,
            ..Config::default()
        };
        let mut rng = SmallRng::seed_from_u64(4);
        let mut pop = Population::new();
        let partner = pop.insert(Blob::singleton(p(150.0, 150.0, [120; 3]), Vec2::ZERO));
        let big = pop.insert(Blob::new(
            (0..10).map(|i| p(10.0 + i as f32, 10.0, [120; 3])).collect(),
            Vec2::ZERO,
        ));
        pop.bond(big, partner);

        assert_eq!(oversize_split_phase(&mut pop, &cfg, &mut rng), 1);
        assert!(!pop.contains(big));
        let mut sizes: Vec<_> = pop
            .iter()
            .filter(|(id, _)| *id != partner)
            .map(|(_, b)| b.len())
            .collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![2, 4, 4]);
        assert_eq!(pop[partner].bonded.len(), 3);
        for (id, blob) in pop.iter().filter(|(id, _)| *id != partner) {
            assert!(blob.bonded.contains(&partner));
            assert!(pop.are_bonded(id, partner));
        }
    }

    #[test]
    fn drop_empty_prunes_dangling_bonds() {
        let mut pop = Population::new();
        let a = pop.insert(Blob::singleton(p(10.0, 10.0, [120; 3]), Vec2::ZERO));
        let b = pop.insert(Blob::new(Vec::new(), Vec2::ZERO));
        pop.bond(a, b);
        assert_eq!(drop_empty_phase(&mut pop), 1);
        assert!(!pop.contains(b));
        assert!(pop[a].bonded.is_empty());
    }

    #[test]
    fn overlapping_first_particles_are_pushed_apart_symmetrically() {
        let world = world();
        let mut grid = SpatialGrid::new(20.0, &world).expect("grid");
        let mut buffer = DisplacementBuffer::default();
        let mut pop = Population::new();
        let a = pop.insert(Blob::singleton(p(100.0, 100.0, [120; 3]), Vec2::ZERO));
        let b = pop.insert(Blob::singleton(p(106.0, 100.0, [120; 3]), Vec2::ZERO));

        assert_eq!(separation_phase(&mut pop, &world, &mut grid, &mut buffer), 2);
        // Overlap of 4 split evenly.
        assert!((pop[a].particles[0].pos.x - 98.0).abs() < 1e-4);
        assert!((pop[b].particles[0].pos.x - 108.0).abs() < 1e-4);
    }

    #[test]
    fn separation_works_across_the_seam() {
        let world = world();
        let mut grid = SpatialGrid::new(20.0, &world).expect("grid");
        let mut buffer = DisplacementBuffer::default();
        let mut pop = Population::new();
        let a = pop.insert(Blob::singleton(p(198.0, 50.0, [120; 3]), Vec2::ZERO));
        let b = pop.insert(Blob::singleton(p(2.0, 50.0, [120; 3]), Vec2::ZERO));

        separation_phase(&mut pop, &world, &mut grid, &mut buffer);
        let gap = world.distance(pop[a].particles[0].pos, pop[b].particles[0].pos);
        assert!((gap - 10.0).abs() < 1e-3, "gap {gap}");
    }

    #[test]
    fn trapped_singleton_is_nudged_out() {
        let world = world();
        let mut grid = SpatialGrid::new(20.0, &world).expect("grid");
        let mut buffer = DisplacementBuffer::default();
        let mut pop = Population::new();
        let host = pop.insert(Blob::new(
            vec![
                p(80.0, 100.0, [120; 3]),
                p(90.0, 100.0, [120; 3]),
                p(110.0, 100.0, [120; 3]),
                p(120.0, 100.0, [120; 3]),
            ],
            Vec2::ZERO,
        ));
        let lone = pop.insert(Blob::singleton(p(100.0, 103.0, [120; 3]), Vec2::ZERO));

        separation_phase(&mut pop, &world, &mut grid, &mut buffer);
        let bc = pop[host].bounding_circle(&world).expect("circle");
        let pos = pop[lone].particles[0].pos;
        assert!(!bc.contains(pos, &world), "{pos:?} still inside {bc:?}");
    }

    #[test]
    fn escape_offset_ignores_outside_points() {
        let world = world();
        let bc = BoundingCircle {
            center: Vec2::new(50.0, 50.0),
            radius: 10.0,
        };
        assert!(escape_offset(&bc, Vec2::new(80.0, 50.0), 2.0, &world).is_none());
        assert!(escape_offset(&bc, Vec2::new(50.0, 50.0), 2.0, &world).is_none());
        let off = escape_offset(&bc, Vec2::new(55.0, 50.0), 2.0, &world).expect("inside");
        assert!((off - Vec2::new(7.0, 0.0)).length() < 1e-5);
    }
}

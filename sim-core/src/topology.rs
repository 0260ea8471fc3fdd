//! Connectivity of an aggregate's particles.
//!
//! Two particles of the same aggregate are connected when their circles
//! overlap on the torus. An aggregate whose particles form more than one
//! connected component is replaced by one aggregate per component.

use std::collections::VecDeque;

use rand::Rng;
use tracing::trace;

use crate::blob::Blob;
use crate::config::Config;
use crate::geometry::World;
use crate::particle::SubParticle;
use crate::population::Population;

/// Connected components of `particles` under circle overlap.
///
/// Each component lists particle indices in ascending order; components are
/// ordered by their smallest index.
pub fn connected_components(particles: &[SubParticle], world: &World) -> Vec<Vec<usize>> {
    let n = particles.len();
    let mut seen = vec![false; n];
    let mut components = Vec::new();
    let mut queue = VecDeque::new();

    for start in 0..n {
        if seen[start] {
            continue;
        }
        seen[start] = true;
        queue.push_back(start);
        let mut component = Vec::new();

        while let Some(i) = queue.pop_front() {
            component.push(i);
            for j in 0..n {
                if !seen[j] && particles[i].overlaps(&particles[j], world) {
                    seen[j] = true;
                    queue.push_back(j);
                }
            }
        }
        component.sort_unstable();
        components.push(component);
    }
    components
}

/// Splits a disconnected aggregate into one aggregate per component.
///
/// Returns `None` when the aggregate is connected (or empty). Every child
/// inherits the parent's full bonded set and cooldown, with a velocity
/// perturbed by up to `split_kick` per axis.
pub fn split_disconnected(
    blob: &Blob,
    world: &World,
    cfg: &Config,
    rng: &mut impl Rng,
) -> Option<Vec<Blob>> {
    if blob.len() < 2 {
        return None;
    }
    let components = connected_components(&blob.particles, world);
    if components.len() < 2 {
        return None;
    }
    Some(
        components
            .into_iter()
            .map(|component| {
                let particles = component.into_iter().map(|i| blob.particles[i]).collect();
                blob.offspring(particles, cfg.split_kick, rng)
            })
            .collect(),
    )
}

/// Replaces every disconnected aggregate with its components.
///
/// ### Returns
/// The number of aggregates that were split.
pub fn split_phase(
    population: &mut Population,
    world: &World,
    cfg: &Config,
    rng: &mut impl Rng,
) -> usize {
    let mut split = 0;
    for id in population.ids() {
        let Some(children) = split_disconnected(&population[id], world, cfg, rng) else {
            continue;
        };
        population.remove(id);
        let count = children.len();
        let new_ids: Vec<_> = children.into_iter().map(|c| population.insert(c)).collect();
        population.retarget_bonds(&[id], &new_ids);
        trace!(?id, count, "split disconnected aggregate");
        split += 1;
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use rand::{SeedableRng, rngs::SmallRng};

    fn world() -> World {
        World::new(100.0, 100.0).expect("world")
    }

    fn at(x: f32, y: f32) -> SubParticle {
        SubParticle::new(Vec2::new(x, y), 2.0, [120; 3])
    }

    #[test]
    fn isolated_particle_forms_its_own_component() {
        let particles = [
            at(10.0, 10.0),
            at(13.0, 10.0),
            at(16.0, 10.0),
            at(50.0, 50.0),
            at(19.0, 10.0),
        ];
        let components = connected_components(&particles, &world());
        assert_eq!(components, vec![vec![0, 1, 2, 4], vec![3]]);
    }

    #[test]
    fn components_connect_across_the_seam() {
        let particles = [at(99.0, 50.0), at(1.0, 50.0)];
        assert_eq!(connected_components(&particles, &world()), vec![vec![0, 1]]);
    }

    #[test]
    fn connected_blob_is_left_alone() {
        let cfg = Config::default();
        let mut rng = SmallRng::seed_from_u64(3);
        let blob = Blob::new(vec![at(10.0, 10.0), at(12.0, 10.0)], Vec2::ZERO);
        assert!(split_disconnected(&blob, &world(), &cfg, &mut rng).is_none());
    }

    #[test]
    fn children_inherit_full_bonded_set() {
        let cfg = Config::default();
        let world = world();
        let mut rng = SmallRng::seed_from_u64(3);
        let mut pop = Population::new();
        let partner = pop.insert(Blob::singleton(at(80.0, 80.0), Vec2::ZERO));
        let parent = pop.insert(Blob::new(
            vec![at(10.0, 10.0), at(12.0, 10.0), at(40.0, 40.0)],
            Vec2::new(1.0, 0.0),
        ));
        pop.bond(parent, partner);

        assert_eq!(split_phase(&mut pop, &world, &cfg, &mut rng), 1);
        assert!(!pop.contains(parent));
        assert_eq!(pop.len(), 3);

        let children: Vec<_> = pop.ids().into_iter().filter(|&id| id != partner).collect();
        let mut sizes: Vec<_> = children.iter().map(|&id| pop[id].len()).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, vec![1, 2]);
        for &child in &children {
            assert!(pop[child].bonded.contains(&partner));
            assert!(pop[partner].bonded.contains(&child));
            let dv = pop[child].velocity - Vec2::new(1.0, 0.0);
            assert!(dv.x.abs() <= cfg.split_kick && dv.y.abs() <= cfg.split_kick);
        }
        assert!(!pop[partner].bonded.contains(&parent));
    }
}

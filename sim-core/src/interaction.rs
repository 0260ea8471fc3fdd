//! Collision discovery and resolution between aggregates.
//!
//! Resolution is two-phase:
//!
//! 1. [`scan_phase`] reads a frozen view of the population (plus a grid
//!    built from it) and produces a list of [`InteractionEvent`]s. It never
//!    mutates anything, so neighbor queries stay consistent for the whole
//!    scan and no collision is counted twice.
//! 2. [`apply_phase`] commits those events: merges replace two aggregates
//!    with one, flocks share velocity, bounces invert motion and push the
//!    contacting colors apart.

use std::cmp::Ordering;
use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;
use tracing::trace;

use crate::blob::Blob;
use crate::config::Config;
use crate::geometry::{BoundingCircle, World};
use crate::particle::{SubParticle, clamp_channel};
use crate::population::Population;
use crate::spatial_grid::SpatialGrid;
use crate::types::{BlobId, Rgb};

/// Outcome of the attraction test for a colliding pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attraction {
    /// Previously bonded; always attracts.
    Bonded,
    /// Mean colors are close enough; a new bond will be recorded.
    Similar,
    /// Would attract, but one side is still cooling down from a merge;
    /// nothing happens this frame.
    CoolingDown,
    /// Neither bonded nor similar; the pair bounces.
    Dissimilar,
}

impl Attraction {
    #[inline]
    pub fn attracts(self) -> bool {
        matches!(self, Self::Bonded | Self::Similar)
    }
}

/// Decides whether two colliding aggregates attract.
///
/// Bonds are sticky: once two aggregates have been attracted they stay
/// attracted regardless of color drift. Colors are compared by aggregate
/// mean. A pending merge cooldown on either side vetoes attraction for the
/// frame; it never stops a dissimilar, unbonded pair from bouncing.
pub fn are_attracted(a: &Blob, a_id: BlobId, b: &Blob, b_id: BlobId, cfg: &Config) -> Attraction {
    let attraction = if a.bonded.contains(&b_id) || b.bonded.contains(&a_id) {
        Attraction::Bonded
    } else if a.mean_color().distance(b.mean_color()) < cfg.attraction_threshold {
        Attraction::Similar
    } else {
        return Attraction::Dissimilar;
    };
    if a.merge_cooldown > 0 || b.merge_cooldown > 0 {
        Attraction::CoolingDown
    } else {
        attraction
    }
}

/// A pending effect produced by [`scan_phase`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InteractionEvent {
    /// Fuse `a` and `b` into a single aggregate.
    Merge { a: BlobId, b: BlobId },
    /// Give `a` and `b` their average velocity and bond them.
    Flock { a: BlobId, b: BlobId },
    /// Bounce `a` off `b`; `contact` holds the particle indices that touched.
    Bounce {
        a: BlobId,
        b: BlobId,
        contact: (usize, usize),
    },
}

/// Result of a scan: events to apply plus the merges held back by the
/// per-frame budget.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScanOutcome {
    pub events: Vec<InteractionEvent>,
    pub deferred: usize,
}

/// Counts of applied events.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InteractionReport {
    pub merges: usize,
    pub flocks: usize,
    pub bounces: usize,
}

/// Whether blob `index` is scanned on `frame` under the stagger divisor.
#[inline]
pub fn is_scheduled(index: usize, frame: u64, divisor: u32) -> bool {
    let divisor = u64::from(divisor.max(1));
    index as u64 % divisor == frame % divisor
}

/// First pair of particles (one from each side) whose circles overlap.
pub fn first_contact(a: &Blob, b: &Blob, world: &World) -> Option<(usize, usize)> {
    a.particles.iter().enumerate().find_map(|(i, pa)| {
        b.particles
            .iter()
            .position(|pb| pa.overlaps(pb, world))
            .map(|j| (i, j))
    })
}

/// Discovers collisions and decides their outcome without mutating anything.
///
/// `order` is the snapshot order the grid was rebuilt with, so a grid
/// entry's `blob` field indexes into it. Only blobs scheduled for `frame`
/// initiate checks, each aggregate takes part in at most one event, and no
/// more than `max_collisions_per_frame` merges are emitted. Further
/// attracted pairs are counted as deferred; both sides sit out the rest of
/// the frame.
///
/// ### Parameters
/// - `population` - Read-only view of the aggregates.
/// - `order` - Ids in the order used to build `grid`.
/// - `grid` - Particle grid rebuilt from `order` this frame.
/// - `frame` - Current frame number, used for staggering.
pub fn scan_phase(
    population: &Population,
    order: &[BlobId],
    grid: &SpatialGrid,
    world: &World,
    cfg: &Config,
    frame: u64,
) -> ScanOutcome {
    let circles: Vec<Option<BoundingCircle>> = order
        .iter()
        .map(|&id| population[id].bounding_circle(world))
        .collect();
    let mut engaged = vec![false; order.len()];
    let mut outcome = ScanOutcome::default();
    let mut merges = 0;
    let mut candidates = Vec::new();

    for i in 0..order.len() {
        if engaged[i] || !is_scheduled(i, frame, cfg.stagger_divisor) {
            continue;
        }
        let Some(circle_i) = circles[i] else {
            continue;
        };
        let (id_i, blob_i) = (order[i], &population[order[i]]);

        candidates.clear();
        for p in &blob_i.particles {
            grid.for_each_nearby(p.pos, |r| {
                if r.blob != i {
                    candidates.push(r.blob);
                }
            });
        }
        candidates.sort_unstable();
        candidates.dedup();

        for &j in &candidates {
            if engaged[j] {
                continue;
            }
            let Some(circle_j) = circles[j] else {
                continue;
            };
            if !circle_i.overlaps(&circle_j, world) {
                continue;
            }
            let (id_j, blob_j) = (order[j], &population[order[j]]);
            let Some(contact) = first_contact(blob_i, blob_j, world) else {
                continue;
            };

            let event = match cfg.mode {
                mode if !mode.attracts() => InteractionEvent::Bounce {
                    a: id_i,
                    b: id_j,
                    contact,
                },
                mode => match are_attracted(blob_i, id_i, blob_j, id_j, cfg) {
                    Attraction::CoolingDown => continue,
                    Attraction::Dissimilar => InteractionEvent::Bounce {
                        a: id_i,
                        b: id_j,
                        contact,
                    },
                    _ if mode.merges() => {
                        if merges >= cfg.max_collisions_per_frame {
                            outcome.deferred += 1;
                            engaged[i] = true;
                            engaged[j] = true;
                            break;
                        }
                        merges += 1;
                        InteractionEvent::Merge { a: id_i, b: id_j }
                    }
                    _ => InteractionEvent::Flock { a: id_i, b: id_j },
                },
            };

            engaged[i] = true;
            engaged[j] = true;
            outcome.events.push(event);
            break;
        }
    }
    outcome
}

/// Commits scanned events against the population.
///
/// Events whose aggregates are no longer alive are skipped.
pub fn apply_phase(
    population: &mut Population,
    events: &[InteractionEvent],
    world: &World,
    cfg: &Config,
    rng: &mut impl Rng,
) -> InteractionReport {
    let mut report = InteractionReport::default();
    for &event in events {
        match event {
            InteractionEvent::Merge { a, b } => {
                if !(population.contains(a) && population.contains(b)) {
                    continue;
                }
                let (Some(blob_a), Some(blob_b)) = (population.remove(a), population.remove(b))
                else {
                    continue;
                };
                let merged = merge_blobs(blob_a, blob_b, world, cfg, rng);
                let size = merged.len();
                let id = population.insert(merged);
                population.retarget_bonds(&[a, b], &[id]);
                trace!(?a, ?b, merged = ?id, size, "merge");
                report.merges += 1;
            }
            InteractionEvent::Flock { a, b } => {
                if !(population.contains(a) && population.contains(b)) {
                    continue;
                }
                flock(population, a, b);
                trace!(?a, ?b, "flock");
                report.flocks += 1;
            }
            InteractionEvent::Bounce { a, b, contact } => {
                if !(population.contains(a) && population.contains(b)) {
                    continue;
                }
                if cfg.mode.flocks() {
                    escalating_bounce(population, a, b, contact, world, cfg);
                } else {
                    population[a].velocity = -population[a].velocity;
                    population[b].velocity = -population[b].velocity;
                }
                bounce_colors(population, a, b, contact, cfg, rng);
                trace!(?a, ?b, "bounce");
                report.bounces += 1;
            }
        }
    }
    report
}

/// Fuses two aggregates into one.
///
/// Particles are concatenated and spread, velocity is averaged, bonded sets
/// are unioned, and a fresh cooldown is set (scaled up for fast merges).
/// The caller is responsible for retargeting bonds that named the inputs.
pub fn merge_blobs(a: Blob, b: Blob, world: &World, cfg: &Config, rng: &mut impl Rng) -> Blob {
    let combined_speed = a.speed() + b.speed();
    let velocity = (a.velocity + b.velocity) * 0.5;

    let mut bonded = a.bonded;
    bonded.extend(b.bonded);
    let mut particles = a.particles;
    particles.extend(b.particles);
    spread(&mut particles, combined_speed, world, cfg, rng);

    let merge_cooldown = if combined_speed > cfg.fast_merge_speed {
        (cfg.merge_cooldown as f32 * cfg.fast_merge_cooldown_scale).round() as u32
    } else {
        cfg.merge_cooldown
    };

    Blob {
        particles,
        velocity,
        bonded,
        merge_cooldown,
        ..Blob::default()
    }
}

/// Non-uniform spread applied to freshly merged particles.
///
/// Each particle moves along a random angle by a randomized distance
/// derived from the two largest radii present, growing with speed.
fn spread(
    particles: &mut [SubParticle],
    speed: f32,
    world: &World,
    cfg: &Config,
    rng: &mut impl Rng,
) {
    if cfg.spread_factor <= 0.0 {
        return;
    }
    let (r1, r2) = particles.iter().fold((0.0_f32, 0.0_f32), |(r1, r2), p| {
        if p.radius > r1 {
            (p.radius, r1)
        } else {
            (r1, r2.max(p.radius))
        }
    });
    let base = (r1 + r2) * 0.5 * cfg.spread_factor * (1.0 + speed / cfg.repulsion_speed_scale);
    for p in particles.iter_mut() {
        let angle = rng.random_range(0.0..TAU);
        let distance = base * rng.random_range(0.5..=1.0);
        p.pos = world.wrap(p.pos + Vec2::from_angle(angle) * distance);
    }
}

fn flock(population: &mut Population, a: BlobId, b: BlobId) {
    let avg = (population[a].velocity + population[b].velocity) * 0.5;
    population[a].velocity = avg;
    population[b].velocity = avg;
    population[a].collision_memory.remove(&b);
    population[b].collision_memory.remove(&a);
    population.bond(a, b);
}

/// Upper bound of a collision-memory entry.
const MAX_COLLISION_MEMORY: f32 = 10.0;

/// Normal-impulse bounce whose strength grows with repeated contact.
///
/// Both sides' memory of the other is bumped (starting at 1, capped at
/// [`MAX_COLLISION_MEMORY`]); normal velocity components are exchanged
/// scaled by that intensity and a separation term of half the intensity is
/// added along the normal. Resulting speeds are capped at `max_speed` times
/// the memory cap.
fn escalating_bounce(
    population: &mut Population,
    a: BlobId,
    b: BlobId,
    (ia, ib): (usize, usize),
    world: &World,
    cfg: &Config,
) {
    let bump = |memory: &mut f32| *memory = (*memory + 1.0).min(MAX_COLLISION_MEMORY);
    let intensity = {
        let entry = population[a].collision_memory.entry(b).or_insert(0.0);
        bump(entry);
        *entry
    };
    bump(population[b].collision_memory.entry(a).or_insert(0.0));

    let Some(pa) = population[a].particles.get(ia).map(|p| p.pos) else {
        return;
    };
    let Some(pb) = population[b].particles.get(ib).map(|p| p.pos) else {
        return;
    };
    let offset = world.delta(pb, pa);
    let d = offset.length();
    if d <= 0.0 {
        return;
    }
    let normal = offset / d;
    let multiplier = intensity.max(1.0);

    let va = population[a].velocity;
    let vb = population[b].velocity;
    let (na, nb) = (va.dot(normal), vb.dot(normal));
    let separation = normal * multiplier * 0.5;
    let cap = cfg.max_speed * MAX_COLLISION_MEMORY;
    population[a].velocity =
        (va + normal * (nb - na) * multiplier + separation).clamp_length_max(cap);
    population[b].velocity =
        (vb + normal * (na - nb) * multiplier - separation).clamp_length_max(cap);
}

fn bounce_colors(
    population: &mut Population,
    a: BlobId,
    b: BlobId,
    (ia, ib): (usize, usize),
    cfg: &Config,
    rng: &mut impl Rng,
) {
    let (Some(ca), Some(cb)) = (
        population[a].particles.get(ia).map(|p| p.color),
        population[b].particles.get(ib).map(|p| p.color),
    ) else {
        return;
    };
    let (ca, cb) = push_colors_apart(ca, cb, cfg, rng);
    population[a].particles[ia].color = ca;
    population[b].particles[ib].color = cb;
}

/// Pushes two colors apart channel by channel.
///
/// For each channel a random shift in [`Config::color_shift_range`] raises
/// the higher value and lowers the other; ties pick a side at random.
/// Results are clamped to `[color_min, color_max]`.
pub fn push_colors_apart(mut a: Rgb, mut b: Rgb, cfg: &Config, rng: &mut impl Rng) -> (Rgb, Rgb) {
    let (lo, hi) = cfg.color_shift_range();
    for ch in 0..3 {
        let shift = i32::from(rng.random_range(lo..=hi));
        let a_rises = match a[ch].cmp(&b[ch]) {
            Ordering::Greater => true,
            Ordering::Less => false,
            Ordering::Equal => rng.random_bool(0.5),
        };
        let (da, db) = if a_rises { (shift, -shift) } else { (-shift, shift) };
        a[ch] = clamp_channel(i32::from(a[ch]) + da, cfg.color_min, cfg.color_max);
        b[ch] = clamp_channel(i32::from(b[ch]) + db, cfg.color_min, cfg.color_max);
    }
    (a, b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BehaviorMode;
    use rand::{SeedableRng, rngs::SmallRng};
    use std::collections::BTreeSet;

    fn world() -> World {
        World::new(200.0, 200.0).expect("world")
    }

    fn cfg() -> Config {
        Config {
            color_min: 0,
            color_max: 255,
            attraction_threshold: 30.0,
            ..Config::default()
        }
    }

    fn single(x: f32, y: f32, color: Rgb, velocity: Vec2) -> Blob {
        Blob::singleton(SubParticle::new(Vec2::new(x, y), 10.0, color), velocity)
    }

    fn scan(pop: &Population, cfg: &Config, frame: u64) -> ScanOutcome {
        let world = world();
        let order = pop.ids();
        let mut grid = SpatialGrid::new(cfg.cell_size, &world).expect("grid");
        grid.rebuild(order.iter().map(|&id| &pop[id]));
        scan_phase(pop, &order, &grid, &world, cfg, frame)
    }

    #[test]
    fn cooldown_vetoes_even_bonded_pairs() {
        let cfg = cfg();
        let mut pop = Population::new();
        let a = pop.insert(single(0.0, 0.0, [0; 3], Vec2::ZERO));
        let b = pop.insert(single(0.0, 0.0, [255; 3], Vec2::ZERO));
        pop.bond(a, b);
        assert_eq!(are_attracted(&pop[a], a, &pop[b], b, &cfg), Attraction::Bonded);
        pop[b].merge_cooldown = 3;
        assert_eq!(
            are_attracted(&pop[a], a, &pop[b], b, &cfg),
            Attraction::CoolingDown
        );
    }

    #[test]
    fn cooling_down_dissimilar_pair_still_bounces() {
        let cfg = cfg();
        let mut pop = Population::new();
        let red = pop.insert(single(50.0, 50.0, [255, 0, 0], Vec2::ZERO));
        let green = pop.insert(single(55.0, 50.0, [0, 255, 0], Vec2::ZERO));
        pop[red].merge_cooldown = 5;
        assert_eq!(
            are_attracted(&pop[red], red, &pop[green], green, &cfg),
            Attraction::Dissimilar
        );

        let outcome = scan(&pop, &cfg, 0);
        assert!(matches!(
            outcome.events.as_slice(),
            [InteractionEvent::Bounce { .. }]
        ));

        pop[green].merge_cooldown = 5;
        pop[red].particles[0].color = [0, 250, 0];
        assert!(scan(&pop, &cfg, 0).events.is_empty());
    }

    #[test]
    fn attraction_uses_mean_color() {
        let cfg = cfg();
        let mut pop = Population::new();
        let a = pop.insert(Blob::new(
            vec![
                SubParticle::new(Vec2::ZERO, 1.0, [100, 100, 100]),
                SubParticle::new(Vec2::ZERO, 1.0, [200, 200, 200]),
            ],
            Vec2::ZERO,
        ));
        let b = pop.insert(single(0.0, 0.0, [150, 150, 150], Vec2::ZERO));
        assert_eq!(are_attracted(&pop[a], a, &pop[b], b, &cfg), Attraction::Similar);
    }

    #[test]
    fn scan_is_limited_by_merge_budget() {
        let cfg = Config {
            max_collisions_per_frame: 1,
            ..cfg()
        };
        let mut pop = Population::new();
        pop.insert(single(20.0, 20.0, [100; 3], Vec2::ZERO));
        pop.insert(single(25.0, 20.0, [100; 3], Vec2::ZERO));
        pop.insert(single(120.0, 120.0, [100; 3], Vec2::ZERO));
        pop.insert(single(125.0, 120.0, [100; 3], Vec2::ZERO));

        let outcome = scan(&pop, &cfg, 0);
        let merges = outcome
            .events
            .iter()
            .filter(|e| matches!(e, InteractionEvent::Merge { .. }))
            .count();
        assert_eq!(merges, 1);
        assert_eq!(outcome.deferred, 1);
    }

    #[test]
    fn each_blob_joins_at_most_one_event() {
        let cfg = cfg();
        let mut pop = Population::new();
        for x in [50.0, 55.0, 60.0] {
            pop.insert(single(x, 50.0, [100; 3], Vec2::ZERO));
        }
        let outcome = scan(&pop, &cfg, 0);
        assert_eq!(outcome.events.len(), 1);
    }

    #[test]
    fn stagger_skips_unscheduled_initiators() {
        assert!(is_scheduled(4, 6, 2));
        assert!(!is_scheduled(3, 6, 2));
        assert!(is_scheduled(3, 6, 1));

        let cfg = Config {
            stagger_divisor: 2,
            ..cfg()
        };
        let mut pop = Population::new();
        pop.insert(single(50.0, 50.0, [100; 3], Vec2::ZERO));
        pop.insert(single(55.0, 50.0, [100; 3], Vec2::ZERO));
        // Index 0 initiates on even frames and finds index 1; on odd frames
        // index 1 initiates and finds index 0.
        assert_eq!(scan(&pop, &cfg, 0).events.len(), 1);
        assert_eq!(scan(&pop, &cfg, 1).events.len(), 1);
    }

    #[test]
    fn bounce_mode_never_merges() {
        let cfg = Config {
            mode: BehaviorMode::Bounce,
            ..cfg()
        };
        let mut pop = Population::new();
        pop.insert(single(50.0, 50.0, [100; 3], Vec2::ZERO));
        pop.insert(single(55.0, 50.0, [100; 3], Vec2::ZERO));
        let outcome = scan(&pop, &cfg, 0);
        assert!(matches!(
            outcome.events.as_slice(),
            [InteractionEvent::Bounce { .. }]
        ));
    }

    #[test]
    fn flock_averages_velocity_and_bonds() {
        let cfg = Config {
            mode: BehaviorMode::Flock,
            ..cfg()
        };
        let world = world();
        let mut pop = Population::new();
        let a = pop.insert(single(50.0, 50.0, [100; 3], Vec2::new(1.0, 0.0)));
        let b = pop.insert(single(55.0, 50.0, [105; 3], Vec2::new(0.0, 1.0)));
        let outcome = scan(&pop, &cfg, 0);
        assert_eq!(outcome.events, vec![InteractionEvent::Flock { a, b }]);

        let mut rng = SmallRng::seed_from_u64(5);
        let report = apply_phase(&mut pop, &outcome.events, &world, &cfg, &mut rng);
        assert_eq!(report.flocks, 1);
        assert_eq!(pop[a].velocity, Vec2::new(0.5, 0.5));
        assert_eq!(pop[b].velocity, Vec2::new(0.5, 0.5));
        assert!(pop.are_bonded(a, b));
    }

    #[test]
    fn escalating_bounce_grows_with_repeats() {
        let cfg = Config {
            mode: BehaviorMode::Flock,
            ..cfg()
        };
        let world = world();
        let mut pop = Population::new();
        let a = pop.insert(single(50.0, 50.0, [0; 3], Vec2::ZERO));
        let b = pop.insert(single(60.0, 50.0, [255; 3], Vec2::ZERO));
        let mut rng = SmallRng::seed_from_u64(5);
        let event = InteractionEvent::Bounce {
            a,
            b,
            contact: (0, 0),
        };

        apply_phase(&mut pop, &[event], &world, &cfg, &mut rng);
        assert_eq!(pop[a].collision_memory[&b], 1.0);
        // Pushed apart along the contact normal: a to the left, b to the right.
        assert!((pop[a].velocity - Vec2::new(-0.5, 0.0)).length() < 1e-5);
        assert!((pop[b].velocity - Vec2::new(0.5, 0.0)).length() < 1e-5);

        pop[a].velocity = Vec2::ZERO;
        pop[b].velocity = Vec2::ZERO;
        apply_phase(&mut pop, &[event], &world, &cfg, &mut rng);
        assert_eq!(pop[b].collision_memory[&a], 2.0);
        assert!((pop[a].velocity - Vec2::new(-1.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn merge_keeps_every_particle_and_unions_bonds() {
        let cfg = cfg();
        let world = world();
        let mut keys = slotmap::SlotMap::<BlobId, ()>::with_key();
        let (x, y) = (keys.insert(()), keys.insert(()));

        let mut a = Blob::new(
            vec![
                SubParticle::new(Vec2::new(10.0, 10.0), 10.0, [1; 3]),
                SubParticle::new(Vec2::new(15.0, 10.0), 10.0, [2; 3]),
            ],
            Vec2::new(1.0, 0.0),
        );
        a.bonded.insert(x);
        let mut b = single(20.0, 10.0, [3; 3], Vec2::new(0.0, 1.0));
        b.bonded.insert(y);

        let mut rng = SmallRng::seed_from_u64(11);
        let merged = merge_blobs(a, b, &world, &cfg, &mut rng);
        assert_eq!(merged.len(), 3);
        let mut colors: Vec<Rgb> = merged.particles.iter().map(|p| p.color).collect();
        colors.sort();
        assert_eq!(colors, vec![[1; 3], [2; 3], [3; 3]]);
        assert_eq!(merged.bonded, BTreeSet::from([x, y]));
        assert_eq!(merged.velocity, Vec2::new(0.5, 0.5));
        assert_eq!(merged.merge_cooldown, cfg.merge_cooldown);
    }

    #[test]
    fn fast_merges_cool_down_longer() {
        let cfg = Config {
            fast_merge_speed: 1.0,
            fast_merge_cooldown_scale: 2.0,
            merge_cooldown: 10,
            ..cfg()
        };
        let mut rng = SmallRng::seed_from_u64(1);
        let merged = merge_blobs(
            single(0.0, 0.0, [0; 3], Vec2::new(1.0, 0.0)),
            single(5.0, 0.0, [0; 3], Vec2::new(-1.0, 0.0)),
            &world(),
            &cfg,
            &mut rng,
        );
        assert_eq!(merged.merge_cooldown, 20);
    }

    #[test]
    fn color_push_respects_bounds_and_direction() {
        let cfg = Config {
            color_min: 100,
            color_max: 200,
            color_bounce_strength: 20,
            ..Config::default()
        };
        let mut rng = SmallRng::seed_from_u64(2);
        for _ in 0..100 {
            let (a, b) = push_colors_apart([150, 110, 190], [140, 190, 190], &cfg, &mut rng);
            assert!(a.iter().chain(b.iter()).all(|c| (100..=200).contains(c)));
            assert!(a[0] > 150 && b[0] < 140);
            assert_eq!((a[1], b[1]), (100, 200));
            assert_ne!(a[2], b[2]);
        }
    }
}

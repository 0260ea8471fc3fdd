//! Windowless runner that logs aggregate summaries.

use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use swirly_core::{BlobId, Config, FrameStats, Simulation};
use tracing::info;

/// One logged line per aggregate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AggregateSummary {
    pub id: BlobId,
    pub center: Vec2,
    pub velocity: Vec2,
    pub color: Vec3,
    pub particles: usize,
}

/// Event totals over a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub merges: usize,
    pub flocks: usize,
    pub bounces: usize,
    pub ejected: usize,
    pub split: usize,
}

impl Totals {
    fn add(&mut self, stats: &FrameStats) {
        self.merges += stats.merges;
        self.flocks += stats.flocks;
        self.bounces += stats.bounces;
        self.ejected += stats.ejected;
        self.split += stats.split + stats.chunked;
    }
}

pub fn summarize(sim: &Simulation) -> Vec<AggregateSummary> {
    let world = sim.world();
    sim.snapshot()
        .map(|view| AggregateSummary {
            id: view.id,
            center: view
                .bounding_circle(world)
                .map(|bc| bc.center)
                .unwrap_or_default(),
            velocity: view.velocity,
            color: view.mean_color(),
            particles: view.particles.len(),
        })
        .collect()
}

/// Runs `frames` frames, logging every aggregate each `log_interval` frames.
pub fn run(config: Config, frames: u64, log_interval: u64) -> Result<()> {
    let mut sim = Simulation::new(config).context("failed to build simulation")?;
    let totals = run_frames(&mut sim, frames, log_interval);
    info!(
        frames = sim.frame(),
        seed = sim.seed(),
        blobs = sim.population().len(),
        particles = sim.population().particle_count(),
        merges = totals.merges,
        flocks = totals.flocks,
        bounces = totals.bounces,
        ejected = totals.ejected,
        split = totals.split,
        "headless run complete"
    );
    Ok(())
}

fn run_frames(sim: &mut Simulation, frames: u64, log_interval: u64) -> Totals {
    let interval = log_interval.max(1);
    let mut totals = Totals::default();
    for _ in 0..frames {
        let stats = sim.step();
        totals.add(&stats);
        if stats.frame % interval == 0 {
            for s in summarize(sim) {
                info!(
                    frame = stats.frame,
                    id = ?s.id,
                    x = s.center.x,
                    y = s.center.y,
                    vx = s.velocity.x,
                    vy = s.velocity.y,
                    r = s.color.x,
                    g = s.color.y,
                    b = s.color.z,
                    particles = s.particles,
                    "aggregate"
                );
            }
        }
    }
    totals
}

//! Core toroidal aggregate physics and topology engine.
//!
//! Main components:
//! - [`geometry`]: toroidal displacement, wrapping and bounding circles.
//! - [`particle`], [`blob`], [`population`]: sub-particles, aggregates and
//!   the id table that keeps bonds symmetric.
//! - [`spatial_grid`]: uniform wrapped grid for neighbor queries.
//! - [`integrator`]: substepped motion with intra-aggregate repulsion.
//! - [`steering`]: speed regulation and flock-mode target search.
//! - [`interaction`]: collision scan and merge / flock / bounce resolution.
//! - [`topology`]: connected components and disconnected splits.
//! - [`maintenance`]: outlier ejection, oversize split, overlap separation.
//! - [`simulation`]: the frame driver and read-only snapshots.
//! - [`config`], [`error`], [`types`], [`displacement`]: shared plumbing.

pub mod blob;
pub mod config;
pub mod displacement;
pub mod error;
pub mod geometry;
pub mod integrator;
pub mod interaction;
pub mod maintenance;
pub mod particle;
pub mod population;
pub mod simulation;
pub mod spatial_grid;
pub mod steering;
pub mod topology;
pub mod types;

pub use blob::Blob;
pub use config::{BehaviorMode, Config};
pub use error::ConfigError;
pub use geometry::{BoundingCircle, World, toroidal_delta};
pub use particle::SubParticle;
pub use population::Population;
pub use simulation::{BlobView, FrameStats, Simulation};
pub use types::{BlobId, Rgb};

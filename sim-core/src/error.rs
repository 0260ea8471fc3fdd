use thiserror::Error;

/// Errors raised while validating a [`crate::config::Config`] or building
/// the structures derived from it.
///
/// These are only produced before the first frame runs; a constructed
/// [`crate::simulation::Simulation`] never fails during stepping.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// A parameter is outside its valid range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The cell size leaves no room for even one grid cell along an axis.
    #[error("cell size {cell_size} yields an empty grid for a {width}x{height} world")]
    EmptyGrid { cell_size: f32, width: f32, height: f32 },
    /// The cell size is so small relative to the world that the grid would
    /// exceed [`crate::spatial_grid::MAX_GRID_CELLS`].
    #[error("cell size {cell_size} yields a {cols}x{rows} grid, above the cell limit")]
    GridTooLarge { cell_size: f32, cols: usize, rows: usize },
}

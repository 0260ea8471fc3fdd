//! Uniform grid bucketing of sub-particle positions on the torus.
//!
//! A particle lands in cell `(floor(x / cell_w), floor(y / cell_h))`.
//! Neighbor queries visit the 3x3 block around a cell with coordinates
//! wrapped modulo the grid size, so contacts across the world seam are
//! found like any other.
//!
//! Columns are `floor(width / cell_size)`, which keeps the effective cell
//! width `width / columns` at or above `cell_size`. As long as that is at
//! least the largest particle diameter, a query never misses a colliding
//! pair; it may return extra candidates that exact distance tests reject.

use glam::Vec2;

use crate::blob::Blob;
use crate::error::ConfigError;
use crate::geometry::World;
use crate::types::ParticleRef;

/// Upper bound on `columns * rows` for a single grid.
pub const MAX_GRID_CELLS: usize = 1 << 20;

#[derive(Clone, Debug)]
pub struct SpatialGrid {
    cols: usize,
    rows: usize,
    cell_w: f32,
    cell_h: f32,
    cells: Vec<Vec<ParticleRef>>,
    /// Cells touched since the last clear, so clearing is proportional to
    /// the number of inserted items rather than the grid size.
    occupied: Vec<usize>,
}

impl SpatialGrid {
    pub fn new(cell_size: f32, world: &World) -> Result<Self, ConfigError> {
        let (cols, rows) = Self::dims_for(cell_size, world)?;
        Ok(Self {
            cols,
            rows,
            cell_w: world.width / cols as f32,
            cell_h: world.height / rows as f32,
            cells: vec![Vec::new(); cols * rows],
            occupied: Vec::new(),
        })
    }

    /// Grid dimensions for a cell size, failing when either axis is empty or
    /// the grid would hold more than [`MAX_GRID_CELLS`] cells.
    pub fn dims_for(cell_size: f32, world: &World) -> Result<(usize, usize), ConfigError> {
        let empty = || ConfigError::EmptyGrid {
            cell_size,
            width: world.width,
            height: world.height,
        };
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(empty());
        }
        let cols = (world.width / cell_size).floor();
        let rows = (world.height / cell_size).floor();
        if cols < 1.0 || rows < 1.0 {
            return Err(empty());
        }
        let (cols, rows) = (cols as usize, rows as usize);
        if cols.saturating_mul(rows) > MAX_GRID_CELLS {
            return Err(ConfigError::GridTooLarge {
                cell_size,
                cols,
                rows,
            });
        }
        Ok((cols, rows))
    }

    #[cfg(test)]
    pub fn dims(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Effective cell extent along each axis.
    #[cfg(test)]
    pub fn cell_extent(&self) -> Vec2 {
        Vec2::new(self.cell_w, self.cell_h)
    }

    pub fn clear(&mut self) {
        for &cell in &self.occupied {
            self.cells[cell].clear();
        }
        self.occupied.clear();
    }

    /// Wrapped integer cell coordinates of a position.
    #[inline]
    pub fn cell_coords(&self, pos: Vec2) -> (usize, usize) {
        let cx = ((pos.x / self.cell_w).floor() as i64).rem_euclid(self.cols as i64);
        let cy = ((pos.y / self.cell_h).floor() as i64).rem_euclid(self.rows as i64);
        (cx as usize, cy as usize)
    }

    #[inline]
    fn cell_index(&self, cx: usize, cy: usize) -> usize {
        cy * self.cols + cx
    }

    #[inline]
    pub fn insert(&mut self, pos: Vec2, item: ParticleRef) {
        let (cx, cy) = self.cell_coords(pos);
        let idx = self.cell_index(cx, cy);
        if self.cells[idx].is_empty() {
            self.occupied.push(idx);
        }
        self.cells[idx].push(item);
    }

    /// Clears the grid and buckets every particle of `blobs`, tagging each
    /// with its position in the iteration order.
    pub fn rebuild<'a>(&mut self, blobs: impl IntoIterator<Item = &'a Blob>) {
        self.clear();
        for (b, blob) in blobs.into_iter().enumerate() {
            for (p, particle) in blob.particles.iter().enumerate() {
                self.insert(particle.pos, ParticleRef::new(b, p));
            }
        }
    }

    /// Distinct flat indices of the wrapped 3x3 block around `pos`.
    ///
    /// Grids narrower than three cells would otherwise visit the same
    /// column twice and report duplicate candidates.
    fn block_around(&self, pos: Vec2) -> ([usize; 9], usize) {
        let (cx, cy) = self.cell_coords(pos);
        let (cols, rows) = (self.cols as i64, self.rows as i64);
        let mut out = [0usize; 9];
        let mut len = 0;
        for dy in -1..=1_i64 {
            let y = (cy as i64 + dy).rem_euclid(rows) as usize;
            for dx in -1..=1_i64 {
                let x = (cx as i64 + dx).rem_euclid(cols) as usize;
                let idx = self.cell_index(x, y);
                if !out[..len].contains(&idx) {
                    out[len] = idx;
                    len += 1;
                }
            }
        }
        (out, len)
    }

    /// Visits every item bucketed in the 3x3 block around `pos`.
    pub fn for_each_nearby(&self, pos: Vec2, mut visit: impl FnMut(ParticleRef)) {
        let (block, len) = self.block_around(pos);
        for &idx in &block[..len] {
            for &item in &self.cells[idx] {
                visit(item);
            }
        }
    }

    /// Collects the candidates around `pos` into a fresh vector.
    #[cfg(test)]
    pub fn nearby(&self, pos: Vec2) -> Vec<ParticleRef> {
        let mut result = Vec::new();
        self.for_each_nearby(pos, |item| result.push(item));
        result
    }
}

use glam::Vec2;

/// A scratch buffer that accumulates displacement contributions per slot.
///
/// Slots are indices into whatever list the caller is processing: the
/// particles of one aggregate during repulsion, or the aggregates of a
/// population during overlap separation. Contributions are gathered from
/// a read-only view first and applied afterwards, so the order in which
/// slots are visited never affects the result.
#[derive(Debug, Default)]
pub struct DisplacementBuffer {
    /// Summed displacement for each slot.
    sum: Vec<Vec2>,
    /// Number of contributions for each slot.
    count: Vec<u32>,
}

impl DisplacementBuffer {
    /// Creates a buffer with `len` cleared slots.
    #[cfg(test)]
    pub fn with_len(len: usize) -> Self {
        Self {
            sum: vec![Vec2::ZERO; len],
            count: vec![0; len],
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.sum.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.sum.is_empty()
    }

    /// Resizes to exactly `len` slots and clears every slot, even when the
    /// length was already correct.
    pub fn ensure_len(&mut self, len: usize) {
        if self.sum.len() != len {
            self.sum.resize(len, Vec2::ZERO);
            self.count.resize(len, 0);
        }
        self.clear();
    }

    pub fn clear(&mut self) {
        self.sum.fill(Vec2::ZERO);
        self.count.fill(0);
    }

    /// Adds one contribution to slot `id`.
    ///
    /// ### Panics
    /// Panics if `id` is out of bounds.
    #[inline]
    pub fn add(&mut self, id: usize, offset: Vec2) {
        self.sum[id] += offset;
        self.count[id] += 1;
    }

    /// Summed displacement for `id`, `Vec2::ZERO` if nothing was added.
    #[inline]
    pub fn total(&self, id: usize) -> Vec2 {
        self.sum[id]
    }

    #[cfg(test)]
    pub fn is_displaced(&self, id: usize) -> bool {
        self.count[id] > 0
    }

    /// Slots that received at least one contribution.
    pub fn displaced_indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.count
            .iter()
            .enumerate()
            .filter_map(|(i, &c)| if c > 0 { Some(i) } else { None })
    }
}

use slotmap::new_key_type;

new_key_type! {
    /// Stable identifier for an aggregate ("blob") in a [`crate::population::Population`].
    ///
    /// Identifiers are generational: once an aggregate is merged away, split
    /// or dropped, its id never resolves again, so a stale id held in a bonded
    /// set looks up as "not found" instead of aliasing a newer aggregate.
    pub struct BlobId;
}

/// 8-bit RGB color carried by every sub-particle.
pub type Rgb = [u8; 3];

/// Location of a sub-particle inside a population snapshot.
///
/// `blob` indexes the snapshot's ordered id list (not a [`BlobId`]), and
/// `particle` indexes that aggregate's particle list. Only meaningful for the
/// lifetime of the snapshot it was built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParticleRef {
    pub blob: usize,
    pub particle: usize,
}

impl ParticleRef {
    #[inline]
    pub const fn new(blob: usize, particle: usize) -> Self {
        Self { blob, particle }
    }
}

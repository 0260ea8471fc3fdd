//! Identity table for aggregates and the bookkeeping that keeps the bonded
//! relation symmetric across merge, split and ejection.

use std::collections::BTreeSet;
use std::ops::{Index, IndexMut};

use slotmap::SlotMap;

use crate::blob::Blob;
use crate::types::BlobId;

/// All live aggregates, keyed by stable [`BlobId`].
#[derive(Clone, Debug, Default)]
pub struct Population {
    blobs: SlotMap<BlobId, Blob>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_blobs(blobs: impl IntoIterator<Item = Blob>) -> Self {
        let mut population = Self::new();
        for blob in blobs {
            population.insert(blob);
        }
        population
    }

    pub fn insert(&mut self, blob: Blob) -> BlobId {
        self.blobs.insert(blob)
    }

    pub fn remove(&mut self, id: BlobId) -> Option<Blob> {
        self.blobs.remove(id)
    }

    pub fn get(&self, id: BlobId) -> Option<&Blob> {
        self.blobs.get(id)
    }

    pub fn get_mut(&mut self, id: BlobId) -> Option<&mut Blob> {
        self.blobs.get_mut(id)
    }

    pub fn contains(&self, id: BlobId) -> bool {
        self.blobs.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    pub fn particle_count(&self) -> usize {
        self.blobs.values().map(Blob::len).sum()
    }

    /// Ids in iteration order. Used as the stable snapshot order for a pass.
    pub fn ids(&self) -> Vec<BlobId> {
        self.blobs.keys().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (BlobId, &Blob)> {
        self.blobs.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (BlobId, &mut Blob)> {
        self.blobs.iter_mut()
    }

    pub fn blobs(&self) -> impl Iterator<Item = &Blob> {
        self.blobs.values()
    }

    pub fn blobs_mut(&mut self) -> impl Iterator<Item = &mut Blob> {
        self.blobs.values_mut()
    }

    /// Records a symmetric bond between two live aggregates.
    pub fn bond(&mut self, a: BlobId, b: BlobId) {
        if a == b || !self.contains(a) || !self.contains(b) {
            return;
        }
        self.blobs[a].bonded.insert(b);
        self.blobs[b].bonded.insert(a);
    }

    #[cfg(test)]
    pub fn are_bonded(&self, a: BlobId, b: BlobId) -> bool {
        let a_to_b = self.get(a).is_some_and(|blob| blob.bonded.contains(&b));
        let b_to_a = self.get(b).is_some_and(|blob| blob.bonded.contains(&a));
        a_to_b || b_to_a
    }

    /// Replaces consumed aggregates `old` with their products `new` in every
    /// bonded set.
    ///
    /// Any live aggregate that was bonded to one of `old` becomes bonded to
    /// all of `new`, and each product gains the matching back-reference.
    /// Products drop references to `old` and to each other.
    pub fn retarget_bonds(&mut self, old: &[BlobId], new: &[BlobId]) {
        let mut partners = Vec::new();
        for (id, blob) in self.blobs.iter_mut() {
            if new.contains(&id) {
                continue;
            }
            let before = blob.bonded.len();
            blob.bonded.retain(|b| !old.contains(b));
            if blob.bonded.len() != before {
                blob.bonded.extend(new.iter().copied());
                partners.push(id);
            }
        }
        for &id in new {
            if let Some(blob) = self.blobs.get_mut(id) {
                blob.bonded.retain(|b| !old.contains(b) && !new.contains(b));
                blob.bonded.extend(partners.iter().copied());
            }
        }
    }

    /// Forgets bonds that point at aggregates no longer alive.
    pub fn prune_stale_bonds(&mut self) -> usize {
        let live: BTreeSet<BlobId> = self.blobs.keys().collect();
        let mut pruned = 0;
        for blob in self.blobs.values_mut() {
            let before = blob.bonded.len();
            blob.bonded.retain(|id| live.contains(id));
            pruned += before - blob.bonded.len();
        }
        pruned
    }

    /// Removes aggregates with no particles, returning how many were dropped.
    pub fn drop_empty(&mut self) -> usize {
        let before = self.blobs.len();
        self.blobs.retain(|_, blob| !blob.is_empty());
        before - self.blobs.len()
    }
}

impl Index<BlobId> for Population {
    type Output = Blob;

    fn index(&self, id: BlobId) -> &Blob {
        &self.blobs[id]
    }
}

impl IndexMut<BlobId> for Population {
    fn index_mut(&mut self, id: BlobId) -> &mut Blob {
        &mut self.blobs[id]
    }
}

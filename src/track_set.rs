//! Set algebra over tracklet lists and index views used by the association rounds.
//!
//! Lists keep their order, membership is decided by track id.

use std::collections::HashSet;

use crate::matching::iou_distance;
use crate::tracklet::Tracklet;

#[derive(Debug, Clone)]
enum IndexedSliceKind {
    All,
    Indexes(Vec<usize>),
}

/// Read-only view over a subset of a slice, positions in the view map back to
/// positions in the slice through [`IndexedSlice::get_index`].
pub struct IndexedSlice<'a, T> {
    pub slice: &'a [T],
    kind: IndexedSliceKind,
}

impl<'a, T> Clone for IndexedSlice<'a, T> {
    fn clone(&self) -> Self {
        Self {
            slice: self.slice,
            kind: self.kind.clone(),
        }
    }
}

impl<'a, T> IndexedSlice<'a, T> {
    pub fn new(slice: &'a [T]) -> Self {
        Self {
            slice,
            kind: IndexedSliceKind::All,
        }
    }

    pub fn new_with_indexes(slice: &'a [T], idx: Vec<usize>) -> Self {
        Self {
            slice,
            kind: IndexedSliceKind::Indexes(idx),
        }
    }

    /// Position in the underlying slice of the `idx`-th view element.
    #[inline]
    pub fn get_index(&self, idx: usize) -> usize {
        match &self.kind {
            IndexedSliceKind::All => idx,
            IndexedSliceKind::Indexes(idxs) => idxs[idx],
        }
    }

    #[inline]
    pub fn get(&self, idx: usize) -> Option<&'a T> {
        match &self.kind {
            IndexedSliceKind::All => self.slice.get(idx),
            IndexedSliceKind::Indexes(idxs) => self.slice.get(*idxs.get(idx)?),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        match &self.kind {
            IndexedSliceKind::All => self.slice.len(),
            IndexedSliceKind::Indexes(idxs) => idxs.len(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn all_indexes(&self) -> Vec<usize> {
        match &self.kind {
            IndexedSliceKind::All => (0..self.slice.len()).collect(),
            IndexedSliceKind::Indexes(idxs) => idxs.clone(),
        }
    }

    /// Narrows the view to the given view positions.
    pub fn select(&self, positions: &[usize]) -> Self {
        Self::new_with_indexes(
            self.slice,
            positions.iter().map(|&p| self.get_index(p)).collect(),
        )
    }

    /// Concatenates two views over the same slice.
    pub fn chain(&self, other: &Self) -> Self {
        let mut idxs = self.all_indexes();
        idxs.extend(other.all_indexes());

        Self::new_with_indexes(self.slice, idxs)
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a T> + '_ {
        (0..self.len()).filter_map(move |i| self.get(i))
    }
}

impl<'a, T> std::ops::Index<usize> for IndexedSlice<'a, T> {
    type Output = T;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.slice[self.get_index(index)]
    }
}

/// `a` followed by the members of `b` whose id is not in `a` yet.
pub fn join(mut a: Vec<Tracklet>, b: Vec<Tracklet>) -> Vec<Tracklet> {
    let mut seen: HashSet<u64> = a.iter().map(|t| t.track_id()).collect();

    for t in b {
        if seen.insert(t.track_id()) {
            a.push(t);
        }
    }

    a
}

/// Members of `a` whose id is not in `b`.
pub fn subtract(mut a: Vec<Tracklet>, b: &[Tracklet]) -> Vec<Tracklet> {
    let ids: HashSet<u64> = b.iter().map(|t| t.track_id()).collect();
    a.retain(|t| !ids.contains(&t.track_id()));

    a
}

/// Resolves tracked/lost pairs that cover the same object, `iou_distance < threshold`.
/// The tracklet with the longer lifespan survives, on a tie the tracked one is dropped.
pub fn remove_duplicates(
    tracked: Vec<Tracklet>,
    lost: Vec<Tracklet>,
    threshold: f32,
) -> (Vec<Tracklet>, Vec<Tracklet>) {
    if tracked.is_empty() || lost.is_empty() {
        return (tracked, lost);
    }

    let a: Vec<_> = tracked.iter().map(|t| t.ltrb()).collect();
    let b: Vec<_> = lost.iter().map(|t| t.ltrb()).collect();
    let dist = iou_distance(&a, &b);

    let mut drop_a = vec![false; tracked.len()];
    let mut drop_b = vec![false; lost.len()];

    for ((p, q), d) in dist.indexed_iter() {
        if *d < threshold {
            if tracked[p].lifespan() > lost[q].lifespan() {
                drop_b[q] = true;
            } else {
                drop_a[p] = true;
            }
        }
    }

    let keep = |items: Vec<Tracklet>, drop: Vec<bool>| {
        items
            .into_iter()
            .zip(drop)
            .filter_map(|(t, d)| if d { None } else { Some(t) })
            .collect::<Vec<_>>()
    };

    (keep(tracked, drop_a), keep(lost, drop_b))
}

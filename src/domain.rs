//! Index boxes, box arrays, and domain decomposition.
//!
//! An `IndexBox` is a closed integer hyper-rectangle in up to three
//! dimensions, cell-centered. `decompose` splits a box across ranks so that
//! a chosen axis stays undivided (pencil/slab layout for a local 1-D FFT).

use crate::error::{FftError, Result};

/// A 3-component integer index vector. Lower-dimensional problems use
/// degenerate (length-1) trailing axes.
pub type IntVect = [i64; 3];

/// Closed integer box `[lo, hi]`, cell-centered. Invariant: `lo <= hi`
/// componentwise for non-empty boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBox {
    pub lo: IntVect,
    pub hi: IntVect,
}

impl IndexBox {
    pub fn new(lo: IntVect, hi: IntVect) -> Self {
        Self { lo, hi }
    }

    /// Box `[0, hi]` from per-axis lengths. A length of 0 is treated as 1.
    pub fn from_lengths(n: [usize; 3]) -> Self {
        Self {
            lo: [0, 0, 0],
            hi: [
                n[0].max(1) as i64 - 1,
                n[1].max(1) as i64 - 1,
                n[2].max(1) as i64 - 1,
            ],
        }
    }

    pub fn length(&self, axis: usize) -> usize {
        (self.hi[axis] - self.lo[axis] + 1).max(0) as usize
    }

    pub fn num_pts(&self) -> usize {
        self.length(0) * self.length(1) * self.length(2)
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|d| self.hi[d] < self.lo[d])
    }

    pub fn contains(&self, idx: IntVect) -> bool {
        (0..3).all(|d| idx[d] >= self.lo[d] && idx[d] <= self.hi[d])
    }

    /// Componentwise intersection. The result may be empty.
    pub fn intersect(&self, other: &IndexBox) -> IndexBox {
        IndexBox {
            lo: [
                self.lo[0].max(other.lo[0]),
                self.lo[1].max(other.lo[1]),
                self.lo[2].max(other.lo[2]),
            ],
            hi: [
                self.hi[0].min(other.hi[0]),
                self.hi[1].min(other.hi[1]),
                self.hi[2].min(other.hi[2]),
            ],
        }
    }

    /// Replace the upper bound along one axis. Used to carve the r2c
    /// half-spectrum box out of a real box.
    pub fn with_hi(&self, axis: usize, hi: i64) -> IndexBox {
        let mut b = *self;
        b.hi[axis] = hi;
        b
    }

    /// Flat offset of `idx` within this box, axis 0 fastest.
    pub fn flat_index(&self, idx: IntVect) -> usize {
        debug_assert!(self.contains(idx));
        let i = (idx[0] - self.lo[0]) as usize;
        let j = (idx[1] - self.lo[1]) as usize;
        let k = (idx[2] - self.lo[2]) as usize;
        i + self.length(0) * (j + self.length(1) * k)
    }
}

/// Ordered sequence of disjoint boxes covering a domain. The position of a
/// box in the sequence is its global box id.
#[derive(Debug, Clone, Default)]
pub struct BoxArray {
    pub boxes: Vec<IndexBox>,
}

impl BoxArray {
    pub fn new(boxes: Vec<IndexBox>) -> Self {
        Self { boxes }
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn get(&self, id: usize) -> &IndexBox {
        &self.boxes[id]
    }
}

/// Total map from box id to owning rank.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankMap {
    pub ranks: Vec<usize>,
}

impl RankMap {
    /// Box i -> rank i. The engines only ever use this map, so the first K
    /// ranks own exactly one box each.
    pub fn iota(n: usize) -> Self {
        Self {
            ranks: (0..n).collect(),
        }
    }

    pub fn rank_of(&self, box_id: usize) -> usize {
        self.ranks[box_id]
    }

    /// The box owned by `rank`, if any. Valid for iota maps where each rank
    /// owns at most one box.
    pub fn box_of_rank(&self, rank: usize) -> Option<usize> {
        self.ranks.iter().position(|&r| r == rank)
    }
}

/// Split `domain` into at most `n_pieces` disjoint boxes.
///
/// `keep_dims[d] = true` forbids splitting along axis d. Higher axes are
/// split first; volumes are balanced approximately, not exactly (the 1-D
/// vendor transforms tolerate varying batch counts).
pub fn decompose(domain: &IndexBox, n_pieces: usize, keep_dims: [bool; 3]) -> Result<BoxArray> {
    if n_pieces < 1 {
        return Err(FftError::invalid_domain(
            "decompose",
            format!("n_pieces = {n_pieces}"),
        ));
    }
    let splittable: Vec<usize> = (0..3)
        .rev()
        .filter(|&d| !keep_dims[d] && domain.length(d) > 0)
        .collect();
    if splittable.is_empty() {
        return Err(FftError::invalid_domain(
            "decompose",
            "every axis is locked".to_string(),
        ));
    }

    // Number of cuts per axis: give as many pieces as possible to the
    // highest splittable axis, push the remainder down to the next one.
    let mut cuts = [1usize; 3];
    let mut remaining = n_pieces;
    for &d in &splittable {
        let c = remaining.min(domain.length(d));
        cuts[d] = c;
        remaining /= c;
        if remaining <= 1 {
            break;
        }
    }

    let mut boxes = Vec::with_capacity(cuts[0] * cuts[1] * cuts[2]);
    for k in 0..cuts[2] {
        for j in 0..cuts[1] {
            for i in 0..cuts[0] {
                let piece = [i, j, k];
                let mut lo = domain.lo;
                let mut hi = domain.hi;
                for d in 0..3 {
                    let n = domain.length(d);
                    let c = cuts[d];
                    let base = n / c;
                    let extra = n % c;
                    // First `extra` pieces get one extra cell.
                    let start: usize = (0..piece[d]).map(|p| base + usize::from(p < extra)).sum();
                    let len = base + usize::from(piece[d] < extra);
                    lo[d] = domain.lo[d] + start as i64;
                    hi[d] = lo[d] + len as i64 - 1;
                }
                boxes.push(IndexBox::new(lo, hi));
            }
        }
    }
    Ok(BoxArray::new(boxes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_lengths_and_points() {
        let b = IndexBox::from_lengths([8, 4, 2]);
        assert_eq!(b.length(0), 8);
        assert_eq!(b.length(1), 4);
        assert_eq!(b.length(2), 2);
        assert_eq!(b.num_pts(), 64);
    }

    #[test]
    fn flat_index_is_axis0_fastest() {
        let b = IndexBox::from_lengths([4, 3, 2]);
        assert_eq!(b.flat_index([0, 0, 0]), 0);
        assert_eq!(b.flat_index([1, 0, 0]), 1);
        assert_eq!(b.flat_index([0, 1, 0]), 4);
        assert_eq!(b.flat_index([0, 0, 1]), 12);
        assert_eq!(b.flat_index([3, 2, 1]), 23);
    }

    #[test]
    fn intersect_disjoint_is_empty() {
        let a = IndexBox::new([0, 0, 0], [3, 3, 0]);
        let b = IndexBox::new([4, 0, 0], [7, 3, 0]);
        assert!(a.intersect(&b).is_empty());
    }

    #[test]
    fn decompose_keeps_locked_axis_whole() {
        let domain = IndexBox::from_lengths([8, 8, 8]);
        let ba = decompose(&domain, 4, [true, false, false]).unwrap();
        assert!(ba.len() <= 4);
        for b in &ba.boxes {
            assert_eq!(b.length(0), 8, "axis 0 must stay undivided");
        }
        let total: usize = ba.boxes.iter().map(IndexBox::num_pts).sum();
        assert_eq!(total, domain.num_pts());
    }

    #[test]
    fn decompose_prefers_highest_axis() {
        let domain = IndexBox::from_lengths([8, 8, 8]);
        let ba = decompose(&domain, 4, [true, false, false]).unwrap();
        // 4 slabs along z, y untouched.
        assert_eq!(ba.len(), 4);
        for b in &ba.boxes {
            assert_eq!(b.length(1), 8);
            assert_eq!(b.length(2), 2);
        }
    }

    #[test]
    fn decompose_cascades_to_lower_axis() {
        let domain = IndexBox::from_lengths([8, 8, 2]);
        let ba = decompose(&domain, 8, [true, false, false]).unwrap();
        // z can only take 2 pieces, so y picks up the rest.
        assert_eq!(ba.len(), 8);
        let total: usize = ba.boxes.iter().map(IndexBox::num_pts).sum();
        assert_eq!(total, domain.num_pts());
    }

    #[test]
    fn decompose_single_piece_is_whole_domain() {
        let domain = IndexBox::from_lengths([8, 1, 1]);
        let ba = decompose(&domain, 1, [true, false, false]).unwrap();
        assert_eq!(ba.len(), 1);
        assert_eq!(*ba.get(0), domain);
    }

    #[test]
    fn decompose_rejects_zero_pieces() {
        let domain = IndexBox::from_lengths([8, 8, 8]);
        assert!(decompose(&domain, 0, [false, false, false]).is_err());
    }

    #[test]
    fn decompose_rejects_all_locked() {
        let domain = IndexBox::from_lengths([8, 8, 8]);
        assert!(decompose(&domain, 2, [true, true, true]).is_err());
    }

    #[test]
    fn decompose_rejects_all_locked_single_piece() {
        // Locked axes are an error even when no split would be needed.
        let domain = IndexBox::from_lengths([8, 8, 8]);
        assert!(decompose(&domain, 1, [true, true, true]).is_err());
    }

    #[test]
    fn iota_rank_map() {
        let rm = RankMap::iota(3);
        assert_eq!(rm.rank_of(2), 2);
        assert_eq!(rm.box_of_rank(1), Some(1));
        assert_eq!(rm.box_of_rank(5), None);
    }
}

//! Site labels and translation-compressed indexing.
//!
//! For a Bravais-periodic system the interaction between two sites depends
//! only on their basis indices and the integer cell displacement
//! $\Delta = \mathbf{c}_j - \mathbf{c}_i$. [`DisplacementIndex`] maps the
//! signed range $\Delta_d \in [-(L_d - 1), L_d - 1]$ onto zero-based storage.

/// A lattice site: basis atom plus integer cell offset within the supercell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Site {
    pub basis: usize,
    pub cell: [usize; 3],
}

/// Affine map from a signed cell displacement to a dense storage offset.
///
/// `index(Δ) = Σ_d (Δ_d + L_d − 1) · stride_d` with `span_d = 2 L_d − 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplacementIndex {
    extents: [usize; 3],
    spans: [usize; 3],
}

impl DisplacementIndex {
    pub fn new(extents: [usize; 3]) -> Self {
        Self {
            extents,
            spans: [
                2 * extents[0] - 1,
                2 * extents[1] - 1,
                2 * extents[2] - 1,
            ],
        }
    }

    /// Number of distinct realisable displacements, $\prod_d (2 L_d - 1)$.
    pub fn len(&self) -> usize {
        self.spans.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest representable |Δ_d| per dimension.
    pub fn max_offset(&self) -> [i64; 3] {
        [
            self.extents[0] as i64 - 1,
            self.extents[1] as i64 - 1,
            self.extents[2] as i64 - 1,
        ]
    }

    /// Storage offset of `delta`, or `None` if it is not realisable.
    pub fn index(&self, delta: [i64; 3]) -> Option<usize> {
        let max = self.max_offset();
        let mut idx = 0usize;
        for d in (0..3).rev() {
            if delta[d].abs() > max[d] {
                return None;
            }
            idx = idx * self.spans[d] + (delta[d] + max[d]) as usize;
        }
        Some(idx)
    }

    /// Storage offset of the displacement from cell `from` to cell `to`,
    /// both inside the supercell. Always realisable.
    pub fn cell_pair_index(&self, from: [usize; 3], to: [usize; 3]) -> usize {
        let mut idx = 0usize;
        for d in (0..3).rev() {
            debug_assert!(from[d] < self.extents[d] && to[d] < self.extents[d]);
            idx = idx * self.spans[d] + to[d] + self.extents[d] - 1 - from[d];
        }
        idx
    }

    /// Inverse of [`index`](Self::index).
    pub fn delta(&self, index: usize) -> [i64; 3] {
        assert!(index < self.len(), "Displacement index {index} out of range");
        let max = self.max_offset();
        let mut rest = index;
        let mut delta = [0i64; 3];
        for d in 0..3 {
            delta[d] = (rest % self.spans[d]) as i64 - max[d];
            rest /= self.spans[d];
        }
        delta
    }

    /// Iterate over every realisable displacement in storage order.
    pub fn deltas(&self) -> impl Iterator<Item = [i64; 3]> + '_ {
        (0..self.len()).map(move |i| self.delta(i))
    }
}

/// One entry of a translation-compressed table: basis pair plus displacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BasisPairOffset {
    pub basis_i: usize,
    pub basis_j: usize,
    pub delta: [i64; 3],
}

/// Enumerate all (basis_i, basis_j, Δ) triples in row-major storage order:
/// basis_i slowest, Δ fastest.
pub fn basis_pair_offsets(
    n_basis: usize,
    index: DisplacementIndex,
) -> impl Iterator<Item = BasisPairOffset> {
    let n_delta = index.len();
    (0..n_basis * n_basis * n_delta).map(move |k| {
        let pair = k / n_delta;
        BasisPairOffset {
            basis_i: pair / n_basis,
            basis_j: pair % n_basis,
            delta: index.delta(k % n_delta),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_is_dense_and_invertible() {
        let idx = DisplacementIndex::new([3, 1, 2]);
        assert_eq!(idx.len(), 15);
        for (k, delta) in idx.deltas().enumerate() {
            assert_eq!(idx.index(delta), Some(k));
        }
    }

    #[test]
    fn test_zero_displacement_is_centre() {
        let idx = DisplacementIndex::new([2, 2, 2]);
        // 3 x 3 x 3 block, centre at 13.
        assert_eq!(idx.index([0, 0, 0]), Some(13));
        assert_eq!(idx.delta(0), [-1, -1, -1]);
        assert_eq!(idx.delta(26), [1, 1, 1]);
    }

    #[test]
    fn test_out_of_range_displacement() {
        let idx = DisplacementIndex::new([2, 1, 1]);
        assert_eq!(idx.index([2, 0, 0]), None);
        assert_eq!(idx.index([0, 1, 0]), None);
        assert_eq!(idx.index([-1, 0, 0]), Some(0));
    }

    #[test]
    fn test_cell_pair_index_matches_signed_index() {
        let idx = DisplacementIndex::new([3, 2, 4]);
        for from in [[0, 0, 0], [2, 1, 3], [1, 0, 2]] {
            for to in [[0, 1, 0], [2, 0, 3], [1, 1, 1]] {
                let delta = [
                    to[0] as i64 - from[0] as i64,
                    to[1] as i64 - from[1] as i64,
                    to[2] as i64 - from[2] as i64,
                ];
                assert_eq!(Some(idx.cell_pair_index(from, to)), idx.index(delta));
            }
        }
    }

    #[test]
    fn test_basis_pair_offsets_cover_table() {
        let idx = DisplacementIndex::new([2, 1, 1]);
        let triples: Vec<_> = basis_pair_offsets(2, idx).collect();
        assert_eq!(triples.len(), 2 * 2 * 3);
        assert_eq!(
            triples[4],
            BasisPairOffset { basis_i: 0, basis_j: 1, delta: [0, 0, 0] }
        );
    }
}

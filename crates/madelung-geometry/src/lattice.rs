//! Bravais lattice with a basis, repeated over a finite periodic supercell.
//!
//! The periodic box seen by the lattice sums is the supercell spanned by
//! $L_d \mathbf{a}_d$. Sites are labelled by a basis index and an integer
//! cell offset $\mathbf{c} \in [0, L_0) \times [0, L_1) \times [0, L_2)$, and
//! the displacement between two sites is always formed from integers plus
//! the basis difference so every caller sees bit-identical vectors.

use std::f64::consts::PI;

use nalgebra::{Matrix3, Vector3};

use crate::sites::{DisplacementIndex, Site};
use crate::GeometryError;

/// Relative tolerance on $|\det A| / (|a_0||a_1||a_2|)$ below which the
/// lattice vectors are treated as linearly dependent.
pub const VOLUME_EPSILON: f64 = 1e-10;

/// Distance (in units of the shortest lattice vector) below which two basis
/// atoms are considered to coincide modulo the lattice.
const COINCIDENCE_EPSILON: f64 = 1e-10;

/// Immutable description of a periodic supercell.
#[derive(Debug, Clone)]
pub struct LatticeGeometry {
    /// Primitive lattice vectors (columns).
    vectors: Matrix3<f64>,
    /// Reciprocal lattice vectors $\mathbf{b} = 2\pi A^{-T}$ (columns).
    reciprocal: Matrix3<f64>,
    /// Basis atom positions (cartesian).
    basis: Vec<Vector3<f64>>,
    /// Number of primitive cells along each lattice vector.
    supercell: [usize; 3],
    /// Primitive cell volume, $|\det A|$.
    cell_volume: f64,
    /// Supercell vectors $L_d \mathbf{a}_d$ (columns).
    supercell_vectors: Matrix3<f64>,
    /// Inverse of `supercell_vectors`, used for fractional wrapping.
    supercell_inverse: Matrix3<f64>,
    /// Reciprocal vectors of the supercell (columns).
    supercell_reciprocal: Matrix3<f64>,
}

impl LatticeGeometry {
    /// Construct a geometry from primitive vectors (columns of `vectors`),
    /// cartesian basis positions, and supercell extents.
    pub fn new(
        vectors: Matrix3<f64>,
        basis: Vec<Vector3<f64>>,
        supercell: [usize; 3],
    ) -> Result<Self, GeometryError> {
        if vectors.iter().any(|x| !x.is_finite()) {
            return Err(GeometryError::NonFinite("lattice vectors".into()));
        }
        if basis.iter().any(|b| b.iter().any(|x| !x.is_finite())) {
            return Err(GeometryError::NonFinite("basis positions".into()));
        }
        if basis.is_empty() {
            return Err(GeometryError::EmptyBasis);
        }
        if supercell.iter().any(|&l| l == 0) {
            return Err(GeometryError::InvalidSupercell { extents: supercell });
        }

        let det = vectors.determinant();
        let norm_product: f64 = vectors.column_iter().map(|c| c.norm()).product();
        if norm_product == 0.0 || det.abs() / norm_product < VOLUME_EPSILON {
            return Err(GeometryError::Degenerate { volume: det.abs() });
        }
        let inverse = vectors
            .try_inverse()
            .ok_or(GeometryError::Degenerate { volume: det.abs() })?;
        let reciprocal = (2.0 * PI) * inverse.transpose();

        let scale = Matrix3::from_diagonal(&Vector3::new(
            supercell[0] as f64,
            supercell[1] as f64,
            supercell[2] as f64,
        ));
        let supercell_vectors = vectors * scale;
        let supercell_inverse = supercell_vectors
            .try_inverse()
            .ok_or(GeometryError::Degenerate { volume: det.abs() })?;
        let supercell_reciprocal = (2.0 * PI) * supercell_inverse.transpose();

        let shortest = vectors
            .column_iter()
            .map(|c| c.norm())
            .fold(f64::INFINITY, f64::min);
        for i in 0..basis.len() {
            for j in (i + 1)..basis.len() {
                let mut frac = inverse * (basis[j] - basis[i]);
                frac.iter_mut().for_each(|f| *f -= f.round());
                if (vectors * frac).norm() < COINCIDENCE_EPSILON * shortest {
                    return Err(GeometryError::CoincidentBasis { first: i, second: j });
                }
            }
        }

        Ok(Self {
            vectors,
            reciprocal,
            basis,
            supercell,
            cell_volume: det.abs(),
            supercell_vectors,
            supercell_inverse,
            supercell_reciprocal,
        })
    }

    /// Construct from row-major arrays: `vectors[d]` is the d-th lattice vector.
    pub fn from_arrays(
        vectors: [[f64; 3]; 3],
        basis: &[[f64; 3]],
        supercell: [usize; 3],
    ) -> Result<Self, GeometryError> {
        let columns = Matrix3::from_columns(&[
            Vector3::from(vectors[0]),
            Vector3::from(vectors[1]),
            Vector3::from(vectors[2]),
        ]);
        let basis = basis.iter().map(|&b| Vector3::from(b)).collect();
        Self::new(columns, basis, supercell)
    }

    pub fn lattice_vectors(&self) -> &Matrix3<f64> {
        &self.vectors
    }

    pub fn reciprocal_vectors(&self) -> &Matrix3<f64> {
        &self.reciprocal
    }

    pub fn supercell_vectors(&self) -> &Matrix3<f64> {
        &self.supercell_vectors
    }

    pub fn supercell_reciprocal_vectors(&self) -> &Matrix3<f64> {
        &self.supercell_reciprocal
    }

    pub fn basis(&self) -> &[Vector3<f64>] {
        &self.basis
    }

    pub fn n_basis(&self) -> usize {
        self.basis.len()
    }

    pub fn supercell(&self) -> [usize; 3] {
        self.supercell
    }

    /// Number of primitive cells in the supercell.
    pub fn n_cells(&self) -> usize {
        self.supercell.iter().product()
    }

    /// Total number of sites, $N = n_{\text{basis}} \prod_d L_d$.
    pub fn n_sites(&self) -> usize {
        self.n_basis() * self.n_cells()
    }

    /// Primitive cell volume.
    pub fn cell_volume(&self) -> f64 {
        self.cell_volume
    }

    /// Volume of the periodic box (the supercell).
    pub fn supercell_volume(&self) -> f64 {
        self.cell_volume * self.n_cells() as f64
    }

    /// Linear site index: `basis + n_basis * (c0 + L0 * (c1 + L1 * c2))`.
    ///
    /// # Panics
    /// Panics if the basis index or cell offset is out of range.
    pub fn site_index(&self, basis: usize, cell: [usize; 3]) -> usize {
        assert!(basis < self.n_basis(), "Basis index {basis} out of range");
        assert!(
            cell.iter().zip(self.supercell.iter()).all(|(c, l)| c < l),
            "Cell offset {cell:?} outside supercell {:?}",
            self.supercell
        );
        let [l0, l1, _] = self.supercell;
        basis + self.n_basis() * (cell[0] + l0 * (cell[1] + l1 * cell[2]))
    }

    /// Inverse of [`site_index`](Self::site_index).
    pub fn site(&self, index: usize) -> Site {
        assert!(index < self.n_sites(), "Site index {index} out of range");
        let nb = self.n_basis();
        let [l0, l1, _] = self.supercell;
        let basis = index % nb;
        let cell_linear = index / nb;
        Site {
            basis,
            cell: [cell_linear % l0, (cell_linear / l0) % l1, cell_linear / (l0 * l1)],
        }
    }

    /// Iterate over all sites in linear-index order.
    pub fn sites(&self) -> impl Iterator<Item = Site> + '_ {
        (0..self.n_sites()).map(move |i| self.site(i))
    }

    /// Absolute cartesian position of a site.
    pub fn position(&self, site: Site) -> Vector3<f64> {
        self.vectors * cell_vector(site.cell) + self.basis[site.basis]
    }

    /// Integer cell displacement $\Delta = \mathbf{c}_j - \mathbf{c}_i$ between two sites.
    pub fn cell_delta(&self, i: usize, j: usize) -> [i64; 3] {
        let (si, sj) = (self.site(i), self.site(j));
        [
            sj.cell[0] as i64 - si.cell[0] as i64,
            sj.cell[1] as i64 - si.cell[1] as i64,
            sj.cell[2] as i64 - si.cell[2] as i64,
        ]
    }

    /// Minimum-image displacement from basis atom `bi` to basis atom `bj`
    /// located `delta` primitive cells away.
    ///
    /// The raw vector $A\Delta + \mathbf{x}_{b_j} - \mathbf{x}_{b_i}$ is
    /// wrapped into the supercell by rounding its fractional coordinates.
    pub fn pair_displacement(&self, bi: usize, bj: usize, delta: [i64; 3]) -> Vector3<f64> {
        let raw = self.vectors
            * Vector3::new(delta[0] as f64, delta[1] as f64, delta[2] as f64)
            + (self.basis[bj] - self.basis[bi]);
        let mut frac = self.supercell_inverse * raw;
        frac.iter_mut().for_each(|f| *f -= f.round());
        self.supercell_vectors * frac
    }

    /// Minimum-image displacement between two sites given by linear index.
    pub fn site_displacement(&self, i: usize, j: usize) -> Vector3<f64> {
        let (bi, bj) = (i % self.n_basis(), j % self.n_basis());
        self.pair_displacement(bi, bj, self.cell_delta(i, j))
    }

    /// Periodic image offset $\sum_d n_d L_d \mathbf{a}_d$.
    pub fn image_vector(&self, n: [i64; 3]) -> Vector3<f64> {
        self.supercell_vectors * Vector3::new(n[0] as f64, n[1] as f64, n[2] as f64)
    }

    /// Supercell reciprocal vector $\sum_d m_d \mathbf{b}_d / L_d$.
    pub fn reciprocal_vector(&self, m: [i64; 3]) -> Vector3<f64> {
        self.supercell_reciprocal * Vector3::new(m[0] as f64, m[1] as f64, m[2] as f64)
    }

    /// Per-dimension integer range that encloses every image with
    /// $|\mathbf{n}| \le$ `radius`.
    ///
    /// The spacing between supercell lattice planes normal to
    /// $\mathbf{b}_d$ is $2\pi / |\mathbf{b}_d|$.
    pub fn image_range_within(&self, radius: f64) -> [i64; 3] {
        let mut range = [0i64; 3];
        for (d, col) in self.supercell_reciprocal.column_iter().enumerate() {
            let spacing = 2.0 * PI / col.norm();
            range[d] = (radius / spacing).ceil() as i64;
        }
        range
    }

    /// Affine map from signed cell displacements to dense storage offsets.
    pub fn displacement_index(&self) -> DisplacementIndex {
        DisplacementIndex::new(self.supercell)
    }

    /// Copy of this geometry with basis atom `basis` moved by the integer
    /// combination `shift` of primitive lattice vectors.
    pub fn with_translated_basis(&self, basis: usize, shift: [i64; 3]) -> Result<Self, GeometryError> {
        let mut positions = self.basis.clone();
        positions[basis] += self.vectors
            * Vector3::new(shift[0] as f64, shift[1] as f64, shift[2] as f64);
        Self::new(self.vectors, positions, self.supercell)
    }
}

fn cell_vector(cell: [usize; 3]) -> Vector3<f64> {
    Vector3::new(cell[0] as f64, cell[1] as f64, cell[2] as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn cubic(supercell: [usize; 3]) -> LatticeGeometry {
        LatticeGeometry::from_arrays(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &[[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
            supercell,
        )
        .unwrap()
    }

    #[test]
    fn test_reciprocal_duality() {
        let g = LatticeGeometry::from_arrays(
            [[1.0, 0.0, 0.0], [0.5, 0.8, 0.0], [0.1, 0.2, 1.3]],
            &[[0.0, 0.0, 0.0]],
            [2, 3, 1],
        )
        .unwrap();
        // a_i . b_j = 2π δ_ij
        let prod = g.lattice_vectors().transpose() * g.reciprocal_vectors();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 2.0 * PI } else { 0.0 };
                assert_abs_diff_eq!(prod[(i, j)], expected, epsilon = 1e-12);
            }
        }
        assert_abs_diff_eq!(g.cell_volume(), 1.04, epsilon = 1e-12);
        assert_abs_diff_eq!(g.supercell_volume(), 6.24, epsilon = 1e-12);
    }

    #[test]
    fn test_degenerate_vectors_rejected() {
        let err = LatticeGeometry::from_arrays(
            [[1.0, 0.0, 0.0], [2.0, 0.0, 0.0], [0.0, 0.0, 1.0]],
            &[[0.0, 0.0, 0.0]],
            [1, 1, 1],
        )
        .unwrap_err();
        assert!(matches!(err, GeometryError::Degenerate { .. }));
    }

    #[test]
    fn test_empty_basis_and_zero_supercell_rejected() {
        let id = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        assert!(matches!(
            LatticeGeometry::from_arrays(id, &[], [1, 1, 1]),
            Err(GeometryError::EmptyBasis)
        ));
        assert!(matches!(
            LatticeGeometry::from_arrays(id, &[[0.0; 3]], [1, 0, 1]),
            Err(GeometryError::InvalidSupercell { .. })
        ));
    }

    #[test]
    fn test_coincident_basis_rejected() {
        let err = LatticeGeometry::from_arrays(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            &[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]],
            [1, 1, 1],
        )
        .unwrap_err();
        assert!(matches!(err, GeometryError::CoincidentBasis { first: 0, second: 1 }));
    }

    #[test]
    fn test_site_index_roundtrip() {
        let g = cubic([2, 3, 4]);
        assert_eq!(g.n_sites(), 48);
        for i in 0..g.n_sites() {
            let s = g.site(i);
            assert_eq!(g.site_index(s.basis, s.cell), i);
        }
    }

    #[test]
    fn test_displacement_is_minimum_image() {
        let g = cubic([3, 3, 3]);
        let i = g.site_index(0, [0, 0, 0]);
        let j = g.site_index(0, [2, 0, 0]);
        // Two cells to the right is one cell to the left in a 3-cell box.
        let r = g.site_displacement(i, j);
        assert_abs_diff_eq!(r.x, -1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(r.norm(), 1.0, epsilon = 1e-12);
        // Antisymmetric under exchange.
        let r_back = g.site_displacement(j, i);
        assert_abs_diff_eq!((r + r_back).norm(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_self_displacement_is_exactly_zero() {
        let g = cubic([2, 2, 2]);
        for i in 0..g.n_sites() {
            assert_eq!(g.site_displacement(i, i), Vector3::zeros());
        }
    }

    #[test]
    fn test_image_range_covers_radius() {
        let g = cubic([2, 1, 1]);
        // Supercell is 2 x 1 x 1, so a radius of 3 needs 2 images along x and 3 along y, z.
        assert_eq!(g.image_range_within(3.0), [2, 3, 3]);
    }

    #[test]
    fn test_translated_basis_keeps_site_count() {
        let g = cubic([2, 2, 2]);
        let t = g.with_translated_basis(1, [1, -2, 0]).unwrap();
        assert_eq!(t.n_sites(), g.n_sites());
        assert_abs_diff_eq!(t.basis()[1].y, -1.5, epsilon = 1e-12);
    }
}

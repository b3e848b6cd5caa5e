//! Interaction matrix assembly.
//!
//! Each entry (scalar, or row-major 3×3 block for dipoles) is
//!
//! - seeded with the neutrality term $-\pi/(2V\eta^2)$ (monopoles only),
//! - plus the self-energy term when both indices refer to the same site,
//! - plus $\tfrac12$ of the real-space kernel,
//! - plus $2\pi/V$ times the reciprocal-space kernel,
//!
//! in that order. The dense and compressed layouts go through the same
//! [`EntryAssembler`] with the same `(basis_i, basis_j, Δ)` arguments, so a
//! compressed entry is bit-identical to the dense entry it stands for.

use std::sync::Arc;

use madelung_compute::{ComputeBackend, CpuBackend};
use madelung_geometry::{basis_pair_offsets, LatticeGeometry};
use ndarray::{Array2, Array4};

use super::{InteractionMatrix, MatrixLayout, MatrixStorage};
use crate::ewald::summation::{
    dipole_self_coefficient, monopole_self_coefficient, neutrality_coefficient,
    reciprocal_prefactor,
};
use crate::ewald::{EwaldError, RealSpaceKernel, ReciprocalSpaceKernel};
use crate::types::{EwaldParameters, Multipole, Tensor3};

/// Builds [`InteractionMatrix`] values for a fixed set of Ewald parameters.
pub struct InteractionMatrixBuilder {
    pub params: EwaldParameters,
    pub layout: MatrixLayout,
    pub backend: Arc<dyn ComputeBackend>,
}

impl InteractionMatrixBuilder {
    pub fn new(params: EwaldParameters, layout: MatrixLayout) -> Result<Self, EwaldError> {
        Self::with_backend(params, layout, Arc::new(CpuBackend::new()))
    }

    pub fn with_backend(
        params: EwaldParameters,
        layout: MatrixLayout,
        backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self, EwaldError> {
        params.validate()?;
        Ok(Self {
            params,
            layout,
            backend,
        })
    }

    /// Build the matrix for `kind` on `geometry`.
    pub fn build(
        &self,
        geometry: Arc<LatticeGeometry>,
        kind: Multipole,
    ) -> Result<InteractionMatrix, EwaldError> {
        self.params.validate()?;
        log::debug!(
            "building {} {:?} matrix: {} sites, {} basis atoms",
            self.layout,
            kind,
            geometry.n_sites(),
            geometry.n_basis()
        );
        let assembler = EntryAssembler::new(&geometry, &self.params, kind)?;
        let storage = match self.layout {
            MatrixLayout::Dense => MatrixStorage::Dense(self.fill_dense(&assembler)?),
            MatrixLayout::Compressed => {
                MatrixStorage::Compressed(self.fill_compressed(&assembler)?)
            }
        };
        let matrix = InteractionMatrix::from_parts(kind, geometry, self.params.clone(), storage);
        log::info!(
            "built {} {:?} interaction matrix: {} entries ({} bytes)",
            self.layout,
            kind,
            matrix.storage_len(),
            matrix.storage_len() * std::mem::size_of::<f64>()
        );
        Ok(matrix)
    }

    /// One task per row of sites; task `i` writes the `c` matrix rows of site `i`.
    fn fill_dense(&self, assembler: &EntryAssembler<'_>) -> Result<Array2<f64>, EwaldError> {
        let geometry = assembler.geometry;
        let n = geometry.n_sites();
        let nb = geometry.n_basis();
        let c = assembler.kind.components();
        let dim = c * n;

        let data = self.backend.parallel_fill(n, c * dim, &|i, rows| {
            let mut block = [0.0; 9];
            for j in 0..n {
                let block = &mut block[..c * c];
                assembler.fill(i % nb, j % nb, geometry.cell_delta(i, j), i == j, block);
                for a in 0..c {
                    rows[a * dim + c * j..a * dim + c * (j + 1)]
                        .copy_from_slice(&block[a * c..(a + 1) * c]);
                }
            }
        })?;
        Ok(Array2::from_shape_vec((dim, dim), data)?)
    }

    /// One task per `(basis_i, basis_j, Δ)` triple.
    fn fill_compressed(&self, assembler: &EntryAssembler<'_>) -> Result<Array4<f64>, EwaldError> {
        let geometry = assembler.geometry;
        let nb = geometry.n_basis();
        let index = geometry.displacement_index();
        let block_len = assembler.kind.block_len();
        let triples: Vec<_> = basis_pair_offsets(nb, index).collect();

        let data = self.backend.parallel_fill(triples.len(), block_len, &|k, block| {
            let t = triples[k];
            let same_site = t.basis_i == t.basis_j && t.delta == [0, 0, 0];
            assembler.fill(t.basis_i, t.basis_j, t.delta, same_site, block);
        })?;
        Ok(Array4::from_shape_vec((nb, nb, index.len(), block_len), data)?)
    }
}

/// Computes single matrix entries; shared by both layouts.
pub(crate) struct EntryAssembler<'a> {
    geometry: &'a LatticeGeometry,
    kind: Multipole,
    real: RealSpaceKernel,
    recip: ReciprocalSpaceKernel,
    neutrality: f64,
    self_term: f64,
    prefactor: f64,
}

impl<'a> EntryAssembler<'a> {
    pub(crate) fn new(
        geometry: &'a LatticeGeometry,
        params: &EwaldParameters,
        kind: Multipole,
    ) -> Result<Self, EwaldError> {
        let eta = params.eta;
        let volume = geometry.supercell_volume();
        let (neutrality, self_term) = match kind {
            Multipole::Monopole => (neutrality_coefficient(eta, volume), monopole_self_coefficient(eta)),
            Multipole::Dipole => (0.0, dipole_self_coefficient(eta)),
        };
        Ok(Self {
            geometry,
            kind,
            real: RealSpaceKernel::new(geometry, eta, params.real_extent)?,
            recip: ReciprocalSpaceKernel::new(geometry, eta, params.reciprocal_extent)?,
            neutrality,
            self_term,
            prefactor: reciprocal_prefactor(volume),
        })
    }

    /// Write the entry for basis `bi` to basis `bj` displaced by `delta` cells.
    pub(crate) fn fill(&self, bi: usize, bj: usize, delta: [i64; 3], same_site: bool, out: &mut [f64]) {
        let r = self.geometry.pair_displacement(bi, bj, delta);
        match self.kind {
            Multipole::Monopole => {
                let mut acc = self.neutrality;
                if same_site {
                    acc += self.self_term;
                }
                acc += 0.5 * self.real.monopole(&r).total;
                acc += self.prefactor * self.recip.monopole(&r).re;
                out[0] = acc;
            }
            Multipole::Dipole => {
                let mut acc = Tensor3::from_element(self.neutrality);
                if same_site {
                    acc += Tensor3::identity() * self.self_term;
                }
                acc += 0.5 * self.real.dipole_tensor(&r).total;
                acc += self.prefactor * self.recip.dipole_tensor(&r);
                for a in 0..3 {
                    for b in 0..3 {
                        out[3 * a + b] = acc[(a, b)];
                    }
                }
            }
        }
    }
}

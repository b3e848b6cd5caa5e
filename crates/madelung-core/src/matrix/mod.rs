//! Precomputed Ewald interaction matrices.
//!
//! An interaction matrix $\mathbf{A}$ satisfies
//! $$U = \sum_{ij} q_i A_{ij} q_j \quad\text{or}\quad U = \sum_{ij} \mathbf{p}_i^T \mathbf{A}_{ij} \mathbf{p}_j ,$$
//! with the self-energy and neutrality corrections already folded into the
//! entries, so a contraction reproduces the Ewald energy without further
//! terms.
//!
//! Two layouts are supported:
//!
//! - **Dense**: $N \times N$ (or $3N \times 3N$) storage, $O(N^2)$ memory.
//! - **Compressed**: entries keyed by `(basis_i, basis_j, Δ)` with
//!   $\Delta = \mathbf{c}_j - \mathbf{c}_i$, using translation invariance,
//!   $O(n_{\text{basis}}^2 \prod_d (2L_d - 1))$ memory.

pub mod assembly;
pub mod contract;
pub mod shared;

use std::sync::Arc;

use madelung_geometry::LatticeGeometry;
use ndarray::{s, Array2, Array4};
use serde::{Deserialize, Serialize};

use crate::ewald::{EwaldError, LatticeSum};
use crate::types::{ChargeSystem, EwaldParameters, Multipole, SiteConfiguration, Tensor3};

pub use assembly::InteractionMatrixBuilder;
pub use contract::EnergyContractor;
pub use shared::SharedInteractionMatrix;

/// Storage layout of an [`InteractionMatrix`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixLayout {
    Dense,
    #[default]
    Compressed,
}

impl std::fmt::Display for MatrixLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            MatrixLayout::Dense => "dense",
            MatrixLayout::Compressed => "compressed",
        })
    }
}

/// Backing array of an interaction matrix.
#[derive(Debug, Clone)]
pub enum MatrixStorage {
    /// Shape `(N, N)` for monopoles, `(3N, 3N)` for dipoles.
    Dense(Array2<f64>),
    /// Shape `(n_basis, n_basis, n_Δ, block)` with `block` 1 or 9 (row-major 3×3).
    Compressed(Array4<f64>),
}

/// One pair interaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InteractionEntry {
    Scalar(f64),
    Tensor(Tensor3),
}

/// A built interaction matrix. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct InteractionMatrix {
    kind: Multipole,
    geometry: Arc<LatticeGeometry>,
    params: EwaldParameters,
    storage: MatrixStorage,
}

impl InteractionMatrix {
    pub(crate) fn from_parts(
        kind: Multipole,
        geometry: Arc<LatticeGeometry>,
        params: EwaldParameters,
        storage: MatrixStorage,
    ) -> Self {
        Self {
            kind,
            geometry,
            params,
            storage,
        }
    }

    pub fn kind(&self) -> Multipole {
        self.kind
    }

    pub fn layout(&self) -> MatrixLayout {
        match self.storage {
            MatrixStorage::Dense(_) => MatrixLayout::Dense,
            MatrixStorage::Compressed(_) => MatrixLayout::Compressed,
        }
    }

    pub fn geometry(&self) -> &Arc<LatticeGeometry> {
        &self.geometry
    }

    /// Parameters the matrix was built with.
    pub fn params(&self) -> &EwaldParameters {
        &self.params
    }

    pub fn storage(&self) -> &MatrixStorage {
        &self.storage
    }

    /// Number of stored `f64` values.
    pub fn storage_len(&self) -> usize {
        match &self.storage {
            MatrixStorage::Dense(a) => a.len(),
            MatrixStorage::Compressed(a) => a.len(),
        }
    }

    /// Interaction between sites `i` and `j` (linear site indices).
    ///
    /// # Panics
    /// Panics if either index is out of range.
    pub fn entry(&self, i: usize, j: usize) -> InteractionEntry {
        let c = self.kind.components();
        let block: Vec<f64> = match &self.storage {
            MatrixStorage::Dense(a) => a
                .slice(s![c * i..c * (i + 1), c * j..c * (j + 1)])
                .iter()
                .copied()
                .collect(),
            MatrixStorage::Compressed(a) => {
                let (si, sj) = (self.geometry.site(i), self.geometry.site(j));
                let delta = self
                    .geometry
                    .displacement_index()
                    .cell_pair_index(si.cell, sj.cell);
                a.slice(s![si.basis, sj.basis, delta, ..]).to_vec()
            }
        };
        match self.kind {
            Multipole::Monopole => InteractionEntry::Scalar(block[0]),
            Multipole::Dipole => InteractionEntry::Tensor(Tensor3::from_row_slice(&block)),
        }
    }

    /// Dense copy of this matrix. Every entry is copied, not recomputed.
    pub fn expand_to_dense(&self) -> InteractionMatrix {
        let storage = match &self.storage {
            MatrixStorage::Dense(a) => a.clone(),
            MatrixStorage::Compressed(_) => {
                let c = self.kind.components();
                let dim = c * self.geometry.n_sites();
                let mut dense = Array2::zeros((dim, dim));
                for i in 0..self.geometry.n_sites() {
                    for j in 0..self.geometry.n_sites() {
                        match self.entry(i, j) {
                            InteractionEntry::Scalar(v) => dense[[i, j]] = v,
                            InteractionEntry::Tensor(t) => {
                                for a in 0..3 {
                                    for b in 0..3 {
                                        dense[[3 * i + a, 3 * j + b]] = t[(a, b)];
                                    }
                                }
                            }
                        }
                    }
                }
                dense
            }
        };
        Self::from_parts(
            self.kind,
            Arc::clone(&self.geometry),
            self.params.clone(),
            MatrixStorage::Dense(storage),
        )
    }
}

impl LatticeSum for InteractionMatrix {
    fn monopole_energy(&self, system: &ChargeSystem) -> Result<f64, EwaldError> {
        EnergyContractor::default().contract(self, system)
    }

    fn method_name(&self) -> &str {
        match self.layout() {
            MatrixLayout::Dense => "dense interaction matrix",
            MatrixLayout::Compressed => "compressed interaction matrix",
        }
    }
}

/// Build an interaction matrix on the default backend.
pub fn build_interaction_matrix(
    geometry: Arc<LatticeGeometry>,
    params: &EwaldParameters,
    layout: MatrixLayout,
    kind: Multipole,
) -> Result<InteractionMatrix, EwaldError> {
    InteractionMatrixBuilder::new(params.clone(), layout)?.build(geometry, kind)
}

/// Energy of `system` from a precomputed matrix.
pub fn contract_energy<S: SiteConfiguration>(
    system: &S,
    matrix: &InteractionMatrix,
) -> Result<f64, EwaldError> {
    EnergyContractor::default().contract(matrix, system)
}

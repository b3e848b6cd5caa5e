//! Energy from a precomputed interaction matrix.

use std::sync::Arc;

use madelung_compute::{ComputeBackend, CpuBackend};
use ndarray::{s, Array4};

use super::{InteractionMatrix, MatrixStorage};
use crate::ewald::EwaldError;
use crate::types::SiteConfiguration;

/// Contracts an [`InteractionMatrix`] with a live configuration.
///
/// The matrix must have been built for the same multipole kind, basis and
/// supercell as the configuration; anything else is rejected before any
/// arithmetic is done.
pub struct EnergyContractor {
    pub backend: Arc<dyn ComputeBackend>,
}

impl Default for EnergyContractor {
    fn default() -> Self {
        Self {
            backend: Arc::new(CpuBackend::new()),
        }
    }
}

impl EnergyContractor {
    pub fn with_backend(backend: Arc<dyn ComputeBackend>) -> Self {
        Self { backend }
    }

    /// $U = \sum_{ij} x_i^T A_{ij} x_j$ for charges or moments `x`.
    pub fn contract<S: SiteConfiguration>(
        &self,
        matrix: &InteractionMatrix,
        system: &S,
    ) -> Result<f64, EwaldError> {
        check_compatible(matrix, system)?;
        let x = system.component_vector();
        let sums = match matrix.storage() {
            MatrixStorage::Dense(a) => {
                self.backend.parallel_sum(a.nrows(), 1, &|row, acc| {
                    if x[row] != 0.0 {
                        acc[0] += x[row] * a.row(row).dot(&x);
                    }
                })?
            }
            MatrixStorage::Compressed(a) => self.contract_compressed(matrix, a, &x.to_vec())?,
        };
        Ok(sums[0])
    }

    fn contract_compressed(
        &self,
        matrix: &InteractionMatrix,
        a: &Array4<f64>,
        x: &[f64],
    ) -> Result<Vec<f64>, EwaldError> {
        let geometry = matrix.geometry();
        let index = geometry.displacement_index();
        let c = matrix.kind().components();
        let n = geometry.n_sites();

        Ok(self.backend.parallel_sum(n, 1, &|i, acc| {
            let xi = &x[c * i..c * (i + 1)];
            if xi.iter().all(|&v| v == 0.0) {
                return;
            }
            let si = geometry.site(i);
            let mut row = 0.0;
            for j in 0..n {
                let sj = geometry.site(j);
                let block = a.slice(s![
                    si.basis,
                    sj.basis,
                    index.cell_pair_index(si.cell, sj.cell),
                    ..
                ]);
                for (p, &xp) in xi.iter().enumerate() {
                    for q in 0..c {
                        row += xp * block[p * c + q] * x[c * j + q];
                    }
                }
            }
            acc[0] += row;
        })?)
    }
}

fn check_compatible<S: SiteConfiguration>(
    matrix: &InteractionMatrix,
    system: &S,
) -> Result<(), EwaldError> {
    let built = matrix.geometry();
    let live = system.geometry();
    if matrix.kind() != S::KIND {
        return Err(EwaldError::ConfigurationMismatch {
            what: "multipole kind",
            expected: format!("{:?}", matrix.kind()),
            found: format!("{:?}", S::KIND),
        });
    }
    if built.n_basis() != live.n_basis() {
        return Err(EwaldError::ConfigurationMismatch {
            what: "basis atoms",
            expected: built.n_basis().to_string(),
            found: live.n_basis().to_string(),
        });
    }
    if built.supercell() != live.supercell() {
        return Err(EwaldError::ConfigurationMismatch {
            what: "supercell",
            expected: format!("{:?}", built.supercell()),
            found: format!("{:?}", live.supercell()),
        });
    }
    if built.n_sites() != live.n_sites() {
        return Err(EwaldError::ConfigurationMismatch {
            what: "sites",
            expected: built.n_sites().to_string(),
            found: live.n_sites().to_string(),
        });
    }
    Ok(())
}

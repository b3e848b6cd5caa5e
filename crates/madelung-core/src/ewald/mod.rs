//! Ewald summation for periodic point charges and point dipoles.
//!
//! The conditionally convergent lattice sum
//! $$U = \tfrac12 \sum_{i,j} \sum_{\mathbf{n}}{}' \frac{q_i q_j}{|\mathbf{r}_{ij} + \mathbf{n}|}$$
//! is split by a Gaussian screening of width $1/\eta$ into a real-space sum
//! of $\operatorname{erfc}$-damped terms ([`real_space`]), a reciprocal-space
//! sum of Gaussian-damped plane waves ([`reciprocal`]), and closed-form
//! self-energy and net-charge corrections. [`summation::EwaldSummation`]
//! combines them; [`direct::DirectSummation`] is the brute-force damped sum
//! used to validate the split.

pub mod direct;
pub mod real_space;
pub mod reciprocal;
pub mod summation;

use std::fmt;

use madelung_compute::ComputeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{ChargeSystem, EwaldParameters, SpinSystem};

pub use direct::DirectSummation;
pub use real_space::RealSpaceKernel;
pub use reciprocal::{ReciprocalSpaceKernel, RECIPROCAL_DAMPING_DENOMINATOR};
pub use summation::EwaldSummation;

/// Errors that can occur while evaluating lattice energies.
///
/// Degenerate cells are rejected with a `GeometryError` when the
/// [`LatticeGeometry`](madelung_geometry::LatticeGeometry) is built, so no
/// evaluation ever sees one.
#[derive(Debug, Error)]
pub enum EwaldError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration mismatch in {what}: expected {expected}, found {found}")]
    ConfigurationMismatch {
        what: &'static str,
        expected: String,
        found: String,
    },

    #[error("Compute backend error: {0}")]
    Compute(#[from] ComputeError),

    #[error("Matrix storage error: {0}")]
    Storage(#[from] ndarray::ShapeError),
}

/// The outermost real-space shell still carries a significant share of the
/// sum: the extent is probably too small for the chosen η.
///
/// This is a diagnostic, not an error; the energy is still returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceWarning {
    /// Which sum the diagnostic refers to.
    pub term: String,
    /// Contribution of the outermost included shell.
    pub outer_shell: f64,
    /// Accumulated total of the sum.
    pub total: f64,
    /// `|outer_shell / total|`.
    pub ratio: f64,
    /// Threshold that was exceeded.
    pub threshold: f64,
}

impl fmt::Display for ConvergenceWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} sum not converged: outermost shell contributes {:.3e} of {:.6e} (ratio {:.2e} > {:.2e}); increase the extent or eta",
            self.term, self.outer_shell, self.total, self.ratio, self.threshold
        )
    }
}

impl ConvergenceWarning {
    /// Return a warning if `|outer / total|` exceeds `threshold`.
    pub(crate) fn check(term: &str, outer: f64, total: f64, threshold: f64) -> Option<Self> {
        if total == 0.0 || outer == 0.0 {
            return None;
        }
        let ratio = (outer / total).abs();
        (ratio > threshold).then(|| Self {
            term: term.to_string(),
            outer_shell: outer,
            total,
            ratio,
            threshold,
        })
    }
}

/// A method that computes the electrostatic energy of a periodic charge lattice.
///
/// Implemented by the Ewald evaluator, the brute-force damped sum, and
/// precomputed interaction matrices, so front-ends can compare them.
pub trait LatticeSum {
    /// Total electrostatic energy of the charge configuration.
    fn monopole_energy(&self, system: &ChargeSystem) -> Result<f64, EwaldError>;

    /// Human-readable name of the method.
    fn method_name(&self) -> &str;
}

/// Ewald energy of a periodic point-charge configuration.
pub fn energy_monopole(system: &ChargeSystem, params: &EwaldParameters) -> Result<f64, EwaldError> {
    EwaldSummation::new(params.clone())?.energy_monopole(system)
}

/// Ewald energy of a periodic point-dipole configuration.
pub fn energy_dipole(system: &SpinSystem, params: &EwaldParameters) -> Result<f64, EwaldError> {
    EwaldSummation::new(params.clone())?.energy_dipole(system)
}

/// Gaussian-damped direct lattice sum with damping `s` and image cutoff
/// `extent` (a length, not a shell count).
pub fn direct_sum_monopole(system: &ChargeSystem, s: f64, extent: f64) -> Result<f64, EwaldError> {
    DirectSummation::new(s, extent)?.monopole_energy(system)
}

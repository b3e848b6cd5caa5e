//! Core types shared across the Madelung framework.
//!
//! This module defines the configurations the lattice sums act on (charges
//! and point moments attached to lattice sites), the Ewald convergence
//! parameters, and the energy report returned by the evaluators.

use std::sync::Arc;

use madelung_geometry::LatticeGeometry;
use nalgebra::{Matrix3, Vector3};
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::ewald::{ConvergenceWarning, EwaldError};

/// Stack-allocated 3×3 real tensor.
pub type Tensor3 = Matrix3<f64>;

/// Which multipole the lattice carries on each site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multipole {
    /// Scalar point charges.
    Monopole,
    /// Three-component point dipoles.
    Dipole,
}

impl Multipole {
    /// Number of values carried per site.
    pub fn components(self) -> usize {
        match self {
            Multipole::Monopole => 1,
            Multipole::Dipole => 3,
        }
    }

    /// Number of values in one pair interaction (1 or a row-major 3×3 block).
    pub fn block_len(self) -> usize {
        self.components() * self.components()
    }
}

/// Ewald splitting parameter and summation extents.
///
/// Larger `eta` shifts weight from the real-space to the reciprocal-space
/// sum; the extents must grow accordingly for both sums to stay converged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EwaldParameters {
    /// Splitting parameter η (inverse length, > 0).
    pub eta: f64,
    /// Real-space image shells per dimension (≥ 0).
    pub real_extent: [i32; 3],
    /// Reciprocal-space shells per dimension (≥ 0).
    pub reciprocal_extent: [i32; 3],
    /// Fraction of the real-space total above which the outermost shell
    /// triggers a [`ConvergenceWarning`].
    #[serde(default = "default_convergence_threshold")]
    pub convergence_threshold: f64,
}

fn default_convergence_threshold() -> f64 {
    1e-6
}

impl Default for EwaldParameters {
    fn default() -> Self {
        Self {
            eta: 2.0,
            real_extent: [5, 5, 5],
            reciprocal_extent: [5, 5, 5],
            convergence_threshold: default_convergence_threshold(),
        }
    }
}

impl EwaldParameters {
    pub fn new(eta: f64, real_extent: [i32; 3], reciprocal_extent: [i32; 3]) -> Self {
        Self {
            eta,
            real_extent,
            reciprocal_extent,
            ..Default::default()
        }
    }

    /// Same shell count along every dimension.
    pub fn uniform(eta: f64, real_extent: i32, reciprocal_extent: i32) -> Self {
        Self::new(eta, [real_extent; 3], [reciprocal_extent; 3])
    }

    pub fn with_convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }

    /// Check η > 0, non-negative extents and a usable warning threshold.
    pub fn validate(&self) -> Result<(), EwaldError> {
        check_eta(self.eta)?;
        check_extent("real-space", self.real_extent)?;
        check_extent("reciprocal-space", self.reciprocal_extent)?;
        if !(self.convergence_threshold.is_finite() && self.convergence_threshold >= 0.0) {
            return Err(EwaldError::InvalidParameter(format!(
                "convergence threshold must be non-negative, got {}",
                self.convergence_threshold
            )));
        }
        Ok(())
    }
}

pub(crate) fn check_eta(eta: f64) -> Result<(), EwaldError> {
    if eta.is_finite() && eta > 0.0 {
        Ok(())
    } else {
        Err(EwaldError::InvalidParameter(format!(
            "splitting parameter eta must be positive and finite, got {eta}"
        )))
    }
}

pub(crate) fn check_extent(space: &str, extent: [i32; 3]) -> Result<(), EwaldError> {
    match extent.iter().find(|&&e| e < 0) {
        Some(e) => Err(EwaldError::InvalidParameter(format!(
            "{space} extent must be non-negative, got {e}"
        ))),
        None => Ok(()),
    }
}

/// Read access shared by every per-site configuration.
pub trait SiteConfiguration {
    /// Multipole carried by each site.
    const KIND: Multipole;

    fn geometry(&self) -> &LatticeGeometry;

    /// All site values flattened to length `n_sites * KIND.components()`.
    fn component_vector(&self) -> Array1<f64>;
}

/// Scalar charge on every lattice site.
///
/// The geometry is shared and immutable; individual charges may be updated
/// between evaluations by a sampler.
#[derive(Debug, Clone)]
pub struct ChargeSystem {
    geometry: Arc<LatticeGeometry>,
    charges: Vec<f64>,
}

impl ChargeSystem {
    /// One charge per site, in linear site-index order.
    pub fn new(geometry: Arc<LatticeGeometry>, charges: Vec<f64>) -> Result<Self, EwaldError> {
        if charges.len() != geometry.n_sites() {
            return Err(EwaldError::ConfigurationMismatch {
                what: "charges per supercell",
                expected: geometry.n_sites().to_string(),
                found: charges.len().to_string(),
            });
        }
        if charges.iter().any(|q| !q.is_finite()) {
            return Err(EwaldError::InvalidParameter("charges must be finite".into()));
        }
        Ok(Self { geometry, charges })
    }

    /// Every site of basis atom `b` carries `per_basis[b]`.
    pub fn per_basis(geometry: Arc<LatticeGeometry>, per_basis: &[f64]) -> Result<Self, EwaldError> {
        if per_basis.len() != geometry.n_basis() {
            return Err(EwaldError::ConfigurationMismatch {
                what: "charges per basis",
                expected: geometry.n_basis().to_string(),
                found: per_basis.len().to_string(),
            });
        }
        let charges = geometry.sites().map(|s| per_basis[s.basis]).collect();
        Self::new(geometry, charges)
    }

    pub fn zeros(geometry: Arc<LatticeGeometry>) -> Self {
        let n = geometry.n_sites();
        Self {
            geometry,
            charges: vec![0.0; n],
        }
    }

    pub fn shared_geometry(&self) -> &Arc<LatticeGeometry> {
        &self.geometry
    }

    pub fn charges(&self) -> &[f64] {
        &self.charges
    }

    pub fn n_sites(&self) -> usize {
        self.charges.len()
    }

    pub fn charge(&self, site: usize) -> f64 {
        self.charges[site]
    }

    pub fn set_charge(&mut self, site: usize, charge: f64) {
        self.charges[site] = charge;
    }

    /// $Q = \sum_i q_i$.
    pub fn total_charge(&self) -> f64 {
        self.charges.iter().sum()
    }

    /// $\sum_i q_i^2$.
    pub fn sum_squares(&self) -> f64 {
        self.charges.iter().map(|q| q * q).sum()
    }

    /// Cell dipole moment $\sum_i q_i \mathbf{x}_i$ using absolute positions.
    pub fn dipole_moment(&self) -> Vector3<f64> {
        self.geometry
            .sites()
            .zip(&self.charges)
            .map(|(s, &q)| q * self.geometry.position(s))
            .sum()
    }
}

impl SiteConfiguration for ChargeSystem {
    const KIND: Multipole = Multipole::Monopole;

    fn geometry(&self) -> &LatticeGeometry {
        &self.geometry
    }

    fn component_vector(&self) -> Array1<f64> {
        Array1::from_vec(self.charges.clone())
    }
}

/// Point dipole moment on every lattice site.
#[derive(Debug, Clone)]
pub struct SpinSystem {
    geometry: Arc<LatticeGeometry>,
    moments: Vec<Vector3<f64>>,
}

impl SpinSystem {
    pub fn new(geometry: Arc<LatticeGeometry>, moments: Vec<Vector3<f64>>) -> Result<Self, EwaldError> {
        if moments.len() != geometry.n_sites() {
            return Err(EwaldError::ConfigurationMismatch {
                what: "moments per supercell",
                expected: geometry.n_sites().to_string(),
                found: moments.len().to_string(),
            });
        }
        if moments.iter().any(|m| m.iter().any(|x| !x.is_finite())) {
            return Err(EwaldError::InvalidParameter("moments must be finite".into()));
        }
        Ok(Self { geometry, moments })
    }

    pub fn per_basis(
        geometry: Arc<LatticeGeometry>,
        per_basis: &[Vector3<f64>],
    ) -> Result<Self, EwaldError> {
        if per_basis.len() != geometry.n_basis() {
            return Err(EwaldError::ConfigurationMismatch {
                what: "moments per basis",
                expected: geometry.n_basis().to_string(),
                found: per_basis.len().to_string(),
            });
        }
        let moments = geometry.sites().map(|s| per_basis[s.basis]).collect();
        Self::new(geometry, moments)
    }

    pub fn zeros(geometry: Arc<LatticeGeometry>) -> Self {
        let n = geometry.n_sites();
        Self {
            geometry,
            moments: vec![Vector3::zeros(); n],
        }
    }

    pub fn shared_geometry(&self) -> &Arc<LatticeGeometry> {
        &self.geometry
    }

    pub fn moments(&self) -> &[Vector3<f64>] {
        &self.moments
    }

    pub fn n_sites(&self) -> usize {
        self.moments.len()
    }

    pub fn moment(&self, site: usize) -> &Vector3<f64> {
        &self.moments[site]
    }

    pub fn set_moment(&mut self, site: usize, moment: Vector3<f64>) {
        self.moments[site] = moment;
    }

    /// $\sum_i \mathbf{p}_i$.
    pub fn total_moment(&self) -> Vector3<f64> {
        self.moments.iter().sum()
    }

    /// $\sum_i |\mathbf{p}_i|^2$.
    pub fn sum_squares(&self) -> f64 {
        self.moments.iter().map(|m| m.norm_squared()).sum()
    }
}

impl SiteConfiguration for SpinSystem {
    const KIND: Multipole = Multipole::Dipole;

    fn geometry(&self) -> &LatticeGeometry {
        &self.geometry
    }

    fn component_vector(&self) -> Array1<f64> {
        self.moments.iter().flat_map(|m| [m.x, m.y, m.z]).collect()
    }
}

/// Ewald energy split into its contributions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnergyReport {
    /// Total lattice energy.
    pub total: f64,
    /// $\tfrac12 \sum$ of the screened real-space pair terms.
    pub real_space: f64,
    /// $(2\pi/V) \sum$ of the reciprocal-space pair terms.
    pub reciprocal: f64,
    /// Self-energy correction (always ≤ 0).
    pub self_energy: f64,
    /// Net-charge (neutralising background) correction; zero for dipoles.
    pub neutrality: f64,
    /// Non-fatal convergence diagnostics.
    pub warnings: Vec<ConvergenceWarning>,
}

impl EnergyReport {
    pub fn is_converged(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn geometry() -> Arc<LatticeGeometry> {
        Arc::new(
            LatticeGeometry::from_arrays(
                [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                &[[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
                [2, 1, 1],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_parameters_validation() {
        assert!(EwaldParameters::default().validate().is_ok());
        assert!(EwaldParameters::uniform(0.0, 1, 1).validate().is_err());
        assert!(EwaldParameters::uniform(-1.0, 1, 1).validate().is_err());
        assert!(EwaldParameters::uniform(f64::NAN, 1, 1).validate().is_err());
        assert!(EwaldParameters::new(1.0, [1, -1, 1], [1, 1, 1]).validate().is_err());
        assert!(EwaldParameters::new(1.0, [1, 1, 1], [0, 0, -2]).validate().is_err());
        assert!(EwaldParameters::uniform(1.0, 0, 0).validate().is_ok());
    }

    #[test]
    fn test_parameters_from_json_use_default_threshold() {
        let p: EwaldParameters = serde_json::from_str(
            r#"{"eta": 1.5, "real_extent": [2, 2, 2], "reciprocal_extent": [4, 4, 4]}"#,
        )
        .unwrap();
        assert_eq!(p.convergence_threshold, 1e-6);
        assert_eq!(p.reciprocal_extent, [4, 4, 4]);
    }

    #[test]
    fn test_charge_system_length_checked() {
        let err = ChargeSystem::new(geometry(), vec![1.0; 3]).unwrap_err();
        assert!(matches!(err, EwaldError::ConfigurationMismatch { .. }));
    }

    #[test]
    fn test_per_basis_charges() {
        let mut q = ChargeSystem::per_basis(geometry(), &[1.0, -1.0]).unwrap();
        assert_eq!(q.charges(), &[1.0, -1.0, 1.0, -1.0]);
        assert_abs_diff_eq!(q.total_charge(), 0.0);
        assert_abs_diff_eq!(q.sum_squares(), 4.0);
        q.set_charge(3, 0.0);
        assert_abs_diff_eq!(q.total_charge(), 1.0);
        // +1 at x = 0 and 1, -1 at x = 0.5; the remaining anion was switched off.
        assert_abs_diff_eq!(q.dipole_moment().x, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_spin_component_vector_is_interleaved() {
        let s = SpinSystem::per_basis(
            geometry(),
            &[Vector3::new(1.0, 2.0, 3.0), Vector3::new(-1.0, 0.0, 0.5)],
        )
        .unwrap();
        let v = s.component_vector();
        assert_eq!(v.len(), 12);
        assert_eq!(v[3], -1.0);
        assert_eq!(v[11], 0.5);
        assert_abs_diff_eq!(s.sum_squares(), 2.0 * (14.0 + 1.25));
        let m = s.total_moment();
        assert_abs_diff_eq!(m.x, 0.0);
        assert_abs_diff_eq!(m.y, 4.0);
        assert_abs_diff_eq!(m.z, 7.0);
    }

    #[test]
    fn test_multipole_block_sizes() {
        assert_eq!(Multipole::Monopole.block_len(), 1);
        assert_eq!(Multipole::Dipole.block_len(), 9);
    }
}

//! Brute-force Gaussian-damped lattice sum.
//!
//! $$U_s = \tfrac12 \sum_{ij} q_i q_j \sum_{|\mathbf{n}| \le R}{}'
//!     \frac{e^{-s|\mathbf{n}|^2}}{|\mathbf{r}_{ij} + \mathbf{n}|}$$
//!
//! There is no reciprocal-space term. As $R \to \infty$ and $s \to 0$ the
//! damped sum approaches the Ewald energy plus two analytic terms:
//!
//! - the neutralising background $\pi Q^2/(Vs)$, divergent unless the
//!   configuration is neutral ([`DirectSummation::neutralising_background`]);
//! - the surface term of a spherically grown sample,
//!   $-\frac{\pi}{3V}\sum_{ij} q_i q_j |\mathbf{r}_{ij}|^2$, which equals
//!   $2\pi|\mathbf{M}|^2/(3V)$ for a neutral cell with dipole moment
//!   $\mathbf{M}$ ([`DirectSummation::surface_term`]).
//!
//! The remaining error is linear in $s$, so a few values of $s$ can be
//! extrapolated.

use std::f64::consts::PI;
use std::sync::Arc;

use madelung_compute::{ComputeBackend, CpuBackend};
use madelung_geometry::LatticeGeometry;
use nalgebra::Vector3;

use super::{EwaldError, LatticeSum};
use crate::types::{ChargeSystem, SiteConfiguration};

/// Damped direct summation with damping `s` and a cutoff radius on the
/// image vector length.
pub struct DirectSummation {
    damping: f64,
    cutoff: f64,
    pub backend: Arc<dyn ComputeBackend>,
}

impl DirectSummation {
    pub fn new(damping: f64, cutoff: f64) -> Result<Self, EwaldError> {
        Self::with_backend(damping, cutoff, Arc::new(CpuBackend::new()))
    }

    pub fn with_backend(
        damping: f64,
        cutoff: f64,
        backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self, EwaldError> {
        if !(damping.is_finite() && damping >= 0.0) {
            return Err(EwaldError::InvalidParameter(format!(
                "damping must be non-negative and finite, got {damping}"
            )));
        }
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(EwaldError::InvalidParameter(format!(
                "cutoff must be positive and finite, got {cutoff}"
            )));
        }
        Ok(Self {
            damping,
            cutoff,
            backend,
        })
    }

    pub fn damping(&self) -> f64 {
        self.damping
    }

    pub fn cutoff(&self) -> f64 {
        self.cutoff
    }

    /// Image offsets with $|\mathbf{n}| \le$ cutoff, paired with their damping weight.
    fn images(&self, geometry: &LatticeGeometry) -> Vec<(Vector3<f64>, f64)> {
        let range = geometry.image_range_within(self.cutoff);
        let mut images = Vec::new();
        for n0 in -range[0]..=range[0] {
            for n1 in -range[1]..=range[1] {
                for n2 in -range[2]..=range[2] {
                    let offset = geometry.image_vector([n0, n1, n2]);
                    let n_sq = offset.norm_squared();
                    if n_sq <= self.cutoff * self.cutoff {
                        images.push((offset, (-self.damping * n_sq).exp()));
                    }
                }
            }
        }
        images
    }

    /// Damped sum without any correction.
    pub fn damped_energy(&self, system: &ChargeSystem) -> Result<f64, EwaldError> {
        let geometry = system.geometry();
        let n = geometry.n_sites();
        let images = self.images(geometry);
        log::debug!(
            "direct sum: {n} sites, s={}, cutoff={}, {} images",
            self.damping,
            self.cutoff,
            images.len()
        );
        let q = system.charges();

        let sums = self.backend.parallel_sum(n * n, 1, &|k, acc| {
            let (i, j) = (k / n, k % n);
            let qq = q[i] * q[j];
            if qq == 0.0 {
                return;
            }
            let r = geometry.site_displacement(i, j);
            let mut pair = 0.0;
            for (offset, weight) in &images {
                let d = (r + offset).norm();
                if d > 0.0 {
                    pair += weight / d;
                }
            }
            acc[0] += qq * pair;
        })?;
        Ok(0.5 * sums[0])
    }

    /// $\pi Q^2 / (V s)$: the part of the damped sum that diverges as
    /// $s \to 0$ when the configuration is not neutral. Zero for $s = 0$.
    pub fn neutralising_background(&self, system: &ChargeSystem) -> f64 {
        if self.damping == 0.0 {
            return 0.0;
        }
        let q = system.total_charge();
        PI * q * q / (system.geometry().supercell_volume() * self.damping)
    }

    /// $-\frac{\pi}{3V}\sum_{ij} q_i q_j |\mathbf{r}_{ij}|^2$ over
    /// minimum-image displacements. Zero for a single site or a cell
    /// without dipole moment.
    pub fn surface_term(&self, system: &ChargeSystem) -> Result<f64, EwaldError> {
        let geometry = system.geometry();
        let n = geometry.n_sites();
        let q = system.charges();
        let sums = self.backend.parallel_sum(n, 1, &|i, acc| {
            for j in 0..n {
                acc[0] += q[i] * q[j] * geometry.site_displacement(i, j).norm_squared();
            }
        })?;
        Ok(-PI / (3.0 * geometry.supercell_volume()) * sums[0])
    }
}

impl LatticeSum for DirectSummation {
    /// Damped sum minus the neutralising background and the surface term.
    fn monopole_energy(&self, system: &ChargeSystem) -> Result<f64, EwaldError> {
        Ok(self.damped_energy(system)?
            - self.neutralising_background(system)
            - self.surface_term(system)?)
    }

    fn method_name(&self) -> &str {
        "damped direct summation"
    }
}

//! Total Ewald energy of a periodic configuration.
//!
//! For charges $q_i$ in a box of volume $V$,
//! $$U = \tfrac12 \sum_{ij} q_i q_j \phi_R(\mathbf{r}_{ij})
//!     + \frac{2\pi}{V} \sum_{ij} q_i q_j \operatorname{Re}\phi_K(\mathbf{r}_{ij})
//!     - \frac{\pi}{2V\eta^2} Q^2 - \frac{\eta}{\sqrt\pi} \sum_i q_i^2 ,$$
//! and for dipoles $\mathbf{p}_i$ the pair terms are contracted with the
//! moments and the self term is $-\tfrac{2\eta^3}{3\sqrt\pi}\sum_i |\mathbf{p}_i|^2$.
//!
//! Pairs are distributed over the compute backend; each task accumulates a
//! private partial sum and the partials are added at the end.

use std::f64::consts::PI;
use std::sync::Arc;

use madelung_compute::{ComputeBackend, CpuBackend};

use super::real_space::RealSpaceKernel;
use super::reciprocal::ReciprocalSpaceKernel;
use super::{ConvergenceWarning, EwaldError, LatticeSum};
use crate::types::{ChargeSystem, EnergyReport, EwaldParameters, SiteConfiguration, SpinSystem};

/// Prefactor $2\pi/V$ of the reciprocal-space sum.
pub fn reciprocal_prefactor(volume: f64) -> f64 {
    2.0 * PI / volume
}

/// Per-pair neutralising-background term, $-\pi/(2V\eta^2)$; summed over all
/// ordered pairs it gives $-\pi Q^2/(2V\eta^2)$.
pub fn neutrality_coefficient(eta: f64, volume: f64) -> f64 {
    -PI / (2.0 * volume * eta * eta)
}

/// Monopole self-energy per unit charge squared, $-\eta/\sqrt\pi$.
pub fn monopole_self_coefficient(eta: f64) -> f64 {
    -eta / PI.sqrt()
}

/// Dipole self-energy per unit moment squared, $-2\eta^3/(3\sqrt\pi)$.
pub fn dipole_self_coefficient(eta: f64) -> f64 {
    -2.0 * eta.powi(3) / (3.0 * PI.sqrt())
}

/// Direct pairwise Ewald evaluator.
///
/// Cost is $O(N^2)$ pairs times the number of images and wavevectors, so
/// this is meant for validation and one-off energies. Repeated evaluation on
/// a fixed geometry should go through an
/// [`InteractionMatrix`](crate::matrix::InteractionMatrix).
pub struct EwaldSummation {
    pub params: EwaldParameters,
    pub backend: Arc<dyn ComputeBackend>,
}

impl Default for EwaldSummation {
    fn default() -> Self {
        Self {
            params: EwaldParameters::default(),
            backend: Arc::new(CpuBackend::new()),
        }
    }
}

impl EwaldSummation {
    pub fn new(params: EwaldParameters) -> Result<Self, EwaldError> {
        params.validate()?;
        Ok(Self {
            params,
            ..Default::default()
        })
    }

    pub fn with_backend(
        params: EwaldParameters,
        backend: Arc<dyn ComputeBackend>,
    ) -> Result<Self, EwaldError> {
        params.validate()?;
        Ok(Self { params, backend })
    }

    /// Monopole energy with its individual contributions.
    pub fn evaluate_monopole(&self, system: &ChargeSystem) -> Result<EnergyReport, EwaldError> {
        self.params.validate()?;
        let geometry = system.geometry();
        let eta = self.params.eta;
        let n = geometry.n_sites();
        log::debug!("Ewald monopole: {n} sites, eta={eta}");

        let real = RealSpaceKernel::new(geometry, eta, self.params.real_extent)?;
        let recip = ReciprocalSpaceKernel::new(geometry, eta, self.params.reciprocal_extent)?;
        let q = system.charges();

        // acc = [real total, real outer shell, reciprocal]
        let sums = self.backend.parallel_sum(n * n, 3, &|k, acc| {
            let (i, j) = (k / n, k % n);
            let qq = q[i] * q[j];
            if qq == 0.0 {
                return;
            }
            let r = geometry.site_displacement(i, j);
            let shell = real.monopole(&r);
            acc[0] += qq * shell.total;
            acc[1] += qq * shell.outer;
            acc[2] += qq * recip.monopole(&r).re;
        })?;

        let volume = geometry.supercell_volume();
        let total_charge = system.total_charge();
        let mut report = EnergyReport {
            real_space: 0.5 * sums[0],
            reciprocal: reciprocal_prefactor(volume) * sums[2],
            self_energy: monopole_self_coefficient(eta) * system.sum_squares(),
            neutrality: neutrality_coefficient(eta, volume) * total_charge * total_charge,
            ..Default::default()
        };
        self.finish(&mut report, sums[1], sums[0]);
        Ok(report)
    }

    /// Dipole energy with its individual contributions.
    pub fn evaluate_dipole(&self, system: &SpinSystem) -> Result<EnergyReport, EwaldError> {
        self.params.validate()?;
        let geometry = system.geometry();
        let eta = self.params.eta;
        let n = geometry.n_sites();
        log::debug!("Ewald dipole: {n} sites, eta={eta}");

        let real = RealSpaceKernel::new(geometry, eta, self.params.real_extent)?;
        let recip = ReciprocalSpaceKernel::new(geometry, eta, self.params.reciprocal_extent)?;
        let p = system.moments();

        let sums = self.backend.parallel_sum(n * n, 3, &|k, acc| {
            let (i, j) = (k / n, k % n);
            if p[i].iter().all(|&x| x == 0.0) || p[j].iter().all(|&x| x == 0.0) {
                return;
            }
            let r = geometry.site_displacement(i, j);
            let shell = real.dipole_tensor(&r);
            acc[0] += p[i].dot(&(shell.total * p[j]));
            acc[1] += p[i].dot(&(shell.outer * p[j]));
            acc[2] += recip.dipole_pair(&r, &p[i], &p[j]);
        })?;

        let volume = geometry.supercell_volume();
        let mut report = EnergyReport {
            real_space: 0.5 * sums[0],
            reciprocal: reciprocal_prefactor(volume) * sums[2],
            self_energy: dipole_self_coefficient(eta) * system.sum_squares(),
            neutrality: 0.0,
            ..Default::default()
        };
        self.finish(&mut report, sums[1], sums[0]);
        Ok(report)
    }

    /// Total monopole energy; convergence warnings are logged.
    pub fn energy_monopole(&self, system: &ChargeSystem) -> Result<f64, EwaldError> {
        Ok(self.evaluate_monopole(system)?.total)
    }

    /// Total dipole energy; convergence warnings are logged.
    pub fn energy_dipole(&self, system: &SpinSystem) -> Result<f64, EwaldError> {
        Ok(self.evaluate_dipole(system)?.total)
    }

    fn finish(&self, report: &mut EnergyReport, outer: f64, real_total: f64) {
        report.total =
            report.real_space + report.reciprocal + report.self_energy + report.neutrality;
        if let Some(warning) = ConvergenceWarning::check(
            "real-space",
            outer,
            real_total,
            self.params.convergence_threshold,
        ) {
            log::warn!("{warning}");
            report.warnings.push(warning);
        }
        log::debug!(
            "Ewald energy {:.12e} (real {:.6e}, reciprocal {:.6e}, self {:.6e}, neutrality {:.6e})",
            report.total,
            report.real_space,
            report.reciprocal,
            report.self_energy,
            report.neutrality
        );
    }
}

impl LatticeSum for EwaldSummation {
    fn monopole_energy(&self, system: &ChargeSystem) -> Result<f64, EwaldError> {
        self.energy_monopole(system)
    }

    fn method_name(&self) -> &str {
        "Ewald summation"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use madelung_compute::SerialBackend;
    use madelung_geometry::LatticeGeometry;
    use nalgebra::Vector3;

    fn unit_cube(basis: &[[f64; 3]]) -> Arc<LatticeGeometry> {
        Arc::new(
            LatticeGeometry::from_arrays(
                [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
                basis,
                [1, 1, 1],
            )
            .unwrap(),
        )
    }

    #[test]
    fn test_rejects_invalid_eta() {
        assert!(matches!(
            EwaldSummation::new(EwaldParameters::uniform(0.0, 3, 3)),
            Err(EwaldError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_report_components_add_up() {
        let system = ChargeSystem::new(
            unit_cube(&[[0.5, 0.5, 0.5], [0.25, 0.5, 0.5], [0.75, 0.5, 0.5]]),
            vec![2.0, -1.0, -1.0],
        )
        .unwrap();
        let ewald = EwaldSummation::new(EwaldParameters::uniform(2.0, 3, 5)).unwrap();
        let report = ewald.evaluate_monopole(&system).unwrap();
        assert_abs_diff_eq!(
            report.total,
            report.real_space + report.reciprocal + report.self_energy + report.neutrality,
            epsilon = 1e-12
        );
        assert_eq!(report.neutrality, 0.0);
        assert_abs_diff_eq!(report.self_energy, -2.0 * 6.0 / PI.sqrt(), epsilon = 1e-12);
        assert_abs_diff_eq!(report.total, -13.831563025409, epsilon = 1e-8);
        assert!(report.is_converged());
    }

    #[test]
    fn test_single_charge_includes_background() {
        let system = ChargeSystem::new(unit_cube(&[[0.0, 0.0, 0.0]]), vec![1.0]).unwrap();
        let report = EwaldSummation::default().evaluate_monopole(&system).unwrap();
        assert_abs_diff_eq!(report.neutrality, -PI / 8.0, epsilon = 1e-14);
        assert_abs_diff_eq!(report.total, -1.4186487397403, epsilon = 1e-9);
    }

    #[test]
    fn test_serial_and_parallel_backends_agree() {
        let system = SpinSystem::new(
            unit_cube(&[[0.1, 0.2, 0.3], [0.6, 0.4, 0.7]]),
            vec![Vector3::new(0.3, -0.5, 1.0), Vector3::new(-0.2, 0.8, 0.4)],
        )
        .unwrap();
        let params = EwaldParameters::uniform(3.0, 2, 6);
        let serial = EwaldSummation::with_backend(params.clone(), Arc::new(SerialBackend)).unwrap();
        let parallel = EwaldSummation::new(params).unwrap();
        let a = serial.energy_dipole(&system).unwrap();
        let b = parallel.energy_dipole(&system).unwrap();
        assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        assert_abs_diff_eq!(a, -7.741412735935819, epsilon = 1e-8);
    }

    #[test]
    fn test_too_small_extent_warns() {
        // eta = 0.5 with a single real-space shell leaves erfc(0.5) in the outer shell.
        let system = ChargeSystem::new(
            unit_cube(&[[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]]),
            vec![1.0, -1.0],
        )
        .unwrap();
        let ewald = EwaldSummation::new(EwaldParameters::uniform(0.5, 1, 2)).unwrap();
        let report = ewald.evaluate_monopole(&system).unwrap();
        assert!(!report.is_converged());
        assert_eq!(report.warnings[0].term, "real-space");
        assert!(report.warnings[0].ratio > 1e-6);
    }

    #[test]
    fn test_custom_threshold_controls_warning() {
        let system = ChargeSystem::new(
            unit_cube(&[[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]]),
            vec![1.0, -1.0],
        )
        .unwrap();
        let params = EwaldParameters::uniform(0.5, 1, 2);
        let ratio = EwaldSummation::new(params.clone())
            .unwrap()
            .evaluate_monopole(&system)
            .unwrap()
            .warnings[0]
            .ratio;

        let lenient = params.clone().with_convergence_threshold(2.0 * ratio);
        let report = EwaldSummation::new(lenient).unwrap().evaluate_monopole(&system).unwrap();
        assert!(report.is_converged());

        let strict = params.with_convergence_threshold(0.5 * ratio);
        let report = EwaldSummation::new(strict).unwrap().evaluate_monopole(&system).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert_abs_diff_eq!(report.warnings[0].threshold, 0.5 * ratio);
    }
}

//! Gaussian-damped reciprocal-space pair terms.
//!
//! Every term carries the weight
//! $$w(\mathbf{k}) = \frac{\exp(-k^2 / 4\eta^2)}{k^2}$$
//! summed over the supercell reciprocal vectors
//! $\mathbf{k} = \sum_d m_d \mathbf{b}_d / L_d$ with $|m_d| \le$ extent and
//! $\mathbf{k} \neq 0$. Both the scalar dipole path used by the evaluator and
//! the tensor path used by the matrix builder read the same weights.

use madelung_geometry::LatticeGeometry;
use nalgebra::Vector3;
use num_complex::Complex64;

use crate::ewald::EwaldError;
use crate::types::{check_eta, check_extent, Tensor3};

/// Denominator `c` in the damping factor $\exp(-k^2 / (c\,\eta^2))$.
pub const RECIPROCAL_DAMPING_DENOMINATOR: f64 = 4.0;

/// Gaussian damping $\exp(-k^2 / (4\eta^2))$ for a squared wavevector.
pub fn reciprocal_damping(k_sq: f64, eta: f64) -> f64 {
    (-k_sq / (RECIPROCAL_DAMPING_DENOMINATOR * eta * eta)).exp()
}

#[derive(Debug, Clone)]
struct Wavevector {
    k: Vector3<f64>,
    weight: f64,
}

/// Reciprocal-space Ewald kernel for one geometry, η and extent.
#[derive(Debug, Clone)]
pub struct ReciprocalSpaceKernel {
    eta: f64,
    wavevectors: Vec<Wavevector>,
}

impl ReciprocalSpaceKernel {
    pub fn new(
        geometry: &LatticeGeometry,
        eta: f64,
        extent: [i32; 3],
    ) -> Result<Self, EwaldError> {
        check_eta(eta)?;
        check_extent("reciprocal-space", extent)?;
        let ext = extent.map(i64::from);
        let mut wavevectors = Vec::new();
        for m0 in -ext[0]..=ext[0] {
            for m1 in -ext[1]..=ext[1] {
                for m2 in -ext[2]..=ext[2] {
                    if m0 == 0 && m1 == 0 && m2 == 0 {
                        continue;
                    }
                    let k = geometry.reciprocal_vector([m0, m1, m2]);
                    let k_sq = k.norm_squared();
                    wavevectors.push(Wavevector {
                        k,
                        weight: reciprocal_damping(k_sq, eta) / k_sq,
                    });
                }
            }
        }
        log::debug!(
            "reciprocal kernel: eta={eta}, {} wavevectors",
            wavevectors.len()
        );
        Ok(Self { eta, wavevectors })
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    pub fn n_wavevectors(&self) -> usize {
        self.wavevectors.len()
    }

    /// $\sum_{\mathbf{k}} w(\mathbf{k})\, e^{i \mathbf{k}\cdot\mathbf{r}}$.
    ///
    /// The imaginary part cancels over the symmetric k set; callers keep
    /// the real part.
    pub fn monopole(&self, r: &Vector3<f64>) -> Complex64 {
        self.wavevectors
            .iter()
            .map(|wv| wv.weight * Complex64::from_polar(1.0, wv.k.dot(r)))
            .sum()
    }

    /// Scalar dipole term
    /// $\sum_{\mathbf{k}} w\,\cos(\mathbf{k}\cdot\mathbf{r})\,(\mathbf{p}_i\cdot\mathbf{k})(\mathbf{p}_j\cdot\mathbf{k})$.
    pub fn dipole_pair(&self, r: &Vector3<f64>, p_i: &Vector3<f64>, p_j: &Vector3<f64>) -> f64 {
        self.wavevectors
            .iter()
            .map(|wv| wv.weight * wv.k.dot(r).cos() * p_i.dot(&wv.k) * p_j.dot(&wv.k))
            .sum()
    }

    /// Dipole tensor $\sum_{\mathbf{k}} w\,\cos(\mathbf{k}\cdot\mathbf{r})\,\mathbf{k}\mathbf{k}^T$;
    /// `p_iᵀ T p_j` equals [`dipole_pair`](Self::dipole_pair).
    pub fn dipole_tensor(&self, r: &Vector3<f64>) -> Tensor3 {
        let mut tensor = Tensor3::zeros();
        for wv in &self.wavevectors {
            tensor += (wv.weight * wv.k.dot(r).cos()) * wv.k * wv.k.transpose();
        }
        tensor
    }
}

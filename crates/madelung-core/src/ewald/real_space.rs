//! Screened real-space pair terms summed over periodic images.
//!
//! For a displacement $\mathbf{r}$ and image offsets $\mathbf{n}$ of the
//! supercell, the monopole term is
//! $$\phi(\mathbf{r}) = \sum_{\mathbf{n}}{}' \frac{\operatorname{erfc}(\eta d)}{d}, \qquad d = |\mathbf{r} + \mathbf{n}|,$$
//! and the dipole tensor is
//! $$\mathbf{T}(\mathbf{r}) = \sum_{\mathbf{n}}{}' \left[ B(d)\,\mathbf{I} - C(d)\,\boldsymbol{\Delta}\boldsymbol{\Delta}^T \right],$$
//! with $\boldsymbol{\Delta} = \mathbf{r} + \mathbf{n}$,
//! $B = (e + \operatorname{erfc}(\eta d))/d^3$,
//! $C = 3\,((2\eta^2 d^2/3 + 1)\,e + \operatorname{erfc}(\eta d))/d^5$ and
//! $e = (2\eta/\sqrt{\pi})\, d\, \exp(-\eta^2 d^2)$.
//!
//! The primed sum omits the singular term where both $\mathbf{r}$ and
//! $\mathbf{n}$ are zero.

use std::f64::consts::PI;

use madelung_geometry::LatticeGeometry;
use nalgebra::Vector3;
use statrs::function::erf::erfc;

use crate::ewald::EwaldError;
use crate::types::{check_eta, check_extent, Tensor3};

/// Total over all images, and the part contributed by the outermost shell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShellSum<T> {
    pub total: T,
    pub outer: T,
}

#[derive(Debug, Clone)]
struct Image {
    offset: Vector3<f64>,
    origin: bool,
    outer: bool,
}

/// Real-space Ewald kernel for one geometry, η and shell extent.
///
/// Image offsets are enumerated once at construction and reused for every
/// pair.
#[derive(Debug, Clone)]
pub struct RealSpaceKernel {
    eta: f64,
    images: Vec<Image>,
}

impl RealSpaceKernel {
    /// Enumerate images $\mathbf{n} = \sum_d n_d L_d \mathbf{a}_d$ with
    /// $|n_d| \le$ `extent[d]`.
    ///
    /// Fails with [`EwaldError::InvalidParameter`] for η that is not positive
    /// and finite, or for a negative extent.
    pub fn new(
        geometry: &LatticeGeometry,
        eta: f64,
        extent: [i32; 3],
    ) -> Result<Self, EwaldError> {
        check_eta(eta)?;
        check_extent("real-space", extent)?;
        let ext = extent.map(i64::from);
        let mut images = Vec::with_capacity(
            ext.iter().map(|&e| (2 * e + 1) as usize).product(),
        );
        for n0 in -ext[0]..=ext[0] {
            for n1 in -ext[1]..=ext[1] {
                for n2 in -ext[2]..=ext[2] {
                    let n = [n0, n1, n2];
                    let outer = (0..3).any(|d| ext[d] > 0 && n[d].abs() == ext[d]);
                    images.push(Image {
                        offset: geometry.image_vector(n),
                        origin: n == [0, 0, 0],
                        outer,
                    });
                }
            }
        }
        log::debug!("real-space kernel: eta={eta}, {} images", images.len());
        Ok(Self { eta, images })
    }

    pub fn eta(&self) -> f64 {
        self.eta
    }

    pub fn n_images(&self) -> usize {
        self.images.len()
    }

    /// Screened Coulomb sum $\sum' \operatorname{erfc}(\eta d)/d$.
    pub fn monopole(&self, r: &Vector3<f64>) -> ShellSum<f64> {
        let self_pair = is_zero(r);
        let mut total = 0.0;
        let mut outer = 0.0;
        for image in &self.images {
            if self_pair && image.origin {
                continue;
            }
            let d = (r + image.offset).norm();
            let term = erfc(self.eta * d) / d;
            total += term;
            if image.outer {
                outer += term;
            }
        }
        ShellSum { total, outer }
    }

    /// Screened dipole–dipole tensor, isotropic plus anisotropic parts.
    pub fn dipole_tensor(&self, r: &Vector3<f64>) -> ShellSum<Tensor3> {
        let self_pair = is_zero(r);
        let eta = self.eta;
        let mut iso = 0.0;
        let mut iso_outer = 0.0;
        let mut aniso = Tensor3::zeros();
        let mut aniso_outer = Tensor3::zeros();

        for image in &self.images {
            if self_pair && image.origin {
                continue;
            }
            let delta = r + image.offset;
            let d_sq = delta.norm_squared();
            let d = d_sq.sqrt();
            let exp_term = 2.0 * eta / PI.sqrt() * d * (-eta * eta * d_sq).exp();
            let erfc_term = erfc(eta * d);

            let b = (exp_term + erfc_term) / (d_sq * d);
            let c = -3.0 * ((2.0 * eta * eta * d_sq / 3.0 + 1.0) * exp_term + erfc_term)
                / (d_sq * d_sq * d);
            let dyad = c * delta * delta.transpose();

            iso += b;
            aniso += dyad;
            if image.outer {
                iso_outer += b;
                aniso_outer += dyad;
            }
        }

        ShellSum {
            total: Tensor3::identity() * iso + aniso,
            outer: Tensor3::identity() * iso_outer + aniso_outer,
        }
    }
}

fn is_zero(r: &Vector3<f64>) -> bool {
    r.iter().all(|&x| x == 0.0)
}

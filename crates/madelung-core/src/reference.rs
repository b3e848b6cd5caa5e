//! Closed-form reference values for validating lattice sums.
//!
//! Madelung constants are quoted per ion pair (or per charge for the
//! jellium lattice) relative to the nearest-neighbour distance $r_0$:
//! $U = -\alpha q^2 / r_0$. For the simple cubic lattice of unit charges in
//! a neutralising background the convention is $U = -\alpha q^2 / (2a)$.

use madelung_geometry::CrystalPreset;
use nalgebra::Vector3;

/// Simple cubic lattice of like charges in a uniform neutralising background.
pub const SIMPLE_CUBIC_JELLIUM: f64 = 2.837_297_479_481;

/// NaCl structure.
pub const ROCK_SALT: f64 = 1.747_564_594_633;

/// CsCl structure.
pub const CAESIUM_CHLORIDE: f64 = 1.762_674_773_070;

/// Classical interaction of two point dipoles separated by `r` (from 1 to 2):
/// $$U = \frac{\mathbf{p}_1\cdot\mathbf{p}_2 - 3(\mathbf{p}_1\cdot\hat{\mathbf{r}})(\mathbf{p}_2\cdot\hat{\mathbf{r}})}{|\mathbf{r}|^3}.$$
pub fn point_dipole_energy(p1: &Vector3<f64>, p2: &Vector3<f64>, r: &Vector3<f64>) -> f64 {
    let d = r.norm();
    let r_hat = r / d;
    (p1.dot(p2) - 3.0 * p1.dot(&r_hat) * p2.dot(&r_hat)) / d.powi(3)
}

/// Expected Ewald energy of a whole supercell of a built-in preset carrying
/// its formal charges (unit charges for simple cubic). `None` for custom cells.
pub fn expected_energy(preset: &CrystalPreset) -> Option<f64> {
    match preset {
        CrystalPreset::SimpleCubic(c) => {
            let cells = c.supercell.iter().product::<usize>() as f64;
            Some(-cells * SIMPLE_CUBIC_JELLIUM / (2.0 * c.lattice_constant))
        }
        CrystalPreset::RockSalt(c) => {
            let pairs = 4.0 * c.supercell.iter().product::<usize>() as f64;
            Some(-pairs * ROCK_SALT / (0.5 * c.lattice_constant))
        }
        CrystalPreset::CaesiumChloride(c) => {
            let pairs = c.supercell.iter().product::<usize>() as f64;
            Some(-pairs * CAESIUM_CHLORIDE / (0.5 * 3.0_f64.sqrt() * c.lattice_constant))
        }
        CrystalPreset::Custom(_) => None,
    }
}

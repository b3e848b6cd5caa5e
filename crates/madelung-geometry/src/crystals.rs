//! Built-in crystal structures.
//!
//! Each preset is fully described by a handful of parameters so it can be
//! written inline in a TOML job file. Ionic presets also carry the formal
//! charges of their basis atoms.

use serde::{Deserialize, Serialize};

use crate::{GeometryError, LatticeGeometry};

/// A crystal structure that can be expanded into a [`LatticeGeometry`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CrystalPreset {
    SimpleCubic(Cubic),
    RockSalt(Cubic),
    CaesiumChloride(Cubic),
    Custom(CustomCell),
}

/// Cubic structure parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cubic {
    /// Edge length of the cubic cell.
    pub lattice_constant: f64,
    /// Number of cells along each axis.
    #[serde(default = "unit_supercell")]
    pub supercell: [usize; 3],
}

/// Arbitrary lattice given explicitly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomCell {
    /// Lattice vectors, one per row.
    pub vectors: [[f64; 3]; 3],
    /// Basis positions in fractional coordinates of `vectors`.
    pub basis: Vec<[f64; 3]>,
    #[serde(default = "unit_supercell")]
    pub supercell: [usize; 3],
}

fn unit_supercell() -> [usize; 3] {
    [1, 1, 1]
}

impl CrystalPreset {
    pub fn name(&self) -> &str {
        match self {
            CrystalPreset::SimpleCubic(_) => "simple cubic",
            CrystalPreset::RockSalt(_) => "rock salt (NaCl)",
            CrystalPreset::CaesiumChloride(_) => "caesium chloride (CsCl)",
            CrystalPreset::Custom(_) => "custom",
        }
    }

    /// Expand the preset into a geometry.
    pub fn build(&self) -> Result<LatticeGeometry, GeometryError> {
        match self {
            CrystalPreset::SimpleCubic(c) => cubic(c, &[[0.0, 0.0, 0.0]]),
            CrystalPreset::RockSalt(c) => cubic(c, &ROCK_SALT_BASIS),
            CrystalPreset::CaesiumChloride(c) => {
                cubic(c, &[[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]])
            }
            CrystalPreset::Custom(cell) => {
                let v = cell.vectors;
                let basis: Vec<[f64; 3]> = cell
                    .basis
                    .iter()
                    .map(|f| {
                        let mut x = [0.0; 3];
                        for (d, xd) in x.iter_mut().enumerate() {
                            *xd = f[0] * v[0][d] + f[1] * v[1][d] + f[2] * v[2][d];
                        }
                        x
                    })
                    .collect();
                LatticeGeometry::from_arrays(v, &basis, cell.supercell)
            }
        }
    }

    /// Formal charge of each basis atom, for ionic presets.
    pub fn formal_charges(&self) -> Option<Vec<f64>> {
        match self {
            CrystalPreset::RockSalt(_) => Some(vec![1.0, 1.0, 1.0, 1.0, -1.0, -1.0, -1.0, -1.0]),
            CrystalPreset::CaesiumChloride(_) => Some(vec![1.0, -1.0]),
            CrystalPreset::SimpleCubic(_) | CrystalPreset::Custom(_) => None,
        }
    }
}

/// Conventional 8-atom rock-salt cell: cations on the fcc sites, anions
/// shifted by half a cell edge.
const ROCK_SALT_BASIS: [[f64; 3]; 8] = [
    [0.0, 0.0, 0.0],
    [0.0, 0.5, 0.5],
    [0.5, 0.0, 0.5],
    [0.5, 0.5, 0.0],
    [0.5, 0.0, 0.0],
    [0.0, 0.5, 0.0],
    [0.0, 0.0, 0.5],
    [0.5, 0.5, 0.5],
];

fn cubic(params: &Cubic, fractional: &[[f64; 3]]) -> Result<LatticeGeometry, GeometryError> {
    let a = params.lattice_constant;
    let basis: Vec<[f64; 3]> = fractional
        .iter()
        .map(|f| [a * f[0], a * f[1], a * f[2]])
        .collect();
    LatticeGeometry::from_arrays(
        [[a, 0.0, 0.0], [0.0, a, 0.0], [0.0, 0.0, a]],
        &basis,
        params.supercell,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_rock_salt_is_neutral() {
        let preset = CrystalPreset::RockSalt(Cubic { lattice_constant: 5.64, supercell: [1, 1, 1] });
        let g = preset.build().unwrap();
        let q = preset.formal_charges().unwrap();
        assert_eq!(g.n_basis(), q.len());
        assert_abs_diff_eq!(q.iter().sum::<f64>(), 0.0);
        assert_abs_diff_eq!(g.cell_volume(), 5.64_f64.powi(3), epsilon = 1e-9);
    }

    #[test]
    fn test_custom_cell_uses_fractional_basis() {
        let preset = CrystalPreset::Custom(CustomCell {
            vectors: [[2.0, 0.0, 0.0], [0.0, 3.0, 0.0], [0.0, 0.0, 4.0]],
            basis: vec![[0.0, 0.0, 0.0], [0.5, 0.5, 0.5]],
            supercell: [1, 2, 1],
        });
        let g = preset.build().unwrap();
        assert_abs_diff_eq!(g.basis()[1].x, 1.0);
        assert_abs_diff_eq!(g.basis()[1].y, 1.5);
        assert_abs_diff_eq!(g.basis()[1].z, 2.0);
        assert_eq!(g.n_sites(), 4);
    }

    #[test]
    fn test_preset_from_toml() {
        let preset: CrystalPreset = toml::from_str(
            r#"
            type = "caesium_chloride"
            lattice_constant = 4.1
            supercell = [2, 2, 2]
            "#,
        )
        .unwrap();
        assert_eq!(preset.name(), "caesium chloride (CsCl)");
        let g = preset.build().unwrap();
        assert_eq!(g.n_sites(), 16);
    }

    #[test]
    fn test_supercell_defaults_to_single_cell() {
        let preset: CrystalPreset =
            toml::from_str("type = \"simple_cubic\"\nlattice_constant = 1.0\n").unwrap();
        assert_eq!(preset.build().unwrap().supercell(), [1, 1, 1]);
    }
}

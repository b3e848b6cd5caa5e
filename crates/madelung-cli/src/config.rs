//! TOML configuration deserialisation for lattice-energy jobs.

use madelung_core::{EwaldParameters, MatrixLayout};
use madelung_geometry::CrystalPreset;
use serde::Deserialize;

/// Top-level job configuration.
#[derive(Debug, Deserialize)]
pub struct JobConfig {
    pub lattice: CrystalPreset,
    #[serde(default)]
    pub ewald: EwaldParameters,
    /// Site charges. Ionic presets fall back to their formal charges.
    pub charges: Option<ChargeSpec>,
    pub moments: Option<MomentSpec>,
    /// Also precompute an interaction matrix and contract it.
    pub matrix: Option<MatrixConfig>,
    #[serde(default)]
    pub compute: ComputeConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Charges given once per basis atom or once per supercell site.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ChargeSpec {
    PerBasis { per_basis: Vec<f64> },
    PerSite { per_site: Vec<f64> },
}

/// Point dipole moments, one per basis atom.
#[derive(Debug, Deserialize)]
pub struct MomentSpec {
    pub per_basis: Vec<[f64; 3]>,
}

#[derive(Debug, Deserialize)]
pub struct MatrixConfig {
    #[serde(default)]
    pub layout: MatrixLayout,
}

#[derive(Debug, Default, Deserialize)]
pub struct ComputeConfig {
    /// Worker threads. Default: the global Rayon pool.
    pub threads: Option<usize>,
}

/// Output configuration.
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    /// Output directory (default: "./output").
    #[serde(default = "default_output_dir")]
    pub directory: String,
    /// Whether to write the energy report as JSON (default: true).
    #[serde(default = "default_true")]
    pub save_json: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            save_json: true,
        }
    }
}

fn default_output_dir() -> String {
    "./output".into()
}
fn default_true() -> bool {
    true
}

/// Load and parse a TOML job configuration file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<JobConfig> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> anyhow::Result<JobConfig> {
    let config: JobConfig = toml::from_str(content)?;
    config.ewald.validate()?;
    Ok(config)
}

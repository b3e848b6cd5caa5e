//! Job runner: ties together geometry, configurations, and the lattice sums.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use nalgebra::Vector3;
use serde::Serialize;

use madelung_compute::{ComputeBackend, CpuBackend};
use madelung_core::reference;
use madelung_core::{
    ChargeSystem, EnergyContractor, EnergyReport, EwaldParameters, EwaldSummation,
    InteractionMatrixBuilder, MatrixLayout, Multipole, SpinSystem,
};
use madelung_geometry::crystals::Cubic;
use madelung_geometry::{CrystalPreset, LatticeGeometry};

use crate::config::{ChargeSpec, JobConfig};

/// Energy of one configuration recovered from a precomputed matrix.
#[derive(Debug, Serialize)]
pub struct MatrixResult {
    pub kind: Multipole,
    pub layout: MatrixLayout,
    pub stored_values: usize,
    pub energy: f64,
}

/// Results from a job run.
#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub lattice: String,
    pub n_sites: usize,
    pub parameters: EwaldParameters,
    pub monopole: Option<EnergyReport>,
    pub dipole: Option<EnergyReport>,
    pub matrix: Vec<MatrixResult>,
    /// Closed-form energy for presets with formal charges.
    pub expected_monopole: Option<f64>,
}

/// Run a job from a parsed configuration.
pub fn run_job(job: &JobConfig) -> Result<RunOutput> {
    let geometry = Arc::new(job.lattice.build()?);
    println!(
        "  Lattice '{}': {} basis atoms, supercell {:?}, {} sites",
        job.lattice.name(),
        geometry.n_basis(),
        geometry.supercell(),
        geometry.n_sites()
    );

    let charges = build_charges(job.charges.as_ref(), &job.lattice, &geometry)?;
    let moments = build_moments(job, &geometry)?;
    if charges.is_none() && moments.is_none() {
        anyhow::bail!(
            "Lattice '{}' has no formal charges: give [charges] or [moments]",
            job.lattice.name()
        );
    }

    let backend = create_backend(job.compute.threads)?;
    let ewald = EwaldSummation::with_backend(job.ewald.clone(), Arc::clone(&backend))?;

    let monopole = charges
        .as_ref()
        .map(|system| ewald.evaluate_monopole(system))
        .transpose()?;
    let dipole = moments
        .as_ref()
        .map(|system| ewald.evaluate_dipole(system))
        .transpose()?;

    for (label, report) in [("Monopole", &monopole), ("Dipole", &dipole)] {
        if let Some(report) = report {
            print_report(label, report);
        }
    }

    let mut matrix = Vec::new();
    if let Some(config) = &job.matrix {
        let builder = InteractionMatrixBuilder::with_backend(
            job.ewald.clone(),
            config.layout,
            Arc::clone(&backend),
        )?;
        let contractor = EnergyContractor::with_backend(Arc::clone(&backend));
        if let Some(system) = &charges {
            let m = builder.build(Arc::clone(&geometry), Multipole::Monopole)?;
            let energy = contractor.contract(&m, system)?;
            matrix.push(MatrixResult {
                kind: Multipole::Monopole,
                layout: m.layout(),
                stored_values: m.storage_len(),
                energy,
            });
        }
        if let Some(system) = &moments {
            let m = builder.build(Arc::clone(&geometry), Multipole::Dipole)?;
            let energy = contractor.contract(&m, system)?;
            matrix.push(MatrixResult {
                kind: Multipole::Dipole,
                layout: m.layout(),
                stored_values: m.storage_len(),
                energy,
            });
        }
        for r in &matrix {
            println!(
                "  {:?} {} matrix ({} values): U = {:.10}",
                r.kind, r.layout, r.stored_values, r.energy
            );
        }
    }

    // The closed form only applies to the formal charges.
    let expected_monopole = match job.charges {
        None => reference::expected_energy(&job.lattice),
        Some(_) => None,
    };
    if let (Some(expected), Some(report)) = (expected_monopole, &monopole) {
        println!(
            "  Madelung reference: {expected:.10} (deviation {:.2e})",
            report.total - expected
        );
    }

    Ok(RunOutput {
        lattice: job.lattice.name().to_string(),
        n_sites: geometry.n_sites(),
        parameters: job.ewald.clone(),
        monopole,
        dipole,
        matrix,
        expected_monopole,
    })
}

/// Charges from the job, or the preset's formal charges when none are given.
/// Simple cubic lattices without explicit charges carry unit charges.
fn build_charges(
    spec: Option<&ChargeSpec>,
    preset: &CrystalPreset,
    geometry: &Arc<LatticeGeometry>,
) -> Result<Option<ChargeSystem>> {
    let system = match spec {
        Some(ChargeSpec::PerBasis { per_basis }) => {
            ChargeSystem::per_basis(Arc::clone(geometry), per_basis)?
        }
        Some(ChargeSpec::PerSite { per_site }) => {
            ChargeSystem::new(Arc::clone(geometry), per_site.clone())?
        }
        None => match (preset, preset.formal_charges()) {
            (_, Some(formal)) => ChargeSystem::per_basis(Arc::clone(geometry), &formal)?,
            (CrystalPreset::SimpleCubic(_), None) => {
                ChargeSystem::per_basis(Arc::clone(geometry), &[1.0])?
            }
            _ => return Ok(None),
        },
    };
    Ok(Some(system))
}

fn build_moments(job: &JobConfig, geometry: &Arc<LatticeGeometry>) -> Result<Option<SpinSystem>> {
    let Some(spec) = &job.moments else {
        return Ok(None);
    };
    let per_basis: Vec<Vector3<f64>> = spec.per_basis.iter().map(|p| Vector3::from(*p)).collect();
    let system = SpinSystem::per_basis(Arc::clone(geometry), &per_basis)
        .context("Invalid [moments] section")?;
    Ok(Some(system))
}

fn print_report(label: &str, report: &EnergyReport) {
    println!("  {label} energy: {:.10}", report.total);
    println!("    real space:  {:+.10}", report.real_space);
    println!("    reciprocal:  {:+.10}", report.reciprocal);
    println!("    self:        {:+.10}", report.self_energy);
    println!("    neutrality:  {:+.10}", report.neutrality);
    for warning in &report.warnings {
        eprintln!("  Warning: {warning}");
    }
}

/// Write the run output to a JSON file.
pub fn write_report_json(output: &RunOutput, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(output)
        .map_err(|e| anyhow::anyhow!("JSON serialisation error: {}", e))?;
    std::fs::write(path, json)?;

    println!("Report (JSON) written to: {}", path.display());
    Ok(())
}

/// One row of the preset self-check.
pub struct PresetCheck {
    pub name: String,
    pub computed: f64,
    pub expected: f64,
}

impl PresetCheck {
    pub fn relative_error(&self) -> f64 {
        ((self.computed - self.expected) / self.expected).abs()
    }
}

/// Evaluate every ionic preset at unit lattice constant and compare with
/// its Madelung constant.
pub fn check_presets(params: &EwaldParameters, threads: Option<usize>) -> Result<Vec<PresetCheck>> {
    let ewald = EwaldSummation::with_backend(params.clone(), create_backend(threads)?)?;
    let cubic = || Cubic {
        lattice_constant: 1.0,
        supercell: [1, 1, 1],
    };
    let presets = [
        CrystalPreset::SimpleCubic(cubic()),
        CrystalPreset::RockSalt(cubic()),
        CrystalPreset::CaesiumChloride(cubic()),
    ];

    let mut checks = Vec::with_capacity(presets.len());
    for preset in &presets {
        let geometry = Arc::new(preset.build()?);
        let system = build_charges(None, preset, &geometry)?
            .with_context(|| format!("Preset '{}' carries no charges", preset.name()))?;
        let expected = reference::expected_energy(preset)
            .with_context(|| format!("No reference energy for '{}'", preset.name()))?;
        checks.push(PresetCheck {
            name: preset.name().to_string(),
            computed: ewald.energy_monopole(&system)?,
            expected,
        });
    }
    Ok(checks)
}

/// Create a compute backend: the global Rayon pool, or a dedicated pool
/// with `threads` workers.
fn create_backend(threads: Option<usize>) -> Result<Arc<dyn ComputeBackend>> {
    let backend = match threads {
        Some(n) => CpuBackend::with_threads(n)?,
        None => CpuBackend::new(),
    };
    let info = backend.device_info();
    log::debug!("backend: {} ({:?} workers)", info.name, info.compute_units);
    Ok(Arc::new(backend))
}

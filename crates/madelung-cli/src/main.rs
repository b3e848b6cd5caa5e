//! Madelung command-line interface.
//!
//! Compute lattice energies from TOML job files:
//! ```sh
//! madelung run job.toml
//! madelung validate job.toml
//! madelung presets --check
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use madelung_core::EwaldParameters;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "madelung")]
#[command(about = "Madelung: Ewald summation for periodic charge and dipole lattices")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a job from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Worker threads (overrides config file setting).
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },
    /// Validate a configuration file without running the job.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// List the built-in crystal presets.
    Presets {
        /// Evaluate each ionic preset and compare with its Madelung constant.
        #[arg(long)]
        check: bool,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            output,
            threads,
        } => {
            println!("Madelung Ewald Solver");
            println!("=====================");
            let mut job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());
            if threads.is_some() {
                job.compute.threads = threads;
            }

            let result = runner::run_job(&job)?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            if job.output.save_json {
                runner::write_report_json(&result, &out_dir.join("energy.json"))?;
            }

            println!("Calculation complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            let geometry = job.lattice.build()?;
            println!("Configuration is valid: {}", config.display());
            println!(
                "  {} ({} sites), eta = {}",
                job.lattice.name(),
                geometry.n_sites(),
                job.ewald.eta
            );
            Ok(())
        }
        Commands::Presets { check } => {
            println!("Available crystal presets:");
            println!();
            println!("  simple_cubic      one site per cell, unit charge, neutralising background");
            println!("  rock_salt         conventional NaCl cell, 8 sites, charges ±1");
            println!("  caesium_chloride  CsCl cell, 2 sites, charges ±1");
            println!("  custom            explicit lattice vectors and fractional basis");

            if check {
                println!();
                println!("Madelung constant check (a = 1):");
                let params = EwaldParameters::uniform(4.0, 2, 8);
                for row in runner::check_presets(&params, None)? {
                    println!(
                        "  {:<26} computed {:+.12}  expected {:+.12}  rel. err {:.1e}",
                        row.name,
                        row.computed,
                        row.expected,
                        row.relative_error()
                    );
                }
            }
            Ok(())
        }
    }
}

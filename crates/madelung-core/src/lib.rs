//! # Madelung Core
//!
//! The numerical backbone of the Madelung framework. This crate computes the
//! electrostatic energy of periodic point-charge and point-dipole lattices
//! with Ewald summation, and caches the pairwise interactions so repeated
//! whole-system energies reduce to a matrix contraction.
//!
//! ## Architecture
//!
//! [`ewald::EwaldSummation`] evaluates energies pair by pair from the
//! real-space and reciprocal-space kernels. [`matrix::InteractionMatrixBuilder`]
//! calls the same kernels once per pair (dense) or once per basis pair and
//! cell displacement (compressed), and [`matrix::EnergyContractor`] recovers
//! the energy of any configuration on that geometry. All three, plus the
//! brute-force [`ewald::DirectSummation`], implement [`ewald::LatticeSum`].
//!
//! ## Modules
//!
//! - [`types`]: Configurations, Ewald parameters, energy reports.
//! - [`ewald`]: Kernels, the Ewald evaluator and the damped direct sum.
//! - [`matrix`]: Dense and compressed interaction matrices, contraction,
//!   and a swap-on-publish shared cache.
//! - [`reference`]: Madelung constants and the classical dipole energy.

pub mod ewald;
pub mod matrix;
pub mod reference;
pub mod types;

pub use ewald::{
    direct_sum_monopole, energy_dipole, energy_monopole, ConvergenceWarning, DirectSummation,
    EwaldError, EwaldSummation, LatticeSum,
};
pub use matrix::{
    build_interaction_matrix, contract_energy, EnergyContractor, InteractionMatrix,
    InteractionMatrixBuilder, MatrixLayout, SharedInteractionMatrix,
};
pub use types::{ChargeSystem, EnergyReport, EwaldParameters, Multipole, SpinSystem};

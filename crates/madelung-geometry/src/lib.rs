//! # Madelung Geometry
//!
//! Periodic lattice geometry for the Madelung framework. This crate provides:
//!
//! - **Lattice geometry** ([`lattice`]): Primitive and reciprocal vectors,
//!   basis atoms, supercell extents, cell volumes, and minimum-image pair
//!   displacements.
//! - **Site indexing** ([`sites`]): Linear site labels and the affine
//!   (basis, basis, Δ) map used by translation-compressed storage.
//! - **Crystal presets** ([`crystals`]): Simple cubic, rock salt, caesium
//!   chloride, and explicit custom cells.

pub mod crystals;
pub mod lattice;
pub mod sites;

use thiserror::Error;

pub use crystals::CrystalPreset;
pub use lattice::LatticeGeometry;
pub use sites::{basis_pair_offsets, BasisPairOffset, DisplacementIndex, Site};

/// Errors raised while constructing a lattice geometry.
#[derive(Debug, Error)]
pub enum GeometryError {
    #[error("Degenerate lattice: cell volume {volume:.3e} (lattice vectors are not linearly independent)")]
    Degenerate { volume: f64 },

    #[error("Lattice has no basis atoms")]
    EmptyBasis,

    #[error("Invalid supercell extents {extents:?}: every extent must be at least 1")]
    InvalidSupercell { extents: [usize; 3] },

    #[error("Basis atoms {first} and {second} coincide modulo the lattice")]
    CoincidentBasis { first: usize, second: usize },

    #[error("Non-finite values in {0}")]
    NonFinite(String),
}

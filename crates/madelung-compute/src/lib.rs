//! # Madelung Compute
//!
//! Compute backend abstraction for the Madelung framework. This crate
//! provides a [`ComputeBackend`](backend::ComputeBackend) trait that isolates
//! the lattice-sum code from execution details.
//!
//! ## Available backends
//!
//! | Backend | Feature flag | Notes |
//! |---------|-------------|-------|
//! | Serial | always | Fixed summation order, used as a reference |
//! | CPU (Rayon) | `cpu` (default) | Global pool or a dedicated pool |

pub mod backend;

#[cfg(feature = "cpu")]
pub mod cpu;

pub use backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, SerialBackend};

#[cfg(feature = "cpu")]
pub use cpu::CpuBackend;

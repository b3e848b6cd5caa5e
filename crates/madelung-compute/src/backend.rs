//! Compute backend trait and device abstraction.
//!
//! The [`ComputeBackend`] trait abstracts over execution environments so that
//! the lattice-sum code in `madelung-core` stays device-agnostic. Work is
//! expressed as independent per-index tasks: either filling a disjoint block
//! of an output buffer, or accumulating into a private partial sum that is
//! reduced by element-wise addition.

use thiserror::Error;

/// Errors originating from compute backends.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("Failed to build thread pool: {0}")]
    ThreadPool(String),
}

/// Describes the capabilities of a compute backend.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub name: String,
    pub backend_type: BackendType,
    pub compute_units: Option<usize>,
}

/// The type of compute backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Cpu,
    Serial,
}

/// Per-index block writer: `fill(index, block)` writes exactly `block.len()` values.
pub type FillFn<'a> = dyn Fn(usize, &mut [f64]) + Send + Sync + 'a;

/// Per-index accumulator: `term(index, partial)` adds into a zeroed private slice.
pub type TermFn<'a> = dyn Fn(usize, &mut [f64]) + Send + Sync + 'a;

/// Abstraction over compute backends.
///
/// Implementations provide the two hot-path patterns used by the Ewald
/// code: filling interaction tables entry by entry, and reducing pair sums.
pub trait ComputeBackend: Send + Sync {
    /// Return information about the device.
    fn device_info(&self) -> DeviceInfo;

    /// Fill a buffer of `count * block_len` values, one block per index.
    ///
    /// Each block is written by exactly one task, so the result does not
    /// depend on scheduling.
    fn parallel_fill(
        &self,
        count: usize,
        block_len: usize,
        fill: &FillFn<'_>,
    ) -> Result<Vec<f64>, ComputeError>;

    /// Sum `width` accumulators over `count` independent tasks.
    ///
    /// Every task receives its own zeroed slice; partial results are combined
    /// with element-wise addition. Summation order may vary between runs.
    fn parallel_sum(
        &self,
        count: usize,
        width: usize,
        term: &TermFn<'_>,
    ) -> Result<Vec<f64>, ComputeError>;
}

/// Single-threaded reference backend. Summation order is fixed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialBackend;

impl ComputeBackend for SerialBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Serial CPU".into(),
            backend_type: BackendType::Serial,
            compute_units: Some(1),
        }
    }

    fn parallel_fill(
        &self,
        count: usize,
        block_len: usize,
        fill: &FillFn<'_>,
    ) -> Result<Vec<f64>, ComputeError> {
        let mut data = vec![0.0; count * block_len];
        if block_len > 0 {
            for (idx, block) in data.chunks_mut(block_len).enumerate() {
                fill(idx, block);
            }
        }
        Ok(data)
    }

    fn parallel_sum(
        &self,
        count: usize,
        width: usize,
        term: &TermFn<'_>,
    ) -> Result<Vec<f64>, ComputeError> {
        let mut total = vec![0.0; width];
        let mut partial = vec![0.0; width];
        for idx in 0..count {
            partial.iter_mut().for_each(|x| *x = 0.0);
            term(idx, &mut partial);
            for (t, p) in total.iter_mut().zip(&partial) {
                *t += p;
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_fill_writes_every_block() {
        let data = SerialBackend
            .parallel_fill(4, 2, &|i, block| {
                block[0] = i as f64;
                block[1] = -(i as f64);
            })
            .unwrap();
        assert_eq!(data, vec![0.0, -0.0, 1.0, -1.0, 2.0, -2.0, 3.0, -3.0]);
    }

    #[test]
    fn test_serial_sum_uses_private_partials() {
        let sums = SerialBackend
            .parallel_sum(5, 2, &|i, acc| {
                // Partials arrive zeroed, so overwriting is equivalent to adding.
                assert!(acc.iter().all(|&x| x == 0.0));
                acc[0] += i as f64;
                acc[1] += 1.0;
            })
            .unwrap();
        assert_eq!(sums, vec![10.0, 5.0]);
    }
}

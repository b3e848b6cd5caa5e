//! CPU compute backend using Rayon for shared-memory parallelism.

use rayon::prelude::*;

use crate::backend::{BackendType, ComputeBackend, ComputeError, DeviceInfo, FillFn, TermFn};

/// CPU backend that parallelises work across threads via Rayon.
///
/// [`CpuBackend::new`] runs on Rayon's global pool; [`CpuBackend::with_threads`]
/// owns a dedicated pool of the requested size.
pub struct CpuBackend {
    num_threads: usize,
    pool: Option<rayon::ThreadPool>,
}

impl CpuBackend {
    /// Create a new CPU backend using all available threads.
    pub fn new() -> Self {
        Self {
            num_threads: rayon::current_num_threads(),
            pool: None,
        }
    }

    /// Create a CPU backend with a dedicated pool of `num_threads` workers.
    pub fn with_threads(num_threads: usize) -> Result<Self, ComputeError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .build()
            .map_err(|e| ComputeError::ThreadPool(e.to_string()))?;
        Ok(Self {
            num_threads: pool.current_num_threads(),
            pool: Some(pool),
        })
    }

    fn run<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        match &self.pool {
            Some(pool) => pool.install(op),
            None => op(),
        }
    }
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputeBackend for CpuBackend {
    fn device_info(&self) -> DeviceInfo {
        DeviceInfo {
            name: format!("CPU ({} threads)", self.num_threads),
            backend_type: BackendType::Cpu,
            compute_units: Some(self.num_threads),
        }
    }

    fn parallel_fill(
        &self,
        count: usize,
        block_len: usize,
        fill: &FillFn<'_>,
    ) -> Result<Vec<f64>, ComputeError> {
        let mut data = vec![0.0; count * block_len];
        if block_len == 0 {
            return Ok(data);
        }
        self.run(|| {
            data.par_chunks_mut(block_len)
                .enumerate()
                .for_each(|(idx, block)| fill(idx, block));
        });
        Ok(data)
    }

    fn parallel_sum(
        &self,
        count: usize,
        width: usize,
        term: &TermFn<'_>,
    ) -> Result<Vec<f64>, ComputeError> {
        let total = self.run(|| {
            (0..count)
                .into_par_iter()
                .fold(
                    || (vec![0.0; width], vec![0.0; width]),
                    |(mut acc, mut partial), idx| {
                        partial.iter_mut().for_each(|x| *x = 0.0);
                        term(idx, &mut partial);
                        for (a, p) in acc.iter_mut().zip(&partial) {
                            *a += p;
                        }
                        (acc, partial)
                    },
                )
                .map(|(acc, _)| acc)
                .reduce(
                    || vec![0.0; width],
                    |mut a, b| {
                        for (x, y) in a.iter_mut().zip(&b) {
                            *x += y;
                        }
                        a
                    },
                )
        });
        Ok(total)
    }
}

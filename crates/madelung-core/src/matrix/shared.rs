//! Shared, swap-on-publish interaction matrix cache.
//!
//! Readers take an [`Arc`] snapshot and contract against it without holding
//! any lock. A rebuild constructs the replacement outside the lock and then
//! swaps the pointer, so contractions already in flight finish on the old
//! matrix.

use std::sync::{Arc, PoisonError, RwLock};

use madelung_geometry::LatticeGeometry;

use super::{EnergyContractor, InteractionMatrix, InteractionMatrixBuilder};
use crate::ewald::EwaldError;
use crate::types::{Multipole, SiteConfiguration};

pub struct SharedInteractionMatrix {
    current: RwLock<Arc<InteractionMatrix>>,
}

impl SharedInteractionMatrix {
    pub fn new(matrix: InteractionMatrix) -> Self {
        Self {
            current: RwLock::new(Arc::new(matrix)),
        }
    }

    /// The currently published matrix.
    pub fn snapshot(&self) -> Arc<InteractionMatrix> {
        // The guarded value is a pointer swap, never left half-written.
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the published matrix and return the previous one.
    pub fn publish(&self, matrix: InteractionMatrix) -> Arc<InteractionMatrix> {
        self.swap(Arc::new(matrix))
    }

    fn swap(&self, next: Arc<InteractionMatrix>) -> Arc<InteractionMatrix> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }

    /// Build a new matrix with `builder` and publish it.
    ///
    /// On error the published matrix is left untouched.
    pub fn rebuild(
        &self,
        builder: &InteractionMatrixBuilder,
        geometry: Arc<LatticeGeometry>,
        kind: Multipole,
    ) -> Result<Arc<InteractionMatrix>, EwaldError> {
        let matrix = Arc::new(builder.build(geometry, kind)?);
        self.swap(Arc::clone(&matrix));
        Ok(matrix)
    }

    /// Contract `system` against the current snapshot.
    pub fn contract<S: SiteConfiguration>(
        &self,
        contractor: &EnergyContractor,
        system: &S,
    ) -> Result<f64, EwaldError> {
        contractor.contract(&self.snapshot(), system)
    }
}

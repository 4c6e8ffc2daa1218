//! # Sampler Module
//!
//! Builds one telemetry record per tick from the device providers.
//!
//! This module handles:
//! - Asking the location provider for the latest fix
//! - Asking the cell provider for visible cells
//! - Keeping only registered LTE cells, in provider order
//! - Skipping the tick silently when no fix is available

pub mod provider;
pub mod snapshot_file;

use std::sync::Arc;

use tracing::debug;

use crate::telemetry::TelemetryRecord;

pub use provider::{CellInfoProvider, LocationProvider, ObservedCell, RadioType};
pub use snapshot_file::SnapshotFileProvider;

/// Reference sampling period in milliseconds
pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 5000;

/// Turns provider snapshots into telemetry records
///
/// The sampler holds no per-tick state. Non-overlapping ticks are enforced
/// by the coordinator that drives it.
#[derive(Clone)]
pub struct Sampler {
    location: Arc<dyn LocationProvider>,
    cells: Arc<dyn CellInfoProvider>,
}

impl std::fmt::Debug for Sampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sampler").finish_non_exhaustive()
    }
}

impl Sampler {
    /// Create a sampler over the given providers
    #[must_use]
    pub fn new(location: Arc<dyn LocationProvider>, cells: Arc<dyn CellInfoProvider>) -> Self {
        Self { location, cells }
    }

    /// Take one sample.
    ///
    /// Returns `None` when the location provider has no fix; the cell
    /// provider is not queried in that case.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::sync::Arc;
    /// use cell_telemetry_sync::sampler::{Sampler, SnapshotFileProvider};
    ///
    /// # async fn run() {
    /// let provider = Arc::new(SnapshotFileProvider::new("snapshot.json"));
    /// let sampler = Sampler::new(provider.clone(), provider);
    /// if let Some(record) = sampler.sample().await {
    ///     println!("{} cells", record.cells().len());
    /// }
    /// # }
    /// ```
    pub async fn sample(&self) -> Option<TelemetryRecord> {
        let Some(location) = self.location.snapshot().await else {
            debug!("No location fix this tick, skipping");
            return None;
        };

        let cells: Vec<_> = self
            .cells
            .snapshot()
            .await
            .into_iter()
            .filter(ObservedCell::is_registered_lte)
            .map(|cell| cell.measurement)
            .collect();

        debug!(
            "Sampled fix at {} with {} registered LTE cell(s)",
            location.timestamp,
            cells.len()
        );

        Some(TelemetryRecord::new(location, cells))
    }
}

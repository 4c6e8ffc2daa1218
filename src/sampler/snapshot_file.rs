//! Provider backed by a JSON snapshot file that an external process keeps
//! up to date (a modem bridge, a GNSS daemon hook, a test harness).
//!
//! A location query re-reads the file and holds its cells for the next
//! cell query, so one tick sees a single version of the file. A cell query
//! with nothing held reads the file itself. Shape:
//!
//! ```json
//! {
//!   "location": {"latitude": 55.75, "longitude": 37.61, "timestamp": 1700000000000, "accuracy": 12.5},
//!   "cells": [
//!     {"radio": "LTE", "registered": true,
//!      "cellIdentity": {"cellIdentity": 26435586, "earfcn": 1602, "pci": 311, "tac": 7715},
//!      "signalStrength": {"asuLevel": 38, "cqi": 2147483647, "rsrp": -102, "rsrq": -11,
//!                         "rssi": -71, "rssnr": 2147483647, "timingAdvance": 2147483647}}
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::provider::{CellInfoProvider, LocationProvider, ObservedCell};
use crate::error::Result;
use crate::telemetry::LocationSample;

#[derive(Debug, Default, Deserialize)]
struct Snapshot {
    #[serde(default)]
    location: Option<LocationSample>,
    #[serde(default)]
    cells: Vec<ObservedCell>,
}

/// Reads location and cells from a snapshot file
#[derive(Debug)]
pub struct SnapshotFileProvider {
    path: PathBuf,
    /// Cells from the file version that produced the last location
    held_cells: Mutex<Option<Vec<ObservedCell>>>,
}

impl SnapshotFileProvider {
    #[must_use]
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            held_cells: Mutex::new(None),
        }
    }

    fn hold_cells(&self, cells: Option<Vec<ObservedCell>>) {
        match self.held_cells.lock() {
            Ok(mut held) => *held = cells,
            Err(poisoned) => *poisoned.into_inner() = cells,
        }
    }

    fn take_held_cells(&self) -> Option<Vec<ObservedCell>> {
        match self.held_cells.lock() {
            Ok(mut held) => held.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    async fn load(&self) -> Result<Snapshot> {
        let contents = tokio::fs::read_to_string(&self.path).await?;
        Ok(serde_json::from_str(&contents)?)
    }

    async fn load_or_empty(&self) -> Snapshot {
        match self.load().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                debug!("No usable snapshot at {}: {}", self.path.display(), e);
                Snapshot::default()
            }
        }
    }
}

#[async_trait]
impl LocationProvider for SnapshotFileProvider {
    async fn snapshot(&self) -> Option<LocationSample> {
        let snapshot = self.load_or_empty().await;
        self.hold_cells(Some(snapshot.cells));
        snapshot.location
    }
}

#[async_trait]
impl CellInfoProvider for SnapshotFileProvider {
    async fn snapshot(&self) -> Vec<ObservedCell> {
        match self.take_held_cells() {
            Some(cells) => cells,
            None => self.load_or_empty().await.cells,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::provider::RadioType;
    use tempfile::TempDir;

    const SNAPSHOT: &str = r#"{
        "location": {"latitude": 55.75, "longitude": 37.61, "altitude": 148.0,
                     "timestamp": 1700000000000, "accuracy": 12.5},
        "cells": [
            {"radio": "LTE", "registered": true,
             "cellIdentity": {"band": [3], "cellIdentity": 26435586, "earfcn": 1602,
                              "mcc": "250", "mnc": "01", "pci": 311, "tac": 7715},
             "signalStrength": {"asuLevel": 38, "cqi": 2147483647, "rsrp": -102, "rsrq": -11,
                                "rssi": -71, "rssnr": 2147483647, "timingAdvance": 2147483647}},
            {"radio": "GSM", "registered": false,
             "cellIdentity": {"cellIdentity": 1, "earfcn": 0, "pci": 0, "tac": 0},
             "signalStrength": {"asuLevel": 1, "cqi": 0, "rsrp": 0, "rsrq": 0,
                                "rssi": 0, "rssnr": 0, "timingAdvance": 0}}
        ]
    }"#;

    #[tokio::test]
    async fn test_reads_location_and_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SNAPSHOT).unwrap();

        let provider = SnapshotFileProvider::new(&path);
        let location = LocationProvider::snapshot(&provider).await.unwrap();
        assert_eq!(location.altitude, Some(148.0));
        assert_eq!(location.speed, None);

        let cells = CellInfoProvider::snapshot(&provider).await;
        assert_eq!(cells.len(), 2);
        assert_eq!(cells[0].radio, RadioType::Lte);
        assert!(cells[0].is_registered_lte());
        assert_eq!(cells[0].measurement.identity.mcc.as_deref(), Some("250"));
        assert!(!cells[1].is_registered_lte());
    }

    #[tokio::test]
    async fn test_missing_file_is_no_data() {
        let provider = SnapshotFileProvider::new("/nonexistent/snapshot.json");
        assert!(LocationProvider::snapshot(&provider).await.is_none());
        assert!(CellInfoProvider::snapshot(&provider).await.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_file_is_no_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, "{\"location\": ").unwrap();

        let provider = SnapshotFileProvider::new(&path);
        assert!(LocationProvider::snapshot(&provider).await.is_none());
    }

    #[tokio::test]
    async fn test_null_location() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, r#"{"location": null}"#).unwrap();

        let provider = SnapshotFileProvider::new(&path);
        assert!(LocationProvider::snapshot(&provider).await.is_none());
        assert!(CellInfoProvider::snapshot(&provider).await.is_empty());
    }

    #[tokio::test]
    async fn test_cells_come_from_same_read_as_location() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        std::fs::write(&path, SNAPSHOT).unwrap();
        let provider = SnapshotFileProvider::new(&path);

        assert!(LocationProvider::snapshot(&provider).await.is_some());

        // Bridge rewrites the file between the two queries of one tick
        std::fs::write(&path, r#"{"location": null, "cells": []}"#).unwrap();
        assert_eq!(CellInfoProvider::snapshot(&provider).await.len(), 2);

        // Held cells are used once; the next query reads the new version
        assert!(CellInfoProvider::snapshot(&provider).await.is_empty());
    }

    #[tokio::test]
    async fn test_file_is_reread_each_call() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("snapshot.json");
        let provider = SnapshotFileProvider::new(&path);

        assert!(LocationProvider::snapshot(&provider).await.is_none());
        std::fs::write(&path, SNAPSHOT).unwrap();
        assert!(LocationProvider::snapshot(&provider).await.is_some());
    }
}

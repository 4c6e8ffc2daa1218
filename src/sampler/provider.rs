//! Trait abstraction for the device data sources to enable testing
//!
//! Both providers are best-effort: they return "nothing" instead of failing.

use async_trait::async_trait;
use serde::Deserialize;

use crate::telemetry::{CellMeasurement, LocationSample};

/// Radio access technology of an observed cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RadioType {
    Gsm,
    Cdma,
    Umts,
    Lte,
    Nr,
}

/// One cell as reported by the platform, before filtering
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ObservedCell {
    pub radio: RadioType,

    /// True when the device is registered (camped) on this cell
    pub registered: bool,

    #[serde(flatten)]
    pub measurement: CellMeasurement,
}

impl ObservedCell {
    /// Registered LTE cells are the only ones kept in a record
    #[must_use]
    pub fn is_registered_lte(&self) -> bool {
        self.radio == RadioType::Lte && self.registered
    }
}

/// Source of location fixes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Latest fix, or `None` when no fix is available right now
    async fn snapshot(&self) -> Option<LocationSample>;
}

/// Source of nearby cell observations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CellInfoProvider: Send + Sync {
    /// Cells currently visible, in platform order. Empty when unknown.
    async fn snapshot(&self) -> Vec<ObservedCell>;
}

//! # Telemetry Record Types
//!
//! A record pairs one location fix with the registered LTE cells seen at the
//! same tick. Records serialize to a single JSON object per line with
//! camelCase keys; absent optional values are omitted from the line.
//!
//! Numeric cell fields routinely carry the provider's "unknown" sentinel
//! (see [`UNAVAILABLE`]). Those values are stored and written verbatim.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Provider sentinel for an unknown integer cell field.
///
/// Exported for providers and tests; never interpreted by this crate.
pub const UNAVAILABLE: i32 = i32::MAX;

/// A location fix as captured by the provider
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    /// Latitude in degrees
    pub latitude: f64,

    /// Longitude in degrees
    pub longitude: f64,

    /// Altitude in meters, when the fix has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,

    /// Provider capture time (epoch milliseconds)
    pub timestamp: i64,

    /// Ground speed in m/s, when the fix has one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f32>,

    /// Horizontal accuracy radius in meters
    pub accuracy: f32,
}

/// Identity of one LTE cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellIdentity {
    /// Frequency bands, in provider order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub band: Option<Vec<i32>>,

    /// 28-bit E-UTRAN cell identifier (widened)
    pub cell_identity: i64,

    pub earfcn: i32,

    /// Mobile country code; absent when the SIM state is unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mcc: Option<String>,

    /// Mobile network code; absent when the SIM state is unknown
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnc: Option<String>,

    /// Physical cell id
    pub pci: i32,

    /// Tracking area code
    pub tac: i32,
}

/// Signal strength of one LTE cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellSignal {
    pub asu_level: i32,
    pub cqi: i32,
    pub rsrp: i32,
    pub rsrq: i32,
    pub rssi: i32,
    pub rssnr: i32,
    pub timing_advance: i32,
}

/// One registered LTE cell: identity plus signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMeasurement {
    #[serde(rename = "cellIdentity")]
    pub identity: CellIdentity,

    #[serde(rename = "signalStrength")]
    pub signal: CellSignal,
}

/// One captured sample: a location fix and zero or more cells
///
/// Fields are private so a record cannot change after construction.
///
/// # Examples
///
/// ```
/// use cell_telemetry_sync::telemetry::{LocationSample, TelemetryRecord};
///
/// let location = LocationSample {
///     latitude: 55.75,
///     longitude: 37.61,
///     altitude: None,
///     timestamp: 1_700_000_000_000,
///     speed: None,
///     accuracy: 12.5,
/// };
/// let record = TelemetryRecord::new(location, Vec::new());
/// let line = record.to_json_line().unwrap();
/// assert!(!line.contains('\n'));
/// assert_eq!(TelemetryRecord::from_json_line(&line).unwrap(), record);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    location: LocationSample,

    #[serde(default, alias = "cellInfoLte")]
    cells: Vec<CellMeasurement>,
}

impl TelemetryRecord {
    /// Build a record from a location fix and the cells seen with it
    #[must_use]
    pub fn new(location: LocationSample, cells: Vec<CellMeasurement>) -> Self {
        Self { location, cells }
    }

    #[must_use]
    pub fn location(&self) -> &LocationSample {
        &self.location
    }

    #[must_use]
    pub fn cells(&self) -> &[CellMeasurement] {
        &self.cells
    }

    /// Encode as one JSON line, without the trailing newline.
    ///
    /// `serde_json` escapes control characters inside strings, so the
    /// output never contains a raw newline.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Json` if serialization fails.
    pub fn to_json_line(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse one queued line back into a record
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Json` if the line is not a valid record.
    pub fn from_json_line(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
    }
}

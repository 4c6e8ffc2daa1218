//! # Telemetry Module
//!
//! Telemetry record data model and its JSON Lines encoding.
//!
//! This module handles:
//! - Location fixes and LTE cell measurements as immutable values
//! - Encoding one record as exactly one JSON line
//! - Parsing queued lines back into records

pub mod record;

pub use record::{
    CellIdentity, CellMeasurement, CellSignal, LocationSample, TelemetryRecord, UNAVAILABLE,
};

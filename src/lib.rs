//! # Cell Telemetry Sync Library
//!
//! Periodically sample a location fix plus registered LTE cell measurements,
//! queue them durably on disk, and deliver them to a remote collector over a
//! line-framed request/reply exchange.
//!
//! Connectivity loss never loses a sample: anything not acknowledged stays in
//! the queue and is retried, in order, on the next attempt.

pub mod config;
pub mod error;
pub mod queue;
pub mod sampler;
pub mod sync;
pub mod telemetry;

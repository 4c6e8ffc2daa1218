//! # Sync Module
//!
//! Delivery of telemetry records to the remote collector.
//!
//! This module handles:
//! - Line-framed request/reply sessions over TCP
//! - Draining the durable queue in order, one request in flight
//! - Immediate send with backlog-first ordering and queue fallback
//! - The single-flight timer that drives sampling and delivery

pub mod client;
pub mod coordinator;
pub mod transport;

pub use client::SyncClient;
pub use coordinator::{CycleOutcome, DrainOutcome, SyncCoordinator, SyncEvent, TickOutcome};
pub use transport::{Connector, Exchange, TcpConnector};

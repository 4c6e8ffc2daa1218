//! # Sync Client
//!
//! Delivers queued and freshly built records to the collector, one request
//! at a time, waiting for each reply before sending the next.
//!
//! Any timeout, connection failure, or bad reply aborts the attempt. Unsent
//! state stays in the durable queue and is retried wholesale next time, so
//! delivery is at-least-once and the collector must tolerate duplicates.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::transport::{Connector, TcpConnector};
use crate::error::Result;
use crate::queue::DurableQueue;
use crate::telemetry::TelemetryRecord;

/// Reference send timeout in milliseconds
pub const DEFAULT_SEND_TIMEOUT_MS: u64 = 3000;

/// Reference receive timeout in milliseconds
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 3000;

/// Request/reply delivery over a [`Connector`]
#[derive(Clone)]
pub struct SyncClient {
    connector: Arc<dyn Connector>,
    queue: Arc<DurableQueue>,
}

impl std::fmt::Debug for SyncClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncClient")
            .field("queue", &self.queue.path())
            .finish_non_exhaustive()
    }
}

impl SyncClient {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>, queue: Arc<DurableQueue>) -> Self {
        Self { connector, queue }
    }

    /// Client over plain TCP with the given send/receive windows
    #[must_use]
    pub fn tcp(send_timeout: Duration, receive_timeout: Duration, queue: Arc<DurableQueue>) -> Self {
        Self::new(Arc::new(TcpConnector::new(send_timeout, receive_timeout)), queue)
    }

    /// Send every queued line to `address`, in order.
    ///
    /// Returns `true` when the queue was empty or every line was
    /// acknowledged. The queue file is never modified here; clearing it
    /// after success is up to the caller.
    pub async fn drain_queue(&self, address: &str) -> bool {
        match self.try_drain_queue(address).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Queue drain to {} failed: {}", address, e);
                false
            }
        }
    }

    /// Like [`drain_queue`](Self::drain_queue) but reports the number of
    /// lines delivered, or the failure cause.
    ///
    /// An empty queue succeeds without opening a connection.
    ///
    /// # Errors
    ///
    /// Returns the first storage or delivery error; nothing after it is sent.
    pub async fn try_drain_queue(&self, address: &str) -> Result<usize> {
        let lines = self.queue.read_all().await?;
        if lines.is_empty() {
            debug!("Queue empty, nothing to drain");
            return Ok(0);
        }

        let mut exchange = self.connector.connect(address).await?;
        for (i, line) in lines.iter().enumerate() {
            let reply = exchange.request(line).await?;
            debug!("Record {}/{} acknowledged: {}", i + 1, lines.len(), reply);
        }

        info!("Drained {} queued record(s) to {}", lines.len(), address);
        Ok(lines.len())
    }

    /// Deliver the backlog and then `record` over one connection.
    ///
    /// If the backlog fails, `record` is not attempted and is appended to
    /// the queue. If the backlog succeeds it is cleared; a failure on
    /// `record` then appends only `record`. Returns `true` only when
    /// everything was acknowledged.
    pub async fn send_immediate(&self, address: &str, record: &TelemetryRecord) -> bool {
        let line = match record.to_json_line() {
            Ok(line) => line,
            Err(e) => {
                error!("Dropping record that cannot be encoded: {}", e);
                return false;
            }
        };

        match self.deliver_with_backlog(address, &line).await {
            Ok(()) => true,
            Err(e) => {
                warn!("Immediate send to {} failed, queueing record: {}", address, e);
                if let Err(e) = self.queue.append_line(&line).await {
                    error!("Failed to queue record, sample lost: {}", e);
                }
                false
            }
        }
    }

    async fn deliver_with_backlog(&self, address: &str, line: &str) -> Result<()> {
        let backlog = self.queue.read_all().await?;
        let mut exchange = self.connector.connect(address).await?;

        if !backlog.is_empty() {
            for l in &backlog {
                exchange.request(l).await?;
            }
            self.queue.clear().await?;
            info!("Delivered {} backlog record(s) to {}", backlog.len(), address);
        }

        let reply = exchange.request(line).await?;
        debug!("Record acknowledged: {}", reply);
        Ok(())
    }
}

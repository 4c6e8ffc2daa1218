//! # Sync Coordinator
//!
//! Owns the sampling timer and the single-flight guard.
//!
//! Two states: idle and cycle-in-progress. A timer tick that finds a cycle
//! in progress is dropped, never deferred. Manual drains take the same
//! guard, so a drain and a timer cycle never overlap. Results are published
//! as [`SyncEvent`]s on a broadcast channel.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use super::client::SyncClient;
use crate::error::Result;
use crate::queue::DurableQueue;
use crate::sampler::Sampler;

/// Capacity of the status event channel
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// How long shutdown waits for an in-flight cycle
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Result of one sampling/sending cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Provider had no fix; nothing built
    NoFix,
    /// Backlog and new record acknowledged
    Delivered,
    /// Delivery failed; the record is in the durable queue
    Queued,
}

/// What happened to a timer tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed(CycleOutcome),
    /// Another cycle or drain was in flight
    Dropped,
}

/// Result of a manual drain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every queued record acknowledged and the queue cleared
    Delivered { sent: usize },
    /// Storage or delivery failure; queue left as it was
    Failed,
    /// A cycle was in flight; nothing attempted
    Busy,
}

impl DrainOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, DrainOutcome::Delivered { .. })
    }
}

/// Status notifications for observers
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    CycleCompleted { outcome: CycleOutcome, at: DateTime<Utc> },
    TickDropped { at: DateTime<Utc> },
    DrainCompleted { outcome: DrainOutcome, at: DateTime<Utc> },
    QueueCleared { at: DateTime<Utc> },
}

/// Releases the single-flight flag when dropped
struct CycleGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Drives sampling and delivery with at most one cycle in flight
pub struct SyncCoordinator {
    sampler: Sampler,
    client: SyncClient,
    queue: Arc<DurableQueue>,
    address: String,
    in_flight: Arc<AtomicBool>,
    events: broadcast::Sender<SyncEvent>,
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("address", &self.address)
            .field("busy", &self.is_busy())
            .finish_non_exhaustive()
    }
}

impl SyncCoordinator {
    /// # Arguments
    ///
    /// * `address` - Collector `host:port` used by timer-driven cycles
    #[must_use]
    pub fn new(
        sampler: Sampler,
        client: SyncClient,
        queue: Arc<DurableQueue>,
        address: impl Into<String>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            sampler,
            client,
            queue,
            address: address.into(),
            in_flight: Arc::new(AtomicBool::new(false)),
            events,
        }
    }

    /// Subscribe to status events
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// True while a cycle or manual drain holds the guard
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn try_begin(&self) -> Option<CycleGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| CycleGuard {
                flag: Arc::clone(&self.in_flight),
            })
    }

    fn publish(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Handle one timer tick: sample, then send or queue.
    pub async fn on_tick(&self) -> TickOutcome {
        match self.try_begin() {
            Some(guard) => TickOutcome::Completed(self.run_cycle(guard).await),
            None => {
                self.drop_tick();
                TickOutcome::Dropped
            }
        }
    }

    fn drop_tick(&self) {
        debug!("Cycle still in flight, dropping tick");
        self.publish(SyncEvent::TickDropped { at: Utc::now() });
    }

    /// One cycle under an acquired guard; the guard is released on return.
    async fn run_cycle(&self, _guard: CycleGuard) -> CycleOutcome {
        let outcome = match self.sampler.sample().await {
            None => CycleOutcome::NoFix,
            Some(record) => {
                if self.client.send_immediate(&self.address, &record).await {
                    CycleOutcome::Delivered
                } else {
                    CycleOutcome::Queued
                }
            }
        };

        debug!("Cycle finished: {:?}", outcome);
        self.publish(SyncEvent::CycleCompleted { outcome, at: Utc::now() });
        outcome
    }

    /// Drain the queue to `address` outside the timer.
    ///
    /// On full success the queue is cleared. Returns `Busy` without any
    /// network activity when a cycle is in flight.
    pub async fn trigger_manual_drain(&self, address: &str) -> DrainOutcome {
        let outcome = match self.try_begin() {
            None => {
                info!("Manual drain requested while a cycle is in flight");
                DrainOutcome::Busy
            }
            Some(_guard) => match self.client.try_drain_queue(address).await {
                Ok(sent) => match self.queue.clear().await {
                    Ok(()) => DrainOutcome::Delivered { sent },
                    Err(e) => {
                        error!("Drain delivered {} record(s) but queue clear failed: {}", sent, e);
                        DrainOutcome::Failed
                    }
                },
                Err(e) => {
                    warn!("Manual drain to {} failed: {}", address, e);
                    DrainOutcome::Failed
                }
            },
        };

        self.publish(SyncEvent::DrainCompleted { outcome, at: Utc::now() });
        outcome
    }

    /// Delete every pending record
    ///
    /// # Errors
    ///
    /// Returns error if the queue file cannot be removed.
    pub async fn clear_queue(&self) -> Result<()> {
        self.queue.clear().await?;
        info!("Pending queue cleared");
        self.publish(SyncEvent::QueueCleared { at: Utc::now() });
        Ok(())
    }

    /// Number of records waiting in the queue
    ///
    /// # Errors
    ///
    /// Returns error if the queue file cannot be read.
    pub async fn pending_count(&self) -> Result<usize> {
        self.queue.count().await
    }

    /// Run the periodic timer until `shutdown` resolves.
    ///
    /// The guard is taken on the timer task and each cycle then runs on its
    /// own task, so a slow collector never delays the timer. Ticks that land
    /// during a cycle are dropped. On shutdown the in-flight cycle gets a
    /// bounded grace period.
    pub async fn run<F>(self: Arc<Self>, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        info!("Sampling every {} ms, collector {}", period.as_millis(), self.address);

        let mut last_cycle: Option<JoinHandle<CycleOutcome>> = None;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.try_begin() {
                        Some(guard) => {
                            let coordinator = Arc::clone(&self);
                            last_cycle = Some(tokio::spawn(async move {
                                coordinator.run_cycle(guard).await
                            }));
                        }
                        None => self.drop_tick(),
                    }
                }

                _ = &mut shutdown => {
                    info!("Stopping sampler timer");
                    break;
                }
            }
        }

        if let Some(handle) = last_cycle {
            match tokio::time::timeout(SHUTDOWN_GRACE, handle).await {
                Ok(Ok(outcome)) => debug!("Final cycle finished: {:?}", outcome),
                Ok(Err(e)) => error!("Cycle task failed: {}", e),
                Err(_) => warn!("In-flight cycle did not finish within shutdown grace period"),
            }
        }
    }
}

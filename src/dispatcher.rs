//! The scheduling loop.
//!
//! One scheduler task drains due records from the ledger without exceeding
//! the global in-flight cap and without ever running two operations for the
//! same destination concurrently. It wakes on three signals: an external
//! recheck, the completion of any dispatched operation, and a coarse
//! periodic tick that lets records become eligible with no other events.
//!
//! The in-flight set is process-local and advisory: it is rebuilt empty on
//! restart, and abandoned attempts self-heal once their last written
//! eligibility timestamp passes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

use crate::directory::ChatDirectory;
use crate::error::DispatchError;
use crate::executor::DeliveryExecutor;
use crate::ledger::Ledger;
use crate::types::{unix_now, DestinationId, DueDelivery, StreamId};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_defect(detail: &str) {
    tracing::error!(detail, "ledger defect; scheduling pass aborted");
}

#[cfg(not(feature = "tracing"))]
fn trace_defect(_detail: &str) {}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Global cap on concurrently executing deliveries.
    pub max_in_flight: usize,

    /// Records fetched per scheduling pass.
    pub batch_limit: usize,

    /// Fallback wake-up interval when no recheck or completion arrives.
    pub tick_interval: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 10,
            batch_limit: 30,
            tick_interval: Duration::from_secs(60),
        }
    }
}

pub struct Dispatcher {
    shared: Arc<Shared>,
    scheduler_handle: Option<JoinHandle<()>>,
}

struct Shared {
    config: DispatcherConfig,
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn ChatDirectory>,
    executor: Arc<DeliveryExecutor>,
    /// Destinations with an operation currently in flight.
    in_flight: Mutex<HashSet<DestinationId>>,
    /// Handles of spawned operations, awaited on shutdown.
    operations: Mutex<Vec<JoinHandle<()>>>,
    notify: Notify,
    is_running: AtomicBool,
}

impl Dispatcher {
    pub fn new(
        config: DispatcherConfig,
        ledger: Arc<dyn Ledger>,
        directory: Arc<dyn ChatDirectory>,
        executor: DeliveryExecutor,
    ) -> Self {
        let shared = Arc::new(Shared {
            config,
            ledger,
            directory,
            executor: Arc::new(executor),
            in_flight: Mutex::new(HashSet::new()),
            operations: Mutex::new(Vec::new()),
            notify: Notify::new(),
            is_running: AtomicBool::new(true),
        });

        let scheduler_handle = tokio::spawn(scheduler_loop(shared.clone()));

        Self {
            shared,
            scheduler_handle: Some(scheduler_handle),
        }
    }

    /// The upstream "notify" trigger: obligate destinations to a stream.
    ///
    /// Creates a fresh record for every listed destination that is
    /// registered in the directory and has no record for this stream yet;
    /// existing records are left untouched. Returns how many records were
    /// created. The stream's snapshot must already exist.
    pub async fn enqueue(
        &self,
        stream_id: &StreamId,
        destination_ids: &[DestinationId],
    ) -> Result<usize, DispatchError> {
        if !self.is_running() {
            return Err(DispatchError::Shutdown);
        }

        if self.shared.ledger.snapshot(stream_id).await.is_none() {
            return Err(DispatchError::UnknownStream {
                stream_id: stream_id.clone(),
            });
        }

        let now = unix_now();
        let mut created = 0usize;
        for destination_id in destination_ids {
            if self
                .shared
                .directory
                .destination(destination_id)
                .await
                .is_none()
            {
                continue;
            }
            if self
                .shared
                .ledger
                .create_record_if_absent(destination_id, stream_id, now)
                .await
            {
                created += 1;
            }
        }

        metric_inc("notify.dispatch.enqueued");
        self.shared.notify.notify_one();
        Ok(created)
    }

    /// External recheck signal (e.g. a stream just went live or a snapshot
    /// changed): wake the scheduler for another pass.
    pub fn recheck(&self) {
        self.shared.notify.notify_one();
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running.load(Ordering::SeqCst)
    }

    /// Number of operations currently in flight.
    pub async fn in_flight_count(&self) -> usize {
        self.shared.in_flight.lock().await.len()
    }

    /// Stop scheduling and wait for the scheduler and all in-flight
    /// operations to finish.
    pub async fn shutdown(&mut self) {
        self.shared.is_running.store(false, Ordering::SeqCst);
        self.shared.notify.notify_one();

        if let Some(handle) = self.scheduler_handle.take() {
            let _ = handle.await;
        }

        let handles: Vec<JoinHandle<()>> = {
            let mut guard = self.shared.operations.lock().await;
            guard.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }
    }
}

async fn scheduler_loop(shared: Arc<Shared>) {
    loop {
        if !shared.is_running.load(Ordering::SeqCst) {
            return;
        }

        run_pass(&shared).await;

        // Drop handles of operations that already finished so the list does
        // not grow unbounded between shutdowns.
        shared.operations.lock().await.retain(|h| !h.is_finished());

        tokio::select! {
            _ = shared.notify.notified() => {}
            _ = tokio::time::sleep(shared.config.tick_interval) => {}
        }
    }
}

/// One scheduling pass: fetch due records and dispatch every eligible one.
///
/// A record is skipped while its destination has an operation in flight
/// (per-destination ordering), and the scan stops once the global cap is
/// reached.
async fn run_pass(shared: &Arc<Shared>) {
    {
        let guard = shared.in_flight.lock().await;
        if guard.len() >= shared.config.max_in_flight {
            return;
        }
    }

    let now = unix_now();
    let due = match shared
        .ledger
        .due_records(now, shared.config.batch_limit)
        .await
    {
        Ok(due) => due,
        Err(err) => {
            trace_defect(&err.to_string());
            metric_inc("notify.pass.defect");
            return;
        }
    };

    for item in due {
        let destination_id = item.record.destination_id.clone();

        {
            let mut guard = shared.in_flight.lock().await;
            if guard.len() >= shared.config.max_in_flight {
                break;
            }
            if guard.contains(&destination_id) {
                continue;
            }
            guard.insert(destination_id.clone());
        }

        // Complete the join: the destination's configuration lives in the
        // external directory. Tracking for a destination that is no longer
        // registered is removed without a transport call.
        let Some(destination) = shared.directory.destination(&destination_id).await else {
            shared
                .ledger
                .remove_destination_records(&destination_id)
                .await;
            shared.in_flight.lock().await.remove(&destination_id);
            continue;
        };

        let task_shared = shared.clone();
        let handle = tokio::spawn(async move {
            let due = DueDelivery {
                record: item.record,
                snapshot: item.snapshot,
                destination,
            };
            task_shared.executor.process(due).await;

            task_shared.in_flight.lock().await.remove(&destination_id);
            // Completion re-triggers a pass, so throughput scales with
            // completions rather than the fallback tick.
            task_shared.notify.notify_one();
        });
        shared.operations.lock().await.push(handle);
    }
}

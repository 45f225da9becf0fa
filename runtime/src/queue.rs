//! Per-event FIFO request queue.
//!
//! Deferred lock/extend/release actions are appended to the event's list in
//! the store and drained by that event's single worker, one item at a time,
//! through the same dispatch the direct path uses. Each outcome is stored
//! under the request id for a short time so the caller can poll for it.
//!
//! # Delivery
//!
//! At most once. An item popped by a worker that dies before writing the
//! result is gone; the caller's poll times out. Nothing retries.
//!
//! # Worker Loop
//!
//! 1. Blocking-pop the head of the queue, waiting up to `queue_pop_timeout`
//! 2. On an item: dispatch, store the result, repeat. A failed dispatch becomes
//!    a failed result; it never ends the loop
//! 3. On timeout with an empty queue: deregister and exit. The next enqueue
//!    starts a new worker

use crate::lock_manager::SeatLockManager;
use crate::metrics::QueueMetrics;
use crate::worker::WorkerSupervisor;
use seatlock_core::environment::{Clock, SystemClock};
use seatlock_core::store::{LockStore, keys};
use seatlock_core::{
    DispatchOutcome, LockConfig, LockError, QueueItem, QueueStats, RequestResult, Result,
    SeatCommand,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// What `enqueue` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueReceipt {
    /// Correlation id to poll with
    pub request_id: String,
    /// Position right after the append (1-based)
    pub queue_position: u64,
    /// `queue_position` times the per-item estimate, in milliseconds
    pub estimated_wait_ms: u64,
}

struct QueueInner<S> {
    store: Arc<S>,
    manager: SeatLockManager<S>,
    clock: Arc<dyn Clock>,
    config: LockConfig,
    workers: WorkerSupervisor,
}

/// Per-event FIFO queue with self-managing workers.
///
/// Cheap to clone; clones share the worker registry.
pub struct RequestQueue<S> {
    inner: Arc<QueueInner<S>>,
}

impl<S> Clone for RequestQueue<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: LockStore> RequestQueue<S> {
    /// Create a queue dispatching into `manager`.
    #[must_use]
    pub fn new(store: Arc<S>, manager: SeatLockManager<S>, config: LockConfig) -> Self {
        Self::with_clock(store, manager, config, Arc::new(SystemClock))
    }

    /// Create a queue with an injected clock for `enqueued_at` / `processed_at`.
    #[must_use]
    pub fn with_clock(
        store: Arc<S>,
        manager: SeatLockManager<S>,
        config: LockConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                store,
                manager,
                clock,
                config,
                workers: WorkerSupervisor::new(),
            }),
        }
    }

    /// Append a command to its event's queue and make sure a worker drains it.
    ///
    /// # Errors
    ///
    /// - [`LockError::InvalidArgument`] if the event or seat id is empty
    ///   or contains a reserved key character
    /// - [`LockError::Store`] if the append fails (nothing was queued)
    pub async fn enqueue(&self, command: &SeatCommand) -> Result<EnqueueReceipt> {
        command.key.validate()?;

        let item = QueueItem {
            request_id: Uuid::new_v4().to_string(),
            event_id: command.key.event_id.clone(),
            seat_id: command.key.seat_id.clone(),
            user_id: command.user_id.clone(),
            action: command.action.clone(),
            enqueued_at: self.inner.clock.now(),
        };
        let payload = serde_json::to_string(&item)?;

        let queue_position = self
            .inner
            .store
            .push_tail(&keys::queue(&item.event_id), &payload)
            .await?;
        QueueMetrics::record_enqueue();

        // Push first, then ensure the worker: a worker that is just exiting
        // re-checks the queue after deregistering, so the item is not stranded.
        self.inner.ensure_worker(&item.event_id);

        tracing::info!(
            request_id = %item.request_id,
            event_id = %item.event_id,
            seat_id = %item.seat_id,
            user_id = %item.user_id,
            action = %item.action,
            queue_position,
            "Request enqueued"
        );

        Ok(EnqueueReceipt {
            request_id: item.request_id,
            queue_position,
            estimated_wait_ms: self.inner.estimate_wait_ms(queue_position),
        })
    }

    /// Look up the stored outcome of a queued request.
    ///
    /// `None` means either "not processed yet" or "result expired".
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] or [`LockError::Serialization`] on store failure
    /// or an undecodable result.
    pub async fn get_result(&self, request_id: &str) -> Result<Option<RequestResult>> {
        let Some(raw) = self.inner.store.get(&keys::result(request_id)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    /// Poll for a result every `poll_interval` until it appears or `timeout` elapses.
    ///
    /// Giving up does not cancel the queued work.
    ///
    /// # Errors
    ///
    /// - [`LockError::Timeout`] if no result appeared in time
    /// - Errors from [`Self::get_result`]
    pub async fn wait_for_result(&self, request_id: &str, timeout: Duration) -> Result<RequestResult> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(result) = self.get_result(request_id).await? {
                return Ok(result);
            }
            let now = Instant::now();
            if now >= deadline {
                tracing::debug!(request_id = %request_id, ?timeout, "Gave up waiting for result");
                return Err(LockError::Timeout(timeout));
            }
            tokio::time::sleep(self.inner.config.poll_interval.min(deadline - now)).await;
        }
    }

    /// Items waiting in an event's queue, excluding one being dispatched.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the store is unavailable.
    pub async fn queue_length(&self, event_id: &str) -> Result<u64> {
        self.inner.store.list_len(&keys::queue(event_id)).await
    }

    /// Queue length, worker state and a linear wait estimate.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the store is unavailable.
    pub async fn queue_stats(&self, event_id: &str) -> Result<QueueStats> {
        let queue_length = self.queue_length(event_id).await?;
        Ok(QueueStats {
            event_id: event_id.to_string(),
            queue_length,
            worker_running: self.inner.workers.is_running(event_id),
            estimated_wait_ms: self.inner.estimate_wait_ms(queue_length),
        })
    }

    /// Drop every waiting item of an event. Returns how many were waiting.
    ///
    /// Administrative. Not ordered against a worker that is draining the
    /// same queue: an item popped between the count and the delete is still
    /// processed, and the returned count may include it.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the store is unavailable.
    pub async fn clear_queue(&self, event_id: &str) -> Result<u64> {
        let queue_key = keys::queue(event_id);
        let waiting = self.inner.store.list_len(&queue_key).await?;
        self.inner.store.delete(&queue_key).await?;
        tracing::warn!(event_id = %event_id, cleared = waiting, "Queue cleared");
        Ok(waiting)
    }

    /// Start workers for every event whose queue still holds items.
    ///
    /// Workers only start on enqueue, so items left in a durable store by a
    /// previous process would otherwise wait for the next request to their
    /// event. Returns the number of workers started.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::Store`] if the store is unavailable.
    pub async fn resume_pending(&self) -> Result<usize> {
        let mut started = 0;
        for key in self.inner.store.keys_matching(&keys::queue_pattern()).await? {
            let Some(event_id) = keys::event_id_from_queue_key(&key) else {
                continue;
            };
            if self.inner.store.list_len(&key).await? > 0 && self.inner.ensure_worker(event_id) {
                tracing::info!(event_id = %event_id, "Resumed worker for pending queue");
                started += 1;
            }
        }
        Ok(started)
    }

    /// Start the event's worker if it isn't running. Returns `true` if started.
    pub fn start_worker(&self, event_id: &str) -> bool {
        self.inner.ensure_worker(event_id)
    }

    /// Abort the event's worker. Returns `true` if one was registered.
    pub fn stop_worker(&self, event_id: &str) -> bool {
        self.inner.workers.stop(event_id)
    }

    /// Replace the event's worker with a fresh one.
    pub fn restart_worker(&self, event_id: &str) -> bool {
        let inner = Arc::clone(&self.inner);
        let event = event_id.to_string();
        self.inner
            .workers
            .restart(event_id, move |generation| spawn_worker(inner, event, generation))
    }

    /// Whether the event has a live worker.
    #[must_use]
    pub fn is_worker_running(&self, event_id: &str) -> bool {
        self.inner.workers.is_running(event_id)
    }

    /// Events that currently have a live worker.
    #[must_use]
    pub fn running_workers(&self) -> Vec<String> {
        self.inner.workers.running_events()
    }

    /// Abort all workers.
    pub fn shutdown(&self) {
        self.inner.workers.shutdown();
    }
}

impl<S: LockStore> QueueInner<S> {
    fn estimate_wait_ms(&self, items: u64) -> u64 {
        let per_item = u64::try_from(self.config.estimated_processing_time.as_millis()).unwrap_or(u64::MAX);
        items.saturating_mul(per_item)
    }

    fn ensure_worker(self: &Arc<Self>, event_id: &str) -> bool {
        let inner = Arc::clone(self);
        let event = event_id.to_string();
        self.workers
            .ensure_running(event_id, move |generation| spawn_worker(inner, event, generation))
    }

    async fn process(&self, raw: &str) {
        let item: QueueItem = match serde_json::from_str(raw) {
            Ok(item) => item,
            Err(e) => {
                QueueMetrics::record_processed("malformed", Duration::ZERO);
                tracing::error!(error = %e, payload = %raw, "Discarding malformed queue item");
                return;
            }
        };

        let command = SeatCommand {
            key: seatlock_core::SeatKey {
                event_id: item.event_id.clone(),
                seat_id: item.seat_id.clone(),
            },
            user_id: item.user_id.clone(),
            action: item.action.clone(),
        };

        let started = Instant::now();
        let outcome = match self.manager.apply(&command).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(
                    request_id = %item.request_id,
                    event_id = %item.event_id,
                    seat_id = %item.seat_id,
                    error = %e,
                    "Queued request failed"
                );
                DispatchOutcome::rejected(format!("Processing failed: {e}"))
            }
        };
        QueueMetrics::record_processed(
            if outcome.success { "success" } else { "failure" },
            started.elapsed(),
        );

        let result = RequestResult::from_item(&item, outcome, self.clock.now());
        if let Err(e) = self.store_result(&result).await {
            // The caller's poll will time out; the action itself already happened.
            tracing::error!(
                request_id = %result.request_id,
                error = %e,
                "Failed to store request result"
            );
            return;
        }

        tracing::debug!(
            request_id = %result.request_id,
            event_id = %result.event_id,
            success = result.success,
            message = %result.message,
            "Request processed"
        );
    }

    async fn store_result(&self, result: &RequestResult) -> Result<()> {
        let payload = serde_json::to_string(result)?;
        self.store
            .set_with_ttl(&keys::result(&result.request_id), &payload, self.config.result_ttl)
            .await
    }
}

fn spawn_worker<S: LockStore>(
    inner: Arc<QueueInner<S>>,
    event_id: String,
    generation: u64,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(run_worker(inner, event_id, generation))
}

async fn run_worker<S: LockStore>(inner: Arc<QueueInner<S>>, event_id: String, generation: u64) {
    let queue_key = keys::queue(&event_id);
    tracing::info!(event_id = %event_id, generation, "Queue worker started");

    loop {
        match inner
            .store
            .blocking_pop_head(&queue_key, inner.config.queue_pop_timeout)
            .await
        {
            Ok(Some(raw)) => inner.process(&raw).await,
            Ok(None) => match inner.store.list_len(&queue_key).await {
                Ok(0) => {
                    inner.workers.deregister(&event_id, generation);
                    // An enqueue may have seen this worker as running just
                    // before it deregistered; hand over to a fresh worker.
                    if !matches!(inner.store.list_len(&queue_key).await, Ok(0)) {
                        inner.ensure_worker(&event_id);
                    }
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(event_id = %event_id, error = %e, "Queue length check failed");
                    tokio::time::sleep(inner.config.poll_interval).await;
                }
            },
            Err(e) => {
                tracing::error!(event_id = %event_id, error = %e, "Queue pop failed");
                tokio::time::sleep(inner.config.poll_interval).await;
            }
        }
    }

    tracing::info!(event_id = %event_id, generation, "Queue worker idle, exiting");
}

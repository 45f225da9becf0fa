//! Load-adaptive admission control.
//!
//! Every incoming action bumps a per-event counter that resets when its
//! fixed window expires. While the counter stays at or below the threshold
//! and the event's queue is empty, actions are applied directly. Otherwise
//! they go through the [`RequestQueue`].
//!
//! The queue-depth check keeps ordering intact: once anything is queued for
//! an event, everything after it is queued too, so a direct request can
//! never overtake an earlier queued one.

use crate::lock_manager::SeatLockManager;
use crate::metrics::AdmissionMetrics;
use crate::queue::RequestQueue;
use seatlock_core::store::{LockStore, keys};
use seatlock_core::{AdmissionOutcome, LoadStats, LoadStatus, LockConfig, LockRequest, Result};
use std::sync::Arc;

/// Pure admission decision.
///
/// Queue when the window's load exceeds the threshold, or when anything is
/// already waiting in the event's queue.
#[must_use]
pub const fn should_queue(load: u64, threshold: u64, queue_depth: u64) -> bool {
    load > threshold || queue_depth > 0
}

/// Routes each request to the direct path or the queue.
pub struct AdmissionController<S> {
    store: Arc<S>,
    manager: SeatLockManager<S>,
    queue: RequestQueue<S>,
    config: LockConfig,
}

impl<S> Clone for AdmissionController<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            manager: self.manager.clone(),
            queue: self.queue.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: LockStore> AdmissionController<S> {
    /// Create a controller over an existing manager and queue.
    #[must_use]
    pub const fn new(
        store: Arc<S>,
        manager: SeatLockManager<S>,
        queue: RequestQueue<S>,
        config: LockConfig,
    ) -> Self {
        Self {
            store,
            manager,
            queue,
            config,
        }
    }

    /// Wire a manager, a queue and a controller over one store.
    #[must_use]
    pub fn from_store(store: Arc<S>, config: LockConfig) -> Self {
        let manager = SeatLockManager::new(Arc::clone(&store), config.clone());
        let queue = RequestQueue::new(Arc::clone(&store), manager.clone(), config.clone());
        Self::new(store, manager, queue, config)
    }

    /// The lock manager used on the direct path.
    #[must_use]
    pub const fn manager(&self) -> &SeatLockManager<S> {
        &self.manager
    }

    /// The queue used on the deferred path.
    #[must_use]
    pub const fn queue(&self) -> &RequestQueue<S> {
        &self.queue
    }

    /// Count one request against the event's current window.
    ///
    /// The first increment of a window sets its expiry; the window does not
    /// slide. Returns the count including this request.
    ///
    /// # Errors
    ///
    /// Returns [`seatlock_core::LockError::Store`] if the store is unavailable.
    pub async fn track_load(&self, event_id: &str) -> Result<u64> {
        let key = keys::load(event_id);
        let count = self.store.increment(&key).await?;
        if count == 1 {
            self.store.expire(&key, self.config.load_window).await?;
        }
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Requests counted in the event's current window (0 if none).
    ///
    /// # Errors
    ///
    /// Returns [`seatlock_core::LockError::Store`] if the store is unavailable.
    pub async fn current_load(&self, event_id: &str) -> Result<u64> {
        Ok(self
            .store
            .get(&keys::load(event_id))
            .await?
            .and_then(|raw| raw.parse::<u64>().ok())
            .unwrap_or(0))
    }

    /// Whether the next request for `event_id` must be queued.
    ///
    /// # Errors
    ///
    /// Returns [`seatlock_core::LockError::Store`] if the store is unavailable.
    pub async fn should_use_queue(&self, event_id: &str) -> Result<bool> {
        let load = self.current_load(event_id).await?;
        let depth = self.queue.queue_length(event_id).await?;
        Ok(should_queue(load, self.config.load_threshold, depth))
    }

    /// Validate, count and route one request.
    ///
    /// Missing fields produce [`AdmissionOutcome::Rejected`], not an error.
    /// Unknown actions are dispatched like any other and come back as an
    /// unsuccessful outcome.
    ///
    /// # Errors
    ///
    /// - [`seatlock_core::LockError::InvalidArgument`] if an event or seat id
    ///   contains a reserved key character (the request is not counted)
    /// - [`seatlock_core::LockError::Store`] if the store is unavailable
    pub async fn process_request(&self, request: LockRequest) -> Result<AdmissionOutcome> {
        let command = match request.into_command() {
            Ok(command) => command,
            Err(missing) => {
                AdmissionMetrics::record_decision("rejected");
                tracing::debug!(missing = ?missing, "Rejected malformed request");
                return Ok(AdmissionOutcome::Rejected {
                    message: format!("Missing required fields: {}", missing.join(", ")),
                    missing_fields: missing.into_iter().map(String::from).collect(),
                });
            }
        };
        if let Err(e) = command.key.validate() {
            AdmissionMetrics::record_decision("rejected");
            return Err(e);
        }
        let event_id = command.key.event_id.as_str();

        self.track_load(event_id).await?;

        if self.should_use_queue(event_id).await? {
            let receipt = self.queue.enqueue(&command).await?;
            AdmissionMetrics::record_decision("queued");
            tracing::debug!(
                event_id = %event_id,
                seat_id = %command.key.seat_id,
                request_id = %receipt.request_id,
                queue_position = receipt.queue_position,
                "Request routed to queue"
            );
            return Ok(AdmissionOutcome::Queued {
                request_id: receipt.request_id,
                queue_position: receipt.queue_position,
                estimated_wait_ms: receipt.estimated_wait_ms,
            });
        }

        let outcome = self.manager.apply(&command).await?;
        AdmissionMetrics::record_decision("direct");
        tracing::debug!(
            event_id = %event_id,
            seat_id = %command.key.seat_id,
            action = %command.action,
            success = outcome.success,
            "Request applied directly"
        );
        Ok(AdmissionOutcome::Applied {
            success: outcome.success,
            message: outcome.message,
            action: command.action,
        })
    }

    /// Load, threshold and queue snapshot for monitoring.
    ///
    /// # Errors
    ///
    /// Returns [`seatlock_core::LockError::Store`] if the store is unavailable.
    pub async fn get_load_stats(&self, event_id: &str) -> Result<LoadStats> {
        let current_load = self.current_load(event_id).await?;
        let queue = self.queue.queue_stats(event_id).await?;
        let threshold = self.config.load_threshold;

        let status = if current_load > threshold {
            LoadStatus::HighLoad
        } else if queue.queue_length > 0 {
            LoadStatus::Draining
        } else {
            LoadStatus::Normal
        };

        Ok(LoadStats {
            event_id: event_id.to_string(),
            current_load,
            threshold,
            using_queue: should_queue(current_load, threshold, queue.queue_length),
            queue,
            status,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use seatlock_testing::InMemoryLockStore;
    use std::time::Duration;

    fn controller(threshold: u64) -> AdmissionController<InMemoryLockStore> {
        AdmissionController::from_store(
            Arc::new(InMemoryLockStore::new()),
            LockConfig::default().with_load_threshold(threshold),
        )
    }

    fn lock_request(event: &str, seat: &str, user: &str) -> LockRequest {
        LockRequest::new(event, seat, user, "lock")
    }

    #[test]
    fn test_should_queue_examples() {
        assert!(!should_queue(0, 100, 0));
        assert!(!should_queue(100, 100, 0));
        assert!(should_queue(101, 100, 0));
        assert!(should_queue(0, 100, 1));
    }

    proptest! {
        #[test]
        fn prop_nonempty_queue_always_queues(load in any::<u64>(), threshold in any::<u64>(), depth in 1u64..) {
            prop_assert!(should_queue(load, threshold, depth));
        }

        #[test]
        fn prop_empty_queue_follows_threshold(load in any::<u64>(), threshold in any::<u64>()) {
            prop_assert_eq!(should_queue(load, threshold, 0), load > threshold);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_track_load_resets_after_window() {
        let controller = controller(100);
        assert_eq!(controller.track_load("20").await.unwrap(), 1);
        assert_eq!(controller.track_load("20").await.unwrap(), 2);
        assert_eq!(controller.current_load("20").await.unwrap(), 2);

        // The window is fixed from the first increment
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(controller.current_load("20").await.unwrap(), 0);
        assert_eq!(controller.track_load("20").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_low_load_applies_directly() {
        let controller = controller(100);
        let outcome = controller
            .process_request(lock_request("20", "A1", "alice"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            AdmissionOutcome::Applied {
                success: true,
                message: "Seat locked".into(),
                action: seatlock_core::LockAction::Lock,
            }
        );

        let second = controller
            .process_request(lock_request("20", "A1", "bob"))
            .await
            .unwrap();
        assert!(!second.is_success());
        assert!(!second.is_queued());
    }

    #[tokio::test]
    async fn test_malformed_request_is_rejected_without_error() {
        let controller = controller(100);
        let outcome = controller
            .process_request(LockRequest {
                event_id: Some("20".into()),
                ..LockRequest::default()
            })
            .await
            .unwrap();

        match outcome {
            AdmissionOutcome::Rejected {
                message,
                missing_fields,
            } => {
                assert_eq!(missing_fields, vec!["seat_id", "user_id", "action"]);
                assert!(message.contains("seat_id"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        // Malformed requests are not counted
        assert_eq!(controller.current_load("20").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_ambiguous_ids_are_refused_before_counting() {
        let controller = controller(100);
        let err = controller
            .process_request(lock_request("20", "X:Y", "bob"))
            .await
            .unwrap_err();
        assert_eq!(err, seatlock_core::LockError::InvalidArgument { field: "seat_id" });
        assert_eq!(controller.current_load("20").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unknown_action_is_unsuccessful_not_an_error() {
        let controller = controller(100);
        let outcome = controller
            .process_request(LockRequest::new("20", "A1", "alice", "teleport"))
            .await
            .unwrap();
        match outcome {
            AdmissionOutcome::Applied { success, message, .. } => {
                assert!(!success);
                assert_eq!(message, "Unknown action");
            }
            other => panic!("expected applied outcome, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_over_threshold_queues_and_load_stats_report_it() {
        let controller = controller(1);

        let first = controller
            .process_request(lock_request("20", "A1", "alice"))
            .await
            .unwrap();
        assert!(!first.is_queued());

        let second = controller
            .process_request(lock_request("20", "A2", "bob"))
            .await
            .unwrap();
        assert!(second.is_queued());
        assert!(second.request_id().is_some());

        let stats = controller.get_load_stats("20").await.unwrap();
        assert_eq!(stats.current_load, 2);
        assert_eq!(stats.threshold, 1);
        assert!(stats.using_queue);
        assert_eq!(stats.status, LoadStatus::HighLoad);
    }

    #[tokio::test]
    async fn test_pending_queue_forces_queuing_below_threshold() {
        let controller = controller(100);

        // Park one item with no worker draining it
        let command = LockRequest::new("20", "A1", "alice", "lock").into_command().unwrap();
        controller.queue().enqueue(&command).await.unwrap();
        controller.queue().stop_worker("20");

        let outcome = controller
            .process_request(lock_request("20", "B1", "bob"))
            .await
            .unwrap();
        assert!(outcome.is_queued());

        let stats = controller.get_load_stats("20").await.unwrap();
        assert_eq!(stats.status, LoadStatus::Draining);
    }
}

//! Lease lifecycle for a single `(event, seat)` pair.
//!
//! The manager is the only writer of `seat:lock:*` keys. Every safety property
//! rests on a single atomic store command:
//!
//! - `acquire` is one `SET NX EX`: of N concurrent callers exactly one wins
//! - `extend` reads the owner, then issues `SET XX EX`. If the lease vanishes
//!   in between, the conditional write fails and `extend` returns `false`.
//!   The write, not the read, closes the gap.
//! - `release` checks ownership, then deletes
//!
//! Logical outcomes (held by someone else, wrong owner, vanished) are
//! `Ok(false)`. Only store failures and empty ids are errors.

use crate::metrics::SeatLockMetrics;
use seatlock_core::environment::{Clock, SystemClock};
use seatlock_core::store::{KeyTtl, LockStore, keys};
use seatlock_core::types::{require_key_segment, require_non_empty};
use seatlock_core::{
    DispatchOutcome, LockAction, LockConfig, LockStatus, LockedSeat, Result, SeatCommand, SeatLock,
};
use std::sync::Arc;

/// Owns acquire / inspect / extend / release for seat leases.
///
/// Cheap to clone; clones share the store and clock.
pub struct SeatLockManager<S> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: LockConfig,
}

impl<S> Clone for SeatLockManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<S: LockStore> SeatLockManager<S> {
    /// Create a manager using the system clock.
    #[must_use]
    pub fn new(store: Arc<S>, config: LockConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create a manager with an injected clock.
    #[must_use]
    pub fn with_clock(store: Arc<S>, config: LockConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    /// Lease settings in use.
    #[must_use]
    pub const fn config(&self) -> &LockConfig {
        &self.config
    }

    /// Try to take the short selection lease on a seat.
    ///
    /// Returns `true` iff the lease was newly created. A seat already held by
    /// anyone, including `user_id`, yields `false` and is left untouched.
    ///
    /// # Errors
    ///
    /// - [`LockError::InvalidArgument`](seatlock_core::LockError::InvalidArgument) if any id is empty
    ///   or the event or seat id contains a reserved key character
    /// - [`LockError::Store`](seatlock_core::LockError::Store) if the store is unavailable
    pub async fn acquire(&self, event_id: &str, seat_id: &str, user_id: &str) -> Result<bool> {
        require_key_segment("event_id", event_id)?;
        require_key_segment("seat_id", seat_id)?;
        require_non_empty("user_id", user_id)?;

        let key = keys::seat_lock(event_id, seat_id);
        let value = SeatLock::new(user_id, self.clock.now()).encode();
        let acquired = self
            .store
            .set_if_absent(&key, &value, self.config.lock_ttl)
            .await?;

        if acquired {
            SeatLockMetrics::record("acquire", "acquired");
            tracing::info!(
                event_id = %event_id,
                seat_id = %seat_id,
                user_id = %user_id,
                ttl_secs = self.config.lock_ttl.as_secs(),
                "Seat lock acquired"
            );
        } else {
            SeatLockMetrics::record("acquire", "held");
            tracing::debug!(
                event_id = %event_id,
                seat_id = %seat_id,
                user_id = %user_id,
                "Seat lock already held"
            );
        }

        Ok(acquired)
    }

    /// Read the current lease of a seat without changing it.
    ///
    /// # Errors
    ///
    /// - [`LockError::InvalidArgument`](seatlock_core::LockError::InvalidArgument) if an id is empty
    ///   or contains a reserved key character
    /// - [`LockError::Store`](seatlock_core::LockError::Store) if the store is unavailable
    pub async fn inspect(&self, event_id: &str, seat_id: &str) -> Result<LockStatus> {
        require_key_segment("event_id", event_id)?;
        require_key_segment("seat_id", seat_id)?;

        let key = keys::seat_lock(event_id, seat_id);
        let Some(raw) = self.store.get(&key).await? else {
            return Ok(LockStatus::unlocked());
        };

        let ttl = self.store.ttl(&key).await?;
        if ttl == KeyTtl::Missing {
            // Expired between the two reads
            return Ok(LockStatus::unlocked());
        }

        let lock = SeatLock::decode(&raw);
        Ok(LockStatus {
            locked: true,
            owner_user_id: Some(lock.owner),
            acquired_at: lock.acquired_at,
            ttl_remaining: ttl.remaining(),
        })
    }

    /// Convert a lease held by `user_id` into the long checkout lease.
    ///
    /// Returns `false` if the seat is unlocked, held by someone else, or the
    /// lease expired between the ownership check and the write.
    ///
    /// # Errors
    ///
    /// - [`LockError::InvalidArgument`](seatlock_core::LockError::InvalidArgument) if any id is empty
    ///   or the event or seat id contains a reserved key character
    /// - [`LockError::Store`](seatlock_core::LockError::Store) if the store is unavailable
    pub async fn extend(&self, event_id: &str, seat_id: &str, user_id: &str) -> Result<bool> {
        require_key_segment("event_id", event_id)?;
        require_key_segment("seat_id", seat_id)?;
        require_non_empty("user_id", user_id)?;

        let key = keys::seat_lock(event_id, seat_id);
        let Some(raw) = self.store.get(&key).await? else {
            SeatLockMetrics::record("extend", "missing");
            return Ok(false);
        };

        let current = SeatLock::decode(&raw);
        if !current.is_owned_by(user_id) {
            SeatLockMetrics::record("extend", "not_owner");
            tracing::warn!(
                event_id = %event_id,
                seat_id = %seat_id,
                user_id = %user_id,
                owner = %current.owner,
                "Extend refused: seat held by another user"
            );
            return Ok(false);
        }

        let value = SeatLock::new(user_id, self.clock.now()).encode();
        let extended = self
            .store
            .set_if_present(&key, &value, self.config.extended_lock_ttl)
            .await?;

        if extended {
            SeatLockMetrics::record("extend", "extended");
            tracing::info!(
                event_id = %event_id,
                seat_id = %seat_id,
                user_id = %user_id,
                ttl_secs = self.config.extended_lock_ttl.as_secs(),
                "Seat lock extended"
            );
        } else {
            SeatLockMetrics::record("extend", "vanished");
            tracing::info!(
                event_id = %event_id,
                seat_id = %seat_id,
                user_id = %user_id,
                "Extend lost race: lock expired before write"
            );
        }

        Ok(extended)
    }

    /// Remove a seat's lease.
    ///
    /// With `Some(user_id)`, a lease owned by someone else is left in place
    /// and `false` is returned. With `None` the delete is unconditional
    /// (administrative use). Returns `true` iff a lease was removed.
    ///
    /// # Errors
    ///
    /// - [`LockError::InvalidArgument`](seatlock_core::LockError::InvalidArgument) if an id is empty
    ///   or contains a reserved key character
    /// - [`LockError::Store`](seatlock_core::LockError::Store) if the store is unavailable
    pub async fn release(&self, event_id: &str, seat_id: &str, user_id: Option<&str>) -> Result<bool> {
        require_key_segment("event_id", event_id)?;
        require_key_segment("seat_id", seat_id)?;

        let key = keys::seat_lock(event_id, seat_id);

        if let Some(user_id) = user_id {
            require_non_empty("user_id", user_id)?;
            if let Some(raw) = self.store.get(&key).await? {
                let current = SeatLock::decode(&raw);
                if !current.is_owned_by(user_id) {
                    SeatLockMetrics::record("release", "not_owner");
                    tracing::warn!(
                        event_id = %event_id,
                        seat_id = %seat_id,
                        user_id = %user_id,
                        owner = %current.owner,
                        "Release refused: seat held by another user"
                    );
                    return Ok(false);
                }
            }
        }

        let released = self.store.delete(&key).await? > 0;
        SeatLockMetrics::record("release", if released { "released" } else { "missing" });
        tracing::info!(
            event_id = %event_id,
            seat_id = %seat_id,
            user_id = ?user_id,
            released,
            "Seat lock release"
        );

        Ok(released)
    }

    /// Every currently locked seat of an event, ordered by seat id.
    ///
    /// Scans the event's key namespace, so cost grows with the number of
    /// locked seats. Intended for monitoring, not the request path.
    ///
    /// # Errors
    ///
    /// - [`LockError::InvalidArgument`](seatlock_core::LockError::InvalidArgument) if `event_id` is empty
    ///   or contains a reserved key character
    /// - [`LockError::Store`](seatlock_core::LockError::Store) if the store is unavailable
    pub async fn list_locked(&self, event_id: &str) -> Result<Vec<LockedSeat>> {
        require_key_segment("event_id", event_id)?;

        let lock_keys = self
            .store
            .keys_matching(&keys::seat_lock_pattern(event_id))
            .await?;

        let mut seats = Vec::with_capacity(lock_keys.len());
        for key in &lock_keys {
            let Some(seat_id) = keys::seat_id_from_lock_key(event_id, key) else {
                continue;
            };
            let status = self.inspect(event_id, seat_id).await?;
            if let (true, Some(owner)) = (status.locked, status.owner_user_id) {
                seats.push(LockedSeat {
                    seat_id: seat_id.to_string(),
                    owner_user_id: owner,
                    acquired_at: status.acquired_at,
                    ttl_remaining: status.ttl_remaining,
                });
            }
        }
        seats.sort_by(|a, b| a.seat_id.cmp(&b.seat_id));

        Ok(seats)
    }

    /// Apply one command; the shared dispatch point of the direct and queued paths.
    ///
    /// Unknown actions produce an `"Unknown action"` failure, not an error.
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying operation.
    pub async fn apply(&self, command: &SeatCommand) -> Result<DispatchOutcome> {
        let SeatCommand { key, user_id, action } = command;
        let outcome = match action {
            LockAction::Lock => {
                if self.acquire(&key.event_id, &key.seat_id, user_id).await? {
                    DispatchOutcome::applied("Seat locked")
                } else {
                    DispatchOutcome::rejected("Seat is already locked")
                }
            }
            LockAction::Extend => {
                if self.extend(&key.event_id, &key.seat_id, user_id).await? {
                    DispatchOutcome::applied("Lock extended")
                } else {
                    DispatchOutcome::rejected("Lock not held by user")
                }
            }
            LockAction::Release => {
                if self.release(&key.event_id, &key.seat_id, Some(user_id.as_str())).await? {
                    DispatchOutcome::applied("Lock released")
                } else {
                    DispatchOutcome::rejected("Lock not released")
                }
            }
            LockAction::Other(name) => {
                tracing::warn!(action = %name, seat = %key, "Unknown action");
                DispatchOutcome::rejected("Unknown action")
            }
        };
        Ok(outcome)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use seatlock_core::{LockError, SeatKey};
    use seatlock_testing::{InMemoryLockStore, test_clock};
    use std::time::Duration;

    fn manager() -> SeatLockManager<InMemoryLockStore> {
        SeatLockManager::with_clock(
            Arc::new(InMemoryLockStore::new()),
            LockConfig::default(),
            Arc::new(test_clock()),
        )
    }

    fn command(action: &str, user: &str) -> SeatCommand {
        SeatCommand {
            key: SeatKey::new("20", "A1").unwrap(),
            user_id: user.to_string(),
            action: LockAction::from(action),
        }
    }

    #[tokio::test]
    async fn test_acquire_rejects_empty_ids() {
        let manager = manager();
        assert_eq!(
            manager.acquire("", "A1", "alice").await,
            Err(LockError::InvalidArgument { field: "event_id" })
        );
        assert_eq!(
            manager.acquire("20", "A1", "").await,
            Err(LockError::InvalidArgument { field: "user_id" })
        );
    }

    #[tokio::test]
    async fn test_acquire_is_not_reentrant() {
        let manager = manager();
        assert!(manager.acquire("20", "A1", "alice").await.unwrap());
        assert!(!manager.acquire("20", "A1", "alice").await.unwrap());
    }

    #[tokio::test]
    async fn test_inspect_reports_owner_timestamp_and_ttl() {
        let manager = manager();
        manager.acquire("20", "A1", "alice").await.unwrap();

        let status = manager.inspect("20", "A1").await.unwrap();
        assert!(status.locked);
        assert_eq!(status.owner_user_id.as_deref(), Some("alice"));
        assert_eq!(status.acquired_at, Some(test_clock().now()));
        assert_eq!(status.ttl_remaining, Some(60));

        assert_eq!(manager.inspect("20", "B2").await.unwrap(), LockStatus::unlocked());
    }

    #[tokio::test]
    async fn test_extend_switches_to_long_ttl() {
        let manager = manager();
        manager.acquire("20", "A1", "alice").await.unwrap();
        assert!(manager.extend("20", "A1", "alice").await.unwrap());

        let status = manager.inspect("20", "A1").await.unwrap();
        assert_eq!(status.ttl_remaining, Some(600));
        assert_eq!(status.owner_user_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_extend_unlocked_seat_is_noop() {
        let manager = manager();
        assert!(!manager.extend("20", "A1", "alice").await.unwrap());
        assert!(!manager.inspect("20", "A1").await.unwrap().locked);
    }

    #[tokio::test]
    async fn test_release_without_user_is_unconditional() {
        let manager = manager();
        manager.acquire("20", "A1", "alice").await.unwrap();
        assert!(manager.release("20", "A1", None).await.unwrap());
        assert!(!manager.release("20", "A1", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_list_locked_is_scoped_to_event() {
        let manager = manager();
        manager.acquire("20", "B1", "bob").await.unwrap();
        manager.acquire("20", "A1", "alice").await.unwrap();
        manager.acquire("200", "A1", "carol").await.unwrap();

        let seats = manager.list_locked("20").await.unwrap();
        let ids: Vec<_> = seats.iter().map(|s| s.seat_id.as_str()).collect();
        assert_eq!(ids, vec!["A1", "B1"]);
        assert_eq!(seats[0].owner_user_id, "alice");
        assert_eq!(seats[0].ttl_remaining, Some(60));
    }

    #[tokio::test]
    async fn test_apply_dispatches_each_action() {
        let manager = manager();

        let locked = manager.apply(&command("lock", "alice")).await.unwrap();
        assert_eq!(locked, DispatchOutcome::applied("Seat locked"));

        let held = manager.apply(&command("lock", "bob")).await.unwrap();
        assert_eq!(held, DispatchOutcome::rejected("Seat is already locked"));

        let not_owner = manager.apply(&command("extend", "bob")).await.unwrap();
        assert!(!not_owner.success);

        let extended = manager.apply(&command("extend", "alice")).await.unwrap();
        assert!(extended.success);

        let released = manager.apply(&command("release", "alice")).await.unwrap();
        assert_eq!(released, DispatchOutcome::applied("Lock released"));
    }

    #[tokio::test]
    async fn test_apply_unknown_action_is_a_failed_outcome() {
        let manager = manager();
        let outcome = manager.apply(&command("teleport", "alice")).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::rejected("Unknown action"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inspect_after_expiry_reports_unlocked() {
        let config = LockConfig::default()
            .with_lock_ttls(Duration::from_secs(2), Duration::from_secs(10));
        let manager = SeatLockManager::new(Arc::new(InMemoryLockStore::new()), config);

        manager.acquire("20", "A1", "alice").await.unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert!(!manager.inspect("20", "A1").await.unwrap().locked);
    }
}

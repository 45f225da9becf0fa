//! Integration tests for seat lease safety under concurrency and expiry.
//!
//! These drive [`SeatLockManager`] against the in-memory store with many
//! concurrent tasks, paused time for TTL behavior, and a delaying store to
//! force the extend read/write gap open.

#![allow(clippy::unwrap_used)]

use futures::future::join_all;
use seatlock_core::store::KeyTtl;
use seatlock_core::{LockConfig, LockError, LockStore};
use seatlock_runtime::SeatLockManager;
use seatlock_testing::{InMemoryLockStore, SlowStore};
use std::sync::Arc;
use std::time::Duration;

fn manager() -> SeatLockManager<InMemoryLockStore> {
    SeatLockManager::new(Arc::new(InMemoryLockStore::new()), LockConfig::default())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_acquires_have_exactly_one_winner() {
    let manager = manager();

    let attempts = (0..64).map(|i| {
        let manager = manager.clone();
        tokio::spawn(async move {
            let user = format!("user-{i}");
            let won = manager.acquire("20", "A1", &user).await.unwrap();
            (user, won)
        })
    });

    let results: Vec<(String, bool)> = join_all(attempts)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let winners: Vec<&String> = results
        .iter()
        .filter(|(_, won)| *won)
        .map(|(user, _)| user)
        .collect();
    assert_eq!(winners.len(), 1);

    let status = manager.inspect("20", "A1").await.unwrap();
    assert_eq!(status.owner_user_id.as_ref(), Some(winners[0]));
}

#[tokio::test(start_paused = true)]
async fn test_inspect_never_changes_lease() {
    let manager = manager();
    manager.acquire("20", "A1", "alice").await.unwrap();

    let before = manager.inspect("20", "A1").await.unwrap();
    for _ in 0..5 {
        assert_eq!(manager.inspect("20", "A1").await.unwrap(), before);
    }

    // Inspecting an unlocked seat does not create anything
    let unlocked = manager.inspect("20", "B1").await.unwrap();
    assert!(!unlocked.locked);
    assert_eq!(manager.list_locked("20").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_only_owner_can_extend_or_release() {
    let manager = manager();
    assert!(manager.acquire("20", "A1", "alice").await.unwrap());

    assert!(!manager.extend("20", "A1", "bob").await.unwrap());
    assert!(!manager.release("20", "A1", Some("bob")).await.unwrap());
    assert_eq!(
        manager.inspect("20", "A1").await.unwrap().owner_user_id.as_deref(),
        Some("alice")
    );

    assert!(manager.extend("20", "A1", "alice").await.unwrap());
    assert!(manager.release("20", "A1", Some("alice")).await.unwrap());
    assert!(!manager.inspect("20", "A1").await.unwrap().locked);
}

#[tokio::test(start_paused = true)]
async fn test_lease_expires_without_release() {
    let config = LockConfig::default().with_lock_ttls(Duration::from_secs(60), Duration::from_secs(600));
    let manager = SeatLockManager::new(Arc::new(InMemoryLockStore::new()), config);

    assert!(manager.acquire("20", "A1", "alice").await.unwrap());
    tokio::time::sleep(Duration::from_secs(59)).await;
    assert!(manager.inspect("20", "A1").await.unwrap().locked);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(!manager.inspect("20", "A1").await.unwrap().locked);
    assert!(manager.acquire("20", "A1", "bob").await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn test_extended_lease_outlives_selection_ttl() {
    let manager = manager();
    assert!(manager.acquire("20", "A1", "alice").await.unwrap());
    assert!(manager.extend("20", "A1", "alice").await.unwrap());

    tokio::time::sleep(Duration::from_secs(120)).await;
    let status = manager.inspect("20", "A1").await.unwrap();
    assert!(status.locked);
    assert!(status.ttl_remaining.unwrap() > 400);
}

#[tokio::test(start_paused = true)]
async fn test_extend_fails_when_lease_vanishes_mid_flight() {
    let slow = Arc::new(SlowStore::new(InMemoryLockStore::new(), Duration::from_secs(5)));
    let manager = SeatLockManager::new(Arc::clone(&slow), LockConfig::default());
    assert!(manager.acquire("20", "A1", "alice").await.unwrap());

    let extending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.extend("20", "A1", "alice").await.unwrap() })
    };

    // The extend has read the owner and is now parked after the read
    tokio::time::sleep(Duration::from_secs(1)).await;
    slow.inner().delete("seat:lock:20:A1").await.unwrap();

    assert!(!extending.await.unwrap());
    assert_eq!(slow.inner().ttl("seat:lock:20:A1").await.unwrap(), KeyTtl::Missing);
}

#[tokio::test]
async fn test_double_booking_is_prevented() {
    let manager = manager();
    assert!(manager.acquire("20", "A1", "user1").await.unwrap());
    assert!(!manager.acquire("20", "A1", "user2").await.unwrap());
    assert_eq!(
        manager.inspect("20", "A1").await.unwrap().owner_user_id.as_deref(),
        Some("user1")
    );
}

#[tokio::test]
async fn test_release_hands_seat_over() {
    let manager = manager();
    assert!(manager.acquire("20", "D1", "alice").await.unwrap());
    assert!(manager.release("20", "D1", Some("alice")).await.unwrap());
    assert!(manager.acquire("20", "D1", "bob").await.unwrap());
    assert_eq!(
        manager.inspect("20", "D1").await.unwrap().owner_user_id.as_deref(),
        Some("bob")
    );
}

#[tokio::test]
async fn test_ids_cannot_alias_another_seats_lease() {
    let manager = manager();
    assert!(manager.acquire("20", "X", "alice").await.unwrap());

    // ("20:X", "Y") and ("20", "X:Y") would both name seat:lock:20:X:Y
    assert_eq!(
        manager.acquire("20:X", "Y", "alice").await,
        Err(LockError::InvalidArgument { field: "event_id" })
    );
    assert_eq!(
        manager.acquire("20", "X:Y", "bob").await,
        Err(LockError::InvalidArgument { field: "seat_id" })
    );
    assert!(manager.release("20", "X:Y", None).await.is_err());
    assert!(manager.list_locked("2*").await.is_err());

    let locked = manager.list_locked("20").await.unwrap();
    assert_eq!(locked.len(), 1);
    assert_eq!(locked[0].seat_id, "X");
    assert!(manager.inspect("20", "X").await.unwrap().locked);
}

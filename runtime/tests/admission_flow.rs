//! Integration tests for admission control feeding the request queue.

#![allow(clippy::unwrap_used, clippy::panic)]

use futures::future::join_all;
use seatlock_core::{AdmissionOutcome, LockConfig, LockRequest, RequestResult, SeatCommand};
use seatlock_runtime::AdmissionController;
use seatlock_testing::InMemoryLockStore;
use std::sync::Arc;
use std::time::Duration;

fn controller(threshold: u64) -> AdmissionController<InMemoryLockStore> {
    AdmissionController::from_store(
        Arc::new(InMemoryLockStore::new()),
        LockConfig::default().with_load_threshold(threshold),
    )
}

async fn wait(controller: &AdmissionController<InMemoryLockStore>, request_id: &str) -> RequestResult {
    controller
        .queue()
        .wait_for_result(request_id, Duration::from_secs(60))
        .await
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_burst_queues_everything_after_the_first() {
    let controller = controller(1);

    let mut outcomes = Vec::new();
    for i in 0..20 {
        let outcome = controller
            .process_request(LockRequest::new("20", format!("S{i}"), format!("user-{i}"), "lock"))
            .await
            .unwrap();
        outcomes.push(outcome);
    }

    assert!(!outcomes[0].is_queued());
    assert!(outcomes[0].is_success());

    let request_ids: Vec<String> = outcomes[1..]
        .iter()
        .map(|outcome| {
            assert!(outcome.is_queued());
            outcome.request_id().unwrap().to_string()
        })
        .collect();
    assert_eq!(request_ids.len(), 19);

    let mut results = Vec::new();
    for request_id in &request_ids {
        results.push(wait(&controller, request_id).await);
    }

    assert!(results.iter().all(|result| result.success));
    for pair in results.windows(2) {
        assert!(pair[0].processed_at <= pair[1].processed_at);
    }
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.seat_id, format!("S{}", i + 1));
    }
}

#[tokio::test(start_paused = true)]
async fn test_queued_requests_keep_first_requester_wins() {
    let controller = controller(0);

    let first = controller
        .process_request(LockRequest::new("20", "A1", "alice", "lock"))
        .await
        .unwrap();
    let second = controller
        .process_request(LockRequest::new("20", "A1", "bob", "lock"))
        .await
        .unwrap();

    let first = wait(&controller, first.request_id().unwrap()).await;
    let second = wait(&controller, second.request_id().unwrap()).await;
    assert!(first.success);
    assert!(!second.success);
    assert_eq!(second.message, "Seat is already locked");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_queued_locks_on_one_seat_have_one_winner() {
    let controller = controller(0);

    let submissions = (0..16).map(|i| {
        let controller = controller.clone();
        tokio::spawn(async move {
            controller
                .process_request(LockRequest::new("20", "A1", format!("user-{i}"), "lock"))
                .await
                .unwrap()
        })
    });
    let outcomes: Vec<AdmissionOutcome> = join_all(submissions)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let mut winners = 0;
    for outcome in &outcomes {
        let request_id = outcome.request_id().unwrap();
        if wait(&controller, request_id).await.success {
            winners += 1;
        }
    }
    assert_eq!(winners, 1);
}

fn command(event: &str, seat: &str, user: &str) -> SeatCommand {
    LockRequest::new(event, seat, user, "lock").into_command().unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_events_are_queued_independently() {
    let controller = AdmissionController::from_store(
        Arc::new(InMemoryLockStore::new()),
        LockConfig::default()
            .with_load_threshold(0)
            .with_queue_pop_timeout(Duration::from_secs(600)),
    );
    let queue = controller.queue();

    // Both events have an idle worker and a stored result
    let a0 = queue.enqueue(&command("A", "0", "alice")).await.unwrap();
    let b0 = queue.enqueue(&command("B", "0", "bob")).await.unwrap();
    assert!(wait(&controller, &a0.request_id).await.success);
    let b0_result = wait(&controller, &b0.request_id).await;
    assert!(queue.is_worker_running("A"));
    assert!(queue.is_worker_running("B"));

    assert!(queue.stop_worker("A"));
    assert!(!queue.is_worker_running("A"));
    assert!(queue.is_worker_running("B"));

    // Park two items on each event with no worker draining them
    for seat in ["1", "2"] {
        queue.enqueue(&command("A", seat, "alice")).await.unwrap();
    }
    queue.stop_worker("A");
    queue.stop_worker("B");
    let mut parked = Vec::new();
    for seat in ["1", "2"] {
        parked.push(queue.enqueue(&command("B", seat, "bob")).await.unwrap());
    }
    queue.stop_worker("B");
    assert_eq!(queue.queue_length("A").await.unwrap(), 2);
    assert_eq!(queue.queue_length("B").await.unwrap(), 2);

    assert_eq!(queue.clear_queue("A").await.unwrap(), 2);
    queue.stop_worker("A");

    assert_eq!(queue.queue_length("A").await.unwrap(), 0);
    assert_eq!(queue.queue_length("B").await.unwrap(), 2);
    assert!(!queue.is_worker_running("B"));
    assert_eq!(queue.get_result(&b0.request_id).await.unwrap(), Some(b0_result));

    // B still drains on its own
    assert!(queue.start_worker("B"));
    for receipt in &parked {
        assert!(wait(&controller, &receipt.request_id).await.success);
    }
    assert_eq!(queue.queue_length("B").await.unwrap(), 0);
    assert_eq!(queue.queue_length("A").await.unwrap(), 0);
    assert!(!queue.is_worker_running("A"));
}

#[tokio::test]
async fn test_malformed_request_lists_missing_fields() {
    let controller = controller(100);
    let outcome = controller
        .process_request(LockRequest {
            event_id: Some("20".into()),
            ..LockRequest::default()
        })
        .await
        .unwrap();

    let AdmissionOutcome::Rejected { message, missing_fields } = outcome else {
        panic!("expected rejection");
    };
    assert_eq!(missing_fields, vec!["seat_id", "user_id", "action"]);
    assert!(message.contains("user_id"));
}

#[tokio::test(start_paused = true)]
async fn test_queued_extend_and_release_use_ownership() {
    let controller = controller(0);

    let lock = controller
        .process_request(LockRequest::new("20", "C1", "alice", "lock"))
        .await
        .unwrap();
    let steal = controller
        .process_request(LockRequest::new("20", "C1", "bob", "release"))
        .await
        .unwrap();
    let extend = controller
        .process_request(LockRequest::new("20", "C1", "alice", "extend"))
        .await
        .unwrap();

    assert!(wait(&controller, lock.request_id().unwrap()).await.success);
    let steal = wait(&controller, steal.request_id().unwrap()).await;
    assert!(!steal.success);
    assert_eq!(steal.message, "Lock not released");
    let extend = wait(&controller, extend.request_id().unwrap()).await;
    assert!(extend.success);
    assert_eq!(extend.message, "Lock extended");
}

//! Per-event worker registry.
//!
//! Each event with pending queue items has at most one worker task. The
//! registry is a concurrent map from event id to the worker's task handle;
//! registration goes through the map's entry API, so two concurrent
//! `ensure_running` calls for the same event spawn one task between them.
//!
//! # Lifecycle
//!
//! ```text
//!   ensure_running ──► Running ──► (idle timeout, queue empty) ──► deregister ──► Exited
//!        ▲                │
//!        │                └──► stop (abort) ──► Exited
//!        └──────────── later enqueue
//! ```
//!
//! Every registration gets a fresh generation number. A worker deregisters
//! with its own generation, so a slow-exiting worker can never remove the
//! registration of the worker that replaced it.
//!
//! The registry knows nothing about queues: callers pass a `spawn` closure
//! that receives the generation and returns the task handle.

use crate::metrics::QueueMetrics;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;

struct WorkerSlot {
    generation: u64,
    handle: JoinHandle<()>,
}

/// Registry of per-event worker tasks.
#[derive(Default)]
pub struct WorkerSupervisor {
    workers: DashMap<String, WorkerSlot>,
    next_generation: AtomicU64,
}

impl WorkerSupervisor {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a worker for `event_id` unless a live one is registered.
    ///
    /// `spawn` runs at most once, while the event's map entry is held, and
    /// must only spawn (not wait on) the task. A registered task that has
    /// already finished, e.g. after a panic, is replaced.
    ///
    /// Returns `true` if a new worker was spawned.
    pub fn ensure_running<F>(&self, event_id: &str, spawn: F) -> bool
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        let started = match self.workers.entry(event_id.to_string()) {
            Entry::Occupied(slot) if !slot.get().handle.is_finished() => false,
            Entry::Occupied(mut slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
                slot.insert(WorkerSlot {
                    generation,
                    handle: spawn(generation),
                });
                tracing::warn!(event_id = %event_id, generation, "Replaced finished queue worker");
                true
            }
            Entry::Vacant(slot) => {
                let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
                slot.insert(WorkerSlot {
                    generation,
                    handle: spawn(generation),
                });
                tracing::debug!(event_id = %event_id, generation, "Queue worker registered");
                true
            }
        };

        if started {
            QueueMetrics::record_worker_started(self.workers.len());
        }
        started
    }

    /// Alias of [`Self::ensure_running`] for explicit lifecycle control.
    pub fn start<F>(&self, event_id: &str, spawn: F) -> bool
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        self.ensure_running(event_id, spawn)
    }

    /// Abort and unregister the worker of `event_id`.
    ///
    /// An item the worker popped but had not finished is lost; it is never
    /// redelivered. Returns `true` if a worker was registered.
    pub fn stop(&self, event_id: &str) -> bool {
        let Some((_, slot)) = self.workers.remove(event_id) else {
            return false;
        };
        slot.handle.abort();
        QueueMetrics::record_worker_stopped(self.workers.len());
        tracing::info!(event_id = %event_id, generation = slot.generation, "Queue worker stopped");
        true
    }

    /// Stop the current worker (if any) and start a fresh one.
    pub fn restart<F>(&self, event_id: &str, spawn: F) -> bool
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        self.stop(event_id);
        self.ensure_running(event_id, spawn)
    }

    /// Remove the registration of `event_id` if it still belongs to `generation`.
    ///
    /// Called by a worker on its way out. Returns `true` if removed.
    pub fn deregister(&self, event_id: &str, generation: u64) -> bool {
        let removed = self
            .workers
            .remove_if(event_id, |_, slot| slot.generation == generation)
            .is_some();
        if removed {
            QueueMetrics::record_worker_stopped(self.workers.len());
        }
        removed
    }

    /// Whether a live worker is registered for `event_id`.
    #[must_use]
    pub fn is_running(&self, event_id: &str) -> bool {
        self.workers
            .get(event_id)
            .is_some_and(|slot| !slot.handle.is_finished())
    }

    /// Events with a live worker, sorted.
    #[must_use]
    pub fn running_events(&self) -> Vec<String> {
        let mut events: Vec<String> = self
            .workers
            .iter()
            .filter(|slot| !slot.handle.is_finished())
            .map(|slot| slot.key().clone())
            .collect();
        events.sort();
        events
    }

    /// Abort every worker.
    pub fn shutdown(&self) {
        let events: Vec<String> = self.workers.iter().map(|slot| slot.key().clone()).collect();
        for event_id in events {
            self.stop(&event_id);
        }
    }
}

impl Drop for WorkerSupervisor {
    fn drop(&mut self) {
        for slot in self.workers.iter() {
            slot.handle.abort();
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn idle_task(_generation: u64) -> JoinHandle<()> {
        tokio::spawn(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        })
    }

    #[tokio::test]
    async fn test_ensure_running_starts_once() {
        let supervisor = WorkerSupervisor::new();
        assert!(supervisor.ensure_running("20", idle_task));
        assert!(!supervisor.ensure_running("20", idle_task));
        assert!(supervisor.is_running("20"));
        assert_eq!(supervisor.running_events(), vec!["20".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_ensure_running_spawns_one_worker() {
        let supervisor = Arc::new(WorkerSupervisor::new());
        let spawned = Arc::new(AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let supervisor = Arc::clone(&supervisor);
            let spawned = Arc::clone(&spawned);
            handles.push(tokio::spawn(async move {
                supervisor.ensure_running("20", |generation| {
                    spawned.fetch_add(1, Ordering::SeqCst);
                    idle_task(generation)
                })
            }));
        }

        let mut started = 0;
        for handle in handles {
            if handle.await.unwrap() {
                started += 1;
            }
        }

        assert_eq!(started, 1);
        assert_eq!(spawned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_events_are_independent() {
        let supervisor = WorkerSupervisor::new();
        assert!(supervisor.ensure_running("A", idle_task));
        assert!(supervisor.ensure_running("B", idle_task));

        assert!(supervisor.stop("A"));
        assert!(!supervisor.is_running("A"));
        assert!(supervisor.is_running("B"));
    }

    #[tokio::test]
    async fn test_deregister_ignores_stale_generation() {
        let supervisor = WorkerSupervisor::new();
        let mut first = None;
        supervisor.ensure_running("20", |generation| {
            first = Some(generation);
            idle_task(generation)
        });
        let first = first.unwrap();

        let mut second = None;
        supervisor.restart("20", |generation| {
            second = Some(generation);
            idle_task(generation)
        });
        let second = second.unwrap();
        assert_ne!(first, second);

        assert!(!supervisor.deregister("20", first));
        assert!(supervisor.is_running("20"));
        assert!(supervisor.deregister("20", second));
        assert!(!supervisor.is_running("20"));
    }

    #[tokio::test]
    async fn test_finished_worker_is_replaced() {
        let supervisor = WorkerSupervisor::new();
        supervisor.ensure_running("20", |_| tokio::spawn(async {}));

        // Let the empty task complete
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!supervisor.is_running("20"));
        assert!(supervisor.ensure_running("20", idle_task));
    }

    #[tokio::test]
    async fn test_shutdown_stops_everything() {
        let supervisor = WorkerSupervisor::new();
        supervisor.ensure_running("A", idle_task);
        supervisor.ensure_running("B", idle_task);
        supervisor.shutdown();
        assert!(supervisor.running_events().is_empty());
    }
}

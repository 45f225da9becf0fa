//! Application state shared by the HTTP handlers.

use seatlock_core::LockStore;
use seatlock_runtime::AdmissionController;
use std::sync::Arc;
use std::time::Duration;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; everything inside is reference counted.
pub struct AppState<S> {
    /// Admission controller, and through it the lock manager and queue
    pub controller: AdmissionController<S>,

    /// Backing store, for readiness probes
    pub store: Arc<S>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            controller: self.controller.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: LockStore> AppState<S> {
    /// Create a new application state.
    #[must_use]
    pub const fn new(controller: AdmissionController<S>, store: Arc<S>) -> Self {
        Self { controller, store }
    }

    /// Longest a `GET /requests/:id?wait_secs=N` call may block.
    #[must_use]
    pub const fn max_result_wait(&self) -> Duration {
        self.controller.manager().config().poll_timeout
    }
}

//! Domain types for seat leases, queued requests and admission decisions.

use crate::error::{LockError, Result};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ============================================================================
// Seat Identity
// ============================================================================

/// Identifies one contended seat: the pair `(event_id, seat_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeatKey {
    /// Event the seat belongs to
    pub event_id: String,
    /// Seat identifier within the event (e.g. `"A1"`)
    pub seat_id: String,
}

impl SeatKey {
    /// Create a seat key, rejecting ids that cannot name a lease key.
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidArgument`] if either id is empty or
    /// contains a reserved key character.
    pub fn new(event_id: impl Into<String>, seat_id: impl Into<String>) -> Result<Self> {
        let key = Self {
            event_id: event_id.into(),
            seat_id: seat_id.into(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Check both ids of a key built without [`SeatKey::new`].
    ///
    /// # Errors
    ///
    /// Returns [`LockError::InvalidArgument`] naming the first bad field.
    pub fn validate(&self) -> Result<()> {
        require_key_segment("event_id", &self.event_id)?;
        require_key_segment("seat_id", &self.seat_id)
    }
}

impl fmt::Display for SeatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.event_id, self.seat_id)
    }
}

/// Reject an empty (or whitespace-only) identifier.
///
/// # Errors
///
/// Returns [`LockError::InvalidArgument`] naming `field` when `value` is blank.
pub fn require_non_empty(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(LockError::InvalidArgument { field });
    }
    Ok(())
}

/// Characters that would let one id spill into the next key segment or
/// widen a `KEYS` pattern.
pub const RESERVED_KEY_CHARS: [char; 6] = [':', '*', '?', '[', ']', '\\'];

/// Reject an identifier that cannot be used as one segment of a store key.
///
/// Lease keys are `seat:lock:{event}:{seat}`, so an id containing `:` could
/// name another event's seat.
///
/// # Errors
///
/// Returns [`LockError::InvalidArgument`] naming `field` when `value` is
/// blank or contains one of [`RESERVED_KEY_CHARS`].
pub fn require_key_segment(field: &'static str, value: &str) -> Result<()> {
    require_non_empty(field, value)?;
    if value.contains(RESERVED_KEY_CHARS) {
        return Err(LockError::InvalidArgument { field });
    }
    Ok(())
}

// ============================================================================
// Actions
// ============================================================================

/// Action a caller can request against a seat.
///
/// Unrecognized action names are kept as [`LockAction::Other`] so they travel
/// through admission and the queue to the dispatcher, which answers them with
/// an `"Unknown action"` failure instead of a parse error.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LockAction {
    /// Acquire a short selection lease
    Lock,
    /// Convert an owned lease into a long checkout lease
    Extend,
    /// Give a lease back
    Release,
    /// Anything else
    Other(String),
}

impl LockAction {
    /// Wire name of the action.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Lock => "lock",
            Self::Extend => "extend",
            Self::Release => "release",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for LockAction {
    fn from(value: &str) -> Self {
        match value {
            "lock" => Self::Lock,
            "extend" => Self::Extend,
            "release" => Self::Release,
            other => Self::Other(other.to_string()),
        }
    }
}

impl fmt::Display for LockAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for LockAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LockAction {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Ok(Self::from(name.as_str()))
    }
}

// ============================================================================
// Seat Lease
// ============================================================================

/// Value stored under a seat lock key.
///
/// Encoded as `"{owner}:{acquired_at_millis}"`. Decoding splits on the last
/// `:` so owner ids may themselves contain colons.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatLock {
    /// User holding the lease
    pub owner: String,
    /// When the lease was acquired or last extended
    pub acquired_at: Option<DateTime<Utc>>,
}

impl SeatLock {
    /// Create a lease value for `owner` stamped at `acquired_at`.
    #[must_use]
    pub fn new(owner: impl Into<String>, acquired_at: DateTime<Utc>) -> Self {
        Self {
            owner: owner.into(),
            acquired_at: Some(acquired_at),
        }
    }

    /// Encode into the stored string form.
    #[must_use]
    pub fn encode(&self) -> String {
        match self.acquired_at {
            Some(at) => format!("{}:{}", self.owner, at.timestamp_millis()),
            None => self.owner.clone(),
        }
    }

    /// Decode a stored value.
    ///
    /// A value without a parseable timestamp suffix is treated as a bare
    /// owner id with an unknown acquisition time.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        if let Some((owner, millis)) = raw.rsplit_once(':') {
            if let Some(at) = millis
                .parse::<i64>()
                .ok()
                .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            {
                return Self {
                    owner: owner.to_string(),
                    acquired_at: Some(at),
                };
            }
        }
        Self {
            owner: raw.to_string(),
            acquired_at: None,
        }
    }

    /// Whether `user_id` owns this lease.
    #[must_use]
    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.owner == user_id
    }
}

/// Snapshot of one seat's lease, as returned by `inspect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockStatus {
    /// Whether a lease currently exists
    pub locked: bool,
    /// Lease owner, when locked
    pub owner_user_id: Option<String>,
    /// Acquisition time, when locked and known
    pub acquired_at: Option<DateTime<Utc>>,
    /// Seconds until the lease expires, when locked with an expiry
    pub ttl_remaining: Option<u64>,
}

impl LockStatus {
    /// Status of a seat without a lease.
    #[must_use]
    pub const fn unlocked() -> Self {
        Self {
            locked: false,
            owner_user_id: None,
            acquired_at: None,
            ttl_remaining: None,
        }
    }
}

/// One entry of the per-event monitoring listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedSeat {
    /// Seat identifier
    pub seat_id: String,
    /// Lease owner
    pub owner_user_id: String,
    /// Acquisition time, when known
    pub acquired_at: Option<DateTime<Utc>>,
    /// Seconds until expiry
    pub ttl_remaining: Option<u64>,
}

// ============================================================================
// Queue Records
// ============================================================================

/// A pending action waiting in an event's FIFO queue.
///
/// Immutable once created; consumed exactly once by the event's worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    /// Correlation id returned to the caller
    pub request_id: String,
    /// Event id
    pub event_id: String,
    /// Seat id
    pub seat_id: String,
    /// Requesting user
    pub user_id: String,
    /// Requested action
    pub action: LockAction,
    /// When the item entered the queue
    pub enqueued_at: DateTime<Utc>,
}

/// Outcome of a queued action, stored briefly for the caller to poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestResult {
    /// Correlation id of the originating [`QueueItem`]
    pub request_id: String,
    /// Whether the action took effect
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
    /// Action that was applied
    pub action: LockAction,
    /// Event id
    pub event_id: String,
    /// Seat id
    pub seat_id: String,
    /// Requesting user
    pub user_id: String,
    /// When the worker finished the action
    pub processed_at: DateTime<Utc>,
}

impl RequestResult {
    /// Build the result for `item` from a dispatch outcome.
    #[must_use]
    pub fn from_item(item: &QueueItem, outcome: DispatchOutcome, processed_at: DateTime<Utc>) -> Self {
        Self {
            request_id: item.request_id.clone(),
            success: outcome.success,
            message: outcome.message,
            action: item.action.clone(),
            event_id: item.event_id.clone(),
            seat_id: item.seat_id.clone(),
            user_id: item.user_id.clone(),
            processed_at,
        }
    }
}

/// Outcome of applying one action to the seat lock manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Whether the action took effect
    pub success: bool,
    /// Human-readable outcome
    pub message: String,
}

impl DispatchOutcome {
    /// Successful outcome.
    #[must_use]
    pub fn applied(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// Rejected outcome.
    #[must_use]
    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// ============================================================================
// Admission
// ============================================================================

/// Raw incoming request; every field may be missing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRequest {
    /// Event id
    pub event_id: Option<String>,
    /// Seat id
    pub seat_id: Option<String>,
    /// Requesting user
    pub user_id: Option<String>,
    /// Action name
    pub action: Option<String>,
}

/// A request whose four fields are all present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeatCommand {
    /// Target seat
    pub key: SeatKey,
    /// Requesting user
    pub user_id: String,
    /// Requested action
    pub action: LockAction,
}

impl LockRequest {
    /// Build a request with all fields set.
    #[must_use]
    pub fn new(
        event_id: impl Into<String>,
        seat_id: impl Into<String>,
        user_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Some(event_id.into()),
            seat_id: Some(seat_id.into()),
            user_id: Some(user_id.into()),
            action: Some(action.into()),
        }
    }

    /// Names of the fields that are absent or blank, in declaration order.
    #[must_use]
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("event_id", &self.event_id),
            ("seat_id", &self.seat_id),
            ("user_id", &self.user_id),
            ("action", &self.action),
        ]
        .into_iter()
        .filter(|(_, value)| value.as_deref().is_none_or(|v| v.trim().is_empty()))
        .map(|(name, _)| name)
        .collect()
    }

    /// Convert into a [`SeatCommand`], or return the missing field names.
    ///
    /// # Errors
    ///
    /// Returns the list from [`Self::missing_fields`] when it is not empty.
    pub fn into_command(self) -> std::result::Result<SeatCommand, Vec<&'static str>> {
        let missing = self.missing_fields();
        match (self.event_id, self.seat_id, self.user_id, self.action) {
            (Some(event_id), Some(seat_id), Some(user_id), Some(action)) if missing.is_empty() => {
                Ok(SeatCommand {
                    key: SeatKey { event_id, seat_id },
                    user_id,
                    action: LockAction::from(action.as_str()),
                })
            }
            _ => Err(missing),
        }
    }
}

/// Result of `process_request`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdmissionOutcome {
    /// The request was malformed; nothing was attempted.
    Rejected {
        /// Message listing the missing fields
        message: String,
        /// Missing field names
        missing_fields: Vec<String>,
    },
    /// The action was applied synchronously; the outcome is known.
    Applied {
        /// Whether the action took effect
        success: bool,
        /// Human-readable outcome
        message: String,
        /// Action that was applied
        action: LockAction,
    },
    /// The action was queued; poll `request_id` for its outcome.
    Queued {
        /// Correlation id
        request_id: String,
        /// Position in the queue right after enqueue (1-based)
        queue_position: u64,
        /// Rough wait estimate in milliseconds
        estimated_wait_ms: u64,
    },
}

impl AdmissionOutcome {
    /// `success` as seen by the caller: a queued request counts as accepted.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        match self {
            Self::Rejected { .. } => false,
            Self::Applied { success, .. } => *success,
            Self::Queued { .. } => true,
        }
    }

    /// Whether the request was routed through the queue.
    #[must_use]
    pub const fn is_queued(&self) -> bool {
        matches!(self, Self::Queued { .. })
    }

    /// Correlation id, for queued requests.
    #[must_use]
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Queued { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

/// Snapshot of one event's queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Event id
    pub event_id: String,
    /// Items waiting (excludes the one being dispatched)
    pub queue_length: u64,
    /// Whether a worker is registered for the event
    pub worker_running: bool,
    /// `queue_length` times the configured per-item estimate, in milliseconds
    pub estimated_wait_ms: u64,
}

/// Label summarizing why an event is or isn't being queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    /// Load under threshold and queue empty; requests apply directly
    Normal,
    /// Load above threshold
    HighLoad,
    /// Load is back under threshold but the queue still holds items
    Draining,
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "normal"),
            Self::HighLoad => write!(f, "high_load"),
            Self::Draining => write!(f, "draining"),
        }
    }
}

/// Diagnostic snapshot of admission control for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadStats {
    /// Event id
    pub event_id: String,
    /// Requests counted in the current window
    pub current_load: u64,
    /// Load above which requests are queued
    pub threshold: u64,
    /// Whether the next request would be queued
    pub using_queue: bool,
    /// Queue snapshot
    pub queue: QueueStats,
    /// Summary label
    pub status: LoadStatus,
}

//! Advisory lock records.
//!
//! One record per object, keyed by the object id. Absence of a record means
//! the object is unlocked. Records are advisory: well-behaved clients check
//! them before mutating, nothing enforces them.

use crate::id::{ObjectId, UserId};
use crate::object::Timestamp;
use serde::{Deserialize, Serialize};

/// Remote lock record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockRecord {
    /// Key of the record in the lock collection, not part of the document.
    #[serde(skip)]
    pub shape_id: ObjectId,
    pub locked_by: UserId,
    pub locked_at: Timestamp,
    /// After this instant the lock is no longer considered held.
    pub expires_at: Timestamp,
    pub is_manipulating: bool,
    pub last_activity: Timestamp,
}

impl LockRecord {
    /// A fresh lock for an owner who is actively manipulating the object.
    pub fn manipulating(
        shape_id: ObjectId,
        locked_by: UserId,
        now: Timestamp,
        activity_window_ms: u64,
    ) -> Self {
        Self {
            shape_id,
            locked_by,
            locked_at: now,
            expires_at: now + activity_window_ms,
            is_manipulating: true,
            last_activity: now,
        }
    }

    /// The same lock after the owner stopped interacting. Owner and
    /// acquisition time are preserved.
    pub fn idle(&self, now: Timestamp, idle_countdown_ms: u64) -> Self {
        Self {
            expires_at: now + idle_countdown_ms,
            is_manipulating: false,
            last_activity: now,
            ..self.clone()
        }
    }

    /// Whether the lock is still held at `now`.
    pub fn is_valid_at(&self, now: Timestamp) -> bool {
        self.expires_at > now
    }

    /// Whether the owner has been silent for longer than `ttl_ms`.
    pub fn is_stale_at(&self, now: Timestamp, ttl_ms: u64) -> bool {
        now.saturating_sub(self.last_activity) > ttl_ms
    }

    pub fn state(&self) -> LockState {
        if self.is_manipulating {
            LockState::Manipulating
        } else {
            LockState::IdleLocked
        }
    }
}

/// Per-object lock state.
///
/// ```text
/// Unlocked --start--> Manipulating --end--> IdleLocked --countdown--> Unlocked
///                          ^                    |
///                          +-------start--------+
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LockState {
    #[default]
    Unlocked,
    Manipulating,
    IdleLocked,
}

impl LockState {
    pub fn of(record: Option<&LockRecord>) -> Self {
        record.map(LockRecord::state).unwrap_or_default()
    }
}

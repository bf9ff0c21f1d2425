//! Tracking of objects the local user is actively editing.
//!
//! An id enters the set on every local mutation and leaves it when the
//! edit ends explicitly or after a window of inactivity. Reconciliation
//! keeps the local copy of every id in the set.

use crate::timer::{spawn_after, KeyedTasks};
use canvas_core::ObjectId;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

struct EditState {
    ids: HashSet<ObjectId>,
    expiry: KeyedTasks<ObjectId>,
}

/// Set of actively edited object ids with self-expiring membership.
pub struct ActiveEditTracker {
    window: Duration,
    state: Arc<Mutex<EditState>>,
}

impl ActiveEditTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            state: Arc::new(Mutex::new(EditState {
                ids: HashSet::new(),
                expiry: KeyedTasks::new(),
            })),
        }
    }

    /// Mark `id` as actively edited and restart its expiry window.
    pub fn begin(&self, id: ObjectId) {
        let weak = Arc::downgrade(&self.state);
        let window = self.window;
        let mut state = self.state.lock();
        state.ids.insert(id.clone());

        let key = id.clone();
        state.expiry.arm(id, move |generation| {
            spawn_after(window, async move {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let mut state = shared.lock();
                if state.expiry.settle(&key, generation) {
                    state.ids.remove(&key);
                    trace!(object_id = %key, "Local edit window expired");
                }
            })
        });
    }

    /// End the edit of `id` immediately.
    pub fn end(&self, id: &ObjectId) {
        let mut state = self.state.lock();
        state.expiry.cancel(id);
        state.ids.remove(id);
    }

    pub fn contains(&self, id: &ObjectId) -> bool {
        self.state.lock().ids.contains(id)
    }

    pub fn ids(&self) -> HashSet<ObjectId> {
        self.state.lock().ids.clone()
    }

    pub fn len(&self) -> usize {
        self.state.lock().ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().ids.is_empty()
    }

    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.expiry.cancel_all();
        state.ids.clear();
    }
}

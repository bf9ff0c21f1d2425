//! Advisory per-object locks.
//!
//! A lock is taken when the local user starts manipulating an object and
//! kept alive by repeated acquisitions. When the activity window passes
//! without one, the lock turns idle; when the idle countdown passes, it is
//! released. A periodic sweep removes locks whose owner went silent.
//!
//! The manager mirrors the remote lock collection for queries and owns the
//! timers of the locks held by the local user.

use crate::clock::Clock;
use crate::config::SyncConfig;
use crate::error::ErrorState;
use crate::remote::{LockSnapshot, RemoteError, RemoteStore};
use crate::timer::{spawn_after, KeyedTasks};
use canvas_core::{LockRecord, LockState, ObjectId, UserId};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events emitted by the lock manager.
#[derive(Clone, Debug, PartialEq)]
pub enum LockEvent {
    Acquired { id: ObjectId, owner: UserId },
    Idle { id: ObjectId, owner: UserId },
    Released { id: ObjectId, owner: UserId },
    Swept { id: ObjectId, owner: UserId },
    Failed { id: ObjectId, error: RemoteError },
}

struct LockTable {
    records: HashMap<ObjectId, LockRecord>,
    activity: KeyedTasks<ObjectId>,
    idle: KeyedTasks<ObjectId>,
    /// Acquisitions whose remote write has not returned yet.
    acquiring: HashMap<ObjectId, usize>,
    /// Ids whose idle release deleted the remote record while an
    /// acquisition was in flight; the acquirer writes its record again.
    reassert: HashSet<ObjectId>,
    closed: bool,
}

enum AfterRelease {
    Released,
    Restore(LockRecord),
    Keep,
}

struct Shared<R: RemoteStore> {
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    local_user: UserId,
    activity_window: Duration,
    idle_countdown: Duration,
    stale_ttl_ms: u64,
    table: Mutex<LockTable>,
    errors: ErrorState,
    events: broadcast::Sender<LockEvent>,
}

/// Lock manager for one local user.
pub struct LockManager<R: RemoteStore> {
    shared: Arc<Shared<R>>,
}

impl<R: RemoteStore> LockManager<R> {
    pub fn new(
        remote: Arc<R>,
        clock: Arc<dyn Clock>,
        local_user: UserId,
        config: &SyncConfig,
        errors: ErrorState,
    ) -> Self {
        let (events, _) = broadcast::channel(100);
        Self {
            shared: Arc::new(Shared {
                remote,
                clock,
                local_user,
                activity_window: config.lock_activity_window(),
                idle_countdown: config.lock_idle_countdown(),
                stale_ttl_ms: config.stale_lock_ttl_ms,
                table: Mutex::new(LockTable {
                    records: HashMap::new(),
                    activity: KeyedTasks::new(),
                    idle: KeyedTasks::new(),
                    acquiring: HashMap::new(),
                    reassert: HashSet::new(),
                    closed: false,
                }),
                errors,
                events,
            }),
        }
    }

    pub fn local_user(&self) -> &UserId {
        &self.shared.local_user
    }

    /// Take or refresh the manipulation lock on `id`.
    ///
    /// Returns false if the remote write failed; the session error is set.
    pub async fn start_manipulation(&self, id: &ObjectId, user: &UserId) -> bool {
        let shared = &self.shared;
        let now = shared.clock.now_millis();
        let mut record = LockRecord::manipulating(
            id.clone(),
            user.clone(),
            now,
            shared.activity_window.as_millis() as u64,
        );

        let held_since = {
            let mut table = shared.table.lock();
            if table.closed {
                return false;
            }
            *table.acquiring.entry(id.clone()).or_insert(0) += 1;
            table
                .records
                .get(id)
                .filter(|existing| &existing.locked_by == user)
                .map(|existing| existing.locked_at)
        };
        if let Some(locked_at) = held_since {
            record.locked_at = locked_at;
        }

        if let Err(error) = shared.remote.put_lock(&record).await {
            Shared::abort_acquire(shared, id);
            shared.acquire_failed(id, error);
            return false;
        }

        if Shared::record_manipulation(shared, record.clone()) {
            debug!(object_id = %id, "Lock deleted by idle release, writing it again");
            if let Err(error) = shared.remote.put_lock(&record).await {
                shared.forget(id);
                shared.acquire_failed(id, error);
                return false;
            }
        }
        true
    }

    /// Turn the lock on `id` idle and start its release countdown.
    pub async fn end_manipulation(&self, id: &ObjectId) {
        Shared::end_manipulation(&self.shared, id).await;
    }

    pub fn is_locked(&self, id: &ObjectId) -> bool {
        self.lock_owner(id).is_some()
    }

    /// Owner of a currently valid lock on `id`.
    pub fn lock_owner(&self, id: &ObjectId) -> Option<UserId> {
        let now = self.shared.clock.now_millis();
        self.shared
            .table
            .lock()
            .records
            .get(id)
            .filter(|record| record.is_valid_at(now))
            .map(|record| record.locked_by.clone())
    }

    /// Whether the local user is manipulating `id` right now.
    pub fn is_manipulating(&self, id: &ObjectId) -> bool {
        self.shared
            .table
            .lock()
            .records
            .get(id)
            .is_some_and(|record| {
                record.is_manipulating && record.locked_by == self.shared.local_user
            })
    }

    pub fn state(&self, id: &ObjectId) -> LockState {
        let now = self.shared.clock.now_millis();
        let table = self.shared.table.lock();
        LockState::of(table.records.get(id).filter(|r| r.is_valid_at(now)))
    }

    pub fn lock(&self, id: &ObjectId) -> Option<LockRecord> {
        self.shared.table.lock().records.get(id).cloned()
    }

    pub fn locks(&self) -> HashMap<ObjectId, LockRecord> {
        self.shared.table.lock().records.clone()
    }

    /// Release every lock held by `user` and cancel all lock timers.
    pub async fn release_all_locks(&self, user: &UserId) {
        let shared = &self.shared;
        let owned: Vec<ObjectId> = {
            let mut table = shared.table.lock();
            table.activity.cancel_all();
            table.idle.cancel_all();
            table
                .records
                .iter()
                .filter(|(_, record)| &record.locked_by == user)
                .map(|(id, _)| id.clone())
                .collect()
        };
        if owned.is_empty() {
            return;
        }

        let results = join_all(owned.iter().map(|id| shared.remote.delete_lock(id))).await;

        let mut failed = 0;
        let mut table = shared.table.lock();
        for (id, result) in owned.iter().zip(results) {
            match result {
                Ok(()) => {
                    table.records.remove(id);
                    let _ = shared.events.send(LockEvent::Released {
                        id: id.clone(),
                        owner: user.clone(),
                    });
                }
                Err(error) => {
                    failed += 1;
                    error!(object_id = %id, %error, "Failed to release lock");
                }
            }
        }

        info!(user = %user, released = owned.len() - failed, failed, "Released locks");
        if failed > 0 {
            shared.errors.set("Failed to release locks");
        }
    }

    /// Drop every lock whose owner has been silent longer than the TTL.
    ///
    /// Remote deletes are fire-and-forget. Returns the swept ids.
    pub fn sweep_stale(&self) -> Vec<ObjectId> {
        let shared = &self.shared;
        let now = shared.clock.now_millis();
        let mut swept = Vec::new();
        {
            let mut table = shared.table.lock();
            let stale: Vec<ObjectId> = table
                .records
                .iter()
                .filter(|(_, record)| record.is_stale_at(now, shared.stale_ttl_ms))
                .map(|(id, _)| id.clone())
                .collect();
            for id in stale {
                table.activity.cancel(&id);
                table.idle.cancel(&id);
                if let Some(record) = table.records.remove(&id) {
                    swept.push(record);
                }
            }
        }

        for record in &swept {
            info!(object_id = %record.shape_id, owner = %record.locked_by, "Sweeping stale lock");
            let _ = shared.events.send(LockEvent::Swept {
                id: record.shape_id.clone(),
                owner: record.locked_by.clone(),
            });

            let remote = Arc::clone(&shared.remote);
            let id = record.shape_id.clone();
            tokio::spawn(async move {
                if let Err(error) = remote.delete_lock(&id).await {
                    debug!(object_id = %id, %error, "Stale lock delete failed");
                }
            });
        }
        swept.into_iter().map(|record| record.shape_id).collect()
    }

    /// Replace the mirror with a remote snapshot.
    pub fn apply_remote_locks(&self, snapshot: LockSnapshot) {
        let mut table = self.shared.table.lock();
        if table.closed {
            return;
        }
        table.records = snapshot
            .into_iter()
            .map(|(id, mut record)| {
                record.shape_id = id.clone();
                (id, record)
            })
            .collect();
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LockEvent> {
        self.shared.events.subscribe()
    }

    /// Cancel every lock timer. Remote records are left as they are.
    pub fn shutdown(&self) {
        let mut table = self.shared.table.lock();
        table.closed = true;
        table.activity.cancel_all();
        table.idle.cancel_all();
    }
}

impl<R: RemoteStore> Shared<R> {
    fn acquire_failed(&self, id: &ObjectId, error: RemoteError) {
        error!(object_id = %id, %error, "Failed to acquire lock");
        self.errors.set("Failed to acquire lock");
        let _ = self.events.send(LockEvent::Failed {
            id: id.clone(),
            error,
        });
    }

    /// Returns the number of acquisitions of `id` still in flight.
    fn finish_acquire(table: &mut LockTable, id: &ObjectId) -> usize {
        let remaining = match table.acquiring.get_mut(id) {
            Some(count) => {
                *count = count.saturating_sub(1);
                *count
            }
            None => 0,
        };
        if remaining == 0 {
            table.acquiring.remove(id);
        }
        remaining
    }

    fn forget(&self, id: &ObjectId) {
        let mut table = self.table.lock();
        table.activity.cancel(id);
        table.idle.cancel(id);
        table.records.remove(id);
    }

    /// A failed acquisition leaves the previous record in place. If an idle
    /// release was held back by it, the release is completed here.
    fn abort_acquire(shared: &Arc<Self>, id: &ObjectId) {
        let released = {
            let mut guard = shared.table.lock();
            let table = &mut *guard;
            let remaining = Self::finish_acquire(table, id);
            if table.closed || remaining > 0 {
                return;
            }

            let local_idle = table.records.get(id).is_some_and(|record| {
                !record.is_manipulating && record.locked_by == shared.local_user
            });
            if table.reassert.remove(id) {
                if local_idle {
                    table.records.remove(id);
                }
                local_idle
            } else {
                if local_idle && !table.idle.is_armed(id) {
                    Self::arm_idle(shared, table, id.clone());
                }
                false
            }
        };

        if released {
            let _ = shared.events.send(LockEvent::Released {
                id: id.clone(),
                owner: shared.local_user.clone(),
            });
        }
    }

    /// Store a freshly written manipulating record and restart its activity
    /// window. Returns true if the remote record was deleted underneath the
    /// write and must be written again.
    fn record_manipulation(shared: &Arc<Self>, record: LockRecord) -> bool {
        let mut guard = shared.table.lock();
        let table = &mut *guard;
        let id = record.shape_id.clone();
        Self::finish_acquire(table, &id);
        let reassert = table.reassert.remove(&id);
        if table.closed {
            return false;
        }

        let owner = record.locked_by.clone();
        table.idle.cancel(&id);
        table.records.insert(id.clone(), record);

        let weak = Arc::downgrade(shared);
        let key = id.clone();
        let window = shared.activity_window;
        table.activity.arm(id.clone(), move |generation| {
            spawn_after(window, async move {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if !shared.table.lock().activity.settle(&key, generation) {
                    return;
                }
                debug!(object_id = %key, "No activity, lock going idle");
                Self::end_manipulation(&shared, &key).await;
            })
        });

        debug!(object_id = %id, owner = %owner, "Lock acquired");
        let _ = shared.events.send(LockEvent::Acquired { id, owner });
        reassert
    }

    async fn end_manipulation(shared: &Arc<Self>, id: &ObjectId) {
        let current = {
            let mut table = shared.table.lock();
            if table.closed {
                return;
            }
            table.activity.cancel(id);
            table.records.get(id).cloned()
        };
        let Some(current) = current else {
            warn!(object_id = %id, "No lock found to end manipulation");
            return;
        };
        if current.locked_by != shared.local_user {
            debug!(object_id = %id, owner = %current.locked_by, "Lock held by another user");
            return;
        }

        let idle = current.idle(
            shared.clock.now_millis(),
            shared.idle_countdown.as_millis() as u64,
        );
        if let Err(error) = shared.remote.put_lock(&idle).await {
            error!(object_id = %id, %error, "Failed to update lock");
            shared.errors.set(format!("Failed to update lock: {}", error));
            let _ = shared.events.send(LockEvent::Failed {
                id: id.clone(),
                error,
            });
            return;
        }

        Self::record_idle(shared, idle);
    }

    fn record_idle(shared: &Arc<Self>, record: LockRecord) {
        let mut guard = shared.table.lock();
        let table = &mut *guard;
        if table.closed {
            return;
        }

        let id = record.shape_id.clone();
        let owner = record.locked_by.clone();
        table.records.insert(id.clone(), record);
        Self::arm_idle(shared, table, id.clone());

        let _ = shared.events.send(LockEvent::Idle { id, owner });
    }

    fn arm_idle(shared: &Arc<Self>, table: &mut LockTable, id: ObjectId) {
        let weak = Arc::downgrade(shared);
        let key = id.clone();
        let countdown = shared.idle_countdown;
        table.idle.arm(id, move |generation| {
            spawn_after(countdown, async move {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if !shared.table.lock().idle.settle(&key, generation) {
                    return;
                }
                Self::release_idle(&shared, &key).await;
            })
        });
    }

    async fn release_idle(shared: &Arc<Self>, id: &ObjectId) {
        {
            let table = shared.table.lock();
            let idle = !table.acquiring.contains_key(id)
                && table.records.get(id).is_some_and(|record| {
                    !record.is_manipulating && record.locked_by == shared.local_user
                });
            if table.closed || !idle {
                debug!(object_id = %id, "Lock no longer idle, release skipped");
                return;
            }
        }

        if let Err(error) = shared.remote.delete_lock(id).await {
            error!(object_id = %id, %error, "Failed to release idle lock");
            let _ = shared.events.send(LockEvent::Failed {
                id: id.clone(),
                error,
            });
            return;
        }

        let after = {
            let mut table = shared.table.lock();
            if table.closed {
                return;
            }
            let local = &shared.local_user;
            if table.acquiring.contains_key(id) {
                table.reassert.insert(id.clone());
                AfterRelease::Keep
            } else {
                match table.records.get(id) {
                    Some(record) if &record.locked_by != local => AfterRelease::Keep,
                    Some(record) if record.is_manipulating => {
                        AfterRelease::Restore(record.clone())
                    }
                    _ => {
                        table.records.remove(id);
                        AfterRelease::Released
                    }
                }
            }
        };

        match after {
            AfterRelease::Released => {
                debug!(object_id = %id, "Idle lock released");
                let _ = shared.events.send(LockEvent::Released {
                    id: id.clone(),
                    owner: shared.local_user.clone(),
                });
            }
            AfterRelease::Restore(record) => {
                debug!(object_id = %id, "Lock taken again during release, restoring");
                if let Err(error) = shared.remote.put_lock(&record).await {
                    shared.forget(id);
                    shared.acquire_failed(id, error);
                }
            }
            AfterRelease::Keep => {}
        }
    }
}

//! Synchronized object store.
//!
//! The composition root of a session. Local mutations are applied to the
//! object list at once and handed to the write throttler; remote snapshots
//! are reconciled into the list, skipping objects the local user is
//! actively editing. Lock operations go through the lock manager, whose
//! mirror also gates every mutation.

use crate::active_edit::ActiveEditTracker;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::{ErrorState, Result, SyncError};
use crate::locks::{LockEvent, LockManager};
use crate::remote::{ObjectSnapshot, RemoteError, RemoteStore};
use crate::throttle::{WriteOutcome, WriteThrottler};
use crate::timer::{spawn_after, KeyedTasks};
use canvas_core::{
    reconcile, removed_ids, LockRecord, LockState, ObjectDraft, ObjectId, ObjectPatch,
    SharedObject, SyncStatus, UserId, UserIdentity,
};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

const OBJECTS_LISTENER_ERROR: &str = "Failed to sync objects";
const LOCKS_LISTENER_ERROR: &str = "Failed to sync lock data";

/// Events emitted by the store.
#[derive(Clone, Debug, PartialEq)]
pub enum StoreEvent {
    /// A snapshot was reconciled into the local list.
    Reconciled { count: usize },
    /// Objects removed by a remote snapshot.
    Removed { ids: Vec<ObjectId> },
    Created { id: ObjectId },
    Updated { id: ObjectId },
    Deleted { id: ObjectId },
    StatusChanged { id: ObjectId, status: SyncStatus },
    Error { message: String },
}

struct SnapshotState {
    latest: Option<ObjectSnapshot>,
    reconcile: KeyedTasks<()>,
    creates_in_flight: usize,
    next_create: u64,
    settle: KeyedTasks<u64>,
    loading: bool,
}

struct Shared<R: RemoteStore> {
    remote: Arc<R>,
    clock: Arc<dyn Clock>,
    user: UserIdentity,
    config: SyncConfig,
    objects: RwLock<Vec<SharedObject>>,
    edits: ActiveEditTracker,
    writer: WriteThrottler<R>,
    locks: LockManager<R>,
    errors: ErrorState,
    snapshots: Mutex<SnapshotState>,
    events: broadcast::Sender<StoreEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

/// Client-side store of the shared objects of one canvas.
///
/// Must be opened inside a tokio runtime. Dropping the store shuts it down.
pub struct SynchronizedObjectStore<R: RemoteStore> {
    shared: Arc<Shared<R>>,
}

impl<R: RemoteStore> SynchronizedObjectStore<R> {
    /// Open a session for `user` and subscribe to both remote collections.
    pub fn open(remote: Arc<R>, user: UserIdentity, config: SyncConfig) -> Self {
        Self::open_with_clock(remote, user, config, Arc::new(SystemClock::new()))
    }

    pub fn open_with_clock(
        remote: Arc<R>,
        user: UserIdentity,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let errors = ErrorState::new();
        let (writer, outcomes) = WriteThrottler::new(remote.clone(), &config);
        let locks = LockManager::new(
            remote.clone(),
            clock.clone(),
            user.id.clone(),
            &config,
            errors.clone(),
        );
        let lock_events = locks.subscribe();
        let (events, _) = broadcast::channel(256);

        let shared = Arc::new(Shared {
            remote,
            clock,
            edits: ActiveEditTracker::new(config.local_edit_window()),
            user,
            config,
            objects: RwLock::new(Vec::new()),
            writer,
            locks,
            errors,
            snapshots: Mutex::new(SnapshotState {
                latest: None,
                reconcile: KeyedTasks::new(),
                creates_in_flight: 0,
                next_create: 0,
                settle: KeyedTasks::new(),
                loading: true,
            }),
            events,
            tasks: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        });

        let tasks = vec![
            Shared::spawn_object_listener(&shared),
            Shared::spawn_lock_listener(&shared),
            Shared::spawn_outcome_listener(&shared, outcomes),
            Shared::spawn_lock_event_listener(&shared, lock_events),
            Shared::spawn_sweeper(&shared),
        ];
        *shared.tasks.lock() = tasks;

        info!(user = %shared.user.id, "Object store opened");
        Self { shared }
    }

    // ---- Mutations ----

    /// Create an object. Returns the id assigned by the remote store.
    pub async fn create(&self, draft: ObjectDraft) -> Option<ObjectId> {
        let kind = draft.kind();
        match Shared::create(&self.shared, draft).await {
            Ok(id) => {
                info!(object_id = %id, %kind, "Object created");
                Some(id)
            }
            Err(error) => {
                self.shared.report("create object", error);
                None
            }
        }
    }

    /// Apply a partial update locally and queue it for writing.
    ///
    /// Refused if another user holds a valid lock on the object.
    pub fn update(&self, id: &ObjectId, patch: ObjectPatch) -> bool {
        match self.shared.update(id, patch) {
            Ok(()) => true,
            Err(error) => {
                self.shared.report("update object", error);
                false
            }
        }
    }

    pub async fn delete(&self, id: &ObjectId) -> bool {
        match self.shared.delete(id).await {
            Ok(()) => {
                info!(object_id = %id, "Object deleted");
                true
            }
            Err(error) => {
                self.shared.report("delete object", error);
                false
            }
        }
    }

    /// Remove every object. Returns the number of successful remote deletes.
    pub async fn delete_all(&self) -> usize {
        self.shared.delete_all().await
    }

    /// Take the manipulation lock on `id` and annotate the object.
    pub async fn lock(&self, id: &ObjectId) -> bool {
        let shared = &self.shared;
        if let Err(error) = shared.check_mutable(id) {
            shared.report("lock object", error);
            return false;
        }
        if !shared.locks.start_manipulation(id, &shared.user.id).await {
            return false;
        }
        shared.annotate(id);
        true
    }

    /// End the manipulation of `id` and clear its annotation.
    pub async fn unlock(&self, id: &ObjectId) {
        let shared = &self.shared;
        shared.locks.end_manipulation(id).await;
        shared.clear_annotation(id, &shared.user.id);
    }

    pub fn begin_local_edit(&self, id: &ObjectId) {
        self.shared.edits.begin(id.clone());
    }

    pub fn end_local_edit(&self, id: &ObjectId) {
        self.shared.edits.end(id);
    }

    /// Clear the error and restart the retry count of queued writes.
    /// Abandoned writes are not replayed.
    pub fn retry(&self) {
        self.shared.errors.clear();
        self.shared.writer.reset_retries();
    }

    /// Run the stale-lock sweep now. Returns the number of locks and
    /// annotations cleared.
    pub fn sweep_stale_locks(&self) -> usize {
        self.shared.sweep_stale()
    }

    // ---- Queries ----

    pub fn objects(&self) -> Vec<SharedObject> {
        self.shared.objects.read().clone()
    }

    pub fn object(&self, id: &ObjectId) -> Option<SharedObject> {
        self.shared
            .objects
            .read()
            .iter()
            .find(|object| &object.id == id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.shared.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.shared.objects.read().is_empty()
    }

    pub fn locks(&self) -> HashMap<ObjectId, LockRecord> {
        self.shared.locks.locks()
    }

    pub fn is_locked(&self, id: &ObjectId) -> bool {
        self.shared.locks.is_locked(id)
    }

    pub fn lock_owner(&self, id: &ObjectId) -> Option<UserId> {
        self.shared.locks.lock_owner(id)
    }

    pub fn is_manipulating(&self, id: &ObjectId) -> bool {
        self.shared.locks.is_manipulating(id)
    }

    pub fn lock_state(&self, id: &ObjectId) -> LockState {
        self.shared.locks.state(id)
    }

    pub fn is_editing(&self, id: &ObjectId) -> bool {
        self.shared.edits.contains(id)
    }

    pub fn has_pending_write(&self, id: &ObjectId) -> bool {
        self.shared.writer.has_pending(id)
    }

    pub fn error(&self) -> Option<String> {
        self.shared.errors.get()
    }

    /// True until the first snapshot or listener failure.
    pub fn is_loading(&self) -> bool {
        self.shared.snapshots.lock().loading
    }

    pub fn user(&self) -> &UserIdentity {
        &self.shared.user
    }

    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.shared.events.subscribe()
    }

    // ---- Lifecycle ----

    /// Release the local user's locks and annotations, then shut down.
    ///
    /// Queued writes are sent before shutting down, with the annotation
    /// cleared from every object the user had marked.
    pub async fn sign_out(&self) {
        let shared = &self.shared;
        // Cleared before the locks go, so released lock events find
        // nothing left to queue.
        let annotated: Vec<ObjectId> = shared
            .objects
            .write()
            .iter_mut()
            .filter(|object| object.is_locked_by(&shared.user.id))
            .map(|object| {
                object.lock = None;
                object.id.clone()
            })
            .collect();

        shared.locks.release_all_locks(&shared.user.id).await;

        let mut writes = shared.writer.drain_pending();
        for id in annotated {
            match writes.iter_mut().find(|(queued, _)| queued == &id) {
                Some((_, patch)) => patch.merge(ObjectPatch::unlock()),
                None => writes.push((id, ObjectPatch::unlock())),
            }
        }
        let results = join_all(
            writes
                .iter()
                .map(|(id, patch)| shared.remote.update_object(id, patch)),
        )
        .await;
        for ((id, _), result) in writes.iter().zip(results) {
            if let Err(error) = result {
                warn!(object_id = %id, %error, "Failed to write on sign out");
            }
        }

        info!(user = %shared.user.id, "Signed out");
        self.shutdown();
    }

    /// Stop listening, cancel every timer and drop queued writes.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }
}

impl<R: RemoteStore> Drop for SynchronizedObjectStore<R> {
    fn drop(&mut self) {
        self.shared.shutdown();
    }
}

impl<R: RemoteStore> Shared<R> {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn emit(&self, event: StoreEvent) {
        let _ = self.events.send(event);
    }

    fn report(&self, action: &str, error: SyncError) {
        match &error {
            SyncError::LockedBy { .. } | SyncError::ObjectNotFound(_) | SyncError::Closed => {
                warn!(%error, "Cannot {}", action);
            }
            SyncError::Model(model) => {
                warn!(%error, "Cannot {}", action);
                self.set_error(format!("Failed to {}: {}", action, model));
            }
            SyncError::Remote(_) => {
                error!(%error, "Failed to {}", action);
                self.set_error(format!("Failed to {}", action));
            }
        }
    }

    fn set_error(&self, message: String) {
        self.errors.set(message.clone());
        self.emit(StoreEvent::Error { message });
    }

    /// A mutation of `id` is allowed unless another user holds a valid lock.
    fn check_mutable(&self, id: &ObjectId) -> Result<()> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }
        match self.locks.lock_owner(id) {
            Some(owner) if owner != self.user.id => Err(SyncError::LockedBy {
                id: id.clone(),
                owner,
            }),
            _ => Ok(()),
        }
    }

    // ---- Mutations ----

    async fn create(shared: &Arc<Self>, draft: ObjectDraft) -> Result<ObjectId> {
        if shared.is_closed() {
            return Err(SyncError::Closed);
        }
        let draft = shared.config.limits.validate_draft(draft)?;

        let ticket = shared.begin_create();
        let result = shared.remote.insert_object(draft, &shared.user.id).await;
        Self::settle_create(shared, ticket);

        let mut object = result?;
        let id = object.id.clone();
        object.sync_status = Some(SyncStatus::Pending);
        {
            let mut objects = shared.objects.write();
            if !objects.iter().any(|existing| existing.id == id) {
                objects.push(object);
            }
        }
        shared.emit(StoreEvent::Created { id: id.clone() });
        Ok(id)
    }

    fn begin_create(&self) -> u64 {
        let mut state = self.snapshots.lock();
        state.creates_in_flight += 1;
        state.next_create += 1;
        state.next_create
    }

    /// Keep the widened reconcile window open a little after the create.
    fn settle_create(shared: &Arc<Self>, ticket: u64) {
        let delay = shared.config.create_settle();
        let mut state = shared.snapshots.lock();
        if delay.is_zero() {
            state.creates_in_flight = state.creates_in_flight.saturating_sub(1);
            return;
        }

        let weak = Arc::downgrade(shared);
        state.settle.arm(ticket, move |generation| {
            spawn_after(delay, async move {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let mut state = shared.snapshots.lock();
                if state.settle.settle(&ticket, generation) {
                    state.creates_in_flight = state.creates_in_flight.saturating_sub(1);
                }
            })
        });
    }

    fn update(&self, id: &ObjectId, patch: ObjectPatch) -> Result<()> {
        self.check_mutable(id)?;
        let patch = self.config.limits.validate_patch(patch)?;
        if patch.is_empty() {
            return Ok(());
        }

        {
            let mut objects = self.objects.write();
            let object = objects
                .iter_mut()
                .find(|object| &object.id == id)
                .ok_or_else(|| SyncError::ObjectNotFound(id.clone()))?;
            object.apply(&patch);
            object.sync_status = Some(SyncStatus::Pending);
        }

        self.edits.begin(id.clone());
        self.writer.enqueue(id.clone(), patch);
        self.emit(StoreEvent::Updated { id: id.clone() });
        Ok(())
    }

    async fn delete(&self, id: &ObjectId) -> Result<()> {
        self.check_mutable(id)?;
        self.objects.write().retain(|object| &object.id != id);
        self.writer.cancel(id);
        self.edits.end(id);

        self.remote.delete_object(id).await?;
        self.emit(StoreEvent::Deleted { id: id.clone() });
        Ok(())
    }

    async fn delete_all(&self) -> usize {
        if self.is_closed() {
            return 0;
        }
        let previous = std::mem::take(&mut *self.objects.write());
        for object in &previous {
            self.writer.cancel(&object.id);
            self.edits.end(&object.id);
        }

        let results = join_all(
            previous
                .iter()
                .map(|object| self.remote.delete_object(&object.id)),
        )
        .await;

        let mut deleted = 0;
        for (object, result) in previous.iter().zip(results) {
            match result {
                Ok(()) => {
                    deleted += 1;
                    self.emit(StoreEvent::Deleted {
                        id: object.id.clone(),
                    });
                }
                Err(error) => error!(object_id = %object.id, %error, "Failed to delete object"),
            }
        }

        let failed = previous.len() - deleted;
        info!(deleted, failed, "Deleted all objects");
        if failed > 0 {
            self.set_error(format!("Failed to delete {} objects", failed));
        }
        deleted
    }

    fn annotate(&self, id: &ObjectId) {
        let annotation = self.user.annotation(self.clock.now_millis());
        let changed = {
            let mut objects = self.objects.write();
            match objects.iter_mut().find(|object| &object.id == id) {
                Some(object) if !object.is_locked_by(&self.user.id) => {
                    object.lock = Some(annotation.clone());
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.edits.begin(id.clone());
            self.writer.enqueue(id.clone(), ObjectPatch::lock(annotation));
        }
    }

    fn clear_annotation(&self, id: &ObjectId, owner: &UserId) {
        let changed = {
            let mut objects = self.objects.write();
            match objects.iter_mut().find(|object| &object.id == id) {
                Some(object) if object.is_locked_by(owner) => {
                    object.lock = None;
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.edits.begin(id.clone());
            self.writer.enqueue(id.clone(), ObjectPatch::unlock());
        }
    }

    fn set_status(&self, id: &ObjectId, status: SyncStatus) {
        let changed = {
            let mut objects = self.objects.write();
            match objects.iter_mut().find(|object| &object.id == id) {
                Some(object) if object.sync_status != Some(status) => {
                    object.sync_status = Some(status);
                    true
                }
                _ => false,
            }
        };
        if changed {
            self.emit(StoreEvent::StatusChanged {
                id: id.clone(),
                status,
            });
        }
    }

    // ---- Snapshots ----

    fn on_snapshot(shared: &Arc<Self>, snapshot: ObjectSnapshot) {
        let snapshot: ObjectSnapshot = snapshot
            .into_iter()
            .map(|mut object| {
                object.sync_status = Some(SyncStatus::Synced);
                object
            })
            .collect();

        let mut guard = shared.snapshots.lock();
        let state = &mut *guard;
        state.latest = Some(snapshot);

        let delay = if state.creates_in_flight > 0 {
            shared.config.create_settle()
        } else {
            shared.config.snapshot_debounce()
        };

        if delay.is_zero() {
            state.reconcile.cancel(&());
            let latest = state.latest.take();
            drop(guard);
            if let Some(snapshot) = latest {
                shared.apply_snapshot(snapshot);
            }
            return;
        }

        let weak = Arc::downgrade(shared);
        state.reconcile.arm((), move |generation| {
            spawn_after(delay, async move {
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                let latest = {
                    let mut state = shared.snapshots.lock();
                    if !state.reconcile.settle(&(), generation) {
                        return;
                    }
                    state.latest.take()
                };
                if let Some(snapshot) = latest {
                    shared.apply_snapshot(snapshot);
                }
            })
        });
    }

    fn apply_snapshot(&self, snapshot: ObjectSnapshot) {
        if self.is_closed() {
            return;
        }
        let active = self.edits.ids();

        let (removed, count) = {
            let mut objects = self.objects.write();
            let removed = removed_ids(&objects, &snapshot);
            let next = reconcile(snapshot, &active, &objects);
            *objects = next;
            (removed, objects.len())
        };

        for id in &removed {
            self.writer.cancel(id);
            self.edits.end(id);
        }
        self.snapshots.lock().loading = false;
        self.errors.clear_if(OBJECTS_LISTENER_ERROR);

        trace!(count, removed = removed.len(), active = active.len(), "Snapshot reconciled");
        if !removed.is_empty() {
            self.emit(StoreEvent::Removed { ids: removed });
        }
        self.emit(StoreEvent::Reconciled { count });
    }

    fn on_listener_error(&self, message: &'static str, error: RemoteError) {
        error!(%error, "{}", message);
        if message == OBJECTS_LISTENER_ERROR {
            self.snapshots.lock().loading = false;
        }
        self.set_error(message.to_string());
    }

    // ---- Write outcomes and lock events ----

    fn on_write_outcome(&self, outcome: WriteOutcome) {
        match outcome {
            WriteOutcome::Written { id, settled } => {
                if settled {
                    self.set_status(&id, SyncStatus::Synced);
                }
            }
            WriteOutcome::Failed {
                id,
                retry_in: Some(_),
                ..
            } => self.set_status(&id, SyncStatus::Error),
            WriteOutcome::Failed { retry_in: None, .. } => {}
            WriteOutcome::Abandoned { id, error } => {
                error!(object_id = %id, %error, "Giving up on write");
                self.set_status(&id, SyncStatus::Error);
                self.set_error(format!("Failed to save changes to {}", id));
            }
        }
    }

    fn on_lock_event(&self, event: LockEvent) {
        match event {
            LockEvent::Released { id, owner } | LockEvent::Swept { id, owner } => {
                self.clear_annotation(&id, &owner);
            }
            LockEvent::Acquired { .. } | LockEvent::Idle { .. } | LockEvent::Failed { .. } => {}
        }
    }

    /// Sweep stale locks, then stale annotations whose owner no longer
    /// holds a valid lock.
    fn sweep_stale(&self) -> usize {
        let swept = self.locks.sweep_stale();
        let held = self.locks.locks();
        let now = self.clock.now_millis();
        let ttl = self.config.stale_lock_ttl_ms;

        let cleared: Vec<ObjectId> = self
            .objects
            .write()
            .iter_mut()
            .filter_map(|object| {
                let annotation = object.lock.as_ref()?;
                let live = held.get(&object.id).is_some_and(|record| {
                    record.locked_by == annotation.user_id && record.is_valid_at(now)
                });
                if live || now.saturating_sub(annotation.locked_at) <= ttl {
                    return None;
                }
                object.lock = None;
                Some(object.id.clone())
            })
            .collect();

        for id in &cleared {
            self.writer.enqueue(id.clone(), ObjectPatch::unlock());
        }
        if !swept.is_empty() || !cleared.is_empty() {
            info!(locks = swept.len(), annotations = cleared.len(), "Swept stale locks");
        }
        swept.len() + cleared.len()
    }

    // ---- Background tasks ----

    fn spawn_object_listener(shared: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = shared.remote.subscribe_objects();
        let weak = Arc::downgrade(shared);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                match message {
                    Ok(snapshot) => Self::on_snapshot(&shared, snapshot),
                    Err(error) => shared.on_listener_error(OBJECTS_LISTENER_ERROR, error),
                }
            }
            debug!("Object subscription closed");
        })
    }

    fn spawn_lock_listener(shared: &Arc<Self>) -> JoinHandle<()> {
        let mut rx = shared.remote.subscribe_locks();
        let weak = Arc::downgrade(shared);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                match message {
                    Ok(snapshot) => {
                        shared.locks.apply_remote_locks(snapshot);
                        shared.errors.clear_if(LOCKS_LISTENER_ERROR);
                    }
                    Err(error) => shared.on_listener_error(LOCKS_LISTENER_ERROR, error),
                }
            }
            debug!("Lock subscription closed");
        })
    }

    fn spawn_outcome_listener(
        shared: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<WriteOutcome>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(shared);
        tokio::spawn(async move {
            while let Some(outcome) = rx.recv().await {
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.on_write_outcome(outcome);
            }
        })
    }

    fn spawn_lock_event_listener(
        shared: &Arc<Self>,
        mut rx: broadcast::Receiver<LockEvent>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(shared);
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(shared) = weak.upgrade() else {
                            break;
                        };
                        shared.on_lock_event(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Lock event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn spawn_sweeper(shared: &Arc<Self>) -> JoinHandle<()> {
        let weak = Arc::downgrade(shared);
        let period = shared
            .config
            .stale_lock_sweep_interval()
            .max(Duration::from_millis(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                shared.sweep_stale();
            }
        })
    }

    fn shutdown(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.writer.shutdown();
        self.locks.shutdown();
        self.edits.clear();
        {
            let mut state = self.snapshots.lock();
            state.reconcile.cancel_all();
            state.settle.cancel_all();
            state.latest = None;
        }
        debug!(user = %self.user.id, "Object store shut down");
    }
}

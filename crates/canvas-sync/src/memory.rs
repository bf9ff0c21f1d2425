//! In-memory remote store for testing and simulation.
//!
//! Every change publishes a fresh snapshot to all subscribers, in order.
//! Writes are recorded in a log so tests can count them, and failures and
//! latency can be injected.

use crate::clock::{Clock, SystemClock};
use crate::remote::{LockSnapshot, ObjectSnapshot, RemoteError, RemoteStore, Subscription};
use async_trait::async_trait;
use canvas_core::{
    LockRecord, ObjectDraft, ObjectId, ObjectPatch, SharedObject, Timestamp, UserId,
};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// A write as seen by the store.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOp {
    Insert,
    Update(ObjectPatch),
    Delete,
    PutLock(LockRecord),
    DeleteLock,
}

/// Entry of the write log.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteRecord {
    pub id: ObjectId,
    pub op: WriteOp,
    pub at: Timestamp,
    pub ok: bool,
}

type Subscribers<T> = Vec<mpsc::UnboundedSender<Result<T, RemoteError>>>;

#[derive(Default)]
struct MemoryState {
    objects: Vec<SharedObject>,
    locks: LockSnapshot,
    object_subscribers: Subscribers<ObjectSnapshot>,
    lock_subscribers: Subscribers<LockSnapshot>,
    log: Vec<WriteRecord>,
}

impl MemoryState {
    fn publish_objects(&mut self) {
        let snapshot = self.objects.clone();
        self.object_subscribers
            .retain(|tx| tx.send(Ok(snapshot.clone())).is_ok());
    }

    fn publish_locks(&mut self) {
        let snapshot = self.locks.clone();
        self.lock_subscribers
            .retain(|tx| tx.send(Ok(snapshot.clone())).is_ok());
    }
}

#[derive(Default)]
struct FailurePlan {
    fail_next: usize,
    fail_all: bool,
}

/// In-memory remote store.
pub struct MemoryStore {
    clock: Arc<dyn Clock>,
    state: RwLock<MemoryState>,
    failures: Mutex<FailurePlan>,
    latency: RwLock<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: RwLock::new(MemoryState::default()),
            failures: Mutex::new(FailurePlan::default()),
            latency: RwLock::new(None),
        }
    }

    /// Delay applied before every write takes effect.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Fail the next `count` writes.
    pub fn fail_next_writes(&self, count: usize) {
        self.failures.lock().fail_next = count;
    }

    /// Fail every write until switched off.
    pub fn set_failing(&self, failing: bool) {
        self.failures.lock().fail_all = failing;
    }

    /// Put an object into the collection without logging a write.
    pub fn seed(&self, object: SharedObject) {
        let mut state = self.state.write();
        state.objects.push(object);
        state.objects.sort_by_key(|o| o.created_at);
        state.publish_objects();
    }

    /// Deliver an arbitrary snapshot to object subscribers, for example a
    /// stale one, without changing the stored collection.
    pub fn inject_snapshot(&self, snapshot: ObjectSnapshot) {
        self.state
            .write()
            .object_subscribers
            .retain(|tx| tx.send(Ok(snapshot.clone())).is_ok());
    }

    /// Deliver a listener error to object subscribers.
    pub fn inject_object_error(&self, error: RemoteError) {
        self.state
            .write()
            .object_subscribers
            .retain(|tx| tx.send(Err(error.clone())).is_ok());
    }

    /// Deliver a listener error to lock subscribers.
    pub fn inject_lock_error(&self, error: RemoteError) {
        self.state
            .write()
            .lock_subscribers
            .retain(|tx| tx.send(Err(error.clone())).is_ok());
    }

    pub fn objects(&self) -> Vec<SharedObject> {
        self.state.read().objects.clone()
    }

    pub fn object(&self, id: &ObjectId) -> Option<SharedObject> {
        self.state
            .read()
            .objects
            .iter()
            .find(|o| &o.id == id)
            .cloned()
    }

    pub fn lock(&self, id: &ObjectId) -> Option<LockRecord> {
        self.state.read().locks.get(id).cloned()
    }

    pub fn writes(&self) -> Vec<WriteRecord> {
        self.state.read().log.clone()
    }

    /// Update attempts against `id`, failed ones included.
    pub fn update_attempts(&self, id: &ObjectId) -> Vec<WriteRecord> {
        self.state
            .read()
            .log
            .iter()
            .filter(|w| &w.id == id && matches!(w.op, WriteOp::Update(_)))
            .cloned()
            .collect()
    }

    /// Patches successfully applied to `id`.
    pub fn applied_updates(&self, id: &ObjectId) -> Vec<ObjectPatch> {
        self.state
            .read()
            .log
            .iter()
            .filter(|w| &w.id == id && w.ok)
            .filter_map(|w| match &w.op {
                WriteOp::Update(patch) => Some(patch.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn successful_deletes(&self) -> usize {
        self.state
            .read()
            .log
            .iter()
            .filter(|w| w.ok && w.op == WriteOp::Delete)
            .count()
    }

    async fn begin_write(&self) -> Result<(), RemoteError> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut plan = self.failures.lock();
        if plan.fail_all {
            return Err(RemoteError::Unavailable("injected failure".into()));
        }
        if plan.fail_next > 0 {
            plan.fail_next -= 1;
            return Err(RemoteError::Unavailable("injected failure".into()));
        }
        Ok(())
    }

    fn record(&self, id: &ObjectId, op: WriteOp, ok: bool) {
        let at = self.clock.now_millis();
        self.state.write().log.push(WriteRecord {
            id: id.clone(),
            op,
            at,
            ok,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn insert_object(
        &self,
        draft: ObjectDraft,
        created_by: &UserId,
    ) -> Result<SharedObject, RemoteError> {
        let id = ObjectId::generate();
        if let Err(e) = self.begin_write().await {
            self.record(&id, WriteOp::Insert, false);
            return Err(e);
        }

        let object = draft.into_object(id.clone(), created_by.clone(), self.clock.now_millis());
        self.record(&id, WriteOp::Insert, true);
        let mut state = self.state.write();
        state.objects.push(object.clone());
        state.publish_objects();
        Ok(object)
    }

    async fn update_object(&self, id: &ObjectId, patch: &ObjectPatch) -> Result<(), RemoteError> {
        let op = WriteOp::Update(patch.clone());
        if let Err(e) = self.begin_write().await {
            self.record(id, op, false);
            return Err(e);
        }

        let now = self.clock.now_millis();
        let found = {
            let mut state = self.state.write();
            match state.objects.iter_mut().find(|o| &o.id == id) {
                Some(object) => {
                    object.apply(patch);
                    object.updated_at = now;
                    state.publish_objects();
                    true
                }
                None => false,
            }
        };

        self.record(id, op, found);
        if found {
            Ok(())
        } else {
            Err(RemoteError::NotFound(id.clone()))
        }
    }

    async fn delete_object(&self, id: &ObjectId) -> Result<(), RemoteError> {
        if let Err(e) = self.begin_write().await {
            self.record(id, WriteOp::Delete, false);
            return Err(e);
        }

        self.record(id, WriteOp::Delete, true);
        let mut state = self.state.write();
        let before = state.objects.len();
        state.objects.retain(|o| &o.id != id);
        if state.objects.len() != before {
            state.publish_objects();
        }
        Ok(())
    }

    fn subscribe_objects(&self) -> Subscription<ObjectSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.write();
        let _ = tx.send(Ok(state.objects.clone()));
        state.object_subscribers.push(tx);
        rx
    }

    async fn put_lock(&self, lock: &LockRecord) -> Result<(), RemoteError> {
        let op = WriteOp::PutLock(lock.clone());
        if let Err(e) = self.begin_write().await {
            self.record(&lock.shape_id, op, false);
            return Err(e);
        }

        self.record(&lock.shape_id, op, true);
        let mut state = self.state.write();
        state.locks.insert(lock.shape_id.clone(), lock.clone());
        state.publish_locks();
        Ok(())
    }

    async fn delete_lock(&self, id: &ObjectId) -> Result<(), RemoteError> {
        if let Err(e) = self.begin_write().await {
            self.record(id, WriteOp::DeleteLock, false);
            return Err(e);
        }

        self.record(id, WriteOp::DeleteLock, true);
        let mut state = self.state.write();
        if state.locks.remove(id).is_some() {
            state.publish_locks();
        }
        Ok(())
    }

    fn subscribe_locks(&self) -> Subscription<LockSnapshot> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.state.write();
        let _ = tx.send(Ok(state.locks.clone()));
        state.lock_subscribers.push(tx);
        rx
    }
}

//! Per-object write coalescing.
//!
//! Mutations of one object are merged into a single pending patch and
//! written after a quiet period. Writes of the same object are spaced by a
//! minimum interval and never overlap. A failed write is retried with a
//! linearly growing delay; a newer mutation folds the failed patch into
//! itself and resets the retry count. Writes of different objects are
//! independent.

use crate::config::SyncConfig;
use crate::remote::{RemoteError, RemoteStore};
use crate::timer::{spawn_after, KeyedTasks};
use canvas_core::{ObjectId, ObjectPatch};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Result of a write, reported on the outcome channel.
#[derive(Clone, Debug, PartialEq)]
pub enum WriteOutcome {
    /// The write landed. `settled` is false if newer mutations are queued.
    Written { id: ObjectId, settled: bool },
    /// An attempt failed. `retry_in` is `None` when the patch was folded
    /// into a newer pending one instead of being retried on its own.
    Failed {
        id: ObjectId,
        attempt: u32,
        error: RemoteError,
        retry_in: Option<Duration>,
    },
    /// Retries are exhausted and the update was dropped.
    Abandoned { id: ObjectId, error: RemoteError },
}

#[derive(Clone, Copy, Debug)]
struct Timing {
    debounce: Duration,
    min_interval: Duration,
    backoff: Duration,
    max_retries: u32,
}

#[derive(Default)]
struct WriteEntry {
    pending: Option<ObjectPatch>,
    in_flight: bool,
    last_write: Option<Instant>,
    attempts: u32,
}

struct ThrottleState {
    entries: HashMap<ObjectId, WriteEntry>,
    debounce: KeyedTasks<ObjectId>,
    writes: KeyedTasks<ObjectId>,
    closed: bool,
}

struct Shared<R: RemoteStore> {
    remote: Arc<R>,
    timing: Timing,
    state: Mutex<ThrottleState>,
    outcomes: mpsc::UnboundedSender<WriteOutcome>,
}

enum Flush {
    Skip,
    Defer(Duration),
    Send(ObjectPatch),
    Forget,
}

enum Step {
    Done,
    Retry(Duration, ObjectPatch),
}

/// Debounced, throttled, retrying writer of object patches.
pub struct WriteThrottler<R: RemoteStore> {
    shared: Arc<Shared<R>>,
}

impl<R: RemoteStore> WriteThrottler<R> {
    pub fn new(remote: Arc<R>, config: &SyncConfig) -> (Self, mpsc::UnboundedReceiver<WriteOutcome>) {
        let (outcomes, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            remote,
            timing: Timing {
                debounce: config.write_debounce(),
                min_interval: config.min_write_interval(),
                backoff: config.retry_backoff(),
                max_retries: config.max_write_retries,
            },
            state: Mutex::new(ThrottleState {
                entries: HashMap::new(),
                debounce: KeyedTasks::new(),
                writes: KeyedTasks::new(),
                closed: false,
            }),
            outcomes,
        });
        (Self { shared }, rx)
    }

    /// Merge `patch` into the pending update of `id` and restart its quiet
    /// period.
    pub fn enqueue(&self, id: ObjectId, patch: ObjectPatch) {
        if patch.is_empty() {
            return;
        }
        let shared = &self.shared;
        let mut guard = shared.state.lock();
        let state = &mut *guard;
        if state.closed {
            return;
        }

        let entry = state.entries.entry(id.clone()).or_default();
        match entry.pending.as_mut() {
            Some(pending) => pending.merge(patch),
            None => entry.pending = Some(patch),
        }
        entry.attempts = 0;
        Shared::arm_flush(shared, state, id, shared.timing.debounce);
    }

    /// Drop everything queued for `id` and abort its in-flight write.
    pub fn cancel(&self, id: &ObjectId) {
        let mut state = self.shared.state.lock();
        state.entries.remove(id);
        state.debounce.cancel(id);
        state.writes.cancel(id);
    }

    /// Restart the retry count of every queued write.
    pub fn reset_retries(&self) {
        for entry in self.shared.state.lock().entries.values_mut() {
            entry.attempts = 0;
        }
    }

    /// Whether `id` has a queued or in-flight write.
    pub fn has_pending(&self, id: &ObjectId) -> bool {
        self.shared
            .state
            .lock()
            .entries
            .get(id)
            .is_some_and(|entry| entry.pending.is_some() || entry.in_flight)
    }

    /// Take every queued patch and stop its quiet period. In-flight writes
    /// keep running.
    pub fn drain_pending(&self) -> Vec<(ObjectId, ObjectPatch)> {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        let mut drained = Vec::new();
        for (id, entry) in state.entries.iter_mut() {
            if let Some(patch) = entry.pending.take() {
                state.debounce.cancel(id);
                drained.push((id.clone(), patch));
            }
        }
        state.entries.retain(|_, entry| entry.in_flight);
        drained
    }

    /// Number of objects with write state held.
    pub fn tracked(&self) -> usize {
        self.shared.state.lock().entries.len()
    }

    pub fn in_flight(&self) -> usize {
        self.shared.state.lock().writes.len()
    }

    /// Cancel every timer and write. Later enqueues are ignored.
    pub fn shutdown(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        state.debounce.cancel_all();
        state.writes.cancel_all();
        state.entries.clear();
    }
}

impl<R: RemoteStore> Shared<R> {
    fn arm_flush(shared: &Arc<Self>, state: &mut ThrottleState, id: ObjectId, delay: Duration) {
        let weak = Arc::downgrade(shared);
        let key = id.clone();
        state.debounce.arm(id, move |generation| {
            spawn_after(delay, async move {
                if let Some(shared) = weak.upgrade() {
                    Self::flush(&shared, key, generation);
                }
            })
        });
    }

    fn flush(shared: &Arc<Self>, id: ObjectId, generation: u64) {
        let mut guard = shared.state.lock();
        let state = &mut *guard;
        if state.closed || !state.debounce.settle(&id, generation) {
            return;
        }

        let min_interval = shared.timing.min_interval;
        let action = match state.entries.get_mut(&id) {
            None => Flush::Skip,
            // Picked up when the in-flight write completes
            Some(entry) if entry.in_flight => Flush::Skip,
            Some(entry) => match entry.last_write.map(|at| at.elapsed()) {
                Some(elapsed) if elapsed < min_interval => Flush::Defer(min_interval - elapsed),
                _ => match entry.pending.take() {
                    Some(patch) => {
                        entry.in_flight = true;
                        Flush::Send(patch)
                    }
                    // Idle and past the spacing window
                    None => Flush::Forget,
                },
            },
        };

        match action {
            Flush::Skip => {}
            Flush::Forget => {
                state.entries.remove(&id);
            }
            Flush::Defer(wait) => Self::arm_flush(shared, state, id, wait),
            Flush::Send(patch) => {
                let weak = Arc::downgrade(shared);
                let key = id.clone();
                state.writes.arm(id, move |generation| {
                    tokio::spawn(Self::run_write(weak, key, patch, generation))
                });
            }
        }
    }

    async fn run_write(weak: Weak<Self>, id: ObjectId, mut patch: ObjectPatch, generation: u64) {
        loop {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let result = shared.remote.update_object(&id, &patch).await;

            match Self::after_attempt(&shared, &id, generation, patch, result) {
                Step::Done => return,
                Step::Retry(delay, failed) => {
                    drop(shared);
                    tokio::time::sleep(delay).await;

                    let Some(shared) = weak.upgrade() else {
                        return;
                    };
                    match Self::before_retry(&shared, &id, failed) {
                        Some(next) => patch = next,
                        None => return,
                    }
                }
            }
        }
    }

    fn after_attempt(
        shared: &Arc<Self>,
        id: &ObjectId,
        generation: u64,
        patch: ObjectPatch,
        result: Result<(), RemoteError>,
    ) -> Step {
        let mut guard = shared.state.lock();
        let state = &mut *guard;
        if state.closed {
            return Step::Done;
        }
        let Some(entry) = state.entries.get_mut(id) else {
            state.writes.settle(id, generation);
            return Step::Done;
        };

        match result {
            Ok(()) => {
                entry.in_flight = false;
                entry.attempts = 0;
                entry.last_write = Some(Instant::now());
                let settled = entry.pending.is_none();
                state.writes.settle(id, generation);
                // Sends what is queued, or forgets the entry once settled
                if !state.debounce.is_armed(id) {
                    Self::arm_flush(shared, state, id.clone(), shared.timing.min_interval);
                }

                debug!(object_id = %id, settled, "Write landed");
                let _ = shared.outcomes.send(WriteOutcome::Written {
                    id: id.clone(),
                    settled,
                });
                Step::Done
            }
            Err(error) => {
                entry.attempts += 1;
                let attempt = entry.attempts;

                if let Some(newer) = entry.pending.take() {
                    entry.pending = Some(patch.merged(newer));
                    entry.in_flight = false;
                    entry.attempts = 0;
                    state.writes.settle(id, generation);
                    if !state.debounce.is_armed(id) {
                        Self::arm_flush(shared, state, id.clone(), shared.timing.debounce);
                    }

                    warn!(object_id = %id, %error, "Write failed, folded into newer update");
                    let _ = shared.outcomes.send(WriteOutcome::Failed {
                        id: id.clone(),
                        attempt,
                        error,
                        retry_in: None,
                    });
                    return Step::Done;
                }

                if attempt > shared.timing.max_retries {
                    entry.in_flight = false;
                    entry.attempts = 0;
                    state.writes.settle(id, generation);
                    if !state.debounce.is_armed(id) {
                        Self::arm_flush(shared, state, id.clone(), Duration::ZERO);
                    }

                    error!(object_id = %id, attempts = attempt, %error, "Write abandoned");
                    let _ = shared.outcomes.send(WriteOutcome::Abandoned {
                        id: id.clone(),
                        error,
                    });
                    return Step::Done;
                }

                let delay = shared.timing.backoff * attempt;
                warn!(object_id = %id, attempt, ?delay, %error, "Write failed, retrying");
                let _ = shared.outcomes.send(WriteOutcome::Failed {
                    id: id.clone(),
                    attempt,
                    error,
                    retry_in: Some(delay),
                });
                Step::Retry(delay, patch)
            }
        }
    }

    /// Fold mutations queued during the backoff into the retried patch.
    fn before_retry(shared: &Arc<Self>, id: &ObjectId, patch: ObjectPatch) -> Option<ObjectPatch> {
        let mut state = shared.state.lock();
        if state.closed {
            return None;
        }
        let entry = state.entries.get_mut(id)?;
        match entry.pending.take() {
            Some(newer) => {
                entry.attempts = 0;
                Some(patch.merged(newer))
            }
            None => Some(patch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use canvas_core::{ObjectDraft, UserId};

    fn config(debounce: u64, min_interval: u64) -> SyncConfig {
        SyncConfig::builder()
            .write_debounce(debounce)
            .min_write_interval(min_interval)
            .build()
    }

    fn seeded() -> (Arc<MemoryStore>, ObjectId) {
        let store = Arc::new(MemoryStore::new());
        let id = ObjectId::new("r1");
        store.seed(ObjectDraft::rectangle(0.0, 0.0, 100.0, 80.0).into_object(
            id.clone(),
            UserId::new("alice"),
            0,
        ));
        (store, id)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<WriteOutcome>) -> Vec<WriteOutcome> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_coalesced() {
        let (store, id) = seeded();
        let (throttler, mut rx) = WriteThrottler::new(store.clone(), &config(100, 16));

        for x in 1..=5 {
            throttler.enqueue(id.clone(), ObjectPatch::new().with_x(x as f64));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.update_attempts(&id).is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(
            store.applied_updates(&id),
            vec![ObjectPatch::new().with_x(5.0)]
        );
        assert_eq!(
            drain(&mut rx),
            vec![WriteOutcome::Written {
                id: id.clone(),
                settled: true
            }]
        );
        assert!(!throttler.has_pending(&id));
        assert_eq!(throttler.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_settled_objects_are_forgotten() {
        let (store, id) = seeded();
        let (throttler, _rx) = WriteThrottler::new(store.clone(), &config(10, 100));

        throttler.enqueue(id.clone(), ObjectPatch::new().with_x(1.0));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(store.update_attempts(&id).len(), 1);

        // Still spacing writes: the next one waits for the interval
        assert_eq!(throttler.tracked(), 1);
        throttler.enqueue(id.clone(), ObjectPatch::new().with_x(2.0));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(store.update_attempts(&id).len(), 1);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(store.update_attempts(&id).len(), 2);
        assert_eq!(throttler.tracked(), 0);
        assert!(!throttler.has_pending(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_min_interval_between_writes() {
        let (store, id) = seeded();
        let (throttler, _rx) = WriteThrottler::new(store.clone(), &config(10, 100));

        throttler.enqueue(id.clone(), ObjectPatch::new().with_x(1.0));
        tokio::time::sleep(Duration::from_millis(20)).await;
        throttler.enqueue(id.clone(), ObjectPatch::new().with_x(2.0));
        tokio::time::sleep(Duration::from_millis(300)).await;

        let attempts = store.update_attempts(&id);
        assert_eq!(attempts.len(), 2);
        assert!(attempts[1].at - attempts[0].at >= 100);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let (store, id) = seeded();
        let (throttler, mut rx) = WriteThrottler::new(store.clone(), &config(100, 50));
        store.set_failing(true);

        throttler.enqueue(id.clone(), ObjectPatch::new().with_x(1.0));
        tokio::time::sleep(Duration::from_secs(10)).await;

        let attempts = store.update_attempts(&id);
        assert_eq!(attempts.len(), 4);
        let gaps: Vec<u64> = attempts.windows(2).map(|w| w[1].at - w[0].at).collect();
        assert!(gaps.windows(2).all(|g| g[1] > g[0]), "gaps: {:?}", gaps);

        let outcomes = drain(&mut rx);
        assert_eq!(outcomes.len(), 4);
        assert!(matches!(
            outcomes.last(),
            Some(WriteOutcome::Abandoned { .. })
        ));
        assert!(!throttler.has_pending(&id));
    }

    #[tokio::test(start_paused = true)]
    async fn test_newer_mutation_folds_into_retry() {
        let (store, id) = seeded();
        let (throttler, _rx) = WriteThrottler::new(store.clone(), &config(100, 50));
        store.fail_next_writes(1);

        throttler.enqueue(id.clone(), ObjectPatch::new().with_x(1.0));
        tokio::time::sleep(Duration::from_millis(200)).await;
        throttler.enqueue(id.clone(), ObjectPatch::new().with_y(2.0));
        tokio::time::sleep(Duration::from_secs(3)).await;

        assert_eq!(
            store.applied_updates(&id),
            vec![ObjectPatch::new().with_x(1.0).with_y(2.0)]
        );
        let object = store.object(&id).unwrap();
        assert_eq!((object.x, object.y), (1.0, 2.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_pending_takes_queued_patches() {
        let (store, id) = seeded();
        let (throttler, _rx) = WriteThrottler::new(store.clone(), &config(100, 50));

        throttler.enqueue(id.clone(), ObjectPatch::new().with_x(1.0));
        throttler.enqueue(id.clone(), ObjectPatch::new().with_y(2.0));
        let drained = throttler.drain_pending();
        assert_eq!(
            drained,
            vec![(id.clone(), ObjectPatch::new().with_x(1.0).with_y(2.0))]
        );
        assert!(!throttler.has_pending(&id));
        assert_eq!(throttler.tracked(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.update_attempts(&id).is_empty());
        assert!(throttler.drain_pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_shutdown() {
        let (store, id) = seeded();
        let (throttler, _rx) = WriteThrottler::new(store.clone(), &config(100, 50));

        throttler.enqueue(id.clone(), ObjectPatch::new().with_x(1.0));
        throttler.cancel(&id);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.update_attempts(&id).is_empty());

        throttler.shutdown();
        throttler.enqueue(id.clone(), ObjectPatch::new().with_x(2.0));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(store.update_attempts(&id).is_empty());
        assert_eq!(throttler.in_flight(), 0);
    }
}

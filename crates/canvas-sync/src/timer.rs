//! Keyed, cancellable background tasks.
//!
//! Each key owns at most one task. Arming a key aborts whatever task it held
//! before. A task that fires must call [`KeyedTasks::settle`] with the
//! generation it was armed with: a stale generation means it was replaced and
//! must do nothing.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Slot {
    generation: u64,
    handle: JoinHandle<()>,
}

pub(crate) struct KeyedTasks<K> {
    next_generation: u64,
    slots: HashMap<K, Slot>,
}

impl<K: Eq + Hash> KeyedTasks<K> {
    pub(crate) fn new() -> Self {
        Self {
            next_generation: 0,
            slots: HashMap::new(),
        }
    }

    /// Arm `key`. `spawn` receives the generation token of the new task.
    pub(crate) fn arm<F>(&mut self, key: K, spawn: F)
    where
        F: FnOnce(u64) -> JoinHandle<()>,
    {
        self.next_generation += 1;
        let generation = self.next_generation;
        let handle = spawn(generation);
        if let Some(previous) = self.slots.insert(key, Slot { generation, handle }) {
            previous.handle.abort();
        }
    }

    /// Release the slot of a task that is running to completion. Returns
    /// false if the task has been replaced or cancelled.
    pub(crate) fn settle(&mut self, key: &K, generation: u64) -> bool {
        match self.slots.get(key) {
            Some(slot) if slot.generation == generation => {
                self.slots.remove(key);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn cancel(&mut self, key: &K) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                slot.handle.abort();
                true
            }
            None => false,
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.handle.abort();
        }
    }

    pub(crate) fn is_armed(&self, key: &K) -> bool {
        self.slots.contains_key(key)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }
}

impl<K> Drop for KeyedTasks<K> {
    fn drop(&mut self) {
        for (_, slot) in self.slots.drain() {
            slot.handle.abort();
        }
    }
}

/// Spawn `work` after `delay`.
pub(crate) fn spawn_after<F>(delay: Duration, work: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        work.await;
    })
}

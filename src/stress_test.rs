use async_stream::stream;
use canvas_sync::memory::WriteOp;
use canvas_sync::{
    MemoryStore, ObjectDraft, ObjectId, ObjectPatch, StoreEvent, SyncConfig,
    SynchronizedObjectStore, UserIdentity,
};
use colored::*;
use futures::stream::Stream;
use futures::stream::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

type Client = Arc<SynchronizedObjectStore<MemoryStore>>;

/// Parameters of a simulated drag session
#[derive(Clone, Debug)]
pub struct StressConfig {
    pub clients: usize,
    pub objects: usize,
    pub drags_per_client: usize,
    pub steps_per_drag: usize,
    pub step_interval_ms: u64,
    pub seed: Option<u64>,
}

/// Statistics collected during stress testing
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub clients: usize,
    pub objects: usize,
    pub drags: usize,
    pub lock_conflicts: usize,
    pub mutations: usize,
    pub update_writes: usize,
    pub failed_writes: usize,
    pub lock_writes: usize,
    pub total_time: Duration,
    pub converged: bool,
}

impl StressTestStats {
    /// Local mutations per remote update write.
    pub fn coalescing_ratio(&self) -> f64 {
        if self.update_writes == 0 {
            0.0
        } else {
            self.mutations as f64 / self.update_writes as f64
        }
    }

    pub fn print(&self) {
        let converged = if self.converged {
            "yes".green().bold()
        } else {
            "NO".red().bold()
        };
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Drag Session Statistics                       ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Clients:                   {:>30} ║", self.clients);
        println!("║  Objects:                   {:>30} ║", self.objects);
        println!("║  Drag Gestures:             {:>30} ║", self.drags);
        println!("║  Lock Conflicts:            {:>30} ║", self.lock_conflicts);
        println!("║  Local Mutations:           {:>30} ║", self.mutations);
        println!("║  Remote Update Writes:      {:>30} ║", self.update_writes);
        println!("║  Failed Writes:             {:>30} ║", self.failed_writes);
        println!("║  Lock Writes:               {:>30} ║", self.lock_writes);
        println!("║  Mutations per Write:       {:>30.2} ║", self.coalescing_ratio());
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("╚════════════════════════════════════════════════════════════╝");
        println!("  Converged: {}", converged);
    }

    pub fn to_json(&self) -> serde_json::Value {
        json!({
            "clients": self.clients,
            "objects": self.objects,
            "drags": self.drags,
            "lockConflicts": self.lock_conflicts,
            "mutations": self.mutations,
            "updateWrites": self.update_writes,
            "failedWrites": self.failed_writes,
            "lockWrites": self.lock_writes,
            "coalescingRatio": self.coalescing_ratio(),
            "totalTimeMs": self.total_time.as_millis() as u64,
            "converged": self.converged,
        })
    }
}

/// One drag gesture: which object, and the offset applied per pointer move.
#[derive(Clone, Copy, Debug)]
struct Gesture {
    object: usize,
    dx: f64,
    dy: f64,
}

/// Generator that yields drag gestures for one client
fn gesture_generator(mut rng: StdRng, objects: usize, drags: usize) -> impl Stream<Item = Gesture> {
    stream! {
        for _ in 0..drags {
            yield Gesture {
                object: rng.gen_range(0..objects),
                dx: rng.gen_range(-8.0..8.0),
                dy: rng.gen_range(-8.0..8.0),
            };
        }
    }
}

fn open_client(remote: &Arc<MemoryStore>, index: usize, config: &SyncConfig) -> Client {
    let user = UserIdentity::new(format!("client-{}", index), format!("Client {}", index));
    Arc::new(SynchronizedObjectStore::open(
        remote.clone(),
        user,
        config.clone(),
    ))
}

/// Drag one object through `steps` pointer moves while holding its lock.
///
/// Returns the number of mutations applied, or `None` if another client
/// held the lock.
async fn perform_drag(client: &Client, id: &ObjectId, gesture: Gesture, steps: usize, interval: Duration) -> Option<usize> {
    if !client.lock(id).await {
        return None;
    }

    let mut applied = 0;
    for _ in 0..steps {
        let Some(current) = client.object(id) else {
            break;
        };
        let patch = ObjectPatch::position(current.x + gesture.dx, current.y + gesture.dy);
        if client.update(id, patch) {
            applied += 1;
        }
        tokio::time::sleep(interval).await;
    }

    client.unlock(id).await;
    Some(applied)
}

/// Whether every client shows the remote position of every object.
fn clients_agree(remote: &MemoryStore, clients: &[Client]) -> bool {
    let stored = remote.objects();
    clients.iter().all(|client| {
        client.len() == stored.len()
            && stored.iter().all(|expected| {
                client
                    .object(&expected.id)
                    .is_some_and(|local| local.x == expected.x && local.y == expected.y)
            })
    })
}

/// Concurrent drag sessions from several clients over one memory store
pub async fn run_stress_test(config: &StressConfig) -> StressTestStats {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Canvas Drag Stress Test                             ║");
    println!("║  Clients: {} | Objects: {} | Drags/Client: {} | Steps: {} ║",
             config.clients, config.objects, config.drags_per_client, config.steps_per_drag);
    println!("╚════════════════════════════════════════════════════════════╝");

    let sync_config = SyncConfig::from_env();
    let remote = Arc::new(MemoryStore::new());
    let clients: Vec<Client> = (0..config.clients.max(1))
        .map(|index| open_client(&remote, index, &sync_config))
        .collect();

    println!("\n[Phase 1/3] Creating objects...");
    let mut ids = Vec::with_capacity(config.objects);
    for i in 0..config.objects {
        let draft = if i % 2 == 0 {
            ObjectDraft::rectangle(i as f64 * 150.0, 0.0, 120.0, 80.0)
        } else {
            ObjectDraft::circle(i as f64 * 150.0, 200.0, 50.0)
        };
        match clients[0].create(draft).await {
            Some(id) => ids.push(id),
            None => warn!(index = i, "Failed to create object"),
        }
    }
    tokio::time::sleep(sync_config.create_settle() * 2).await;
    println!("[Phase 1/3] ✓ Created {} objects", ids.len());

    println!("[Phase 2/3] Dragging...");
    let start = Instant::now();
    let ids = Arc::new(ids);
    let mutations = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));
    let base_seed = config.seed.unwrap_or_else(|| StdRng::from_entropy().gen());
    let interval = Duration::from_millis(config.step_interval_ms);

    let mut handles = vec![];
    for (index, client) in clients.iter().enumerate() {
        let client = Arc::clone(client);
        let ids = Arc::clone(&ids);
        let mutations = Arc::clone(&mutations);
        let conflicts = Arc::clone(&conflicts);
        let steps = config.steps_per_drag;
        let drags = config.drags_per_client;
        let handle = tokio::spawn(async move {
            if ids.is_empty() {
                return;
            }
            let rng = StdRng::seed_from_u64(base_seed.wrapping_add(index as u64));
            let mut gestures = Box::pin(gesture_generator(rng, ids.len(), drags));
            while let Some(gesture) = gestures.next().await {
                let id = &ids[gesture.object];
                match perform_drag(&client, id, gesture, steps, interval).await {
                    Some(applied) => {
                        mutations.fetch_add(applied, Ordering::Relaxed);
                    }
                    None => {
                        conflicts.fetch_add(1, Ordering::Relaxed);
                        tokio::task::yield_now().await;
                    }
                }
            }
        });
        handles.push(handle);
    }

    for handle in handles {
        let _ = handle.await;
    }
    let total_time = start.elapsed();
    println!("[Phase 2/3] ✓ Completed");

    println!("[Phase 3/3] Waiting for convergence...");
    tokio::time::sleep(sync_config.write_debounce() * 3 + Duration::from_millis(200)).await;
    for client in &clients {
        for id in ids.iter() {
            client.end_local_edit(id);
        }
    }
    // Every client now takes the next snapshot verbatim
    remote.inject_snapshot(remote.objects());
    tokio::time::sleep(Duration::from_millis(50)).await;
    let converged = clients_agree(&remote, &clients);
    println!("[Phase 3/3] ✓ Completed");

    let writes = remote.writes();
    let update_writes = writes
        .iter()
        .filter(|w| matches!(w.op, WriteOp::Update(_)))
        .count();
    let failed_writes = writes.iter().filter(|w| !w.ok).count();
    let lock_writes = writes
        .iter()
        .filter(|w| matches!(w.op, WriteOp::PutLock(_) | WriteOp::DeleteLock))
        .count();

    for client in &clients {
        client.sign_out().await;
    }

    let stats = StressTestStats {
        clients: clients.len(),
        objects: ids.len(),
        drags: clients.len() * config.drags_per_client,
        lock_conflicts: conflicts.load(Ordering::Relaxed),
        mutations: mutations.load(Ordering::Relaxed),
        update_writes,
        failed_writes,
        lock_writes,
        total_time,
        converged,
    };
    info!(
        mutations = stats.mutations,
        writes = stats.update_writes,
        converged,
        "Stress test finished"
    );
    stats
}

fn describe(label: &str, client: &Client, id: &ObjectId) {
    match client.object(id) {
        Some(object) => {
            let holder = object
                .lock
                .as_ref()
                .map(|lock| lock.user_name.clone())
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {:<8} at ({:>7.1}, {:>7.1})  status: {:?}  lock: {}",
                label.bold(),
                object.x,
                object.y,
                object.sync_status,
                holder
            );
        }
        None => println!("  {:<8} {}", label.bold(), "(not visible)".dimmed()),
    }
}

/// Two clients sharing a canvas
pub async fn run_demo() {
    let config = SyncConfig::from_env();
    let remote = Arc::new(MemoryStore::new());
    let alice = Arc::new(SynchronizedObjectStore::open(
        remote.clone(),
        UserIdentity::new("alice", "Alice"),
        config.clone(),
    ));
    let bob = Arc::new(SynchronizedObjectStore::open(
        remote.clone(),
        UserIdentity::new("bob", "Bob"),
        config.clone(),
    ));
    let mut bob_events = bob.subscribe();

    println!("\n{}", "1. Alice creates a rectangle".yellow());
    let Some(id) = alice
        .create(ObjectDraft::rectangle(100.0, 100.0, 200.0, 120.0).with_fill("#4ECDC4"))
        .await
    else {
        println!("{}", "create failed".red());
        return;
    };
    tokio::time::sleep(config.create_settle() * 2).await;
    describe("alice", &alice, &id);
    describe("bob", &bob, &id);

    println!("\n{}", "2. Alice drags it through 30 pointer moves".yellow());
    let writes_before = remote.update_attempts(&id).len();
    if alice.lock(&id).await {
        for step in 1..=30 {
            alice.update(&id, ObjectPatch::position(100.0 + step as f64 * 5.0, 100.0));
            tokio::time::sleep(Duration::from_millis(16)).await;
        }
    }
    tokio::time::sleep(config.write_debounce() * 2).await;
    let writes = remote.update_attempts(&id).len() - writes_before;
    println!("  30 local moves became {} remote writes", writes.to_string().green().bold());
    describe("alice", &alice, &id);
    describe("bob", &bob, &id);

    println!("\n{}", "3. Bob tries to grab the same rectangle".yellow());
    tokio::time::sleep(Duration::from_millis(50)).await;
    if bob.lock(&id).await {
        println!("  bob acquired the lock");
        bob.unlock(&id).await;
    } else {
        let owner = bob
            .lock_owner(&id)
            .map(|owner| owner.to_string())
            .unwrap_or_default();
        println!("  bob was refused: locked by {}", owner.cyan());
    }

    println!("\n{}", "4. Alice lets go; the lock goes idle and is released".yellow());
    alice.unlock(&id).await;
    tokio::time::sleep(config.lock_idle_countdown() + Duration::from_millis(200)).await;
    println!("  lock state seen by bob: {:?}", bob.lock_state(&id));

    println!("\n{}", "5. Bob moves it".yellow());
    if bob.lock(&id).await {
        bob.update(&id, ObjectPatch::position(400.0, 300.0));
        bob.unlock(&id).await;
    }
    tokio::time::sleep(config.write_debounce() * 3).await;
    describe("alice", &alice, &id);
    describe("bob", &bob, &id);

    let mut reconciled = 0;
    while let Ok(event) = bob_events.try_recv() {
        if matches!(event, StoreEvent::Reconciled { .. }) {
            reconciled += 1;
        }
    }
    println!("\n  bob reconciled {} snapshots", reconciled);

    alice.sign_out().await;
    bob.sign_out().await;
    println!("\n{}", "✓ Demo completed".green().bold());
}

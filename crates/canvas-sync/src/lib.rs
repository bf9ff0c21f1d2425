//! Canvas Sync - optimistic synchronization engine for the collaborative canvas
//!
//! Keeps a client's view of the shared objects responsive and eventually
//! consistent while a remote document store is the only channel to other
//! clients.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use canvas_sync::prelude::*;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let remote = Arc::new(MemoryStore::new());
//!     let user = UserIdentity::new("user-1", "Alice");
//!     let store = SynchronizedObjectStore::open(remote, user, SyncConfig::default());
//!
//!     // Create a rectangle and drag it
//!     let id = store
//!         .create(ObjectDraft::rectangle(100.0, 100.0, 200.0, 120.0))
//!         .await
//!         .expect("create failed");
//!     store.lock(&id).await;
//!     for step in 1..=10 {
//!         store.update(&id, ObjectPatch::position(100.0 + step as f64, 100.0));
//!     }
//!     store.unlock(&id).await;
//! }
//! ```
//!
//! # Architecture
//!
//! - [`store`] - The composition root: local object list, mutation entry points
//! - [`throttle`] - Per-object write coalescing with bounded retry
//! - [`locks`] - Advisory per-object locks and the stale-lock sweep
//! - [`active_edit`] - Objects excluded from snapshot-driven overwrite
//! - [`remote`] - Remote store abstraction
//! - [`memory`] - In-memory remote store for tests and simulation
//! - [`config`] - Timing configuration
//! - [`clock`] - Wall-clock sources
//! - [`error`] - Error types

pub mod active_edit;
pub mod clock;
pub mod config;
pub mod error;
pub mod locks;
pub mod memory;
pub mod remote;
pub mod store;
pub mod throttle;
mod timer;

// Re-exports for convenience
pub use active_edit::ActiveEditTracker;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{SyncConfig, SyncConfigBuilder};
pub use error::{ErrorState, Result, SyncError};
pub use locks::{LockEvent, LockManager};
pub use memory::{MemoryStore, WriteOp, WriteRecord};
pub use remote::{LockSnapshot, ObjectSnapshot, RemoteError, RemoteStore, Subscription};
pub use store::{StoreEvent, SynchronizedObjectStore};
pub use throttle::{WriteOutcome, WriteThrottler};

// Re-export the object model
pub use canvas_core::{
    GeometryLimits, LockAnnotation, LockRecord, LockState, ObjectDraft, ObjectId, ObjectKind,
    ObjectPatch, SharedObject, SyncStatus, UserId, UserIdentity,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::config::SyncConfig;
    pub use crate::memory::MemoryStore;
    pub use crate::remote::RemoteStore;
    pub use crate::store::{StoreEvent, SynchronizedObjectStore};
    pub use canvas_core::{ObjectDraft, ObjectId, ObjectPatch, SharedObject, UserIdentity};
}

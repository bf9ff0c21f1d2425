// File: `crates/canvas-core/src/lib.rs`
//! Canvas Core - the shared object model of the collaborative canvas.
//!
//! Everything in this crate is synchronous and free of I/O:
//!
//! - [`object`] - shared objects, drafts and partial updates
//! - [`lock`] - advisory lock records and their state machine states
//! - [`limits`] - world bounds and size thresholds enforced on mutation
//! - [`reconcile`] - merging remote snapshots with locally-edited objects
//! - [`user`] - user identity and deterministic user colours

pub mod error;
pub mod id;
pub mod limits;
pub mod lock;
pub mod object;
pub mod reconcile;
pub mod user;

pub use error::{ModelError, Result};
pub use id::{ObjectId, UserId};
pub use limits::GeometryLimits;
pub use lock::{LockRecord, LockState};
pub use object::{
    Geometry, LockAnnotation, ObjectDraft, ObjectKind, ObjectPatch, SharedObject, SyncStatus,
    Timestamp,
};
pub use reconcile::{reconcile, removed_ids};
pub use user::{user_color, UserIdentity, COLOR_PALETTE};

//! Remote store abstraction.
//!
//! The store holds two collections: the shared objects, and one advisory
//! lock record per object. Both are observed through push subscriptions
//! that deliver complete snapshots.

use async_trait::async_trait;
use canvas_core::{LockRecord, ObjectDraft, ObjectId, ObjectPatch, SharedObject, UserId};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc;

/// Remote store error type.
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Document not found: {0}")]
    NotFound(ObjectId),

    #[error("Write rejected: {0}")]
    Rejected(String),

    #[error("Request timed out")]
    Timeout,
}

/// Every object in the collection, ordered by creation time.
pub type ObjectSnapshot = Vec<SharedObject>;

/// Every lock record, keyed by object id.
pub type LockSnapshot = HashMap<ObjectId, LockRecord>;

/// Push subscription. Each message is a full snapshot or a listener error.
pub type Subscription<T> = mpsc::UnboundedReceiver<Result<T, RemoteError>>;

/// Abstract remote store.
#[async_trait]
pub trait RemoteStore: Send + Sync + 'static {
    /// Create an object. The store assigns the id and timestamps.
    async fn insert_object(
        &self,
        draft: ObjectDraft,
        created_by: &UserId,
    ) -> Result<SharedObject, RemoteError>;

    /// Merge a partial update into an existing object.
    async fn update_object(&self, id: &ObjectId, patch: &ObjectPatch) -> Result<(), RemoteError>;

    async fn delete_object(&self, id: &ObjectId) -> Result<(), RemoteError>;

    /// Subscribe to the object collection. The current snapshot is
    /// delivered first.
    fn subscribe_objects(&self) -> Subscription<ObjectSnapshot>;

    /// Create or overwrite the lock record for `lock.shape_id`.
    async fn put_lock(&self, lock: &LockRecord) -> Result<(), RemoteError>;

    async fn delete_lock(&self, id: &ObjectId) -> Result<(), RemoteError>;

    /// Subscribe to the lock collection. The current snapshot is delivered
    /// first.
    fn subscribe_locks(&self) -> Subscription<LockSnapshot>;
}

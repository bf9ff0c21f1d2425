//! Error types for the synchronization engine.

use crate::remote::RemoteError;
use canvas_core::{ModelError, ObjectId, UserId};
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;

/// Errors surfaced by sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Object not found: {0}")]
    ObjectNotFound(ObjectId),

    #[error("Object {id} is locked by {owner}")]
    LockedBy { id: ObjectId, owner: UserId },

    #[error("Invalid object: {0}")]
    Model(#[from] ModelError),

    #[error("Store has been shut down")]
    Closed,
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// The single user-facing error message of a session.
///
/// Components write into it when an operation fails after its retries are
/// spent; the host renders it with a retry affordance.
#[derive(Clone, Debug, Default)]
pub struct ErrorState {
    message: Arc<RwLock<Option<String>>>,
}

impl ErrorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, message: impl Into<String>) {
        *self.message.write() = Some(message.into());
    }

    pub fn clear(&self) {
        *self.message.write() = None;
    }

    /// Clear the message only if it is exactly `message`.
    pub fn clear_if(&self, message: &str) -> bool {
        let mut current = self.message.write();
        if current.as_deref() == Some(message) {
            *current = None;
            true
        } else {
            false
        }
    }

    pub fn get(&self) -> Option<String> {
        self.message.read().clone()
    }

    pub fn is_set(&self) -> bool {
        self.message.read().is_some()
    }
}

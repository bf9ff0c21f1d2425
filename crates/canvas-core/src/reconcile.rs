//! Snapshot reconciliation.
//!
//! A snapshot is authoritative for every object except those the local user
//! is actively editing: for those, the local copy is kept so that a snapshot
//! that has not caught up with an in-flight drag cannot snap the object back.
//! Deletions are never suppressed.

use crate::id::ObjectId;
use crate::object::SharedObject;
use std::collections::{HashMap, HashSet};

/// Merge an incoming snapshot with the previous local list.
///
/// The result follows snapshot order. Objects missing from the snapshot are
/// dropped regardless of edit status.
pub fn reconcile(
    snapshot: Vec<SharedObject>,
    active: &HashSet<ObjectId>,
    previous: &[SharedObject],
) -> Vec<SharedObject> {
    if active.is_empty() {
        return snapshot;
    }

    let local: HashMap<&ObjectId, &SharedObject> = previous
        .iter()
        .filter(|obj| active.contains(&obj.id))
        .map(|obj| (&obj.id, obj))
        .collect();

    snapshot
        .into_iter()
        .map(|remote| match local.get(&remote.id) {
            Some(kept) => (*kept).clone(),
            None => remote,
        })
        .collect()
}

/// Ids present in `previous` but absent from `snapshot`.
pub fn removed_ids(previous: &[SharedObject], snapshot: &[SharedObject]) -> Vec<ObjectId> {
    let present: HashSet<&ObjectId> = snapshot.iter().map(|obj| &obj.id).collect();
    previous
        .iter()
        .filter(|obj| !present.contains(&obj.id))
        .map(|obj| obj.id.clone())
        .collect()
}

//! Property-based tests for snapshot reconciliation
//!
//! These tests verify the guarantees the synchronization engine relies on:
//!  - No flicker: an actively-edited object keeps its local value
//!  - Convergence: without active edits the snapshot is taken verbatim
//!  - Delete dominance: nothing absent from the snapshot survives
//!  - Order: the result follows snapshot order

use canvas_core::{
    reconcile, removed_ids, ObjectDraft, ObjectId, ObjectPatch, SharedObject, SyncStatus, UserId,
};
use proptest::prelude::*;
use std::collections::HashSet;

/// Generate strategies for prop-testing

fn object(id: u8, x: f64, y: f64) -> SharedObject {
    ObjectDraft::rectangle(x, y, 100.0, 80.0).into_object(
        ObjectId::new(format!("obj-{}", id)),
        UserId::new("alice"),
        id as u64,
    )
}

fn objects_strategy() -> impl Strategy<Value = Vec<SharedObject>> {
    prop::collection::btree_map(0u8..40, (-500.0f64..500.0, -500.0f64..500.0), 0..20).prop_map(
        |entries| {
            entries
                .into_iter()
                .map(|(id, (x, y))| object(id, x, y))
                .collect()
        },
    )
}

/// Previous local list: a subset of the snapshot's ids with locally-moved
/// copies, plus some ids the snapshot no longer has.
fn scenario_strategy(
) -> impl Strategy<Value = (Vec<SharedObject>, Vec<SharedObject>, HashSet<ObjectId>)> {
    (objects_strategy(), objects_strategy(), any::<u64>()).prop_map(
        |(snapshot, extra, seed)| {
            let mut previous: Vec<SharedObject> = snapshot
                .iter()
                .enumerate()
                .filter(|(i, _)| seed & (1u64 << (i % 64)) != 0)
                .map(|(_, obj)| {
                    let mut local = obj.patched(&ObjectPatch::new().with_x(obj.x + 7.0));
                    local.sync_status = Some(SyncStatus::Pending);
                    local
                })
                .collect();
            let snapshot_ids: HashSet<_> = snapshot.iter().map(|o| o.id.clone()).collect();
            previous.extend(extra.into_iter().filter(|o| !snapshot_ids.contains(&o.id)));

            let active = previous
                .iter()
                .enumerate()
                .filter(|(i, _)| seed.rotate_left(17) & (1u64 << (i % 64)) != 0)
                .map(|(_, obj)| obj.id.clone())
                .collect();

            (snapshot, previous, active)
        },
    )
}

// ============================================================================
// Reconciliation Properties
// ============================================================================

proptest! {
    #[test]
    fn active_edits_are_never_regressed(
        (snapshot, previous, active) in scenario_strategy()
    ) {
        let snapshot_ids: HashSet<_> = snapshot.iter().map(|o| o.id.clone()).collect();
        let merged = reconcile(snapshot, &active, &previous);

        for local in previous.iter().filter(|o| active.contains(&o.id)) {
            if snapshot_ids.contains(&local.id) {
                let kept = merged.iter().find(|o| o.id == local.id).unwrap();
                prop_assert_eq!(kept, local);
            }
        }
    }

    #[test]
    fn snapshot_is_authoritative_without_active_edits(
        (snapshot, previous, _active) in scenario_strategy()
    ) {
        let merged = reconcile(snapshot.clone(), &HashSet::new(), &previous);
        prop_assert_eq!(merged, snapshot);
    }

    #[test]
    fn inactive_objects_take_snapshot_value(
        (snapshot, previous, active) in scenario_strategy()
    ) {
        let merged = reconcile(snapshot.clone(), &active, &previous);

        for (remote, out) in snapshot.iter().zip(merged.iter()) {
            if !active.contains(&remote.id) {
                prop_assert_eq!(out, remote);
            }
        }
    }

    #[test]
    fn deletes_dominate_active_edits(
        (snapshot, previous, active) in scenario_strategy()
    ) {
        let removed = removed_ids(&previous, &snapshot);
        let merged = reconcile(snapshot, &active, &previous);

        for id in removed {
            prop_assert!(merged.iter().all(|o| o.id != id));
        }
    }

    #[test]
    fn result_follows_snapshot_order(
        (snapshot, previous, active) in scenario_strategy()
    ) {
        let expected: Vec<_> = snapshot.iter().map(|o| o.id.clone()).collect();
        let merged = reconcile(snapshot, &active, &previous);
        let actual: Vec<_> = merged.iter().map(|o| o.id.clone()).collect();
        prop_assert_eq!(actual, expected);
    }
}

//! Property tests for ownership, neighbors, and the holder-set invariants
//! that rebalancing relies on, exercised on small rings where the edge cases
//! live.

use std::collections::BTreeSet;

use cluster_ring::{Ring, WorkerNode};
use proptest::prelude::*;

fn node(id: u16) -> WorkerNode {
    WorkerNode {
        id: format!("{:04x}", id),
        addr: format!("127.0.0.1:{}", 7000 + (id % 1000)),
        last_seen: 0.0,
    }
}

fn ring_of(ids: &BTreeSet<u16>) -> Ring {
    let mut ring = Ring::new();
    for id in ids {
        ring.upsert(node(*id));
    }
    ring
}

fn expected_holder_count(n: usize) -> usize {
    match n {
        0 => 0,
        1 => 1,
        2 => 2,
        _ => 3,
    }
}

proptest! {
    #[test]
    fn insertion_order_does_not_affect_ownership(
        ids in prop::collection::btree_set(any::<u16>(), 1..8),
        key in any::<u16>(),
    ) {
        let key = format!("{:04x}", key);
        let forward = ring_of(&ids);
        let mut reversed = Ring::new();
        for id in ids.iter().rev() {
            reversed.upsert(node(*id));
        }
        prop_assert_eq!(
            forward.owner_of(&key).map(|n| n.id.clone()),
            reversed.owner_of(&key).map(|n| n.id.clone())
        );
    }

    #[test]
    fn owner_is_always_a_member(
        ids in prop::collection::btree_set(any::<u16>(), 1..8),
        key in any::<u16>(),
    ) {
        let key = format!("{:04x}", key);
        let ring = ring_of(&ids);
        let owner = ring.owner_of(&key).expect("non-empty ring has an owner");
        prop_assert!(ring.contains(&owner.id));
    }

    #[test]
    fn holder_set_is_owner_led_distinct_and_sized(
        ids in prop::collection::btree_set(any::<u16>(), 1..8),
        key in any::<u16>(),
    ) {
        let key = format!("{:04x}", key);
        let ring = ring_of(&ids);
        let holders = ring.replica_holders(&key);

        prop_assert_eq!(holders.len(), expected_holder_count(ids.len()));
        prop_assert_eq!(&holders[0], &ring.owner_of(&key).unwrap().id);
        let distinct: BTreeSet<&String> = holders.iter().collect();
        prop_assert_eq!(distinct.len(), holders.len());
    }

    #[test]
    fn next_and_previous_neighbors_are_symmetric(
        ids in prop::collection::btree_set(any::<u16>(), 2..8),
    ) {
        let ring = ring_of(&ids);
        for member in ring.members() {
            for next in ring.neighbors_of(&member.id).next {
                let back = ring.neighbors_of(&next.id).previous;
                prop_assert!(
                    back.iter().any(|n| n.id == member.id),
                    "{} not in previous-neighbors of {}", member.id, next.id
                );
            }
        }
    }

    #[test]
    fn join_only_adds_the_new_node_to_any_holder_set(
        ids in prop::collection::btree_set(any::<u16>(), 1..8),
        joined in any::<u16>(),
        key in any::<u16>(),
    ) {
        prop_assume!(!ids.contains(&joined));
        let key = format!("{:04x}", key);

        let before = ring_of(&ids);
        let mut after = before.clone();
        after.upsert(node(joined));

        let holders_before: BTreeSet<String> =
            before.replica_holders(&key).into_iter().collect();
        let holders_after: BTreeSet<String> =
            after.replica_holders(&key).into_iter().collect();

        let joined_id = format!("{:04x}", joined);
        for holder in &holders_after {
            prop_assert!(
                holders_before.contains(holder) || *holder == joined_id,
                "holder {} appeared from nowhere on join", holder
            );
        }
    }

    #[test]
    fn some_surviving_holder_spans_any_single_failure(
        ids in prop::collection::btree_set(any::<u16>(), 2..8),
        failed_index in any::<prop::sample::Index>(),
        key in any::<u16>(),
    ) {
        let key = format!("{:04x}", key);
        let failed = *failed_index.get(&ids.iter().copied().collect::<Vec<_>>());

        let before = ring_of(&ids);
        let mut after = before.clone();
        after.remove(&format!("{:04x}", failed));

        let holders_before: BTreeSet<String> =
            before.replica_holders(&key).into_iter().collect();
        let holders_after: BTreeSet<String> =
            after.replica_holders(&key).into_iter().collect();

        // At least one pre-failure holder is still responsible afterwards,
        // so the data can always be re-pushed from a surviving replica.
        prop_assert!(
            holders_after.iter().any(|h| holders_before.contains(h)),
            "no surviving holder after failure of {:04x}", failed
        );
    }
}

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use serde::{Deserialize, Serialize};

/// One ring member as learned from its heartbeats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkerNode {
    /// Hex digest of `addr`; the ring's sort key.
    pub id: String,
    /// Address peers use to reach the node.
    pub addr: String,
    /// Timestamp of the freshest heartbeat seen, epoch seconds.
    pub last_seen: f64,
}

/// The next-N and previous-N members around one node, in ring order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Neighbors {
    pub next: Vec<WorkerNode>,
    pub previous: Vec<WorkerNode>,
}

/// Membership table sorted by node identity.
///
/// Ownership of a key is the successor rule: the first member whose identity
/// is strictly greater than the key, wrapping to the smallest identity when
/// none is. The lookup goes through `BTreeMap::range`, so it stays O(log n)
/// as the ring grows.
#[derive(Clone, Debug, Default)]
pub struct Ring {
    nodes: BTreeMap<String, WorkerNode>,
}

impl Ring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a member. Returns `true` for a new insertion; a
    /// refresh only updates the address and heartbeat timestamp.
    pub fn upsert(&mut self, node: WorkerNode) -> bool {
        match self.nodes.get_mut(&node.id) {
            Some(existing) => {
                existing.addr = node.addr;
                existing.last_seen = node.last_seen;
                false
            }
            None => {
                self.nodes.insert(node.id.clone(), node);
                true
            }
        }
    }

    /// Remove a member. Unknown identities are a no-op.
    pub fn remove(&mut self, id: &str) {
        self.nodes.remove(id);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&WorkerNode> {
        self.nodes.get(id)
    }

    /// Members in identity order.
    pub fn members(&self) -> impl Iterator<Item = &WorkerNode> {
        self.nodes.values()
    }

    /// The member owning `key` under the successor rule.
    pub fn owner_of(&self, key: &str) -> Option<&WorkerNode> {
        self.nodes
            .range::<str, _>((Excluded(key), Unbounded))
            .next()
            .or_else(|| self.nodes.iter().next())
            .map(|(_, node)| node)
    }

    /// Neighbor policy: two in each direction once the ring has more than two
    /// members, one each way at exactly two, none below that.
    fn neighbor_count(&self) -> usize {
        match self.nodes.len() {
            0 | 1 => 0,
            2 => 1,
            _ => 2,
        }
    }

    /// The next-N and previous-N members around `id`.
    ///
    /// Empty when `id` is not itself a member.
    pub fn neighbors_of(&self, id: &str) -> Neighbors {
        let count = self.neighbor_count();
        if count == 0 {
            return Neighbors::default();
        }
        let members: Vec<&WorkerNode> = self.nodes.values().collect();
        let n = members.len();
        let index = match members.binary_search_by(|node| node.id.as_str().cmp(id)) {
            Ok(index) => index,
            Err(_) => return Neighbors::default(),
        };
        Neighbors {
            next: (1..=count).map(|i| members[(index + i) % n].clone()).collect(),
            previous: (1..=count)
                .map(|i| members[(index + n - i) % n].clone())
                .collect(),
        }
    }

    /// The set of identities required to hold `key`: its owner plus the
    /// owner's next-N successors, deduplicated, owner first.
    ///
    /// Rebalancing restores exactly this invariant after every membership
    /// change, so both the join and failure paths are defined in terms of it.
    pub fn replica_holders(&self, key: &str) -> Vec<String> {
        let Some(owner) = self.owner_of(key) else {
            return Vec::new();
        };
        let mut holders = vec![owner.id.clone()];
        for neighbor in self.neighbors_of(&holders[0]).next {
            if !holders.contains(&neighbor.id) {
                holders.push(neighbor.id);
            }
        }
        holders
    }

    /// Members other than `keep` whose last heartbeat is older than
    /// `timeout` seconds before `now`.
    pub fn stale(&self, now: f64, timeout: f64, keep: &str) -> Vec<WorkerNode> {
        self.nodes
            .values()
            .filter(|node| node.id != keep && now - node.last_seen > timeout)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str) -> WorkerNode {
        WorkerNode {
            id: id.to_string(),
            addr: format!("127.0.0.1:{}", id),
            last_seen: 0.0,
        }
    }

    fn ring_of(ids: &[&str]) -> Ring {
        let mut ring = Ring::new();
        for id in ids {
            ring.upsert(node(id));
        }
        ring
    }

    #[test]
    fn upsert_distinguishes_insert_from_refresh() {
        let mut ring = Ring::new();
        assert!(ring.upsert(node("10")));
        assert!(!ring.upsert(WorkerNode {
            last_seen: 42.0,
            ..node("10")
        }));
        assert_eq!(ring.len(), 1);
        assert_eq!(ring.get("10").unwrap().last_seen, 42.0);
    }

    #[test]
    fn remove_of_unknown_identity_is_a_noop() {
        let mut ring = ring_of(&["10"]);
        ring.remove("99");
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn successor_rule_with_wraparound() {
        let ring = ring_of(&["10", "50", "90"]);
        assert_eq!(ring.owner_of("30").unwrap().id, "50");
        assert_eq!(ring.owner_of("95").unwrap().id, "10");
        assert_eq!(ring.owner_of("05").unwrap().id, "10");
        // Strictly greater: a key equal to an identity wraps past it.
        assert_eq!(ring.owner_of("50").unwrap().id, "90");
    }

    #[test]
    fn owner_of_empty_ring_is_none() {
        assert!(Ring::new().owner_of("anything").is_none());
    }

    #[test]
    fn neighbor_counts_follow_ring_size() {
        assert_eq!(ring_of(&["10"]).neighbors_of("10"), Neighbors::default());

        let two = ring_of(&["10", "50"]);
        let neighbors = two.neighbors_of("10");
        assert_eq!(neighbors.next.len(), 1);
        assert_eq!(neighbors.previous.len(), 1);
        assert_eq!(neighbors.next[0].id, "50");
        assert_eq!(neighbors.previous[0].id, "50");

        let four = ring_of(&["10", "30", "50", "90"]);
        let neighbors = four.neighbors_of("30");
        assert_eq!(neighbors.next.len(), 2);
        assert_eq!(neighbors.previous.len(), 2);
        assert_eq!(neighbors.next[0].id, "50");
        assert_eq!(neighbors.next[1].id, "90");
        assert_eq!(neighbors.previous[0].id, "10");
        assert_eq!(neighbors.previous[1].id, "90");
    }

    #[test]
    fn neighbors_of_non_member_are_empty() {
        let ring = ring_of(&["10", "50", "90"]);
        assert_eq!(ring.neighbors_of("42"), Neighbors::default());
    }

    #[test]
    fn replica_holders_start_at_the_owner() {
        let ring = ring_of(&["10", "30", "50", "90"]);
        assert_eq!(ring.replica_holders("20"), vec!["30", "50", "90"]);
        // Wraparound: keys beyond the highest identity belong to the lowest.
        assert_eq!(ring.replica_holders("95"), vec!["10", "30", "50"]);
    }

    #[test]
    fn replica_holders_deduplicate_on_small_rings() {
        assert_eq!(ring_of(&["10"]).replica_holders("x"), vec!["10"]);
        assert_eq!(ring_of(&["10", "50"]).replica_holders("20"), vec!["50", "10"]);
        let three = ring_of(&["10", "50", "90"]);
        assert_eq!(three.replica_holders("20"), vec!["50", "90", "10"]);
    }

    #[test]
    fn stale_scan_skips_the_caller_and_fresh_members() {
        let mut ring = Ring::new();
        ring.upsert(WorkerNode {
            last_seen: 100.0,
            ..node("10")
        });
        ring.upsert(WorkerNode {
            last_seen: 90.0,
            ..node("50")
        });
        ring.upsert(WorkerNode {
            last_seen: 99.0,
            ..node("90")
        });

        let stale = ring.stale(100.0, 5.0, "50");
        assert!(stale.is_empty());

        let stale = ring.stale(100.0, 5.0, "10");
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "50");
    }
}

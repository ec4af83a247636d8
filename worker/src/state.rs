//! The shared mutable state of one worker.
//!
//! All three duties (RPC server, heartbeat loop, heartbeat listener) read
//! and mutate this through a single `RwLock`; nothing holds that lock across
//! a peer call.

use std::collections::HashMap;

use cartcast_core::crdt::ShoppingList;
use cluster_ring::{Neighbors, Ring};

pub struct NodeState {
    pub ring: Ring,
    /// Lists this worker currently holds, as owner or replica.
    pub lists: HashMap<String, ShoppingList>,
    /// Cached neighbor sets for this node; recomputed on every membership
    /// change.
    pub neighbors: Neighbors,
}

impl NodeState {
    pub fn new() -> Self {
        Self {
            ring: Ring::new(),
            lists: HashMap::new(),
            neighbors: Neighbors::default(),
        }
    }

    /// Recompute the cached neighbor sets after the ring changed.
    pub fn refresh_neighbors(&mut self, self_id: &str) {
        self.neighbors = self.ring.neighbors_of(self_id);
    }
}

impl Default for NodeState {
    fn default() -> Self {
        Self::new()
    }
}

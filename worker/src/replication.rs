//! Replication and rebalancing.
//!
//! Placement invariant: every list lives on its owner and on the owner's
//! next-N neighbors (the replica holder set). Mutations push fresh state to
//! this node's successors; membership changes push or delete copies until
//! the invariant holds again. Every push is a `merge_replicas` call, so
//! over-pushing is harmless and nothing here retries or rolls back.

use std::sync::Arc;

use cartcast_core::crdt::{ListState, ShoppingList};
use cartcast_core::protocol::{PeerRequest, PeerResponse, MERGE_REPLICAS};
use cluster_ring::WorkerNode;

use crate::error::WorkerResult;
use crate::node::WorkerCtx;

/// Peer-invoked replica merge: fold `state` into the local copy (creating it
/// if absent), persist, and return the merged state. Runs regardless of who
/// owns the list; replica copies are deliberately held off-owner.
pub(crate) async fn merge_into_local(
    ctx: &Arc<WorkerCtx>,
    list_id: &str,
    state: &ListState,
) -> WorkerResult<ListState> {
    ensure_loaded(ctx, list_id).await?;
    let merged = {
        let mut node_state = ctx.state.write().await;
        let list = node_state
            .lists
            .entry(list_id.to_string())
            .or_insert_with(|| ShoppingList::new(list_id));
        list.merge(state);
        list.to_state()
    };
    ctx.storage.put(list_id, &merged).await?;
    Ok(merged)
}

/// Bring a persisted list into the in-memory cache if it is not there yet.
/// Returns whether the list exists at all on this node.
pub(crate) async fn ensure_loaded(ctx: &Arc<WorkerCtx>, list_id: &str) -> WorkerResult<bool> {
    if ctx.state.read().await.lists.contains_key(list_id) {
        return Ok(true);
    }
    match ctx.storage.get(list_id).await? {
        Some(state) => {
            let mut node_state = ctx.state.write().await;
            node_state
                .lists
                .entry(list_id.to_string())
                .or_insert_with(|| ShoppingList::from_state(state));
            Ok(true)
        }
        None => Ok(false),
    }
}

/// After a local mutation on a list this node owns: push the full current
/// state to every successor neighbor. Each push is independent and
/// best-effort; a failed neighbor is skipped, never retried.
pub(crate) async fn on_mutation_applied(ctx: &Arc<WorkerCtx>, list_id: &str) {
    let snapshot = {
        let state = ctx.state.read().await;
        let Some(list) = state.lists.get(list_id) else {
            return;
        };
        (list.to_state(), state.neighbors.next.clone())
    };
    let (list_state, neighbors) = snapshot;
    if neighbors.is_empty() {
        return;
    }
    tracing::debug!(list_id, neighbors = neighbors.len(), "replicating mutated list");
    push_replicas(ctx, list_id, &list_state, &neighbors).await;
}

/// A new member appeared. For every held list, push a copy to each node that
/// is newly in the list's holder set, and drop the local copy when this node
/// is no longer in it.
pub(crate) async fn on_node_joined(ctx: &Arc<WorkerCtx>, joined: &WorkerNode) {
    let plan = {
        let state = ctx.state.read().await;
        if state.ring.len() < 2 {
            return;
        }
        let mut before = state.ring.clone();
        before.remove(&joined.id);

        let mut plan = Vec::new();
        for (list_id, list) in &state.lists {
            let prior = before.replica_holders(list_id);
            let current = state.ring.replica_holders(list_id);
            let keep = current.contains(&ctx.id);
            let targets: Vec<WorkerNode> = current
                .iter()
                .filter(|&id| !prior.contains(id) && id != &ctx.id)
                .filter_map(|id| state.ring.get(id).cloned())
                .collect();
            if !targets.is_empty() || !keep {
                plan.push((list_id.clone(), list.to_state(), targets, keep));
            }
        }
        plan
    };

    for (list_id, list_state, targets, keep) in plan {
        if !targets.is_empty() {
            tracing::info!(
                list_id = %list_id,
                joined = %joined.id,
                targets = targets.len(),
                "rebalancing list for joined worker"
            );
            push_replicas(ctx, &list_id, &list_state, &targets).await;
        }
        if !keep {
            tracing::info!(list_id = %list_id, "no longer in this list's holder set, dropping local copy");
            ctx.state.write().await.lists.remove(&list_id);
            if let Err(e) = ctx.storage.delete(&list_id).await {
                tracing::warn!(list_id = %list_id, "failed to delete list from storage: {}", e);
            }
        }
    }
}

/// A member stopped heartbeating. Called while the failed node is still in
/// the ring. For every held list this node remains responsible for, push a
/// copy to each node that must newly hold it.
///
/// Below four members every surviving node already holds every replica by
/// construction of the neighbor policy, so there is nothing to transfer.
pub(crate) async fn on_node_failed(ctx: &Arc<WorkerCtx>, failed: &WorkerNode) {
    let plan = {
        let state = ctx.state.read().await;
        if state.ring.len() < 4 {
            tracing::debug!(failed = %failed.id, "ring too small for failure rebalancing");
            return;
        }
        let mut after = state.ring.clone();
        after.remove(&failed.id);

        let mut plan = Vec::new();
        for (list_id, list) in &state.lists {
            let prior = state.ring.replica_holders(list_id);
            let current = after.replica_holders(list_id);
            if !current.contains(&ctx.id) {
                continue;
            }
            let targets: Vec<WorkerNode> = current
                .iter()
                .filter(|&id| !prior.contains(id) && id != &ctx.id)
                .filter_map(|id| after.get(id).cloned())
                .collect();
            if !targets.is_empty() {
                plan.push((list_id.clone(), list.to_state(), targets));
            }
        }
        plan
    };

    for (list_id, list_state, targets) in plan {
        tracing::info!(
            list_id = %list_id,
            failed = %failed.id,
            targets = targets.len(),
            "rebalancing list for failed worker"
        );
        push_replicas(ctx, &list_id, &list_state, &targets).await;
    }
}

async fn push_replicas(
    ctx: &Arc<WorkerCtx>,
    list_id: &str,
    list_state: &ListState,
    targets: &[WorkerNode],
) {
    for target in targets {
        let request = PeerRequest {
            action: MERGE_REPLICAS.to_string(),
            list_id: list_id.to_string(),
            list: Some(list_state.clone()),
            id: ctx.id.clone(),
            port: ctx.addr.clone(),
        };
        match ctx.peers.call(&target.addr, &request).await {
            Ok(PeerResponse { status, .. }) if status == cartcast_core::protocol::Status::Success => {
                tracing::debug!(list_id, peer = %target.id, "replica pushed");
            }
            Ok(response) => {
                tracing::warn!(
                    list_id,
                    peer = %target.id,
                    message = response.message.as_deref().unwrap_or(""),
                    "replica push rejected"
                );
            }
            Err(e) => {
                tracing::warn!(list_id, peer = %target.id, "replica push failed: {}", e);
            }
        }
    }
}

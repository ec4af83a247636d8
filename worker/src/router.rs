//! The request router: every inbound RPC lands here.
//!
//! `merge_replicas` executes locally no matter what — replica storage is
//! ownership-blind. `get_list` and `merge_lists` consult the ring: the owner
//! executes, anyone else forwards the request verbatim to the owner and
//! relays its reply. The local ring is eventually consistent, but the owner
//! is authoritative for its keys, so a request takes at most one extra hop.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};

use cartcast_core::protocol::{PeerRequest, PeerResponse, GET_LIST, MERGE_LISTS, MERGE_REPLICAS};
use cluster_ring::WorkerNode;

use crate::node::WorkerCtx;
use crate::replication;

pub(crate) fn rpc_router(ctx: Arc<WorkerCtx>) -> Router {
    Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/health", get(|| async { StatusCode::OK }))
        .with_state(ctx)
}

async fn handle_rpc(
    State(ctx): State<Arc<WorkerCtx>>,
    Json(request): Json<PeerRequest>,
) -> Json<PeerResponse> {
    Json(dispatch(&ctx, request).await)
}

pub(crate) async fn dispatch(ctx: &Arc<WorkerCtx>, request: PeerRequest) -> PeerResponse {
    match request.action.as_str() {
        MERGE_REPLICAS => merge_replicas(ctx, &request).await,
        GET_LIST | MERGE_LISTS => {
            let owner = {
                let state = ctx.state.read().await;
                state.ring.owner_of(&request.list_id).cloned()
            };
            match owner {
                Some(owner) if owner.id != ctx.id => forward(ctx, &owner, request).await,
                _ => execute_local(ctx, request).await,
            }
        }
        other => {
            tracing::warn!(action = other, "unrecognized action");
            PeerResponse::error(format!("Invalid action: {}", other))
        }
    }
}

async fn merge_replicas(ctx: &Arc<WorkerCtx>, request: &PeerRequest) -> PeerResponse {
    let Some(list_state) = request.list.as_ref() else {
        return PeerResponse::error("merge_replicas requires a list payload");
    };
    match replication::merge_into_local(ctx, &request.list_id, list_state).await {
        Ok(merged) => PeerResponse::success_with(
            format!("Replica of list {} merged successfully.", request.list_id),
            merged,
        ),
        Err(e) => {
            tracing::error!(list_id = %request.list_id, "replica merge failed: {}", e);
            PeerResponse::error(e.to_string())
        }
    }
}

async fn execute_local(ctx: &Arc<WorkerCtx>, request: PeerRequest) -> PeerResponse {
    match request.action.as_str() {
        GET_LIST => get_list(ctx, &request.list_id).await,
        MERGE_LISTS => merge_lists(ctx, &request).await,
        _ => PeerResponse::error(format!("Invalid action: {}", request.action)),
    }
}

async fn get_list(ctx: &Arc<WorkerCtx>, list_id: &str) -> PeerResponse {
    match replication::ensure_loaded(ctx, list_id).await {
        Ok(true) => {
            let state = ctx.state.read().await;
            match state.lists.get(list_id) {
                Some(list) => PeerResponse::success(list.to_state()),
                None => PeerResponse::error(format!("List {} not found", list_id)),
            }
        }
        Ok(false) => PeerResponse::error(format!("List {} not found", list_id)),
        Err(e) => {
            tracing::error!(list_id, "failed to load list: {}", e);
            PeerResponse::error(e.to_string())
        }
    }
}

async fn merge_lists(ctx: &Arc<WorkerCtx>, request: &PeerRequest) -> PeerResponse {
    let Some(list_state) = request.list.as_ref() else {
        return PeerResponse::error("merge_lists requires a list payload");
    };
    match replication::merge_into_local(ctx, &request.list_id, list_state).await {
        Ok(merged) => {
            replication::on_mutation_applied(ctx, &request.list_id).await;
            PeerResponse::success_with(
                format!("List {} merged successfully.", request.list_id),
                merged,
            )
        }
        Err(e) => {
            tracing::error!(list_id = %request.list_id, "merge failed: {}", e);
            PeerResponse::error(e.to_string())
        }
    }
}

/// Relay a request to the list's owner and pass its reply back unchanged.
async fn forward(ctx: &Arc<WorkerCtx>, owner: &WorkerNode, request: PeerRequest) -> PeerResponse {
    tracing::debug!(
        list_id = %request.list_id,
        owner = %owner.id,
        "forwarding request to owning worker"
    );
    match ctx.peers.call(&owner.addr, &request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(owner = %owner.id, "forward failed: {}", e);
            PeerResponse::error(format!("Owner {} unreachable: {}", owner.id, e))
        }
    }
}

//! Heartbeat gossip and failure detection.
//!
//! Every worker runs two loops against the message bus: one announces this
//! node each period, refreshes its own ring slot, and evicts peers whose
//! heartbeats have gone stale; the other folds peer announcements into the
//! local ring. Detection is purely local and eventually consistent, which
//! is safe because every rebalancing push is an idempotent merge.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cartcast_core::protocol::{now_ts, Heartbeat};
use cluster_ring::WorkerNode;

use crate::node::WorkerCtx;
use crate::replication;

pub(crate) fn spawn_heartbeat_loop(
    ctx: Arc<WorkerCtx>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(ctx.config.heartbeat_interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::debug!("heartbeat loop shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    beat(&ctx).await;
                    detect_failures(&ctx).await;
                }
            }
        }
    })
}

/// Refresh our own ring slot and announce ourselves on the bus.
async fn beat(ctx: &Arc<WorkerCtx>) {
    let now = now_ts();
    {
        let mut state = ctx.state.write().await;
        state.ring.upsert(WorkerNode {
            id: ctx.id.clone(),
            addr: ctx.addr.clone(),
            last_seen: now,
        });
        state.refresh_neighbors(&ctx.id);
    }
    let heartbeat = Heartbeat {
        id: ctx.id.clone(),
        port: ctx.addr.clone(),
        timestamp: now,
    };
    if let Err(e) = ctx.bus.publish(&heartbeat).await {
        tracing::warn!("failed to publish heartbeat: {}", e);
    }
}

/// Evict every peer whose heartbeat is older than the timeout, handing each
/// to the replication manager before it leaves the ring.
async fn detect_failures(ctx: &Arc<WorkerCtx>) {
    let now = now_ts();
    let timeout = ctx.config.heartbeat_timeout.as_secs_f64();
    let failed = {
        let state = ctx.state.read().await;
        state.ring.stale(now, timeout, &ctx.id)
    };
    for node in failed {
        tracing::info!(id = %node.id, addr = %node.addr, "worker missed its heartbeat deadline, evicting");
        replication::on_node_failed(ctx, &node).await;
        let mut state = ctx.state.write().await;
        state.ring.remove(&node.id);
        state.refresh_neighbors(&ctx.id);
    }
}

pub(crate) fn spawn_listener_loop(
    ctx: Arc<WorkerCtx>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let mut subscription = match ctx.bus.subscribe().await {
                Ok(subscription) => subscription,
                Err(e) => {
                    tracing::warn!("heartbeat subscription failed: {}, retrying", e);
                    tokio::select! {
                        _ = cancel.cancelled() => return,
                        _ = tokio::time::sleep(std::time::Duration::from_secs(1)) => continue,
                    }
                }
            };
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("heartbeat listener shutting down");
                        return;
                    }
                    heartbeat = subscription.recv() => match heartbeat {
                        Some(heartbeat) => apply_heartbeat(&ctx, heartbeat).await,
                        None => {
                            tracing::warn!("heartbeat subscription ended, resubscribing");
                            break;
                        }
                    }
                }
            }
        }
    })
}

/// Fold one peer heartbeat into the ring. A first-time identity is a join
/// and triggers rebalancing; anything else is a refresh.
async fn apply_heartbeat(ctx: &Arc<WorkerCtx>, heartbeat: Heartbeat) {
    if heartbeat.id == ctx.id {
        return;
    }
    let node = WorkerNode {
        id: heartbeat.id,
        addr: heartbeat.port,
        last_seen: heartbeat.timestamp,
    };
    let joined = {
        let mut state = ctx.state.write().await;
        let joined = state.ring.upsert(node.clone());
        if joined {
            state.refresh_neighbors(&ctx.id);
        }
        joined
    };
    if joined {
        tracing::info!(id = %node.id, addr = %node.addr, "worker joined the ring");
        replication::on_node_joined(ctx, &node).await;
    }
}

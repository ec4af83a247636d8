//! Worker assembly: shared context, startup sequence, graceful shutdown.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use cartcast_core::bus::MessageBus;
use cartcast_core::config::NodeConfig;
use cartcast_core::crdt::ShoppingList;
use cartcast_core::protocol::{self, now_ts};
use cartcast_core::storage::Storage;
use cluster_ring::WorkerNode;

use crate::error::WorkerResult;
use crate::rpc::PeerClient;
use crate::state::NodeState;
use crate::{gossip, router};

/// Everything the three duties share. Handed around as `Arc<WorkerCtx>`.
pub struct WorkerCtx {
    pub(crate) config: NodeConfig,
    /// This node's ring identity: hex sha-256 of `addr`.
    pub(crate) id: String,
    /// The address peers reach this node at.
    pub(crate) addr: String,
    pub(crate) state: RwLock<NodeState>,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) peers: PeerClient,
}

/// A running worker node.
pub struct Worker {
    ctx: Arc<WorkerCtx>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Worker {
    /// Bring a worker up.
    ///
    /// Startup order matters: the node registers itself in its local ring
    /// and reloads persisted lists *before* the RPC server and the gossip
    /// loops start, so it never serves a request while ignorant of its own
    /// ring position.
    pub async fn start(
        config: NodeConfig,
        storage: Arc<dyn Storage>,
        bus: Arc<dyn MessageBus>,
    ) -> WorkerResult<Worker> {
        let listener = TcpListener::bind(&config.bind_addr).await?;
        let bound = listener.local_addr()?;
        let addr = if config.advertise_addr.is_empty() {
            bound.to_string()
        } else {
            config.advertise_addr.clone()
        };
        let id = protocol::node_id_for_addr(&addr);
        let peers = PeerClient::new(config.rpc_timeout)?;

        let ctx = Arc::new(WorkerCtx {
            config,
            id: id.clone(),
            addr: addr.clone(),
            state: RwLock::new(NodeState::new()),
            storage,
            bus,
            peers,
        });

        // Explicit join: self-registration happens here, not via heartbeat
        // loopback, so the first inbound request already sees this node in
        // the ring.
        {
            let mut state = ctx.state.write().await;
            state.ring.upsert(WorkerNode {
                id: id.clone(),
                addr: addr.clone(),
                last_seen: now_ts(),
            });
            state.refresh_neighbors(&id);
        }

        // Reload lists persisted by an earlier run of this node.
        let mut reloaded = Vec::new();
        for key in ctx.storage.keys().await? {
            if let Some(list_state) = ctx.storage.get(&key).await? {
                reloaded.push((key, ShoppingList::from_state(list_state)));
            }
        }
        if !reloaded.is_empty() {
            tracing::info!(count = reloaded.len(), "reloaded persisted lists");
            ctx.state.write().await.lists.extend(reloaded);
        }

        let cancel = CancellationToken::new();

        let app = router::rpc_router(ctx.clone());
        let server_cancel = cancel.clone();
        let server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(server_cancel.cancelled_owned())
                .await
            {
                tracing::error!("rpc server error: {}", e);
            }
        });

        let heartbeat = gossip::spawn_heartbeat_loop(ctx.clone(), cancel.clone());
        let listener_loop = gossip::spawn_listener_loop(ctx.clone(), cancel.clone());

        tracing::info!(id = %ctx.id, addr = %ctx.addr, "worker started");
        Ok(Worker {
            ctx,
            cancel,
            tasks: vec![server, heartbeat, listener_loop],
        })
    }

    pub fn id(&self) -> &str {
        &self.ctx.id
    }

    /// The address peers and clients reach this worker at. With an
    /// ephemeral bind this is the actually bound address.
    pub fn addr(&self) -> &str {
        &self.ctx.addr
    }

    /// Current ring size as this node sees it.
    pub async fn ring_size(&self) -> usize {
        self.ctx.state.read().await.ring.len()
    }

    /// Identities of the lists this node currently holds, sorted.
    pub async fn held_lists(&self) -> Vec<String> {
        let state = self.ctx.state.read().await;
        let mut ids: Vec<String> = state.lists.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Materialized view of a held list, if present.
    pub async fn view_of(&self, list_id: &str) -> Option<std::collections::BTreeMap<String, i64>> {
        self.ctx
            .state
            .read()
            .await
            .lists
            .get(list_id)
            .map(|list| list.view())
    }

    /// Stop all duties and wait for them to wind down. No leave message is
    /// sent: peers notice the silence and evict this node by timeout.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        tracing::info!(id = %self.ctx.id, "worker stopped");
    }
}

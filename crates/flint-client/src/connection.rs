//! The top-level cluster connection.
//!
//! A [`Connection`] owns one [`NodeConnection`] per cluster node, the
//! current pipeline generation, and the shared shard-map snapshot. Handles
//! are cheap to clone and safe to share between tasks; callers only ever
//! receive reply values, never the underlying sockets, so `disconnect`
//! can close everything deterministically.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use flint_cluster::{NodeId, ShardMap};
use flint_protocol::{Frame, Request};

use crate::commands::InfoMap;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::node::{Connector, NodeConnection};
use crate::pipeline::{DeferredReply, PipelineState, StateCell};
use crate::topology::Refresher;

/// Shared internals behind a [`Connection`] handle.
pub(crate) struct Core {
    pub(crate) config: ClientConfig,
    pub(crate) info: InfoMap,
    pub(crate) connector: Connector,
    pub(crate) refresher: Refresher,
    /// Current topology snapshot; replaced wholesale on refresh.
    pub(crate) shard_map: RwLock<Arc<ShardMap>>,
    /// One exclusively-owned connection per node.
    pub(crate) node_conns: RwLock<HashMap<NodeId, Arc<Mutex<NodeConnection>>>>,
    /// The current pipeline generation; replaced on rotation.
    pub(crate) pipeline: Mutex<StateCell>,
}

impl Core {
    /// Short-lived read of the current shard map pointer.
    pub(crate) async fn snapshot(&self) -> Arc<ShardMap> {
        Arc::clone(&*self.shard_map.read().await)
    }

    /// The connection for a specific node; absence means the topology and
    /// the table disagree, which callers surface as [`Error::MissingNode`].
    pub(crate) async fn conn_for(
        &self,
        node_id: &NodeId,
    ) -> Result<Arc<Mutex<NodeConnection>>, Error> {
        self.node_conns
            .read()
            .await
            .get(node_id)
            .cloned()
            .ok_or(Error::MissingNode)
    }

    /// An arbitrary connection different from `not` when one exists,
    /// otherwise any connection at all.
    pub(crate) async fn alternate_conn(
        &self,
        not: &NodeId,
    ) -> Option<Arc<Mutex<NodeConnection>>> {
        let table = self.node_conns.read().await;
        table
            .iter()
            .find(|(id, _)| *id != not)
            .map(|(_, conn)| Arc::clone(conn))
            .or_else(|| table.values().next().cloned())
    }

    /// Any live connection.
    pub(crate) async fn any_conn(&self) -> Option<Arc<Mutex<NodeConnection>>> {
        self.node_conns.read().await.values().next().cloned()
    }
}

/// A shared, pipelining connection to a sharded cluster.
///
/// Cloning is cheap — clones share the node table, pipeline, and shard
/// map, so concurrent producers submit through the same buffered batch.
#[derive(Clone)]
pub struct Connection {
    core: Arc<Core>,
}

impl Connection {
    /// Connects to every unique node of the initial shard map.
    ///
    /// If some nodes are unreachable but at least one connection succeeds,
    /// the topology is refreshed through a surviving node and the table is
    /// reconnected against the fresh map — the seed map may simply be out
    /// of date. With zero live connections this fails with
    /// [`Error::NoNode`].
    pub async fn connect(
        connector: Connector,
        info: InfoMap,
        shard_map: ShardMap,
        config: ClientConfig,
        refresher: Refresher,
    ) -> Result<Self, Error> {
        let nodes = shard_map.nodes();
        let mut table = HashMap::with_capacity(nodes.len());
        let mut failed = 0usize;

        for node in &nodes {
            match (connector)(node.host.clone(), node.port, config.connect_timeout).await {
                Ok(transport) => {
                    let nc = NodeConnection::new(node.id.clone(), transport, config.node_deadline);
                    table.insert(node.id.clone(), Arc::new(Mutex::new(nc)));
                }
                Err(e) => {
                    warn!(node = %node.id, host = %node.host, port = node.port, error = %e,
                        "failed to open node connection");
                    failed += 1;
                }
            }
        }

        if table.is_empty() {
            return Err(Error::NoNode);
        }

        let core = Arc::new(Core {
            config,
            info,
            connector,
            refresher,
            shard_map: RwLock::new(Arc::new(shard_map)),
            node_conns: RwLock::new(table),
            pipeline: Mutex::new(Arc::new(Mutex::new(PipelineState::Pending(Vec::new())))),
        });

        if failed > 0 {
            info!(failed, "seed map partially reachable, refreshing topology");
            core.refresh_shard_map().await?;
        }

        Ok(Self { core })
    }

    /// Closes every node connection. Best-effort: sockets are torn down as
    /// they drop, and any unforced deferred replies will fail when forced.
    pub async fn disconnect(&self) {
        self.core.node_conns.write().await.clear();
    }

    /// Buffers a request into the shared pipeline and returns a deferred
    /// handle to its reply. Forcing the handle may flush the batch,
    /// perform I/O, and raise; see [`DeferredReply::force`].
    pub async fn request_pipelined(&self, request: Request) -> Result<DeferredReply, Error> {
        self.core.submit(request).await
    }

    /// Sends the same request to every master in the current shard map and
    /// returns the replies concatenated in master order. Used for fan-out
    /// commands that touch every shard.
    pub async fn request_master_nodes(&self, request: &Request) -> Result<Vec<Frame>, Error> {
        let map = self.core.snapshot().await;
        let mut replies = Vec::new();
        for master in map.masters() {
            let conn = self.core.conn_for(&master.id).await?;
            let batch = self
                .core
                .request_on(&conn, std::slice::from_ref(request))
                .await?;
            replies.extend(batch);
        }
        Ok(replies)
    }

    /// The current topology snapshot.
    pub async fn shard_map(&self) -> Arc<ShardMap> {
        self.core.snapshot().await
    }
}

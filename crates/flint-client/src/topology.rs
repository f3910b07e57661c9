//! Topology refresh.
//!
//! When a node answers MOVED, or a connection attempt fails, the shard map
//! is stale. A [`Refresher`] callback — injected at connect time — asks a
//! surviving node for the current topology; the stock implementation
//! issues `CLUSTER SLOTS` and decodes the reply. After every successful
//! refresh the node connection table is reconciled against the new map:
//! connections are opened to nodes that joined and dropped for nodes that
//! left.

use std::sync::Arc;

use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tracing::{info, warn};

use flint_cluster::{Node, ShardMap, TopologyError};
use flint_protocol::Request;

use crate::connection::Core;
use crate::error::Error;
use crate::node::NodeConnection;
use crate::pipeline::guarded_lock;

/// Callback that produces a fresh [`ShardMap`] using an existing node
/// connection. Injected so deployments can source topology however they
/// like (`CLUSTER SLOTS`, `CLUSTER SHARDS`, a control plane, ...).
pub type Refresher = Arc<
    dyn for<'a> Fn(&'a mut NodeConnection) -> BoxFuture<'a, Result<ShardMap, Error>> + Send + Sync,
>;

/// The stock refresher: `CLUSTER SLOTS` against the given connection.
pub fn cluster_slots_refresher() -> Refresher {
    Arc::new(query_cluster_slots)
}

/// Wraps a closure as a [`Refresher`].
///
/// Mostly a type-inference aid: the higher-ranked signature rarely infers
/// cleanly from a bare closure at an `Arc::new` call site.
pub fn refresher_fn<F>(f: F) -> Refresher
where
    F: for<'a> Fn(&'a mut NodeConnection) -> BoxFuture<'a, Result<ShardMap, Error>>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn query_cluster_slots(nc: &mut NodeConnection) -> BoxFuture<'_, Result<ShardMap, Error>> {
    Box::pin(async move {
        let request = Request::cmd("CLUSTER").arg("SLOTS");
        let mut replies = nc.request_node(std::slice::from_ref(&request)).await?;
        let reply = replies.pop().ok_or(Error::ConnectionClosed)?;
        if let Some(msg) = reply.error_text() {
            warn!(node = %nc.node_id(), error = msg, "topology query rejected");
            return Err(Error::Topology(TopologyError::MalformedReply(
                "topology query rejected by node",
            )));
        }
        Ok(ShardMap::from_cluster_slots(&reply)?)
    })
}

impl Core {
    /// Fetches a fresh shard map through any live connection, installs it,
    /// and reconciles the node table. The map swap happens before
    /// reconciliation so routing decisions never see the old topology once
    /// this returns.
    pub(crate) async fn refresh_shard_map(&self) -> Result<(), Error> {
        let conn = self.any_conn().await.ok_or(Error::NoNode)?;
        let fresh = {
            let mut nc = guarded_lock("node.connection", &conn).await?;
            (self.refresher)(&mut nc).await?
        };

        let fresh = Arc::new(fresh);
        *self.shard_map.write().await = Arc::clone(&fresh);
        info!(nodes = fresh.nodes().len(), "installed fresh shard map");

        self.reconcile_nodes(&fresh).await;
        Ok(())
    }

    /// Brings the connection table in line with a topology snapshot:
    /// opens connections to new nodes, drops connections to departed ones.
    /// Individual connect failures are logged and tolerated — the node
    /// simply stays absent until the next refresh.
    pub(crate) async fn reconcile_nodes(&self, map: &ShardMap) {
        let desired = map.nodes();

        let missing: Vec<Node> = {
            let table = self.node_conns.read().await;
            desired
                .iter()
                .filter(|n| !table.contains_key(&n.id))
                .cloned()
                .collect()
        };

        let mut opened = Vec::with_capacity(missing.len());
        for node in missing {
            match (self.connector)(node.host.clone(), node.port, self.config.connect_timeout).await
            {
                Ok(transport) => {
                    let nc =
                        NodeConnection::new(node.id.clone(), transport, self.config.node_deadline);
                    opened.push((node.id.clone(), nc));
                }
                Err(e) => {
                    warn!(node = %node.id, host = %node.host, port = node.port, error = %e,
                        "could not reach node from fresh map");
                }
            }
        }

        let mut table = self.node_conns.write().await;
        table.retain(|id, _| desired.iter().any(|n| &n.id == id));
        for (id, nc) in opened {
            table.insert(id, Arc::new(Mutex::new(nc)));
        }
    }
}

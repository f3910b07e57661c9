//! flint-client: a clustered client for sharded, replicated RESP
//! key-value stores.
//!
//! The client solves three coupled problems:
//!
//! - **Routing**: every command is mapped to the shard that must serve it
//!   by hashing its key arguments against a local [`ShardMap`], with
//!   read-only commands optionally served by replicas.
//! - **Implicit pipelining**: submissions are buffered and coalesced into
//!   per-node batches that flush lazily on first reply inspection, while
//!   each caller still sees its own replies in submission order.
//! - **Topology recovery**: `MOVED`/`ASK` redirections and transient node
//!   failures trigger shard-map refreshes and targeted retries.
//!
//! The client is reactive: the server is the source of truth for topology,
//! and the shard map is only ever corrected in response to what servers
//! say.
//!
//! # Example
//!
//! ```no_run
//! use flint_client::{
//!     cluster_slots_refresher, tcp_connector, ClientConfig, Connection, InfoMap, Request,
//!     ShardMap,
//! };
//!
//! async fn example(seed_map: ShardMap) -> Result<(), flint_client::Error> {
//!     let conn = Connection::connect(
//!         tcp_connector(),
//!         InfoMap::with_defaults(),
//!         seed_map,
//!         ClientConfig::default(),
//!         cluster_slots_refresher(),
//!     )
//!     .await?;
//!
//!     let reply = conn
//!         .request_pipelined(Request::cmd("GET").arg("hello"))
//!         .await?;
//!     let value = reply.force().await?;
//!     println!("{value:?}");
//!
//!     conn.disconnect().await;
//!     Ok(())
//! }
//! ```

pub mod commands;
mod config;
mod connection;
mod error;
mod node;
mod pipeline;
mod router;
mod topology;

pub use commands::{default_commands, CommandSpec, InfoMap, KeySpec};
pub use config::ClientConfig;
pub use connection::Connection;
pub use error::Error;
pub use node::{connector_fn, tcp_connector, BoxTransport, Connector, NodeConnection, Transport};
pub use pipeline::DeferredReply;
pub use topology::{cluster_slots_refresher, refresher_fn, Refresher};

pub use flint_cluster::{key_slot, Node, NodeId, Redirect, Role, Shard, ShardMap};
pub use flint_protocol::{Frame, ProtocolError, Request};

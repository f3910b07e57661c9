//! Error types observable through the client API.

use flint_cluster::TopologyError;
use thiserror::Error;

/// Errors that can occur while routing, pipelining, or talking to nodes.
///
/// Server error replies that are not handled redirections are *not* errors
/// at this level — they are delivered to the caller as
/// [`Frame::Error`](flint_protocol::Frame::Error) reply values.
#[derive(Debug, Error)]
pub enum Error {
    /// The command is not in the metadata registry, or carries no routable
    /// key, and no MULTI/EXEC override applies.
    #[error("unsupported command: {0:?}")]
    UnsupportedCommand(String),

    /// The keys of a single request hash to more than one shard.
    #[error("keys hash to more than one shard")]
    CrossSlot,

    /// Routing resolved to a node the connection doesn't hold, or an ASK
    /// target could not be located even after a topology refresh.
    #[error("no known node can serve the request")]
    MissingNode,

    /// No node connection could be established, or per-node I/O exceeded
    /// its deadline (including the one retry on an alternate node).
    #[error("no reachable node")]
    NoNode,

    /// The peer closed the connection, or sent bytes that do not parse as
    /// a protocol frame.
    #[error("connection closed")]
    ConnectionClosed,

    /// A topology snapshot could not be built from the server's reply.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Transport-level I/O failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal lock could not be acquired within the stall window,
    /// which indicates a dead holder. A diagnostic naming the site is
    /// logged before this is raised.
    #[error("lock acquisition stalled at {0}")]
    LockStalled(&'static str),
}

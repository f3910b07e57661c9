//! Client configuration.

use std::time::Duration;

/// Tunables for a cluster [`Connection`](crate::Connection).
///
/// The defaults match the behavior of the reference deployment; everything
/// here is overridable per connection.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Route read-only commands to a replica when the owning shard has one.
    /// Writes and commands of unknown flavor always go to the master.
    pub read_only: bool,

    /// Per-socket connect timeout. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,

    /// Deadline for one request/response exchange with a single node.
    /// A node that blows the deadline is treated as failed.
    pub node_deadline: Duration,

    /// Number of buffered requests at which a submission flushes the
    /// pipeline in-line instead of deferring further.
    pub pipeline_flush_threshold: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            read_only: false,
            connect_timeout: Some(Duration::from_secs(1)),
            node_deadline: Duration::from_secs(1),
            pipeline_flush_threshold: 1000,
        }
    }
}

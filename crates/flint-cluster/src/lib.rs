//! flint-cluster: slot hashing and topology snapshots for flint.
//!
//! This crate provides the stateless cluster building blocks the client
//! core routes with:
//!
//! - **Slot hashing**: CRC16 over 16384 slots with hash-tag support
//! - **Topology**: immutable [`ShardMap`] snapshots of slot → shard
//!   ownership, including `CLUSTER SLOTS` reply decoding
//! - **Redirects**: `MOVED`/`ASK` error parsing
//!
//! # Quick start
//!
//! ```
//! use flint_cluster::{key_slot, Node, NodeId, Role, Shard, ShardMap};
//!
//! let master = Node {
//!     id: NodeId::new("aaaa"),
//!     role: Role::Master,
//!     host: "127.0.0.1".into(),
//!     port: 7000,
//! };
//! let map = ShardMap::single(Shard::new(master, vec![]));
//!
//! let slot = key_slot(b"mykey");
//! assert!(map.shard(slot).is_some());
//! ```

mod redirect;
mod shard;
mod slots;

pub use redirect::Redirect;
pub use shard::{Node, NodeId, Role, Shard, ShardMap, TopologyError};
pub use slots::{key_slot, SLOT_COUNT};

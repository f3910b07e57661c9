//! Shard topology snapshots.
//!
//! A [`ShardMap`] is an immutable picture of the cluster at one moment:
//! which shard (one master plus zero or more replicas) owns each of the
//! 16384 hash slots. Maps are never mutated in place — topology changes
//! produce a fresh snapshot that replaces the old one atomically at a
//! higher layer.

use std::collections::BTreeMap;
use std::fmt;

use bytes::Bytes;
use flint_protocol::Frame;

use crate::slots::SLOT_COUNT;

/// Errors produced when building a shard map from untrusted input.
#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    /// A slot range was out of bounds or inverted.
    #[error("invalid slot range {0}-{1}")]
    InvalidSlotRange(i64, i64),

    /// A `CLUSTER SLOTS` reply did not have the expected shape.
    #[error("malformed cluster slots reply: {0}")]
    MalformedReply(&'static str),
}

/// Unique identifier for a cluster node.
///
/// Node ids are opaque byte strings assigned by the server (40-char hex in
/// practice). Identity, equality, and ordering all derive from the id bytes
/// alone.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(Bytes);

impl NodeId {
    /// Creates a node id from raw bytes.
    pub fn new(id: impl AsRef<[u8]>) -> Self {
        Self(Bytes::copy_from_slice(id.as_ref()))
    }

    /// Returns the raw id bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Show a short prefix for readability (similar to git short hashes)
        let text = String::from_utf8_lossy(&self.0);
        write!(f, "{}", &text[..text.len().min(8)])
    }
}

/// The role of a node within its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Owns the shard's slots and accepts writes.
    Master,
    /// Mirrors a master's data; may serve reads.
    Replica,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Replica => write!(f, "replica"),
        }
    }
}

/// A single cluster node: identity, role, and client-facing address.
///
/// Equality, ordering, and hashing consider only the node id — two `Node`
/// values with the same id are the same node even if the advertised address
/// differs between topology snapshots.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: NodeId,
    pub role: Role,
    pub host: String,
    pub port: u16,
}

impl Node {
    /// Returns the `host:port` form of the node's address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl PartialOrd for Node {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Node {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// One master and its replicas, collectively responsible for some slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    master: Node,
    replicas: Vec<Node>,
}

impl Shard {
    /// Creates a shard from a master and its replicas.
    ///
    /// # Panics
    ///
    /// Debug builds panic if the master's role is not [`Role::Master`] or
    /// any replica's role is not [`Role::Replica`].
    pub fn new(master: Node, replicas: Vec<Node>) -> Self {
        debug_assert_eq!(master.role, Role::Master);
        debug_assert!(replicas.iter().all(|r| r.role == Role::Replica));
        Self { master, replicas }
    }

    /// The shard's master node.
    pub fn master(&self) -> &Node {
        &self.master
    }

    /// The shard's replicas, in the order the topology listed them.
    pub fn replicas(&self) -> &[Node] {
        &self.replicas
    }
}

/// Immutable slot → shard mapping.
///
/// Shards are stored once each (keyed by master id) with a dense slot table
/// indexing into them, so a map covering all 16384 slots with three shards
/// holds three `Shard` values. Gaps are representable — a lookup miss tells
/// the caller the snapshot is stale and a refresh is due.
#[derive(Debug, Clone)]
pub struct ShardMap {
    shards: Vec<Shard>,
    slots: Box<[Option<u16>; SLOT_COUNT as usize]>,
}

impl Default for ShardMap {
    fn default() -> Self {
        Self::new()
    }
}

impl ShardMap {
    /// Creates an empty map with no slot assignments.
    pub fn new() -> Self {
        Self {
            shards: Vec::new(),
            // Boxed to avoid a 32KB+ stack allocation
            slots: Box::new([None; SLOT_COUNT as usize]),
        }
    }

    /// Creates a map with every slot owned by a single shard.
    pub fn single(shard: Shard) -> Self {
        let mut map = Self::new();
        map.shards.push(shard);
        map.slots.fill(Some(0));
        map
    }

    /// Builds a map from `(start, end, shard)` range assignments
    /// (both ends inclusive).
    ///
    /// Ranges belonging to the same master are merged into one shard entry,
    /// so masters are enumerated once regardless of how fragmented their
    /// slot ownership is.
    pub fn from_ranges(
        ranges: impl IntoIterator<Item = (u16, u16, Shard)>,
    ) -> Result<Self, TopologyError> {
        let mut map = Self::new();
        for (start, end, shard) in ranges {
            map.assign_range(start, end, shard)?;
        }
        Ok(map)
    }

    fn assign_range(&mut self, start: u16, end: u16, shard: Shard) -> Result<(), TopologyError> {
        if start > end || end >= SLOT_COUNT {
            return Err(TopologyError::InvalidSlotRange(start as i64, end as i64));
        }

        let idx = match self
            .shards
            .iter()
            .position(|s| s.master.id == shard.master.id)
        {
            Some(idx) => idx as u16,
            None => {
                self.shards.push(shard);
                (self.shards.len() - 1) as u16
            }
        };

        for slot in start..=end {
            self.slots[slot as usize] = Some(idx);
        }
        Ok(())
    }

    /// Returns the shard owning `slot`, or `None` when the slot is
    /// unassigned in this snapshot.
    pub fn shard(&self, slot: u16) -> Option<&Shard> {
        let idx = *self.slots.get(slot as usize)?;
        idx.map(|i| &self.shards[i as usize])
    }

    /// Returns every node in the map — masters and replicas — exactly once,
    /// ordered by node id.
    pub fn nodes(&self) -> Vec<Node> {
        let mut by_id: BTreeMap<&NodeId, &Node> = BTreeMap::new();
        for shard in &self.shards {
            by_id.insert(&shard.master.id, &shard.master);
            for replica in &shard.replicas {
                by_id.insert(&replica.id, replica);
            }
        }
        by_id.into_values().cloned().collect()
    }

    /// Iterates over the masters of every shard.
    pub fn masters(&self) -> impl Iterator<Item = &Node> {
        self.shards.iter().map(|s| &s.master)
    }

    /// Finds a node by its advertised host and port.
    ///
    /// Linear scan — only consulted on the ASK redirect path, which is rare.
    pub fn node_at(&self, host: &str, port: u16) -> Option<&Node> {
        for shard in &self.shards {
            if shard.master.host == host && shard.master.port == port {
                return Some(&shard.master);
            }
            for replica in &shard.replicas {
                if replica.host == host && replica.port == port {
                    return Some(replica);
                }
            }
        }
        None
    }

    /// Returns true if the map has no slot assignments.
    pub fn is_empty(&self) -> bool {
        self.shards.is_empty()
    }

    /// Returns the number of unassigned slots.
    pub fn unassigned_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }

    /// Parses a `CLUSTER SLOTS` reply into a shard map.
    ///
    /// The expected shape is an array of entries
    /// `[start, end, [host, port, id], replica...]`, where each node element
    /// is itself an array of at least host and port. Nodes without an id
    /// (pre-4.0 servers omit it) are identified by their `host:port`.
    pub fn from_cluster_slots(reply: &Frame) -> Result<Self, TopologyError> {
        let entries = match reply {
            Frame::Array(entries) => entries,
            _ => return Err(TopologyError::MalformedReply("expected top-level array")),
        };

        let mut map = Self::new();

        for entry in entries {
            let items = match entry {
                Frame::Array(items) if items.len() >= 3 => items,
                _ => return Err(TopologyError::MalformedReply("entry too short")),
            };

            let start = int_field(&items[0])
                .ok_or(TopologyError::MalformedReply("bad range start"))?;
            let end =
                int_field(&items[1]).ok_or(TopologyError::MalformedReply("bad range end"))?;
            if !(0..SLOT_COUNT as i64).contains(&start) || !(0..SLOT_COUNT as i64).contains(&end) {
                return Err(TopologyError::InvalidSlotRange(start, end));
            }

            let master = parse_node(&items[2], Role::Master)?;
            let mut replicas = Vec::with_capacity(items.len() - 3);
            for item in &items[3..] {
                replicas.push(parse_node(item, Role::Replica)?);
            }

            map.assign_range(start as u16, end as u16, Shard::new(master, replicas))?;
        }

        Ok(map)
    }
}

/// Extracts an integer from a frame (integer or decimal bulk string).
fn int_field(frame: &Frame) -> Option<i64> {
    match frame {
        Frame::Integer(n) => Some(*n),
        Frame::Bulk(data) => std::str::from_utf8(data).ok()?.parse().ok(),
        _ => None,
    }
}

/// Parses a node element: `[host, port]` or `[host, port, id, ...]`.
fn parse_node(frame: &Frame, role: Role) -> Result<Node, TopologyError> {
    let items = match frame {
        Frame::Array(items) if items.len() >= 2 => items,
        _ => return Err(TopologyError::MalformedReply("node element too short")),
    };

    let host = match &items[0] {
        Frame::Bulk(data) => String::from_utf8_lossy(data).into_owned(),
        Frame::Simple(s) => s.clone(),
        _ => return Err(TopologyError::MalformedReply("bad node host")),
    };

    let port = int_field(&items[1])
        .filter(|p| (0..=u16::MAX as i64).contains(p))
        .ok_or(TopologyError::MalformedReply("bad node port"))? as u16;

    let id = match items.get(2) {
        Some(Frame::Bulk(data)) if !data.is_empty() => NodeId(data.clone()),
        _ => NodeId::new(format!("{host}:{port}")),
    };

    Ok(Node {
        id,
        role,
        host,
        port,
    })
}

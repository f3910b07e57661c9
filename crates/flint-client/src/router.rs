//! Request routing.
//!
//! Pure policy: given a topology snapshot, the command registry, and the
//! client's replica preference, pick the node a request must go to. No
//! I/O happens here, which is what makes routing deterministic — the same
//! inputs always produce the same node.

use flint_cluster::{key_slot, Node, Shard, ShardMap};
use flint_protocol::Request;

use crate::commands::InfoMap;
use crate::error::Error;

/// Resolves the target node for one request.
///
/// `MULTI`/`EXEC` are special-cased: callers pin a transaction to a slot by
/// passing the pin key as the second token (stripped again before the
/// request hits the wire). Everything else routes through the registry's
/// key positions.
pub(crate) fn route<'m>(
    map: &'m ShardMap,
    info: &InfoMap,
    read_only: bool,
    request: &Request,
) -> Result<&'m Node, Error> {
    let name = request.name();

    if name == "multi" || name == "exec" {
        let pin = request
            .token(1)
            .ok_or_else(|| Error::UnsupportedCommand(name.clone()))?;
        let shard = map.shard(key_slot(pin)).ok_or(Error::MissingNode)?;
        // transactions always run on the master
        return Ok(shard.master());
    }

    let keys = info
        .keys_for(request)
        .ok_or_else(|| Error::UnsupportedCommand(name.clone()))?;

    if keys.is_empty() {
        if !info.is_keyless(request) {
            // the command expects keys but the request carries none we can
            // extract; routing it anywhere would be a guess
            return Err(Error::UnsupportedCommand(name));
        }
        // keyless commands may run anywhere; pin them to the slot-0 shard
        // so routing stays a pure function of its inputs
        let shard = map.shard(0).ok_or(Error::MissingNode)?;
        return Ok(pick_node(shard, read_only && info.is_readonly(request)));
    }

    let mut shards: Vec<&Shard> = Vec::new();
    for key in &keys {
        if let Some(shard) = map.shard(key_slot(key)) {
            if !shards.iter().any(|s| s.master().id == shard.master().id) {
                shards.push(shard);
            }
        }
    }

    match shards.as_slice() {
        [] => Err(Error::MissingNode),
        [shard] => Ok(pick_node(shard, read_only && info.is_readonly(request))),
        _ => Err(Error::CrossSlot),
    }
}

/// Master unless the caller prefers replicas, the command allows it, and
/// the shard has one. The first replica is chosen deterministically — no
/// round-robin.
fn pick_node(shard: &Shard, prefer_replica: bool) -> &Node {
    if prefer_replica {
        if let Some(replica) = shard.replicas().first() {
            return replica;
        }
    }
    shard.master()
}

//! Command metadata registry.
//!
//! The router needs two facts about a command before it can pick a node:
//! which argument positions hold keys, and whether the command is read-only.
//! Both come from [`CommandSpec`] records — supplied by the caller, taken
//! from the built-in table, or decoded from a server `COMMAND` reply.

use std::collections::HashMap;

use bytes::Bytes;
use flint_protocol::{Frame, Request};

/// Where a command's keys live among its argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeySpec {
    /// The command takes no keys and may run on any node.
    None,

    /// Keys sit at these exact token indices (index 0 is the command name).
    Positions(Vec<usize>),

    /// Keys span a range of tokens: `first`, then every `step`-th token up
    /// to `last`. A negative `last` counts from the end of the request, so
    /// `-1` means "through the final token" — the encoding variadic
    /// commands use in `COMMAND` replies.
    Span { first: usize, last: i64, step: usize },
}

/// Metadata record for one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    name: String,
    keys: KeySpec,
    readonly: bool,
}

impl CommandSpec {
    /// Creates a record. The name is matched case-insensitively.
    pub fn new(name: impl Into<String>, keys: KeySpec, readonly: bool) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            keys,
            readonly,
        }
    }

    /// Shorthand for a single-key command with the key at token 1.
    fn one_key(name: &str, readonly: bool) -> Self {
        Self::new(name, KeySpec::Positions(vec![1]), readonly)
    }

    /// Shorthand for a variadic all-keys command (`DEL k1 k2 ...`).
    fn all_keys(name: &str, readonly: bool) -> Self {
        Self::new(
            name,
            KeySpec::Span {
                first: 1,
                last: -1,
                step: 1,
            },
            readonly,
        )
    }
}

/// Read-only lookup table from lowercased command name to its metadata.
#[derive(Debug, Clone, Default)]
pub struct InfoMap {
    commands: HashMap<String, CommandSpec>,
}

impl InfoMap {
    /// Builds a registry from metadata records. Later records win on
    /// duplicate names.
    pub fn new(records: impl IntoIterator<Item = CommandSpec>) -> Self {
        let mut commands = HashMap::new();
        for record in records {
            commands.insert(record.name.clone(), record);
        }
        Self { commands }
    }

    /// Builds a registry preloaded with the built-in command table.
    pub fn with_defaults() -> Self {
        Self::new(default_commands())
    }

    /// Decodes a server `COMMAND` reply into a registry.
    ///
    /// Each entry is `[name, arity, flags, first-key, last-key, step, ...]`.
    /// Entries that don't match that shape are skipped — an incomplete
    /// registry only narrows the set of routable commands, it never
    /// misroutes.
    pub fn from_command_reply(reply: &Frame) -> Self {
        let entries = match reply {
            Frame::Array(entries) => entries.as_slice(),
            _ => &[],
        };
        Self::new(entries.iter().filter_map(spec_from_entry))
    }

    /// Adds or replaces records.
    pub fn extend(&mut self, records: impl IntoIterator<Item = CommandSpec>) {
        for record in records {
            self.commands.insert(record.name.clone(), record);
        }
    }

    fn lookup(&self, request: &Request) -> Option<&CommandSpec> {
        self.commands.get(&request.name())
    }

    /// Extracts the routing keys of a request.
    ///
    /// Returns `None` when the command is unknown — the caller cannot route
    /// it. Known commands return their key tokens; a declared-keyless
    /// command or a request too short to reach any of its key positions
    /// both return an empty list (told apart via [`is_keyless`](Self::is_keyless)).
    pub fn keys_for(&self, request: &Request) -> Option<Vec<Bytes>> {
        let spec = self.lookup(request)?;
        let keys = match &spec.keys {
            KeySpec::None => Vec::new(),
            KeySpec::Positions(positions) => positions
                .iter()
                .filter_map(|&pos| request.token(pos).cloned())
                .collect(),
            KeySpec::Span { first, last, step } => {
                let count = request.token_count() as i64;
                let resolved_last = if *last < 0 { count + last } else { *last };
                let mut keys = Vec::new();
                let mut pos = *first as i64;
                while pos <= resolved_last {
                    match request.token(pos as usize) {
                        Some(token) => keys.push(token.clone()),
                        None => break,
                    }
                    pos += (*step).max(1) as i64;
                }
                keys
            }
        };
        Some(keys)
    }

    /// True if the command is known and declared keyless (routable to any
    /// node).
    pub fn is_keyless(&self, request: &Request) -> bool {
        matches!(
            self.lookup(request),
            Some(CommandSpec {
                keys: KeySpec::None,
                ..
            })
        )
    }

    /// True if the command is known and flagged read-only. Unknown commands
    /// default to false, which routes them to a master.
    pub fn is_readonly(&self, request: &Request) -> bool {
        self.lookup(request).map(|s| s.readonly).unwrap_or(false)
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// True if no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// Decodes one `COMMAND` reply entry, skipping anything malformed.
fn spec_from_entry(entry: &Frame) -> Option<CommandSpec> {
    let items = match entry {
        Frame::Array(items) if items.len() >= 6 => items,
        _ => return None,
    };

    let name = match &items[0] {
        Frame::Bulk(data) => String::from_utf8_lossy(data).into_owned(),
        Frame::Simple(s) => s.clone(),
        _ => return None,
    };

    let flags = match &items[2] {
        Frame::Array(flags) => flags.as_slice(),
        _ => return None,
    };
    let readonly = flags.iter().any(|f| match f {
        Frame::Simple(s) => s == "readonly",
        Frame::Bulk(data) => data.as_ref() == b"readonly",
        _ => false,
    });

    let first = items[3].as_integer()?;
    let last = items[4].as_integer()?;
    let step = items[5].as_integer()?;

    let keys = if first <= 0 {
        KeySpec::None
    } else {
        KeySpec::Span {
            first: first as usize,
            last,
            step: step.max(1) as usize,
        }
    };

    Some(CommandSpec::new(name, keys, readonly))
}

/// The built-in metadata table for the common command set.
///
/// Mirrors what the server's own `COMMAND` output says about key positions
/// and read-only flags.
pub fn default_commands() -> Vec<CommandSpec> {
    vec![
        // keyless
        CommandSpec::new("ping", KeySpec::None, true),
        CommandSpec::new("echo", KeySpec::None, true),
        // strings
        CommandSpec::one_key("get", true),
        CommandSpec::one_key("getrange", true),
        CommandSpec::one_key("strlen", true),
        CommandSpec::one_key("set", false),
        CommandSpec::one_key("setex", false),
        CommandSpec::one_key("psetex", false),
        CommandSpec::one_key("setnx", false),
        CommandSpec::one_key("getset", false),
        CommandSpec::one_key("append", false),
        CommandSpec::one_key("incr", false),
        CommandSpec::one_key("decr", false),
        CommandSpec::one_key("incrby", false),
        CommandSpec::one_key("decrby", false),
        CommandSpec::new(
            "mget",
            KeySpec::Span {
                first: 1,
                last: -1,
                step: 1,
            },
            true,
        ),
        CommandSpec::new(
            "mset",
            KeySpec::Span {
                first: 1,
                last: -1,
                step: 2,
            },
            false,
        ),
        // generic
        CommandSpec::all_keys("del", false),
        CommandSpec::all_keys("unlink", false),
        CommandSpec::all_keys("exists", true),
        CommandSpec::one_key("expire", false),
        CommandSpec::one_key("persist", false),
        CommandSpec::one_key("ttl", true),
        CommandSpec::one_key("pttl", true),
        CommandSpec::one_key("type", true),
        CommandSpec::new("rename", KeySpec::Positions(vec![1, 2]), false),
        // hashes
        CommandSpec::one_key("hget", true),
        CommandSpec::one_key("hmget", true),
        CommandSpec::one_key("hgetall", true),
        CommandSpec::one_key("hkeys", true),
        CommandSpec::one_key("hvals", true),
        CommandSpec::one_key("hlen", true),
        CommandSpec::one_key("hexists", true),
        CommandSpec::one_key("hset", false),
        CommandSpec::one_key("hsetnx", false),
        CommandSpec::one_key("hdel", false),
        CommandSpec::one_key("hincrby", false),
        // lists
        CommandSpec::one_key("lrange", true),
        CommandSpec::one_key("llen", true),
        CommandSpec::one_key("lindex", true),
        CommandSpec::one_key("lpush", false),
        CommandSpec::one_key("rpush", false),
        CommandSpec::one_key("lpop", false),
        CommandSpec::one_key("rpop", false),
        CommandSpec::one_key("lset", false),
        CommandSpec::one_key("ltrim", false),
        // sets
        CommandSpec::one_key("smembers", true),
        CommandSpec::one_key("sismember", true),
        CommandSpec::one_key("scard", true),
        CommandSpec::one_key("srandmember", true),
        CommandSpec::one_key("sadd", false),
        CommandSpec::one_key("srem", false),
        CommandSpec::one_key("spop", false),
        // sorted sets
        CommandSpec::one_key("zrange", true),
        CommandSpec::one_key("zscore", true),
        CommandSpec::one_key("zadd", false),
        CommandSpec::one_key("zrem", false),
    ]
}

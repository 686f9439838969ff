use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

/// The coordinator-issued document telling a member which channels it
/// owns, optionally with per-channel partitions.
///
/// Equality is by value: two assignments compare equal iff their
/// serialized forms are equal. A `BTreeSet` is used for `channels` so
/// that two assignments carrying the same channel set in a different
/// order still compare equal, matching spec §3's invariant without
/// requiring a custom `PartialEq` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Assignment {
    pub channels: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub partitions: HashMap<String, Vec<u32>>,
}

impl Assignment {
    pub fn new(channels: impl IntoIterator<Item = String>) -> Self {
        Self {
            channels: channels.into_iter().collect(),
            partitions: HashMap::new(),
        }
    }
}

/// A message read from a Redis Stream, wrapping its payload and the
/// Redis-assigned `ms-seq` record id it arrived with.
///
/// Created on read, dropped after ack (or re-created on the next
/// PEL-drain / steady-state read on retry).
#[derive(Debug, Clone)]
pub struct RedisMessage {
    /// The channel (Redis Streams key) the message was read from.
    pub channel: String,
    /// The Redis-generated monotonically increasing record id, of the
    /// form `ms-seq`.
    pub record_id: String,
    /// One field value from the stream entry. Field names are not
    /// surfaced — only the field *values* are meaningful to the handler,
    /// per spec §3.
    pub payload: String,
}

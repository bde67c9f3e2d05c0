//! Tags attached to pathway checkpoints.

use std::fmt;

/// Tag keys carried through to the wire payload.
const EDGE_TAG_KEYS: &[&str] = &["type", "direction", "topic", "partition", "group", "exchange"];

/// Edge tag keys that also participate in node hashing.
///
/// `partition` is deliberately absent: a consumer's node identity must not depend on which
/// partition a message happened to land on.
const HASHABLE_TAG_KEYS: &[&str] = &["group", "type", "direction", "topic", "exchange"];

/// A `key:value` pair describing one aspect of a checkpoint, such as the topic or direction.
///
/// Tags with unrecognized keys are accepted but dropped from both the wire payload and the node
/// hash.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag {
    key: String,
    value: String,
}

impl Tag {
    /// Creates a new tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Returns the tag key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the tag value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns `true` if this tag is carried through to the wire payload.
    pub fn is_edge(&self) -> bool {
        EDGE_TAG_KEYS.contains(&self.key.as_str())
    }

    /// Returns `true` if this tag participates in node hashing.
    pub fn is_hashable(&self) -> bool {
        HASHABLE_TAG_KEYS.contains(&self.key.as_str())
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.key, self.value)
    }
}

/// Filters to the edge-classified tags, preserving input order.
pub fn edge_tags(tags: &[Tag]) -> Vec<Tag> {
    tags.iter().filter(|tag| tag.is_edge()).cloned().collect()
}

/// Renders tags as `key:value` strings sorted by key, the form used on the wire.
pub fn sorted_wire_tags(tags: &[Tag]) -> Vec<String> {
    let mut sorted: Vec<&Tag> = tags.iter().collect();
    sorted.sort();
    sorted.iter().map(|tag| tag.to_string()).collect()
}

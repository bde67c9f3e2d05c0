//! Stable hashing for pathway identities.
//!
//! Node and pathway hashes are part of the wire contract: every language runtime reporting into
//! the same pipeline must derive identical hashes for identical hops, so the algorithm here
//! (64-bit FNV-1 over a canonical rendering of the inputs) must never change.

use crate::tags::Tag;

const FNV_OFFSET_BASIS: u64 = 14695981039346656037;
const FNV_PRIME: u64 = 1099511628211;

/// Hashes the given bytes with 64-bit FNV-1.
pub fn fnv1_64(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for byte in data {
        hash = hash.wrapping_mul(FNV_PRIME) ^ u64::from(*byte);
    }
    hash
}

/// Computes the hash identifying a service node in the hop graph.
///
/// Only tags with hashable keys participate; they are sorted by key and rendered as `key:value`,
/// so the hash is a pure function of the bag of recognized tags regardless of input order.
pub fn node_hash(service: &str, env: &str, primary_tag: &str, tags: &[Tag]) -> u64 {
    let mut hashable: Vec<&Tag> = tags.iter().filter(|tag| tag.is_hashable()).collect();
    hashable.sort_by(|a, b| a.key().cmp(b.key()));

    let mut input = String::with_capacity(
        service.len()
            + env.len()
            + primary_tag.len()
            + hashable.iter().map(|tag| tag.key().len() + tag.value().len() + 1).sum::<usize>(),
    );
    input.push_str(service);
    input.push_str(env);
    input.push_str(primary_tag);
    for tag in hashable {
        input.push_str(tag.key());
        input.push(':');
        input.push_str(tag.value());
    }

    fnv1_64(input.as_bytes())
}

/// Combines a node hash with the parent pathway's hash into the new pathway hash.
///
/// The two hashes are laid out as 16 little-endian bytes (node first), making the combination
/// order-sensitive: swapping node and parent yields a different pathway.
pub fn pathway_hash(node_hash: u64, parent_hash: u64) -> u64 {
    let mut buf = [0u8; 16];
    buf[..8].copy_from_slice(&node_hash.to_le_bytes());
    buf[8..].copy_from_slice(&parent_hash.to_le_bytes());
    fnv1_64(&buf)
}

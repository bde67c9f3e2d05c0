//! Pathway context.

use rand::Rng as _;

/// The identity of a node in the directed graph of service hops.
///
/// A pathway is an immutable value: checkpointing never mutates one, it derives a new pathway
/// whose `hash` chains the current node onto the parent's hash. `pathway_start_ns` is set when
/// the first checkpoint in a chain is taken and is invariant across all descendants;
/// `edge_start_ns` is reset on every checkpoint.
///
/// The default value is the *empty* pathway (all fields zero), which checkpointing treats as
/// "no upstream context".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pathway {
    hash: u64,
    pathway_start_ns: u64,
    edge_start_ns: u64,
}

impl Pathway {
    pub(crate) fn new(hash: u64, pathway_start_ns: u64, edge_start_ns: u64) -> Self {
        Self {
            hash,
            pathway_start_ns,
            edge_start_ns,
        }
    }

    /// Returns the hash identifying this pathway.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Returns when the first checkpoint of this pathway was taken, in nanoseconds since the
    /// Unix epoch.
    pub fn pathway_start_ns(&self) -> u64 {
        self.pathway_start_ns
    }

    /// Returns when the most recent checkpoint was taken, in nanoseconds since the Unix epoch.
    pub fn edge_start_ns(&self) -> u64 {
        self.edge_start_ns
    }

    /// Returns `true` if this is the empty pathway.
    pub fn is_empty(&self) -> bool {
        self.hash == 0 && self.pathway_start_ns == 0 && self.edge_start_ns == 0
    }

    /// Picks the pathway to continue from when a message has several upstream contexts.
    ///
    /// There is no way to combine pathways, so the policy is to pick one: a uniformly random
    /// element of the input. Callers must tolerate the non-determinism. An empty input yields
    /// the empty pathway.
    pub fn merge(pathways: &[Pathway]) -> Pathway {
        match pathways.len() {
            0 => Pathway::default(),
            1 => pathways[0],
            len => pathways[rand::thread_rng().gen_range(0..len)],
        }
    }
}

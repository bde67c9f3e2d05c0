//! Wire payload for the pipeline-stats intake.
//!
//! The intake decodes payloads as MessagePack maps with a fixed field order, so the struct
//! field order below is a wire contract: serialization goes through
//! [`rmp_serde::encode::write_named`], which emits map entries in declaration order. Do not
//! reorder fields.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One flush's worth of aggregated pipeline statistics.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsPayload {
    /// Deployment environment of the reporting service.
    pub env: String,

    /// Name of the reporting service.
    pub service: String,

    /// Primary tag of the reporting service, e.g. a datacenter or availability zone.
    pub primary_tag: String,

    /// Aggregated buckets, one entry per flushed window and timestamp type.
    pub stats: Vec<StatsBucket>,

    /// Version of the library that produced this payload.
    pub tracer_version: String,

    /// Language label of the producing runtime.
    pub lang: String,
}

/// Statistics for one aggregation window.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsBucket {
    /// Window start, in nanoseconds since the Unix epoch, aligned to the window duration.
    pub start: u64,

    /// Window duration in nanoseconds.
    pub duration: u64,

    /// Per-pathway statistics recorded in this window.
    pub stats: Vec<StatsPoint>,

    /// Queue-position snapshots recorded in this window.
    pub backlogs: Vec<Backlog>,
}

/// Latency distributions for one pathway hash within a window.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatsPoint {
    /// Deprecated; always empty, present for decoder compatibility.
    pub service: String,

    /// Edge tags of the hop, rendered as `key:value` and sorted by key.
    pub edge_tags: Vec<String>,

    /// Hash of the pathway ending at this hop.
    pub hash: u64,

    /// Hash of the parent pathway.
    pub parent_hash: u64,

    /// Protobuf-encoded DDSketch of latencies from pathway origin, in seconds.
    #[serde(with = "serde_bytes")]
    pub pathway_latency: Vec<u8>,

    /// Protobuf-encoded DDSketch of latencies from the previous hop, in seconds.
    #[serde(with = "serde_bytes")]
    pub edge_latency: Vec<u8>,

    /// Which bucket map produced this point: `"current"` or `"origin"`.
    pub timestamp_type: String,
}

/// A broker-side queue position snapshot, used by the backend to compute lag.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Backlog {
    /// Offset identity, rendered as `key:value` and sorted by key.
    pub tags: Vec<String>,

    /// The queue offset.
    pub value: i64,
}

/// Encodes the payload as MessagePack.
pub fn encode(payload: &StatsPayload) -> Result<Vec<u8>, EncodeError> {
    let mut buf = Vec::new();
    rmp_serde::encode::write_named(&mut buf, payload).map_err(EncodeError)?;
    Ok(buf)
}

/// Error type for payload encoding.
#[derive(Debug)]
pub struct EncodeError(rmp_serde::encode::Error);

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to encode pipeline stats as MessagePack: {}", self.0)
    }
}

impl std::error::Error for EncodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

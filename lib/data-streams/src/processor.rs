//! Checkpoint processing facade.

use std::collections::BTreeMap;

use crate::aggregator::{Aggregator, AggregatorOffset, AggregatorPoint, AggregatorTask, OffsetKind};
use crate::config::Config;
use crate::error::GenericError;
use crate::hash::{node_hash, pathway_hash};
use crate::pathway::Pathway;
use crate::propagator::{self, HeaderCarrier};
use crate::tags::{self, Tag};
use crate::time::unix_now_ns;
use crate::transport::{AgentTransport, Transport};

/// Entry point for instrumenting produce and consume calls.
///
/// The processor derives pathway hashes from its configured service identity, emits one latency
/// point per checkpoint into the aggregator, and moves pathway context in and out of message
/// headers. Pathway context is threaded explicitly: every checkpoint takes the previous
/// [`Pathway`] (if any) and returns the new one.
///
/// All reporting is fire-and-forget; no method here blocks on I/O or fails the instrumented
/// call.
pub struct Processor {
    service: String,
    env: String,
    primary_tag: String,
    aggregator: Aggregator,
}

impl Processor {
    /// Builds a processor from configuration, starting the aggregator when the agent is
    /// enabled.
    ///
    /// With the agent disabled the returned task is `None`, nothing runs in the background, and
    /// every reporting call is a successful no-op. Otherwise the caller owns the returned
    /// [`AggregatorTask`] and should stop it on shutdown to flush buffered windows.
    pub fn from_config(config: &Config) -> Result<(Self, Option<AggregatorTask>), GenericError> {
        if !config.agent_enabled {
            return Ok((Self::new(config, Aggregator::disabled()), None));
        }

        let transport = AgentTransport::new(config)?;
        let (aggregator, task) = Aggregator::start(config, transport);
        Ok((Self::new(config, aggregator), Some(task)))
    }

    /// Builds a processor reporting through the given transport.
    pub fn with_transport<T: Transport>(config: &Config, transport: T) -> (Self, AggregatorTask) {
        let (aggregator, task) = Aggregator::start(config, transport);
        (Self::new(config, aggregator), task)
    }

    fn new(config: &Config, aggregator: Aggregator) -> Self {
        Self {
            service: config.service.clone(),
            env: config.env.clone(),
            primary_tag: config.primary_tag.clone(),
            aggregator,
        }
    }

    /// Returns the aggregator handle this processor reports into.
    pub fn aggregator(&self) -> &Aggregator {
        &self.aggregator
    }

    /// Advances the pathway by one hop, emitting one latency point.
    ///
    /// A missing or empty previous pathway starts a new one at the current instant, so the
    /// first checkpoint of a chain reports zero latencies.
    pub fn checkpoint(&self, previous: Option<Pathway>, tags: &[Tag]) -> Pathway {
        self.checkpoint_at(previous, tags, unix_now_ns())
    }

    /// Advances the pathway by one hop at an explicit instant.
    pub fn checkpoint_at(&self, previous: Option<Pathway>, tags: &[Tag], now_ns: u64) -> Pathway {
        let previous = match previous {
            Some(pathway) if !pathway.is_empty() => pathway,
            _ => Pathway::new(0, now_ns, now_ns),
        };

        let node_hash = node_hash(&self.service, &self.env, &self.primary_tag, tags);
        let pathway = Pathway::new(
            pathway_hash(node_hash, previous.hash()),
            previous.pathway_start_ns(),
            now_ns,
        );

        self.aggregator.add_point(AggregatorPoint {
            edge_tags: tags::edge_tags(tags),
            hash: pathway.hash(),
            parent_hash: previous.hash(),
            pathway_latency_ns: now_ns.saturating_sub(previous.pathway_start_ns()),
            edge_latency_ns: now_ns.saturating_sub(previous.edge_start_ns()),
            timestamp_ns: previous.pathway_start_ns(),
        });

        pathway
    }

    /// Checkpoints and injects the new context into the outgoing message's headers.
    pub fn produce_checkpoint<C: HeaderCarrier + ?Sized>(
        &self, previous: Option<Pathway>, tags: &[Tag], carrier: &mut C,
    ) -> Pathway {
        let pathway = self.checkpoint(previous, tags);
        propagator::inject(&pathway, carrier);
        pathway
    }

    /// Extracts the upstream context from an incoming message's headers and checkpoints from
    /// it.
    ///
    /// Missing or malformed context starts a fresh pathway.
    pub fn consume_checkpoint<C: HeaderCarrier + ?Sized>(&self, carrier: &C, tags: &[Tag]) -> Pathway {
        self.checkpoint(propagator::extract(carrier), tags)
    }

    /// Records a broker-side queue position observed now.
    pub fn add_backlog(&self, kind: OffsetKind, offset: i64, tags: BTreeMap<String, String>) {
        self.add_backlog_at(kind, offset, tags, unix_now_ns());
    }

    /// Records a broker-side queue position observed at an explicit instant.
    pub fn add_backlog_at(&self, kind: OffsetKind, offset: i64, tags: BTreeMap<String, String>, now_ns: u64) {
        self.aggregator.add_offset(AggregatorOffset {
            offset,
            timestamp_ns: now_ns,
            kind,
            tags,
        });
    }
}

//! Time-bucketed aggregation of checkpoint latencies and queue offsets.
//!
//! A single long-lived actor owns all aggregation state. Producers hand it points and offsets
//! through an unbounded channel, so instrumented call sites never block on aggregation or I/O;
//! the actor groups everything into 10-second windows and periodically moves completed windows
//! off to the transport. Encoding and sending run in a detached task, off the actor's critical
//! path, with the outcome posted back only to update counters.
//!
//! Flush failures are counted and otherwise ignored: flushed windows leave the state regardless
//! of whether the transport accepted them, so a broken agent costs memory for at most one
//! window's worth of in-flight payload.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use ddsketch::DDSketch;
use tokio::select;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

use crate::config::Config;
use crate::error::GenericError;
use crate::payload::{self, Backlog, StatsBucket, StatsPayload, StatsPoint};
use crate::tags::{self, Tag};
use crate::time::unix_now_ns;
use crate::transport::Transport;

mod telemetry;
use self::telemetry::Telemetry;

/// Width of one aggregation window, in nanoseconds.
pub const BUCKET_DURATION_NS: u64 = 10_000_000_000;

/// Language label reported in the payload.
const LANG: &str = "rust";

/// One latency measurement emitted by a checkpoint.
#[derive(Clone, Debug)]
pub struct AggregatorPoint {
    /// Edge-classified tags of the hop, in their original order.
    pub edge_tags: Vec<Tag>,

    /// Hash of the pathway ending at this hop.
    pub hash: u64,

    /// Hash of the parent pathway.
    pub parent_hash: u64,

    /// Latency from the pathway origin, in nanoseconds.
    pub pathway_latency_ns: u64,

    /// Latency from the previous hop, in nanoseconds.
    pub edge_latency_ns: u64,

    /// The pathway's start timestamp, in nanoseconds since the Unix epoch.
    ///
    /// This is the pathway start rather than the checkpoint time so that the origin-window key
    /// can be derived from the point alone.
    pub timestamp_ns: u64,
}

/// A broker-side queue position snapshot.
#[derive(Clone, Debug)]
pub struct AggregatorOffset {
    /// The queue offset.
    pub offset: i64,

    /// When the offset was observed, in nanoseconds since the Unix epoch.
    pub timestamp_ns: u64,

    /// Which offset family this snapshot belongs to.
    pub kind: OffsetKind,

    /// Identity of the queue position (topic, partition, consumer group, ...). Snapshots with
    /// equal tags supersede each other within a window.
    pub tags: BTreeMap<String, String>,
}

/// The two offset families tracked per window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OffsetKind {
    /// A consumer commit position.
    Commit,
    /// A producer high-water mark.
    Produce,
}

/// Which bucket map a window came from; becomes the wire `TimestampType`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TimestampKind {
    Current,
    Origin,
}

impl TimestampKind {
    fn as_str(self) -> &'static str {
        match self {
            Self::Current => "current",
            Self::Origin => "origin",
        }
    }
}

/// Aligns a timestamp down to the start of its window.
fn align_timestamp(timestamp_ns: u64) -> u64 {
    timestamp_ns - (timestamp_ns % BUCKET_DURATION_NS)
}

/// Per-pathway-hash accumulator inside a bucket.
struct Group {
    edge_tags: Vec<Tag>,
    hash: u64,
    parent_hash: u64,
    pathway_latency: DDSketch,
    edge_latency: DDSketch,
}

impl Group {
    fn new(point: &AggregatorPoint) -> Self {
        Self {
            edge_tags: point.edge_tags.clone(),
            hash: point.hash,
            parent_hash: point.parent_hash,
            pathway_latency: DDSketch::default(),
            edge_latency: DDSketch::default(),
        }
    }

    fn into_stats_point(self, kind: TimestampKind) -> StatsPoint {
        StatsPoint {
            // Deprecated wire field, always empty.
            service: String::new(),
            edge_tags: tags::sorted_wire_tags(&self.edge_tags),
            hash: self.hash,
            parent_hash: self.parent_hash,
            pathway_latency: self.pathway_latency.to_proto_bytes(),
            edge_latency: self.edge_latency.to_proto_bytes(),
            timestamp_type: kind.as_str().to_string(),
        }
    }
}

/// One 10-second aggregation window.
struct Bucket {
    start_ns: u64,
    groups: HashMap<u64, Group>,
    latest_commit_offsets: Vec<AggregatorOffset>,
    latest_produce_offsets: Vec<AggregatorOffset>,
}

impl Bucket {
    fn new(start_ns: u64) -> Self {
        Self {
            start_ns,
            groups: HashMap::new(),
            latest_commit_offsets: Vec::new(),
            latest_produce_offsets: Vec::new(),
        }
    }

    fn into_stats_bucket(self, kind: TimestampKind) -> StatsBucket {
        let mut groups: Vec<Group> = self.groups.into_values().collect();
        groups.sort_by_key(|group| group.hash);

        StatsBucket {
            start: self.start_ns,
            duration: BUCKET_DURATION_NS,
            stats: groups.into_iter().map(|group| group.into_stats_point(kind)).collect(),
            backlogs: self
                .latest_commit_offsets
                .iter()
                .chain(&self.latest_produce_offsets)
                .map(offset_to_backlog)
                .collect(),
        }
    }
}

fn offset_to_backlog(offset: &AggregatorOffset) -> Backlog {
    Backlog {
        tags: offset.tags.iter().map(|(key, value)| format!("{}:{}", key, value)).collect(),
        value: offset.offset,
    }
}

/// The aggregation state proper, free of any actor plumbing.
struct AggregatorState {
    service: String,
    env: String,
    primary_tag: String,

    /// Buckets keyed by the checkpoint-time window of each point.
    current_buckets: HashMap<u64, Bucket>,

    /// Buckets keyed by the pathway-origin window of each point.
    origin_buckets: HashMap<u64, Bucket>,
}

impl AggregatorState {
    fn new(config: &Config) -> Self {
        Self {
            service: config.service.clone(),
            env: config.env.clone(),
            primary_tag: config.primary_tag.clone(),
            current_buckets: HashMap::new(),
            origin_buckets: HashMap::new(),
        }
    }

    fn add_point(&mut self, point: &AggregatorPoint) {
        let pathway_latency_secs = (point.pathway_latency_ns as f64 / 1e9).max(0.0);
        let edge_latency_secs = (point.edge_latency_ns as f64 / 1e9).max(0.0);

        let current_key = align_timestamp(point.timestamp_ns);
        Self::record(
            &mut self.current_buckets,
            current_key,
            point,
            pathway_latency_secs,
            edge_latency_secs,
        );

        let origin_key = align_timestamp(point.timestamp_ns.saturating_sub(point.pathway_latency_ns));
        Self::record(
            &mut self.origin_buckets,
            origin_key,
            point,
            pathway_latency_secs,
            edge_latency_secs,
        );
    }

    fn record(
        buckets: &mut HashMap<u64, Bucket>, start_ns: u64, point: &AggregatorPoint, pathway_latency_secs: f64,
        edge_latency_secs: f64,
    ) {
        let bucket = buckets.entry(start_ns).or_insert_with(|| Bucket::new(start_ns));
        let group = bucket.groups.entry(point.hash).or_insert_with(|| Group::new(point));
        group.pathway_latency.add(pathway_latency_secs);
        group.edge_latency.add(edge_latency_secs);
    }

    fn add_offset(&mut self, offset: AggregatorOffset) {
        let start_ns = align_timestamp(offset.timestamp_ns);
        let bucket = self
            .current_buckets
            .entry(start_ns)
            .or_insert_with(|| Bucket::new(start_ns));

        let list = match offset.kind {
            OffsetKind::Commit => &mut bucket.latest_commit_offsets,
            OffsetKind::Produce => &mut bucket.latest_produce_offsets,
        };
        match list.iter_mut().find(|existing| existing.tags == offset.tags) {
            Some(existing) => *existing = offset,
            None => list.push(offset),
        }
    }

    /// Removes every flushable bucket and encodes them into a payload.
    ///
    /// A window is flushable once it has been closed for a full window's width (`now >= start +
    /// duration`), or unconditionally when `force` is set. Flushed buckets leave the state here,
    /// before the payload reaches the transport, so a delivery failure never causes a retry.
    fn flush(&mut self, now_ns: u64, force: bool) -> Option<StatsPayload> {
        let mut stats = Vec::new();
        drain_flushable(&mut self.current_buckets, now_ns, force, TimestampKind::Current, &mut stats);
        drain_flushable(&mut self.origin_buckets, now_ns, force, TimestampKind::Origin, &mut stats);

        if stats.is_empty() {
            return None;
        }

        Some(StatsPayload {
            env: self.env.clone(),
            service: self.service.clone(),
            primary_tag: self.primary_tag.clone(),
            stats,
            tracer_version: env!("CARGO_PKG_VERSION").to_string(),
            lang: LANG.to_string(),
        })
    }
}

fn drain_flushable(
    buckets: &mut HashMap<u64, Bucket>, now_ns: u64, force: bool, kind: TimestampKind, out: &mut Vec<StatsBucket>,
) {
    let mut flushable: Vec<u64> = buckets
        .keys()
        .copied()
        .filter(|start_ns| force || now_ns >= start_ns + BUCKET_DURATION_NS)
        .collect();
    flushable.sort_unstable();

    for start_ns in flushable {
        if let Some(bucket) = buckets.remove(&start_ns) {
            out.push(bucket.into_stats_bucket(kind));
        }
    }
}

enum Message {
    Point(AggregatorPoint),
    Offset(AggregatorOffset),
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Handle for feeding the aggregator.
///
/// Cheap to clone; all clones feed the same actor. `add_point` and `add_offset` are
/// fire-and-forget: they never block, and when the aggregator is disabled they accept and
/// discard their input.
#[derive(Clone)]
pub struct Aggregator {
    tx: Option<mpsc::UnboundedSender<Message>>,
}

impl Aggregator {
    /// Starts the aggregator actor on the current tokio runtime.
    ///
    /// Returns the producer-facing handle and the [`AggregatorTask`] owning the actor's
    /// lifecycle.
    pub fn start<T: Transport>(config: &Config, transport: T) -> (Aggregator, AggregatorTask) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();

        let actor = AggregatorActor {
            state: AggregatorState::new(config),
            rx,
            transport: Arc::new(transport),
            telemetry: Telemetry::new(),
            results_tx,
            results_rx,
        };
        let handle = tokio::spawn(actor.run());

        (Aggregator { tx: Some(tx.clone()) }, AggregatorTask { tx, handle })
    }

    /// Creates a disabled aggregator: no actor runs and all input is accepted and discarded.
    pub fn disabled() -> Aggregator {
        Aggregator { tx: None }
    }

    /// Returns `true` if an actor is consuming this handle's input.
    pub fn is_enabled(&self) -> bool {
        self.tx.is_some()
    }

    /// Records a latency point.
    pub fn add_point(&self, point: AggregatorPoint) {
        if let Some(tx) = &self.tx {
            // A send failure means the actor is gone (process teardown); there is nothing
            // useful to do with the point.
            let _ = tx.send(Message::Point(point));
        }
    }

    /// Records a queue-position snapshot.
    pub fn add_offset(&self, offset: AggregatorOffset) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Message::Offset(offset));
        }
    }

    /// Flushes all closed windows immediately.
    ///
    /// Completes once the resulting payload (if any) has been handed to the transport. Mostly
    /// useful for tests and for hosts that want to flush at their own cadence.
    pub async fn flush(&self) {
        if let Some(tx) = &self.tx {
            let (ack_tx, ack_rx) = oneshot::channel();
            if tx.send(Message::Flush(ack_tx)).is_ok() {
                let _ = ack_rx.await;
            }
        }
    }
}

/// Owns the running aggregator actor.
pub struct AggregatorTask {
    tx: mpsc::UnboundedSender<Message>,
    handle: JoinHandle<()>,
}

impl AggregatorTask {
    /// Stops the aggregator gracefully.
    ///
    /// Everything enqueued before this call is aggregated, then every remaining window (closed
    /// or not) is flushed synchronously before the actor exits.
    pub async fn stop(self) {
        let _ = self.tx.send(Message::Shutdown);
        if let Err(e) = self.handle.await {
            error!(error = %e, "Pipeline stats aggregator task panicked.");
        }
    }
}

struct AggregatorActor<T> {
    state: AggregatorState,
    rx: mpsc::UnboundedReceiver<Message>,
    transport: Arc<T>,
    telemetry: Telemetry,
    results_tx: mpsc::UnboundedSender<Result<(), GenericError>>,
    results_rx: mpsc::UnboundedReceiver<Result<(), GenericError>>,
}

impl<T: Transport> AggregatorActor<T> {
    async fn run(mut self) {
        let mut flush_ticker = interval(Duration::from_nanos(BUCKET_DURATION_NS));
        flush_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        flush_ticker.tick().await;

        debug!("Pipeline stats aggregator started.");

        loop {
            select! {
                maybe_message = self.rx.recv() => match maybe_message {
                    Some(Message::Point(point)) => {
                        self.telemetry.increment_payloads_in();
                        self.state.add_point(&point);
                    }
                    Some(Message::Offset(offset)) => self.state.add_offset(offset),
                    Some(Message::Flush(ack)) => {
                        self.flush_now(false).await;
                        let _ = ack.send(());
                    }
                    Some(Message::Shutdown) | None => break,
                },
                _ = flush_ticker.tick() => self.flush_detached(),
                Some(result) = self.results_rx.recv() => self.record_send_result(result),
            }
        }

        // Final flush: all remaining windows go out synchronously, so a graceful shutdown loses
        // nothing that was enqueued before it.
        self.flush_now(true).await;
        debug!("Pipeline stats aggregator stopped.");
    }

    /// Periodic flush path: encode and send off the actor's critical path.
    fn flush_detached(&mut self) {
        let Some(stats_payload) = self.state.flush(unix_now_ns(), false) else {
            return;
        };
        self.telemetry.increment_flushed_buckets(stats_payload.stats.len() as u64);

        let transport = Arc::clone(&self.transport);
        let results_tx = self.results_tx.clone();
        tokio::spawn(async move {
            let result = send_payload(transport.as_ref(), &stats_payload).await;
            let _ = results_tx.send(result);
        });
    }

    /// Explicit and shutdown flush path: wait for the transport before returning.
    async fn flush_now(&mut self, force: bool) {
        let Some(stats_payload) = self.state.flush(unix_now_ns(), force) else {
            return;
        };
        self.telemetry.increment_flushed_buckets(stats_payload.stats.len() as u64);

        let result = send_payload(self.transport.as_ref(), &stats_payload).await;
        self.record_send_result(result);
    }

    fn record_send_result(&self, result: Result<(), GenericError>) {
        match result {
            Ok(()) => self.telemetry.increment_flushed_payloads(),
            Err(e) => {
                error!(error = %e, "Failed to flush pipeline stats.");
                self.telemetry.increment_flush_errors();
            }
        }
    }
}

async fn send_payload<T: Transport>(transport: &T, stats_payload: &StatsPayload) -> Result<(), GenericError> {
    let bytes = payload::encode(stats_payload)?;
    transport.send_pipeline_stats(bytes).await
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;

    fn test_config() -> Config {
        Config {
            service: "svc".to_string(),
            env: "prod".to_string(),
            primary_tag: "dc:us1".to_string(),
            agent_enabled: true,
            ..Config::default()
        }
    }

    fn test_state() -> AggregatorState {
        AggregatorState::new(&test_config())
    }

    fn sample_point(timestamp_ns: u64, pathway_latency_ns: u64) -> AggregatorPoint {
        AggregatorPoint {
            edge_tags: vec![Tag::new("topic", "orders"), Tag::new("direction", "out")],
            hash: 2,
            parent_hash: 1,
            pathway_latency_ns,
            edge_latency_ns: pathway_latency_ns / 2,
            timestamp_ns,
        }
    }

    const TS: u64 = 1_678_471_420_000_000_000;

    #[test]
    fn test_bucket_placement() {
        let mut state = test_state();
        state.add_point(&sample_point(TS, 10_000_000_000));

        assert_eq!(state.current_buckets.len(), 1);
        assert_eq!(state.origin_buckets.len(), 1);

        let current = state.current_buckets.get(&TS).expect("current bucket at checkpoint window");
        assert_eq!(current.start_ns, TS);

        let origin_key = 1_678_471_410_000_000_000;
        let origin = state.origin_buckets.get(&origin_key).expect("origin bucket one window back");
        assert_eq!(origin.start_ns, origin_key);
    }

    #[test]
    fn test_groups_keyed_by_hash_with_stable_parent() {
        let mut state = test_state();
        state.add_point(&sample_point(TS, 1_000_000_000));
        state.add_point(&sample_point(TS + 1, 2_000_000_000));

        let bucket = state.current_buckets.get(&TS).unwrap();
        assert_eq!(bucket.groups.len(), 1);

        let group = bucket.groups.get(&2).unwrap();
        assert_eq!(group.hash, 2);
        assert_eq!(group.parent_hash, 1);
        assert_eq!(group.pathway_latency.count(), 2.0);
        assert_eq!(group.edge_latency.count(), 2.0);
    }

    fn sample_offset(offset: i64) -> AggregatorOffset {
        AggregatorOffset {
            offset,
            timestamp_ns: 1_687_986_447_538_450_340,
            kind: OffsetKind::Commit,
            tags: BTreeMap::from([
                ("consumer_group".to_string(), "test-group".to_string()),
                ("partition".to_string(), "0".to_string()),
                ("topic".to_string(), "test-topic".to_string()),
                ("type".to_string(), "kafka_commit".to_string()),
            ]),
        }
    }

    #[test]
    fn test_offset_upsert_by_tag_identity() {
        let mut state = test_state();
        state.add_offset(sample_offset(13));
        state.add_offset(sample_offset(13));

        let start_ns = align_timestamp(1_687_986_447_538_450_340);
        let bucket = state.current_buckets.get(&start_ns).unwrap();
        assert_eq!(bucket.latest_commit_offsets.len(), 1);

        // A later snapshot with the same identity replaces the stored one.
        state.add_offset(sample_offset(21));
        let bucket = state.current_buckets.get(&start_ns).unwrap();
        assert_eq!(bucket.latest_commit_offsets.len(), 1);
        assert_eq!(bucket.latest_commit_offsets[0].offset, 21);

        // A different identity appends.
        let mut other = sample_offset(5);
        other.tags.insert("partition".to_string(), "1".to_string());
        state.add_offset(other);
        let bucket = state.current_buckets.get(&start_ns).unwrap();
        assert_eq!(bucket.latest_commit_offsets.len(), 2);
    }

    #[test]
    fn test_flush_predicate() {
        let mut state = test_state();
        state.add_point(&sample_point(TS, 0));

        // The window is still open, and stays unflushable for a full window after closing.
        assert!(state.flush(TS + BUCKET_DURATION_NS - 1, false).is_none());
        assert_eq!(state.current_buckets.len(), 1);

        let stats_payload = state.flush(TS + BUCKET_DURATION_NS, false).expect("closed window flushes");
        assert_eq!(stats_payload.stats.len(), 2);
        assert!(state.current_buckets.is_empty());
        assert!(state.origin_buckets.is_empty());
    }

    #[test]
    fn test_flush_force_takes_open_windows() {
        let mut state = test_state();
        state.add_point(&sample_point(TS, 0));

        let stats_payload = state.flush(TS, true).expect("force flush takes everything");
        assert_eq!(stats_payload.stats.len(), 2);
        assert!(state.current_buckets.is_empty());
    }

    #[test]
    fn test_flush_empty_state_yields_no_payload() {
        let mut state = test_state();
        assert!(state.flush(u64::MAX, true).is_none());
    }

    #[test]
    fn test_flush_payload_contents() {
        let mut state = test_state();
        state.add_point(&sample_point(TS, 10_000_000_000));
        state.add_offset(AggregatorOffset {
            offset: 42,
            timestamp_ns: TS,
            kind: OffsetKind::Produce,
            tags: BTreeMap::from([
                ("topic".to_string(), "orders".to_string()),
                ("partition".to_string(), "0".to_string()),
            ]),
        });

        let stats_payload = state.flush(u64::MAX - BUCKET_DURATION_NS, false).unwrap();
        assert_eq!(stats_payload.service, "svc");
        assert_eq!(stats_payload.env, "prod");
        assert_eq!(stats_payload.primary_tag, "dc:us1");
        assert_eq!(stats_payload.lang, "rust");

        // One current bucket and one origin bucket, labeled by their map of origin.
        assert_eq!(stats_payload.stats.len(), 2);
        let current = &stats_payload.stats[0];
        assert_eq!(current.start, TS);
        assert_eq!(current.duration, BUCKET_DURATION_NS);
        assert_eq!(current.stats[0].timestamp_type, "current");
        assert_eq!(current.stats[0].hash, 2);
        assert_eq!(current.stats[0].parent_hash, 1);
        assert_eq!(current.stats[0].service, "");
        assert_eq!(
            current.stats[0].edge_tags,
            vec!["direction:out".to_string(), "topic:orders".to_string()]
        );
        assert!(!current.stats[0].pathway_latency.is_empty());

        // The backlog rides in the current bucket, tags sorted.
        assert_eq!(current.backlogs.len(), 1);
        assert_eq!(current.backlogs[0].value, 42);
        assert_eq!(
            current.backlogs[0].tags,
            vec!["partition:0".to_string(), "topic:orders".to_string()]
        );

        let origin = &stats_payload.stats[1];
        assert_eq!(origin.start, TS - BUCKET_DURATION_NS);
        assert_eq!(origin.stats[0].timestamp_type, "origin");
        assert!(origin.backlogs.is_empty());
    }

    #[derive(Clone, Default)]
    struct MockTransport {
        payloads: Arc<Mutex<Vec<Vec<u8>>>>,
        fail: bool,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send_pipeline_stats(&self, payload: Vec<u8>) -> Result<(), GenericError> {
            self.payloads.lock().unwrap().push(payload);
            if self.fail {
                return Err(anyhow::anyhow!("intake unavailable"));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_actor_flush_and_shutdown() {
        let transport = MockTransport::default();
        let payloads = Arc::clone(&transport.payloads);

        let (aggregator, task) = Aggregator::start(&test_config(), transport);

        aggregator.add_point(sample_point(TS, 10_000_000_000));
        aggregator.flush().await;
        assert_eq!(payloads.lock().unwrap().len(), 1);

        let decoded: StatsPayload = rmp_serde::from_slice(&payloads.lock().unwrap()[0]).unwrap();
        assert_eq!(decoded.service, "svc");
        assert_eq!(decoded.stats.len(), 2);

        // A point enqueued before shutdown must survive into the final flush, even though its
        // window is still open.
        aggregator.add_point(sample_point(unix_now_ns(), 1_000_000));
        task.stop().await;
        assert_eq!(payloads.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_actor_drops_buckets_on_transport_failure() {
        let transport = MockTransport {
            fail: true,
            ..MockTransport::default()
        };
        let payloads = Arc::clone(&transport.payloads);

        let (aggregator, task) = Aggregator::start(&test_config(), transport);

        aggregator.add_point(sample_point(TS, 0));
        aggregator.flush().await;
        assert_eq!(payloads.lock().unwrap().len(), 1);

        // The failed payload's buckets are gone; a second flush has nothing to send.
        aggregator.flush().await;
        assert_eq!(payloads.lock().unwrap().len(), 1);

        task.stop().await;
    }

    #[tokio::test]
    async fn test_disabled_aggregator_accepts_and_discards() {
        let aggregator = Aggregator::disabled();
        assert!(!aggregator.is_enabled());

        aggregator.add_point(sample_point(TS, 0));
        aggregator.add_offset(sample_offset(13));
        aggregator.flush().await;
    }
}

//! End-to-end flow: checkpoints through header propagation into a flushed payload.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use data_streams::payload::{StatsPayload, StatsPoint};
use data_streams::transport::Transport;
use data_streams::{hash, Config, GenericError, OffsetKind, Processor, Tag};
use datastreams_protos::sketches::DdSketch;
use datastreams_protos::Message as _;

#[derive(Clone, Default)]
struct CaptureTransport {
    payloads: Arc<Mutex<Vec<Vec<u8>>>>,
}

#[async_trait]
impl Transport for CaptureTransport {
    async fn send_pipeline_stats(&self, payload: Vec<u8>) -> Result<(), GenericError> {
        self.payloads.lock().unwrap().push(payload);
        Ok(())
    }
}

fn test_config() -> Config {
    Config {
        service: "service-1".to_string(),
        env: "env".to_string(),
        primary_tag: "d:1".to_string(),
        agent_enabled: true,
        ..Config::default()
    }
}

fn find_point<'a>(payload: &'a StatsPayload, hash: u64, timestamp_type: &str) -> &'a StatsPoint {
    payload
        .stats
        .iter()
        .flat_map(|bucket| bucket.stats.iter())
        .find(|point| point.hash == hash && point.timestamp_type == timestamp_type)
        .unwrap_or_else(|| panic!("no {} point with hash {}", timestamp_type, hash))
}

#[tokio::test]
async fn produce_consume_flush_roundtrip() {
    let transport = CaptureTransport::default();
    let payloads = Arc::clone(&transport.payloads);

    let config = test_config();
    let (processor, task) = Processor::with_transport(&config, transport);

    // Producer side: checkpoint and inject context into the message headers.
    let produce_tags = [
        Tag::new("direction", "out"),
        Tag::new("topic", "orders"),
        Tag::new("type", "kafka"),
    ];
    let mut headers: HashMap<String, Vec<u8>> = HashMap::new();
    let produced = processor.produce_checkpoint(None, &produce_tags, &mut headers);

    // Consumer side: pick the context back up from the headers.
    let consume_tags = [
        Tag::new("direction", "in"),
        Tag::new("topic", "orders"),
        Tag::new("type", "kafka"),
        Tag::new("partition", "0"),
    ];
    let consumed = processor.consume_checkpoint(&headers, &consume_tags);

    processor.add_backlog(
        OffsetKind::Commit,
        13,
        BTreeMap::from([
            ("consumer_group".to_string(), "cg".to_string()),
            ("topic".to_string(), "orders".to_string()),
            ("type".to_string(), "kafka_commit".to_string()),
        ]),
    );

    // Stopping the task forces a final flush of the still-open windows.
    task.stop().await;

    let payloads = payloads.lock().unwrap();
    assert_eq!(payloads.len(), 1);

    let decoded: StatsPayload = rmp_serde::from_slice(&payloads[0]).expect("payload must decode");
    assert_eq!(decoded.service, "service-1");
    assert_eq!(decoded.env, "env");
    assert_eq!(decoded.primary_tag, "d:1");
    assert_eq!(decoded.lang, "rust");
    assert!(!decoded.tracer_version.is_empty());

    // Every flushed window is aligned and a full window wide.
    assert!(decoded.stats.len() >= 2, "expected current and origin buckets");
    for bucket in &decoded.stats {
        assert_eq!(bucket.duration, 10_000_000_000);
        assert_eq!(bucket.start % bucket.duration, 0);
    }

    // The hashes on the wire chain producer to consumer exactly as derived locally.
    let produce_node = hash::node_hash("service-1", "env", "d:1", &produce_tags);
    assert_eq!(produced.hash(), hash::pathway_hash(produce_node, 0));
    let consume_node = hash::node_hash("service-1", "env", "d:1", &consume_tags);
    assert_eq!(consumed.hash(), hash::pathway_hash(consume_node, produced.hash()));

    // Both hops show up under both timestamp types.
    let produce_point = find_point(&decoded, produced.hash(), "current");
    assert_eq!(produce_point.parent_hash, 0);
    assert_eq!(produce_point.service, "");
    assert_eq!(
        produce_point.edge_tags,
        vec!["direction:out".to_string(), "topic:orders".to_string(), "type:kafka".to_string()]
    );

    let consume_point = find_point(&decoded, consumed.hash(), "current");
    assert_eq!(consume_point.parent_hash, produced.hash());
    assert_eq!(
        consume_point.edge_tags,
        vec![
            "direction:in".to_string(),
            "partition:0".to_string(),
            "topic:orders".to_string(),
            "type:kafka".to_string()
        ]
    );

    find_point(&decoded, produced.hash(), "origin");
    find_point(&decoded, consumed.hash(), "origin");

    // The latency blobs are valid DDSketch protobufs holding one observation each.
    let sketch = DdSketch::decode(&produce_point.pathway_latency[..]).expect("sketch must decode");
    let mapping = sketch.mapping.expect("mapping must be present");
    assert!((mapping.gamma - 1.01 / 0.99).abs() < 1e-9);
    assert_eq!(mapping.index_offset, 0.0);
    let total: f64 = sketch.zero_count
        + sketch
            .positive_values
            .iter()
            .chain(sketch.negative_values.iter())
            .flat_map(|store| store.contiguous_bin_counts.iter())
            .sum::<f64>();
    assert_eq!(total, 1.0);

    // The backlog rides in a current bucket with sorted tags.
    let backlogs: Vec<_> = decoded.stats.iter().flat_map(|bucket| bucket.backlogs.iter()).collect();
    assert_eq!(backlogs.len(), 1);
    assert_eq!(backlogs[0].value, 13);
    assert_eq!(
        backlogs[0].tags,
        vec!["consumer_group:cg".to_string(), "topic:orders".to_string(), "type:kafka_commit".to_string()]
    );
}

#[tokio::test]
async fn disabled_processor_reports_nothing() {
    let config = Config {
        agent_enabled: false,
        ..test_config()
    };
    let (processor, task) = Processor::from_config(&config).expect("disabled processor must build");
    assert!(task.is_none());
    assert!(!processor.aggregator().is_enabled());

    // All reporting calls succeed as no-ops.
    let mut headers: HashMap<String, Vec<u8>> = HashMap::new();
    let pathway = processor.produce_checkpoint(None, &[Tag::new("topic", "orders")], &mut headers);
    assert!(!pathway.is_empty());
    processor.add_backlog(OffsetKind::Produce, 7, BTreeMap::new());
}

//! Client-side latency instrumentation for asynchronous message pipelines.
//!
//! Applications passing messages through brokers (Kafka and friends) have no single trace that
//! covers a message's journey. This library measures that journey instead: every produce/consume
//! call records a *checkpoint*, which advances a [`Pathway`] — a hashed chain of service hops
//! propagated in-band through message headers — and emits a latency measurement for the hop. The
//! measurements are aggregated locally into 10-second windows as [DDSketch][ddsketch::DDSketch]
//! distributions and periodically flushed to the Datadog agent's pipeline-stats intake.
//!
//! # Usage
//!
//! The [`Processor`] is the entry point. The pathway context is threaded explicitly: callers hold
//! the current [`Pathway`] (or extract it from incoming message headers) and receive a new one
//! from each checkpoint.
//!
//! ```no_run
//! use std::collections::HashMap;
//!
//! use data_streams::{Config, Processor, Tag};
//!
//! # fn main() -> Result<(), data_streams::GenericError> {
//! let config = Config::from_env()?;
//! let (processor, _task) = Processor::from_config(&config)?;
//!
//! // Producer side: checkpoint and inject the context into the outgoing headers.
//! let mut headers: HashMap<String, Vec<u8>> = HashMap::new();
//! let tags = [Tag::new("direction", "out"), Tag::new("topic", "orders"), Tag::new("type", "kafka")];
//! processor.produce_checkpoint(None, &tags, &mut headers);
//!
//! // Consumer side: extract the upstream context and checkpoint from it.
//! let tags = [Tag::new("direction", "in"), Tag::new("topic", "orders"), Tag::new("type", "kafka")];
//! processor.consume_checkpoint(&headers, &tags);
//! # Ok(())
//! # }
//! ```
//!
//! Reporting is fire-and-forget and never blocks or fails the instrumented call: when the agent
//! is disabled all input is accepted and discarded, and flush failures are counted and dropped.

pub mod aggregator;
pub mod config;
pub mod container;
mod error;
pub mod hash;
pub mod pathway;
pub mod payload;
pub mod processor;
pub mod propagator;
pub mod tags;
mod time;
pub mod transport;

pub use self::aggregator::{Aggregator, AggregatorOffset, AggregatorPoint, AggregatorTask, OffsetKind};
pub use self::config::Config;
pub use self::error::GenericError;
pub use self::pathway::Pathway;
pub use self::processor::Processor;
pub use self::propagator::HeaderCarrier;
pub use self::tags::Tag;

use metrics::Counter;

/// Observability counters emitted by the aggregator.
///
/// The counter names are part of the contract with the backend; a `metrics` recorder installed
/// by the host may namespace them further.
#[derive(Clone)]
pub(crate) struct Telemetry {
    payloads_in: Counter,
    flushed_payloads: Counter,
    flushed_buckets: Counter,
    flush_errors: Counter,
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            payloads_in: metrics::counter!("aggregator.payloads_in"),
            flushed_payloads: metrics::counter!("aggregator.flushed_payloads"),
            flushed_buckets: metrics::counter!("aggregator.flushed_buckets"),
            flush_errors: metrics::counter!("aggregator.flush_errors"),
        }
    }

    #[cfg(test)]
    pub fn noop() -> Self {
        Self {
            payloads_in: Counter::noop(),
            flushed_payloads: Counter::noop(),
            flushed_buckets: Counter::noop(),
            flush_errors: Counter::noop(),
        }
    }

    pub fn increment_payloads_in(&self) {
        self.payloads_in.increment(1);
    }

    pub fn increment_flushed_payloads(&self) {
        self.flushed_payloads.increment(1);
    }

    pub fn increment_flushed_buckets(&self, buckets: u64) {
        self.flushed_buckets.increment(buckets);
    }

    pub fn increment_flush_errors(&self) {
        self.flush_errors.increment(1);
    }
}

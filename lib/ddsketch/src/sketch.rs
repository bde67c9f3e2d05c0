//! DDSketch implementation.

use datastreams_protos::sketches::DdSketch as ProtoDdSketch;
use datastreams_protos::Message as _;

use crate::mapping::{IndexMapping, LogarithmicMapping};
use crate::store::{DenseStore, Store};

/// A quantile sketch with relative-error guarantees.
///
/// Observations are partitioned three ways: positive values are indexed through the mapping into
/// the positive store, negative values are indexed by their absolute value into the negative
/// store, and zeros are counted directly. Counts are `f64` so that a sketch can be reweighted
/// after the fact.
///
/// Defaults to a logarithmic index mapping with 1% relative accuracy over dense stores, which
/// works well for tracking latencies where the tail percentiles matter most.
///
/// # Example
///
/// ```
/// use ddsketch::DDSketch;
///
/// let mut sketch = DDSketch::with_relative_accuracy(0.01).unwrap();
/// sketch.add(1.0);
/// sketch.add(2.0);
/// sketch.add(3.0);
///
/// let median = sketch.quantile(0.5);
/// ```
#[derive(Clone, Debug)]
pub struct DDSketch<M: IndexMapping = LogarithmicMapping, S: Store = DenseStore> {
    /// The index mapping for this sketch.
    mapping: M,

    /// Store for positive values.
    positive_store: S,

    /// Store for negative values.
    negative_store: S,

    /// Count of values that map to zero.
    zero_count: f64,
}

impl DDSketch<LogarithmicMapping, DenseStore> {
    /// Creates a new `DDSketch` with the given relative accuracy over dense stores.
    ///
    /// # Errors
    ///
    /// If the relative accuracy is not between `0` and `1`, an error is returned.
    pub fn with_relative_accuracy(relative_accuracy: f64) -> Result<Self, &'static str> {
        let mapping = LogarithmicMapping::new(relative_accuracy)?;
        Ok(Self::new(mapping, DenseStore::new(), DenseStore::new()))
    }
}

impl<M: IndexMapping, S: Store> DDSketch<M, S> {
    /// Creates a new `DDSketch` with the given mapping and stores.
    pub fn new(mapping: M, positive_store: S, negative_store: S) -> Self {
        Self {
            mapping,
            positive_store,
            negative_store,
            zero_count: 0.0,
        }
    }

    /// Adds a single value to the sketch.
    pub fn add(&mut self, value: f64) {
        self.add_with_count(value, 1.0);
    }

    /// Adds a value to the sketch with the given count.
    ///
    /// This is useful for weighted values or pre-aggregated data. Adding a count of zero is a
    /// no-op.
    ///
    /// # Panics
    ///
    /// Panics if the count is negative.
    pub fn add_with_count(&mut self, value: f64, count: f64) {
        assert!(count >= 0.0, "count must not be negative, got {}", count);

        if value > 0.0 {
            self.positive_store.add_with_count(self.mapping.index(value), count);
        } else if value < 0.0 {
            self.negative_store.add_with_count(self.mapping.index(-value), count);
        } else {
            self.zero_count += count;
        }
    }

    /// Returns the approximate value at the given quantile.
    ///
    /// Returns `None` if the sketch is empty.
    ///
    /// # Panics
    ///
    /// Panics if the quantile is outside of `[0, 1]`.
    pub fn quantile(&self, q: f64) -> Option<f64> {
        assert!((0.0..=1.0).contains(&q), "quantile must be within [0, 1], got {}", q);

        let count = self.count();
        if count == 0.0 {
            return None;
        }

        let rank = q * (count - 1.0);
        let negative_count = self.negative_store.total_count();

        if rank < negative_count {
            // Negative values are stored by absolute value, so their ranks run in the opposite
            // direction: scan the negative store from its high end.
            let reversed_rank = negative_count - 1.0 - rank;
            self.negative_store
                .key_at_rank(reversed_rank)
                .map(|index| -self.mapping.value(index))
        } else if rank < negative_count + self.zero_count {
            Some(0.0)
        } else {
            let positive_rank = rank - negative_count - self.zero_count;
            self.positive_store
                .key_at_rank(positive_rank)
                .map(|index| self.mapping.value(index))
        }
    }

    /// Returns `true` if the sketch is empty.
    pub fn is_empty(&self) -> bool {
        self.count() == 0.0
    }

    /// Returns the total count of values added to the sketch.
    pub fn count(&self) -> f64 {
        self.negative_store.total_count() + self.positive_store.total_count() + self.zero_count
    }

    /// Returns the count of values mapped to zero.
    pub fn zero_count(&self) -> f64 {
        self.zero_count
    }

    /// Returns a reference to the index mapping.
    pub fn mapping(&self) -> &M {
        &self.mapping
    }

    /// Returns a reference to the positive value store.
    pub fn positive_store(&self) -> &S {
        &self.positive_store
    }

    /// Returns a reference to the negative value store.
    pub fn negative_store(&self) -> &S {
        &self.negative_store
    }

    /// Returns the relative accuracy of this sketch.
    pub fn relative_accuracy(&self) -> f64 {
        self.mapping.relative_accuracy()
    }

    /// Multiplies every count in the sketch by the given weight.
    ///
    /// # Panics
    ///
    /// Panics if the weight is not positive.
    pub fn reweight(&mut self, weight: f64) {
        assert!(weight > 0.0, "weight must be positive, got {}", weight);
        self.positive_store.reweight(weight);
        self.negative_store.reweight(weight);
        self.zero_count *= weight;
    }

    /// Converts this `DDSketch` to a protobuf `DDSketch` message.
    pub fn to_proto(&self) -> ProtoDdSketch {
        ProtoDdSketch {
            mapping: Some(self.mapping.to_proto()),
            positive_values: Some(self.positive_store.to_proto()),
            negative_values: Some(self.negative_store.to_proto()),
            zero_count: self.zero_count,
        }
    }

    /// Returns the protobuf wire encoding of this sketch.
    pub fn to_proto_bytes(&self) -> Vec<u8> {
        self.to_proto().encode_to_vec()
    }
}

impl Default for DDSketch<LogarithmicMapping, DenseStore> {
    /// Creates a sketch with 1% relative accuracy over empty dense stores.
    fn default() -> Self {
        Self::new(LogarithmicMapping::default(), DenseStore::new(), DenseStore::new())
    }
}

//! Sketch storage.

use datastreams_protos::sketches::Store as ProtoStore;

mod dense;
pub use self::dense::DenseStore;

/// Storage for sketch observations.
///
/// Stores manage holding the counts of mapped values, such that they contain a list of bins and
/// the (possibly fractional, when reweighted) number of observations counted in each bin.
pub trait Store: Clone + Send + Sync {
    /// Adds a single observation to the bin at the given index.
    fn add(&mut self, index: i32) {
        self.add_with_count(index, 1.0);
    }

    /// Adds a count to the bin at the given index.
    ///
    /// Adding a count of zero is a no-op.
    ///
    /// # Panics
    ///
    /// Panics if the count is negative.
    fn add_with_count(&mut self, index: i32, count: f64);

    /// Returns `true` if the store holds no observations.
    fn is_empty(&self) -> bool;

    /// Returns the total count across all bins.
    fn total_count(&self) -> f64;

    /// Returns the minimum index with a non-zero count, or `None` if empty.
    fn min_index(&self) -> Option<i32>;

    /// Returns the maximum index with a non-zero count, or `None` if empty.
    fn max_index(&self) -> Option<i32>;

    /// Returns the index of the bin containing the given rank.
    ///
    /// The rank is 0-indexed; negative ranks are treated as zero. If the cumulative count never
    /// exceeds the rank, the maximum index is returned. Returns `None` only on an empty store.
    fn key_at_rank(&self, rank: f64) -> Option<i32>;

    /// Multiplies every bin count (and the total) by the given weight.
    ///
    /// # Panics
    ///
    /// Panics if the weight is not positive.
    fn reweight(&mut self, weight: f64);

    /// Converts this store to its protobuf wire form.
    fn to_proto(&self) -> ProtoStore;
}

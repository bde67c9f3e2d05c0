use datastreams_protos::sketches::Store as ProtoStore;

use super::Store;

/// Extra capacity allocated beyond the occupied index range.
const ARRAY_LENGTH_OVERHEAD: usize = 64;

/// Backing array lengths are rounded up to a multiple of this.
const ARRAY_LENGTH_ALIGNMENT: usize = 8;

/// A dense store using contiguous array storage.
///
/// This store grows unbounded to accommodate any range of indices. It's memory-efficient when
/// the indices are clustered together, which is the case for latency distributions mapped
/// through a logarithmic index mapping.
///
/// The growth and re-centering arithmetic is deterministic: two stores fed the same sequence of
/// adds end up with identical backing arrays and offsets. Peers rely on this when comparing
/// wire-encoded sketches, so the behavior here must not change.
#[derive(Clone, Debug)]
pub struct DenseStore {
    /// The bin counts, stored contiguously.
    bins: Vec<f64>,

    /// The count stored in bins[0] corresponds to this index.
    offset: i32,

    /// Smallest and largest occupied logical indices, sentinel-initialized while empty.
    min_index: i32,
    max_index: i32,

    /// Total count across all bins.
    count: f64,
}

impl DenseStore {
    /// Creates an empty `DenseStore`.
    pub fn new() -> Self {
        Self {
            bins: Vec::new(),
            offset: 0,
            min_index: i32::MAX,
            max_index: i32::MIN,
            count: 0.0,
        }
    }

    /// Returns the length of the backing array.
    pub fn backing_len(&self) -> usize {
        self.bins.len()
    }

    /// Returns the logical index stored at position 0 of the backing array.
    pub fn backing_offset(&self) -> i32 {
        self.offset
    }

    /// Returns the count in the bin at the given logical index.
    pub fn bin_count(&self, index: i32) -> f64 {
        let position = i64::from(index) - i64::from(self.offset);
        if position < 0 || position >= self.bins.len() as i64 {
            return 0.0;
        }
        self.bins[position as usize]
    }

    /// Returns the backing array position for the logical index, extending the range first if
    /// necessary.
    fn normalize(&mut self, index: i32) -> usize {
        if index < self.min_index || index > self.max_index {
            self.extend_range(index);
        }
        (index - self.offset) as usize
    }

    fn new_length(new_min_index: i32, new_max_index: i32) -> usize {
        let desired = (new_max_index - new_min_index + 1) as usize;
        (desired + ARRAY_LENGTH_OVERHEAD - 1).div_ceil(ARRAY_LENGTH_ALIGNMENT) * ARRAY_LENGTH_ALIGNMENT
    }

    fn extend_range(&mut self, index: i32) {
        let new_min_index = index.min(self.min_index);
        let new_max_index = index.max(self.max_index);

        if self.bins.is_empty() {
            self.bins = vec![0.0; Self::new_length(new_min_index, new_max_index)];
            self.offset = new_min_index;
            self.center_counts(new_min_index, new_max_index);
        } else if self.spans(new_min_index, new_max_index) {
            self.min_index = new_min_index;
            self.max_index = new_max_index;
        } else {
            // Grow before reaching capacity so we don't shift counts on every extension.
            let new_length = Self::new_length(new_min_index, new_max_index);
            if new_length > self.bins.len() {
                self.bins.resize(new_length, 0.0);
            }
            if self.spans(new_min_index, new_max_index) {
                self.min_index = new_min_index;
                self.max_index = new_max_index;
            } else {
                self.center_counts(new_min_index, new_max_index);
            }
        }
    }

    fn spans(&self, new_min_index: i32, new_max_index: i32) -> bool {
        new_min_index >= self.offset
            && i64::from(new_max_index) < i64::from(self.offset) + self.bins.len() as i64
    }

    fn center_counts(&mut self, new_min_index: i32, new_max_index: i32) {
        let desired = new_max_index - new_min_index + 1;
        let middle_index = new_min_index + (desired + 1) / 2;
        self.shift_counts(self.offset + (self.bins.len() / 2) as i32 - middle_index);
        self.min_index = new_min_index;
        self.max_index = new_max_index;
    }

    fn shift_counts(&mut self, shift: i32) {
        let len = self.bins.len();
        if shift > 0 {
            let shift = shift as usize;
            self.bins.copy_within(0..len - shift, shift);
            self.bins[..shift].fill(0.0);
        } else if shift < 0 {
            let shift = (-shift) as usize;
            self.bins.copy_within(shift.., 0);
            self.bins[len - shift..].fill(0.0);
        }
        self.offset -= shift;
    }
}

impl Store for DenseStore {
    fn add_with_count(&mut self, index: i32, count: f64) {
        assert!(count >= 0.0, "count must not be negative, got {}", count);
        if count == 0.0 {
            return;
        }

        let position = self.normalize(index);
        self.bins[position] += count;
        self.count += count;
    }

    fn is_empty(&self) -> bool {
        self.count == 0.0
    }

    fn total_count(&self) -> f64 {
        self.count
    }

    fn min_index(&self) -> Option<i32> {
        (!self.is_empty()).then_some(self.min_index)
    }

    fn max_index(&self) -> Option<i32> {
        (!self.is_empty()).then_some(self.max_index)
    }

    fn key_at_rank(&self, rank: f64) -> Option<i32> {
        if self.is_empty() {
            return None;
        }

        let rank = rank.max(0.0);
        let mut cumulative = 0.0;
        for (position, &count) in self.bins.iter().enumerate() {
            cumulative += count;
            if cumulative > rank {
                return Some(self.offset + position as i32);
            }
        }
        Some(self.max_index)
    }

    fn reweight(&mut self, weight: f64) {
        assert!(weight > 0.0, "weight must be positive, got {}", weight);
        for bin in &mut self.bins {
            *bin *= weight;
        }
        self.count *= weight;
    }

    fn to_proto(&self) -> ProtoStore {
        if self.is_empty() {
            return ProtoStore::default();
        }

        let from = (self.min_index - self.offset) as usize;
        let to = (self.max_index - self.offset) as usize;
        ProtoStore {
            contiguous_bin_counts: self.bins[from..=to].to_vec(),
            contiguous_bin_index_offset: self.min_index,
            ..Default::default()
        }
    }
}

impl Default for DenseStore {
    fn default() -> Self {
        Self::new()
    }
}

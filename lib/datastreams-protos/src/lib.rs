//! Protocol Buffers definitions for the pipeline-stats wire format.
//!
//! This crate contains the DDSketch schema embedded inside the pipeline-stats
//! payload, as published by Datadog's `sketches` Protocol Buffers definitions.
//! The messages are written out by hand rather than generated at build time:
//! the schema is three small messages and an enum, and keeping them as plain
//! `prost` structs avoids a codegen step.

/// Sketch-related definitions.
pub mod sketches {
    /// A quantile sketch split into negative, zero and positive partitions.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DdSketch {
        /// The index mapping shared by both stores.
        #[prost(message, optional, tag = "1")]
        pub mapping: Option<IndexMapping>,

        /// Bin counts for positive values.
        #[prost(message, optional, tag = "2")]
        pub positive_values: Option<Store>,

        /// Bin counts for negative values, indexed by their absolute value.
        #[prost(message, optional, tag = "3")]
        pub negative_values: Option<Store>,

        /// Count of values too close to zero to index.
        #[prost(double, tag = "4")]
        pub zero_count: f64,
    }

    /// How values are mapped to bin indices.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct IndexMapping {
        /// Base of the logarithm; determines bin widths.
        #[prost(double, tag = "1")]
        pub gamma: f64,

        /// Offset applied to every index.
        #[prost(double, tag = "2")]
        pub index_offset: f64,

        /// Interpolation applied within a bin.
        #[prost(enumeration = "Interpolation", tag = "3")]
        pub interpolation: i32,
    }

    /// Interpolation schemes for [`IndexMapping`].
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Interpolation {
        /// Pure logarithmic mapping, no interpolation.
        None = 0,
        /// Linear interpolation within a bin.
        Linear = 1,
        /// Quadratic interpolation within a bin.
        Quadratic = 2,
        /// Cubic interpolation within a bin.
        Cubic = 3,
    }

    /// Bin counts for one sign partition of a sketch.
    ///
    /// Counts may be carried sparsely (`bin_counts`) or as a contiguous run
    /// starting at `contiguous_bin_index_offset`. Encoders here only emit the
    /// contiguous form; decoders must accept both.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Store {
        /// Sparse bin counts, keyed by index.
        #[prost(map = "sint32, double", tag = "1")]
        pub bin_counts: ::std::collections::HashMap<i32, f64>,

        /// Contiguous bin counts, starting at `contiguous_bin_index_offset`.
        #[prost(double, repeated, tag = "2")]
        pub contiguous_bin_counts: Vec<f64>,

        /// Index of the first entry of `contiguous_bin_counts`.
        #[prost(sint32, tag = "3")]
        pub contiguous_bin_index_offset: i32,
    }
}

pub use prost::Message;

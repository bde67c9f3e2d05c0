//! DDSketch quantile estimation for pipeline latencies.
//!
//! A DDSketch summarizes a distribution with a guaranteed bound on the
//! *relative* error of any quantile query: for a sketch built with relative
//! accuracy `alpha`, the value returned for a quantile is within `alpha`
//! (relatively) of the true value. This makes it a good fit for latency
//! distributions, where tail quantiles spanning many orders of magnitude
//! matter.
//!
//! The implementation follows the reference layout: an index mapping
//! ([`LogarithmicMapping`]) turns positive values into integer bin indices,
//! a store ([`DenseStore`]) counts observations per bin, and the sketch
//! itself ([`DDSketch`]) partitions observations into negative, zero and
//! positive sub-stores.
//!
//! # Example
//!
//! ```
//! use ddsketch::DDSketch;
//!
//! let mut sketch = DDSketch::default();
//! sketch.add(1.0);
//! sketch.add(2.0);
//! sketch.add(3.0);
//!
//! let median = sketch.quantile(0.5).unwrap();
//! assert!(median >= 1.0 && median <= 3.0);
//! ```

pub mod mapping;
pub mod sketch;
pub mod store;

pub use self::mapping::{IndexMapping, LogarithmicMapping};
pub use self::sketch::DDSketch;
pub use self::store::{DenseStore, Store};

//! Index mapping for DDSketch.
//!
//! The index mapping defines how floating-point values are mapped to integer bin indices,
//! which determines the relative accuracy guarantees of the sketch.

use datastreams_protos::sketches::{IndexMapping as ProtoIndexMapping, Interpolation};

/// Relative tolerance used when deciding whether two mappings are interchangeable.
const EQUALITY_TOLERANCE: f64 = 1e-12;

/// Maps values to bin indices and vice versa.
///
/// The mapping defines the relationship between floating-point values and integer bin indices,
/// determining the relative accuracy of the sketch.
pub trait IndexMapping: Clone + Send + Sync {
    /// Returns the index of the bin for the given positive value.
    ///
    /// The value must be positive. For negative values, use the index of the absolute value
    /// and store in the negative store.
    fn index(&self, value: f64) -> i32;

    /// Returns the representative value for the given index.
    fn value(&self, index: i32) -> f64;

    /// Returns the lower bound of the bin at the given index.
    fn lower_bound(&self, index: i32) -> f64;

    /// Returns the relative accuracy of this mapping.
    ///
    /// The relative accuracy is the maximum relative error guaranteed for any quantile query.
    fn relative_accuracy(&self) -> f64;

    /// Returns `true` if the two mappings produce interchangeable sketches.
    fn equals(&self, other: &Self) -> bool;

    /// Converts this mapping to its protobuf wire form.
    fn to_proto(&self) -> ProtoIndexMapping;
}

/// Logarithmic index mapping for DDSketch.
///
/// Maps values to indices using `index = floor(log(value) / log(gamma) + index_offset)`,
/// where `gamma = (1 + alpha) / (1 - alpha)` and `alpha` is the relative accuracy.
/// The index offset is zero for locally-built sketches and only carried for wire
/// compatibility with peers that propagate a shifted mapping.
#[derive(Clone, Debug)]
pub struct LogarithmicMapping {
    /// The base of the logarithm, determines bin widths.
    gamma: f64,
    /// Offset applied to every index.
    index_offset: f64,
    /// Precomputed 1/ln(gamma) for performance.
    multiplier: f64,
    /// The relative accuracy guarantee.
    relative_accuracy: f64,
}

impl LogarithmicMapping {
    /// Creates a new logarithmic mapping with the given relative accuracy.
    ///
    /// # Errors
    ///
    /// Returns an error if the relative accuracy is not in the valid range (0, 1).
    pub fn new(relative_accuracy: f64) -> Result<Self, &'static str> {
        if relative_accuracy <= 0.0 || relative_accuracy >= 1.0 {
            return Err("relative accuracy must be between 0 and 1 (exclusive)");
        }

        let gamma = (1.0 + relative_accuracy) / (1.0 - relative_accuracy);
        Self::with_gamma(gamma, 0.0)
    }

    /// Creates a new logarithmic mapping with the given gamma value and index offset.
    ///
    /// # Errors
    ///
    /// Returns an error if gamma is not greater than 1.
    pub fn with_gamma(gamma: f64, index_offset: f64) -> Result<Self, &'static str> {
        if gamma <= 1.0 {
            return Err("gamma must be greater than 1");
        }

        Ok(Self {
            gamma,
            index_offset,
            multiplier: 1.0 / gamma.ln(),
            relative_accuracy: 1.0 - 2.0 / (1.0 + gamma),
        })
    }

    /// Returns the gamma value used for this mapping.
    pub fn gamma(&self) -> f64 {
        self.gamma
    }

    /// Returns the index offset of this mapping.
    pub fn index_offset(&self) -> f64 {
        self.index_offset
    }
}

impl IndexMapping for LogarithmicMapping {
    fn index(&self, value: f64) -> i32 {
        let index = value.ln() * self.multiplier + self.index_offset;
        if index >= 0.0 {
            index as i32
        } else {
            // Truncation rounds toward zero; shift negative indices down so the
            // result is the floor.
            index as i32 - 1
        }
    }

    fn value(&self, index: i32) -> f64 {
        self.lower_bound(index) * (1.0 + self.relative_accuracy)
    }

    fn lower_bound(&self, index: i32) -> f64 {
        ((f64::from(index) - self.index_offset) / self.multiplier).exp()
    }

    fn relative_accuracy(&self) -> f64 {
        self.relative_accuracy
    }

    fn equals(&self, other: &Self) -> bool {
        within_tolerance(self.gamma, other.gamma, EQUALITY_TOLERANCE)
            && within_tolerance(self.index_offset, other.index_offset, EQUALITY_TOLERANCE)
    }

    fn to_proto(&self) -> ProtoIndexMapping {
        ProtoIndexMapping {
            gamma: self.gamma,
            index_offset: self.index_offset,
            interpolation: Interpolation::None as i32,
        }
    }
}

impl Default for LogarithmicMapping {
    /// Creates a logarithmic mapping with 1% relative accuracy (the common default).
    fn default() -> Self {
        Self::new(0.01).expect("0.01 is a valid relative accuracy")
    }
}

fn within_tolerance(x: f64, y: f64, tolerance: f64) -> bool {
    if x == 0.0 || y == 0.0 {
        x.abs() <= tolerance && y.abs() <= tolerance
    } else {
        (x - y).abs() <= tolerance * x.abs().max(y.abs())
    }
}

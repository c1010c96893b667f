//! Geometry error types.

/// Malformed or missing box data. Geometry errors are never patched up
/// silently; callers surface them immediately.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeometryError {
    /// The tile has no size yet, so its box cannot be derived.
    #[error("tile {index} has no size")]
    SizeUnset {
        /// Index of the offending tile.
        index: usize,
    },

    /// Two vectors that must share a dimensionality do not.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Expected number of dimensions.
        expected: usize,
        /// Actual number of dimensions.
        actual: usize,
    },

    /// A box with `min > max` on some axis.
    #[error("inverted bounds on axis {axis}: min {min} > max {max}")]
    InvertedBounds {
        /// Offending axis.
        axis: usize,
        /// Lower bound.
        min: i64,
        /// Upper bound.
        max: i64,
    },

    /// An operation that needs at least one tile received none.
    #[error("empty tile collection")]
    EmptyCollection,

    /// A cell size of zero along some axis.
    #[error("cell size must be positive on axis {axis}")]
    InvalidCellSize {
        /// Offending axis.
        axis: usize,
    },

    /// An axis index beyond the dimensionality of the data.
    #[error("axis {axis} out of range for {dimensions}-dimensional data")]
    AxisOutOfRange {
        /// Requested axis.
        axis: usize,
        /// Dimensionality of the data.
        dimensions: usize,
    },

    /// Adjacent pairs disagree with the tiles' grid coordinates.
    #[error("adjacent pairs along axis {axis} disagree with grid coordinates: {missing} missing, {extra} extra")]
    GridMismatch {
        /// Axis being verified.
        axis: usize,
        /// Grid neighbours that were not classified as adjacent.
        missing: usize,
        /// Adjacent pairs that are not grid neighbours.
        extra: usize,
    },
}

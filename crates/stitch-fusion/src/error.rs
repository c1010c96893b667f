//! Fusion error types.

use std::path::PathBuf;

use stitch_geometry::GeometryError;

/// Errors raised while building a channel's pyramid.
///
/// Every variant aborts the affected channel. Degenerate cells (no
/// contributing tiles, nothing left after downsampling) and an empty tier are
/// not errors and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum FusionError {
    /// Malformed or missing box data.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// A tier configuration exists but cannot be read.
    #[error("failed to read tier configuration {}: {source}", .path.display())]
    TierLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tier configuration exists but cannot be parsed.
    #[error("malformed tier configuration {}: {source}", .path.display())]
    TierParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A tier configuration cannot be written.
    #[error("failed to save tier configuration {}: {source}", .path.display())]
    TierSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tier needed as input has never been produced.
    #[error("tier {tier} is required but has not been produced")]
    MissingTier { tier: String },

    /// A blended cell cannot be written.
    #[error("failed to write cell {}: {source}", .path.display())]
    CellWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source tile cannot be read.
    #[error("failed to read tile {}: {source}", .path.display())]
    TileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A source tile's byte length disagrees with its recorded size.
    #[error("malformed tile {}: expected {expected} bytes, found {actual}", .path.display())]
    MalformedTile {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    /// The blending kernel returned a buffer of the wrong extent.
    #[error("blended buffer has extent {actual:?}, expected {expected:?}")]
    BufferExtent {
        expected: Vec<u64>,
        actual: Vec<u64>,
    },

    /// A tile configuration file cannot be read.
    #[error("failed to read tile configuration {}: {source}", .path.display())]
    TileConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A tile configuration file cannot be parsed.
    #[error("malformed tile configuration {}: {source}", .path.display())]
    TileConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// An export descriptor, manifest or tile configuration cannot be written.
    #[error("failed to write {}: {source}", .path.display())]
    Export {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Voxel dimensions are non-positive or do not match the tiles.
    #[error("invalid voxel dimensions {voxel:?} for {dimensions}-dimensional data")]
    VoxelDimensions { voxel: Vec<f64>, dimensions: usize },

    /// The x/y axes differ, or are coarser than depth. In-plane axes halve at
    /// every level, so only the finest axes can take that schedule.
    #[error("in-plane voxel dimensions of {voxel:?} must be equal and the finest")]
    UnevenPlane { voxel: Vec<f64> },

    #[error("serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

//! Tile geometry for mosaic fusion: integer boxes, tile descriptors, pairwise
//! overlap and adjacency, regular space partitioning, and subregion lookup.

mod boundaries;
mod error;
mod overlap;
mod partition;
mod tile;

pub use boundaries::{Boundaries, collection_boundaries};
pub use error::GeometryError;
pub use overlap::{
    DEFAULT_SHORT_EDGE_THRESHOLD, OverlapStats, ShortEdgeThreshold, TilePair, adjacency_axis,
    filter_adjacent_pairs, find_overlapping_pairs, is_adjacent, overlap_region,
    overlap_statistics, verify_against_grid,
};
pub use partition::{Cell, divide_space, tiles_within};
pub use tile::{Tile, translate_tiles_to_origin};

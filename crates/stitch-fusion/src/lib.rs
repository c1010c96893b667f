//! Fusion of positioned tiles into a resumable multiscale pyramid.
//!
//! A [`Pipeline`] anchors each channel's tiles at the origin and hands them to
//! a [`PyramidBuilder`], which fuses one tier after another through a
//! [`Blender`], writes cells through a [`CellWriter`] and saves every tier to
//! a [`TierStore`]. Export descriptors and a run manifest describe the result.

mod blend;
mod buffer;
mod error;
mod executor;
mod export;
mod layout;
mod pipeline;
mod plan;
mod pyramid;
mod raw_io;
mod store;
mod tile_config;

pub use blend::{Blender, DistanceBlender};
pub use buffer::PixelBuffer;
pub use error::FusionError;
pub use executor::{Executor, SerialExecutor, ThreadPoolExecutor};
pub use export::{
    ExportDescriptor, Manifest, PIXEL_TYPE, PyramidState, VoxelDimensions, save_json,
};
pub use layout::{OutputLayout, TierId, TierKind, cell_path};
pub use pipeline::{Pipeline, RunSummary};
pub use plan::{DEPTH_AXIS, LevelPlan, normalize_voxel_dimensions, xy_factors};
pub use pyramid::{
    ChannelPyramid, FusionStats, PyramidBuilder, PyramidSettings, SaveFailurePolicy, TierOutput,
};
pub use raw_io::{CellWriter, RawVolumeIo, VolumeReader};
pub use store::{FsTierStore, MemoryTierStore, TierStore};
pub use tile_config::{load_tiles, save_tiles};

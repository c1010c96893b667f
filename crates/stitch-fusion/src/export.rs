//! Export metadata describing finished pyramids.
//!
//! Each channel gets an `export-channel<N>.json` descriptor; the run as a
//! whole gets an `export.json` manifest listing every channel.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::FusionError;
use crate::layout::write_atomic;

/// Pixel type of every written cell.
pub const PIXEL_TYPE: &str = "GRAY32";

/// Per-level factors and cell sizes accumulated while a channel is built.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PyramidState {
    channel: usize,
    downsample_factors: BTreeMap<u32, Vec<u64>>,
    cell_sizes: BTreeMap<u32, Vec<u64>>,
}

impl PyramidState {
    pub fn new(channel: usize) -> Self {
        Self {
            channel,
            ..Default::default()
        }
    }

    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Record a completed level's full downsampling factors and cell size.
    pub fn record_level(&mut self, level: u32, factors: Vec<u64>, cell_size: Vec<u64>) {
        self.downsample_factors.insert(level, factors);
        self.cell_sizes.insert(level, cell_size);
    }

    pub fn num_levels(&self) -> usize {
        self.downsample_factors.len()
    }

    pub fn levels(&self) -> impl Iterator<Item = u32> + '_ {
        self.downsample_factors.keys().copied()
    }

    pub fn downsample_factors(&self) -> &BTreeMap<u32, Vec<u64>> {
        &self.downsample_factors
    }

    pub fn cell_sizes(&self) -> &BTreeMap<u32, Vec<u64>> {
        &self.cell_sizes
    }

    pub fn cell_size(&self, level: u32) -> Option<&[u64]> {
        self.cell_sizes.get(&level).map(Vec::as_slice)
    }
}

/// Physical voxel size with its unit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VoxelDimensions {
    pub unit: String,
    pub dimensions: Vec<f64>,
}

/// Everything a reader needs to open one channel's pyramid.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDescriptor {
    pub channel: usize,
    /// Cell path with `{level}`, `{z}`, `{y}` and `{x}` placeholders.
    pub path_template: String,
    pub pixel_type: String,
    /// Extent of the full-resolution volume.
    pub dimensions: Vec<u64>,
    pub downsampling_factors: BTreeMap<u32, Vec<u64>>,
    pub cell_sizes: BTreeMap<u32, Vec<u64>>,
    /// Affine world transform; unset for translation-only mosaics.
    pub transform: Option<Vec<Vec<f64>>>,
    pub voxel_dimensions: VoxelDimensions,
}

impl ExportDescriptor {
    pub fn from_state(
        state: &PyramidState,
        path_template: String,
        dimensions: Vec<u64>,
        voxel_dimensions: VoxelDimensions,
    ) -> Self {
        Self {
            channel: state.channel(),
            path_template,
            pixel_type: PIXEL_TYPE.to_string(),
            dimensions,
            downsampling_factors: state.downsample_factors().clone(),
            cell_sizes: state.cell_sizes().clone(),
            transform: None,
            voxel_dimensions,
        }
    }

    pub fn num_levels(&self) -> usize {
        self.downsampling_factors.len()
    }
}

/// Index of all exported channels.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub channels: Vec<ExportDescriptor>,
}

impl Manifest {
    /// Manifest listing `channels` ordered by channel number.
    pub fn from_channels(mut channels: Vec<ExportDescriptor>) -> Self {
        channels.sort_by_key(|descriptor| descriptor.channel);
        Self { channels }
    }

    pub fn channel(&self, channel: usize) -> Option<&ExportDescriptor> {
        self.channels.iter().find(|d| d.channel == channel)
    }
}

/// Write `value` as pretty JSON, atomically.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<(), FusionError> {
    let json = serde_json::to_string_pretty(value)?;
    write_atomic(path, json.as_bytes()).map_err(|source| FusionError::Export {
        path: path.to_path_buf(),
        source,
    })
}

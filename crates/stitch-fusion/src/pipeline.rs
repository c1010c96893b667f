//! Whole-run orchestration: every channel, then the manifest.

use serde::Serialize;
use std::path::Path;

use stitch_geometry::{Tile, collection_boundaries, translate_tiles_to_origin};
use tracing::{error, info, info_span};

use crate::error::FusionError;
use crate::executor::Executor;
use crate::export::{ExportDescriptor, Manifest, VoxelDimensions, save_json};
use crate::pyramid::{FusionStats, PyramidBuilder, SaveFailurePolicy};

/// Outcome of a complete run.
#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub manifest: Manifest,
    pub stats: FusionStats,
}

/// Fuses channels one after another and exports their metadata.
pub struct Pipeline<'a, E> {
    builder: PyramidBuilder<'a, E>,
    voxel_unit: String,
}

impl<'a, E: Executor> Pipeline<'a, E> {
    pub fn new(builder: PyramidBuilder<'a, E>, voxel_unit: impl Into<String>) -> Self {
        Self {
            builder,
            voxel_unit: voxel_unit.into(),
        }
    }

    /// Fuse `channels` (indexed by position) and write the manifest.
    ///
    /// The first failing channel aborts the run.
    pub fn run(&self, channels: Vec<Vec<Tile>>) -> Result<RunSummary, FusionError> {
        let mut descriptors = Vec::with_capacity(channels.len());
        let mut stats = FusionStats::default();

        for (channel, tiles) in channels.into_iter().enumerate() {
            let span = info_span!("channel", channel);
            let _guard = span.enter();
            let (descriptor, channel_stats) = self.run_channel(channel, tiles)?;
            descriptors.push(descriptor);
            stats.merge(&channel_stats);
        }

        let manifest = Manifest::from_channels(descriptors);
        let path = self.builder.layout().manifest_path();
        self.save_metadata(&path, &manifest)?;
        info!(
            channels = manifest.channels.len(),
            cells_written = stats.cells_written,
            tiers_resumed = stats.tiers_resumed,
            "Wrote manifest {}",
            path.display()
        );
        Ok(RunSummary { manifest, stats })
    }

    /// Anchor one channel's tiles at the origin, build its pyramid and write
    /// its export descriptor.
    pub fn run_channel(
        &self,
        channel: usize,
        mut tiles: Vec<Tile>,
    ) -> Result<(ExportDescriptor, FusionStats), FusionError> {
        let offset = translate_tiles_to_origin(&mut tiles)?;
        let dimensions = collection_boundaries(&tiles)?.dimensions();
        info!(tiles = tiles.len(), ?offset, ?dimensions, "Fusing channel");

        let pyramid = self.builder.build_channel(channel, &tiles)?;

        let layout = self.builder.layout();
        let voxel = VoxelDimensions {
            unit: self.voxel_unit.clone(),
            dimensions: self
                .builder
                .settings()
                .voxel_dimensions
                .iter()
                .take(dimensions.len())
                .copied()
                .collect(),
        };
        let descriptor = ExportDescriptor::from_state(
            &pyramid.state,
            layout.path_template(channel, dimensions.len()),
            dimensions,
            voxel,
        );
        self.save_metadata(&layout.export_path(channel), &descriptor)?;
        Ok((descriptor, pyramid.stats))
    }

    fn save_metadata<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), FusionError> {
        match save_json(path, value) {
            Err(err) if self.builder.settings().save_policy == SaveFailurePolicy::BestEffort => {
                error!(%err, "Failed to write export metadata, continuing");
                Ok(())
            }
            result => result,
        }
    }
}

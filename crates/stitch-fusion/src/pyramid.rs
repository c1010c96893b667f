//! Level-by-level construction of a channel's multiscale pyramid.
//!
//! Level 0 fuses the input tiles at full resolution. Every later level
//! downsamples the previous one, reading the previous tier's cells as its
//! tiles. Each tier is saved to a [`TierStore`] as soon as it is complete, and
//! a saved tier is loaded instead of recomputed, so an interrupted run can be
//! restarted and picks up at the first missing tier.

use std::path::Path;

use stitch_geometry::{
    Boundaries, Cell, GeometryError, Tile, collection_boundaries, divide_space, tiles_within,
};
use tracing::{debug, error, info, info_span, warn};

use crate::blend::Blender;
use crate::error::FusionError;
use crate::executor::Executor;
use crate::export::PyramidState;
use crate::layout::{OutputLayout, TierId, cell_path};
use crate::plan::{LevelPlan, normalize_voxel_dimensions, xy_factors};
use crate::raw_io::CellWriter;
use crate::store::TierStore;

/// A channel stops once its largest extent is at most this many base cells.
const STOP_AT_CELLS: u64 = 4;

/// What to do when a tier or cell cannot be saved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SaveFailurePolicy {
    /// Abort the channel.
    #[default]
    FailFast,
    /// Log the failure and continue. The output may be incomplete and a later
    /// run cannot resume from the unsaved data.
    BestEffort,
}

impl SaveFailurePolicy {
    pub fn from_best_effort(best_effort: bool) -> Self {
        if best_effort {
            Self::BestEffort
        } else {
            Self::FailFast
        }
    }
}

/// Parameters shared by every channel of a run.
#[derive(Clone, Debug, PartialEq)]
pub struct PyramidSettings {
    /// Base output cell size along the finest-sampled axis.
    pub cell_size: u64,
    /// Physical voxel size per axis; only the ratios matter.
    pub voxel_dimensions: Vec<f64>,
    pub save_policy: SaveFailurePolicy,
}

impl Default for PyramidSettings {
    fn default() -> Self {
        Self {
            cell_size: 64,
            voxel_dimensions: vec![1.0, 1.0, 1.0],
            save_policy: SaveFailurePolicy::FailFast,
        }
    }
}

/// Counters reported after each channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FusionStats {
    pub cells_written: usize,
    pub cells_skipped: usize,
    pub tiers_computed: usize,
    pub tiers_resumed: usize,
}

impl FusionStats {
    fn absorb(&mut self, output: &TierOutput) {
        self.tiers_computed += 1;
        self.cells_written += output.cells.len();
        self.cells_skipped += output.skipped;
    }

    /// Add another channel's counters.
    pub fn merge(&mut self, other: &FusionStats) {
        self.cells_written += other.cells_written;
        self.cells_skipped += other.cells_skipped;
        self.tiers_computed += other.tiers_computed;
        self.tiers_resumed += other.tiers_resumed;
    }
}

/// Cells produced for one tier.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TierOutput {
    /// Written cells in index order, with downsampled bounds.
    pub cells: Vec<Cell>,
    /// Cells dropped for having no tiles or no extent after downsampling.
    pub skipped: usize,
}

/// Result of producing a level's full tier.
#[derive(Debug)]
enum TierOutcome {
    Cells(Vec<Cell>),
    /// Nothing survived downsampling; the channel is finished.
    Empty,
}

/// Everything known about a finished channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelPyramid {
    pub state: PyramidState,
    pub stats: FusionStats,
}

/// Where the next XY-only tier reads from.
enum XyChain {
    Tiles(Vec<Tile>),
    Stored(TierId),
}

/// Builds pyramids for one channel at a time.
pub struct PyramidBuilder<'a, E> {
    store: &'a dyn TierStore,
    blender: &'a dyn Blender,
    writer: &'a dyn CellWriter,
    executor: &'a E,
    layout: OutputLayout,
    settings: PyramidSettings,
}

impl<'a, E: Executor> PyramidBuilder<'a, E> {
    pub fn new(
        store: &'a dyn TierStore,
        blender: &'a dyn Blender,
        writer: &'a dyn CellWriter,
        executor: &'a E,
        layout: OutputLayout,
        settings: PyramidSettings,
    ) -> Self {
        Self {
            store,
            blender,
            writer,
            executor,
            layout,
            settings,
        }
    }

    pub fn layout(&self) -> &OutputLayout {
        &self.layout
    }

    pub fn settings(&self) -> &PyramidSettings {
        &self.settings
    }

    /// Build (or resume) every level of `channel` from its origin-anchored
    /// tiles.
    pub fn build_channel(
        &self,
        channel: usize,
        tiles: &[Tile],
    ) -> Result<ChannelPyramid, FusionError> {
        let dims = tiles
            .first()
            .ok_or(GeometryError::EmptyCollection)?
            .num_dimensions();
        let voxel = self
            .settings
            .voxel_dimensions
            .get(..dims)
            .ok_or_else(|| FusionError::VoxelDimensions {
                voxel: self.settings.voxel_dimensions.clone(),
                dimensions: dims,
            })?;
        let normalized = normalize_voxel_dimensions(voxel)?;
        let cell_size = self.settings.cell_size;

        let mut state = PyramidState::new(channel);
        let mut stats = FusionStats::default();
        let mut full_source = tiles.to_vec();
        let mut xy_chain = XyChain::Tiles(full_source.clone());
        let mut level = 0u32;

        loop {
            let plan = LevelPlan::for_level(level, cell_size, &normalized);
            let span = info_span!("level", channel, level);
            let _guard = span.enter();

            let full_id = TierId::full(channel, level);
            let (cells, next_chain) = if self.store.has(&full_id) {
                info!(tier = %full_id, "Resuming saved tier");
                stats.tiers_resumed += 1;
                let cells = self.store.load(&full_id)?;
                let chain = if plan.needs_xy_tier() {
                    XyChain::Stored(TierId::xy_only(channel, level))
                } else {
                    XyChain::Stored(full_id)
                };
                (cells, chain)
            } else {
                let (outcome, xy_tiles) = self.produce_full_tier(
                    &plan,
                    &full_id,
                    &full_source,
                    &xy_chain,
                    &state,
                    &mut stats,
                )?;
                match outcome {
                    TierOutcome::Cells(cells) => {
                        let chain = match xy_tiles {
                            Some(tiles) => XyChain::Tiles(tiles),
                            None => XyChain::Tiles(cells.iter().map(Cell::to_tile).collect()),
                        };
                        (cells, chain)
                    }
                    TierOutcome::Empty => {
                        info!("Level produced no cells, stopping");
                        break;
                    }
                }
            };
            if cells.is_empty() {
                info!(tier = %full_id, "Saved tier is empty, stopping");
                break;
            }

            xy_chain = next_chain;
            full_source = cells.iter().map(Cell::to_tile).collect();
            let extent = collection_boundaries(&full_source)?.dimensions();
            state.record_level(level, plan.full.clone(), plan.cell.clone());
            info!(cells = cells.len(), ?extent, "Processed level {level}");

            let smallest = extent.iter().copied().min().unwrap_or(0);
            let largest = extent.iter().copied().max().unwrap_or(0);
            if smallest <= 1 || largest <= STOP_AT_CELLS.saturating_mul(cell_size) {
                break;
            }
            level += 1;
        }

        info!(
            channel,
            levels = state.num_levels(),
            cells_written = stats.cells_written,
            cells_skipped = stats.cells_skipped,
            tiers_resumed = stats.tiers_resumed,
            "Channel complete"
        );
        Ok(ChannelPyramid { state, stats })
    }

    /// Compute and save a level's full tier. Also returns the XY-only tier's
    /// cells as tiles when one was produced on the way.
    ///
    /// A full tier is only saved when its XY-only tier is saved too, since a
    /// resumed full tier hands the next level its XY-only tier as source.
    fn produce_full_tier(
        &self,
        plan: &LevelPlan,
        full_id: &TierId,
        full_source: &[Tile],
        xy_chain: &XyChain,
        state: &PyramidState,
        stats: &mut FusionStats,
    ) -> Result<(TierOutcome, Option<Vec<Tile>>), FusionError> {
        let mut xy_saved = true;
        let (output, xy_tiles) = if plan.needs_xy_tier() {
            let (xy_tiles, saved) =
                self.xy_tier(plan.level, full_id.channel, xy_chain, state, stats)?;
            xy_saved = saved;
            if xy_tiles.is_empty() {
                return Ok((TierOutcome::Empty, None));
            }
            let output = self.compute_tier(
                full_id,
                &xy_tiles,
                &plan.depth_partition(),
                &plan.depth_factors(),
            )?;
            (output, Some(xy_tiles))
        } else {
            (
                self.compute_tier(full_id, full_source, &plan.upscaled, &plan.step)?,
                None,
            )
        };
        stats.absorb(&output);

        if output.cells.is_empty() {
            return Ok((TierOutcome::Empty, xy_tiles));
        }
        if xy_saved {
            self.persist(full_id, &output.cells)?;
        } else {
            warn!(tier = %full_id, "XY-only tier was not saved, leaving tier unsaved");
        }
        Ok((TierOutcome::Cells(output.cells), xy_tiles))
    }

    /// Produce or resume the XY-only tier of `level`, returned as tiles along
    /// with whether it is in the store.
    fn xy_tier(
        &self,
        level: u32,
        channel: usize,
        xy_chain: &XyChain,
        state: &PyramidState,
        stats: &mut FusionStats,
    ) -> Result<(Vec<Tile>, bool), FusionError> {
        let xy_id = TierId::xy_only(channel, level);
        if self.store.has(&xy_id) {
            info!(tier = %xy_id, "Resuming saved tier");
            stats.tiers_resumed += 1;
            let cells = self.store.load(&xy_id)?;
            return Ok((cells.iter().map(Cell::to_tile).collect(), true));
        }

        let previous = level.checked_sub(1).and_then(|l| state.cell_size(l));
        let Some(previous_cell) = previous else {
            return Err(FusionError::MissingTier {
                tier: TierId::full(channel, level.saturating_sub(1)).to_string(),
            });
        };
        let sources = match xy_chain {
            XyChain::Tiles(tiles) => tiles.clone(),
            XyChain::Stored(tier) => {
                if !self.store.has(tier) {
                    return Err(FusionError::MissingTier {
                        tier: tier.to_string(),
                    });
                }
                self.store.load(tier)?.iter().map(Cell::to_tile).collect()
            }
        };

        let factors = xy_factors(previous_cell.len());
        let partition: Vec<u64> = previous_cell
            .iter()
            .zip(&factors)
            .map(|(c, f)| c * f)
            .collect();
        let output = self.compute_tier(&xy_id, &sources, &partition, &factors)?;
        stats.absorb(&output);
        let saved = !output.cells.is_empty() && self.persist(&xy_id, &output.cells)?;
        Ok((output.cells.iter().map(Cell::to_tile).collect(), saved))
    }

    /// Partition the region spanned by `sources` into `partition_size` cells,
    /// fuse each non-degenerate cell downsampled by `factors`, and write it
    /// below the tier's directory.
    pub fn compute_tier(
        &self,
        tier: &TierId,
        sources: &[Tile],
        partition_size: &[u64],
        factors: &[u64],
    ) -> Result<TierOutput, FusionError> {
        let region = collection_boundaries(sources)?;
        if factors.len() != region.num_dimensions() {
            return Err(GeometryError::DimensionMismatch {
                expected: region.num_dimensions(),
                actual: factors.len(),
            }
            .into());
        }
        if let Some(axis) = factors.iter().position(|&f| f == 0) {
            return Err(GeometryError::InvalidCellSize { axis }.into());
        }
        let cells = divide_space(&region, partition_size)?;
        let tier_dir = self.layout.tier_dir(tier);
        info!(
            tier = %tier,
            cells = cells.len(),
            ?partition_size,
            ?factors,
            "Fusing tier"
        );

        let job = CellJob {
            blender: self.blender,
            writer: self.writer,
            sources,
            factors,
            tier_dir: &tier_dir,
            extension: self.layout.extension(),
            policy: self.settings.save_policy,
        };
        let results = self.executor.map(cells, |cell| job.run(cell));

        let mut output = TierOutput::default();
        for result in results {
            match result? {
                Some(cell) => output.cells.push(cell),
                None => output.skipped += 1,
            }
        }
        output.cells.sort_by_key(|cell| cell.index);
        Ok(output)
    }

    /// Save a tier. `Ok(false)` means the failure was tolerated.
    fn persist(&self, tier: &TierId, cells: &[Cell]) -> Result<bool, FusionError> {
        match self.store.save(tier, cells) {
            Ok(()) => Ok(true),
            Err(err) if self.settings.save_policy == SaveFailurePolicy::BestEffort => {
                error!(tier = %tier, %err, "Failed to save tier, continuing");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }
}

/// Read-only inputs of one tier's per-cell work.
struct CellJob<'a> {
    blender: &'a dyn Blender,
    writer: &'a dyn CellWriter,
    sources: &'a [Tile],
    factors: &'a [u64],
    tier_dir: &'a Path,
    extension: &'a str,
    policy: SaveFailurePolicy,
}

impl CellJob<'_> {
    /// Fuse and write one cell. `None` means the cell was dropped.
    fn run(&self, cell: Cell) -> Result<Option<Cell>, FusionError> {
        let within = tiles_within(self.sources, &cell.bounds)?;
        if within.is_empty() {
            debug!(cell = cell.index, "No tiles in cell");
            return Ok(None);
        }

        let out_size: Vec<u64> = cell
            .bounds
            .dimensions()
            .iter()
            .zip(self.factors)
            .map(|(size, factor)| size / factor)
            .collect();
        if out_size.contains(&0) {
            debug!(cell = cell.index, ?out_size, "Cell vanishes after downsampling");
            return Ok(None);
        }

        let buffer = self.blender.fuse(&within, &cell.bounds, self.factors)?;
        if buffer.dimensions() != out_size.as_slice() {
            return Err(FusionError::BufferExtent {
                expected: out_size,
                actual: buffer.dimensions().to_vec(),
            });
        }

        let path = cell_path(self.tier_dir, &cell.grid, self.extension);
        if let Err(err) = self.writer.write(&path, &buffer) {
            match self.policy {
                SaveFailurePolicy::FailFast => return Err(err),
                SaveFailurePolicy::BestEffort => {
                    error!(cell = cell.index, %err, "Failed to write cell, continuing");
                    return Ok(None);
                }
            }
        }

        let min: Vec<i64> = cell
            .bounds
            .min_corner()
            .iter()
            .zip(self.factors)
            .map(|(&m, &f)| m.div_euclid(f as i64))
            .collect();
        Ok(Some(Cell {
            index: cell.index,
            grid: cell.grid,
            bounds: Boundaries::from_min_size(min, &out_size)?,
            file: Some(path),
        }))
    }
}

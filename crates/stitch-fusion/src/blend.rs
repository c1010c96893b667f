//! Blending of overlapping tiles into one cell.

use stitch_geometry::{Boundaries, Tile};
use tracing::trace;

use crate::buffer::{PixelBuffer, for_each_coord, linear_offset};
use crate::error::FusionError;
use crate::raw_io::VolumeReader;

/// Fuses the tiles overlapping a target region into a downsampled buffer.
///
/// Implementations must return a buffer whose extent is
/// `target.dimension(d) / downsample[d]` on every axis.
pub trait Blender: Send + Sync {
    fn fuse(
        &self,
        tiles: &[Tile],
        target: &Boundaries,
        downsample: &[u64],
    ) -> Result<PixelBuffer, FusionError>;
}

/// Reference kernel: distance-weighted averaging followed by block averaging.
///
/// Each full-resolution voxel is the mean of the tiles covering it, weighted
/// by the distance to the nearest border of each tile plus one, so that seams
/// fade out towards tile edges. The blended voxels are then averaged over
/// `downsample`-sized blocks. Voxels covered by no tile are zero.
#[derive(Clone, Debug, Default)]
pub struct DistanceBlender<R> {
    reader: R,
}

struct LoadedTile {
    bounds: Boundaries,
    pixels: PixelBuffer,
}

impl<R: VolumeReader> DistanceBlender<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    fn load(&self, tile: &Tile) -> Result<LoadedTile, FusionError> {
        let bounds = tile.boundaries()?;
        let pixels = self.reader.read(&tile.file, &bounds.dimensions())?;
        Ok(LoadedTile { bounds, pixels })
    }
}

impl<R: VolumeReader> Blender for DistanceBlender<R> {
    fn fuse(
        &self,
        tiles: &[Tile],
        target: &Boundaries,
        downsample: &[u64],
    ) -> Result<PixelBuffer, FusionError> {
        let dims = target.num_dimensions();
        if downsample.len() != dims {
            return Err(stitch_geometry::GeometryError::DimensionMismatch {
                expected: dims,
                actual: downsample.len(),
            }
            .into());
        }

        let out_dims: Vec<u64> = (0..dims)
            .map(|d| target.dimension(d) / downsample[d].max(1))
            .collect();
        let loaded = tiles
            .iter()
            .map(|tile| self.load(tile))
            .collect::<Result<Vec<_>, _>>()?;
        trace!(tiles = loaded.len(), ?out_dims, "Blending cell");

        let block: Vec<u64> = downsample.iter().map(|&f| f.max(1)).collect();
        let block_volume = block.iter().product::<u64>() as f64;
        let mut sums = vec![0.0f64; out_dims.iter().product::<u64>() as usize];

        // Only the part of the target that maps onto whole output voxels.
        let covered: Vec<u64> = (0..dims).map(|d| out_dims[d] * block[d]).collect();
        let mut global = vec![0i64; dims];
        let mut out_coord = vec![0u64; dims];
        for_each_coord(&covered, |local| {
            for d in 0..dims {
                global[d] = target.min(d) + local[d] as i64;
                out_coord[d] = local[d] / block[d];
            }
            sums[linear_offset(&out_dims, &out_coord)] += blend_voxel(&loaded, &global);
        });

        let data = sums.into_iter().map(|s| (s / block_volume) as f32).collect();
        PixelBuffer::from_data(out_dims, data)
    }
}

fn blend_voxel(tiles: &[LoadedTile], global: &[i64]) -> f64 {
    let mut weighted = 0.0f64;
    let mut total_weight = 0.0f64;
    let mut local = vec![0u64; global.len()];

    for tile in tiles {
        let mut border_distance = i64::MAX;
        let mut inside = true;
        for (d, &g) in global.iter().enumerate() {
            let (min, max) = (tile.bounds.min(d), tile.bounds.max(d));
            if g < min || g >= max {
                inside = false;
                break;
            }
            local[d] = (g - min) as u64;
            border_distance = border_distance.min(g - min).min(max - 1 - g);
        }
        if !inside {
            continue;
        }
        let weight = (border_distance + 1) as f64;
        weighted += weight * f64::from(tile.pixels.get(&local));
        total_weight += weight;
    }

    if total_weight > 0.0 {
        weighted / total_weight
    } else {
        0.0
    }
}

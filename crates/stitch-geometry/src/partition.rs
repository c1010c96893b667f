//! Regular partitioning of space into cells, and per-cell tile lookup.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::boundaries::Boundaries;
use crate::error::GeometryError;
use crate::tile::Tile;

/// Grid-aligned subregion of space: the unit of fused output and of work.
///
/// Before fusion `bounds` is in the source tier's pixel space; after fusion it
/// is replaced by the downsampled box and `file` points at the written data.
/// Serialized as a tile-like record (`index`, `grid`, `position`, `size`,
/// `file`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "CellRecord", try_from = "CellRecord")]
pub struct Cell {
    /// Sequential id within the partition that produced the cell.
    pub index: usize,
    /// Position of the cell within its grid.
    pub grid: Vec<u64>,
    pub bounds: Boundaries,
    pub file: Option<PathBuf>,
}

impl Cell {
    /// Tile-like view of the cell, so one tier's output feeds the next tier.
    pub fn to_tile(&self) -> Tile {
        Tile {
            index: self.index,
            file: self.file.clone().unwrap_or_default(),
            position: self.bounds.min_corner().iter().map(|&m| m as f64).collect(),
            size: Some(self.bounds.dimensions()),
            pixel_resolution: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CellRecord {
    index: usize,
    grid: Vec<u64>,
    position: Vec<i64>,
    size: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<PathBuf>,
}

impl From<Cell> for CellRecord {
    fn from(cell: Cell) -> Self {
        Self {
            index: cell.index,
            size: cell.bounds.dimensions(),
            position: cell.bounds.min_corner().to_vec(),
            grid: cell.grid,
            file: cell.file,
        }
    }
}

impl TryFrom<CellRecord> for Cell {
    type Error = GeometryError;

    fn try_from(record: CellRecord) -> Result<Self, Self::Error> {
        if record.grid.len() != record.position.len() {
            return Err(GeometryError::DimensionMismatch {
                expected: record.position.len(),
                actual: record.grid.len(),
            });
        }
        Ok(Self {
            index: record.index,
            grid: record.grid,
            bounds: Boundaries::from_min_size(record.position, &record.size)?,
            file: record.file,
        })
    }
}

/// Tile `region` with a regular grid of cells anchored at `region.min`.
///
/// Cells along the far edge of each axis are clipped to the region rather
/// than padded, so the cells cover the region exactly with no overlap. The
/// order is fixed (axis 0 varies fastest, the last axis slowest) so that
/// the same region and cell size always reproduce the same list.
pub fn divide_space(region: &Boundaries, cell_size: &[u64]) -> Result<Vec<Cell>, GeometryError> {
    let dims = region.num_dimensions();
    if cell_size.len() != dims {
        return Err(GeometryError::DimensionMismatch {
            expected: dims,
            actual: cell_size.len(),
        });
    }
    if let Some(axis) = cell_size.iter().position(|&s| s == 0) {
        return Err(GeometryError::InvalidCellSize { axis });
    }

    let counts: Vec<u64> = (0..dims)
        .map(|d| region.dimension(d).div_ceil(cell_size[d]))
        .collect();
    let total: u64 = counts.iter().product();

    let mut cells = Vec::with_capacity(total as usize);
    for linear in 0..total {
        let mut rest = linear;
        let mut grid = Vec::with_capacity(dims);
        for &count in &counts {
            grid.push(rest % count);
            rest /= count;
        }

        let min: Vec<i64> = (0..dims)
            .map(|d| region.min(d) + (grid[d] * cell_size[d]) as i64)
            .collect();
        let max: Vec<i64> = (0..dims)
            .map(|d| (min[d] + cell_size[d] as i64).min(region.max(d)))
            .collect();

        cells.push(Cell {
            index: linear as usize,
            grid,
            bounds: Boundaries::new(min, max)?,
            file: None,
        });
    }
    Ok(cells)
}

/// Tiles whose boxes share a non-empty region with `cell`, in input order.
pub fn tiles_within(tiles: &[Tile], cell: &Boundaries) -> Result<Vec<Tile>, GeometryError> {
    let mut within = Vec::new();
    for tile in tiles {
        let bounds = tile.boundaries()?;
        if bounds.num_dimensions() != cell.num_dimensions() {
            return Err(GeometryError::DimensionMismatch {
                expected: cell.num_dimensions(),
                actual: bounds.num_dimensions(),
            });
        }
        if bounds.intersects(cell) {
            within.push(tile.clone());
        }
    }
    Ok(within)
}

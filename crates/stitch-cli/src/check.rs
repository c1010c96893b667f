//! `stitch check`: placement diagnostics for tile configurations.
//!
//! Reports, per axis, how many tile pairs are adjacent and how wide their
//! overlaps are. With `--grid`, adjacency is also compared with the grid
//! coordinates encoded in tile file names (`..._003x_001y_000z.raw`).

use std::collections::HashMap;

use stitch_geometry::{
    GeometryError, OverlapStats, ShortEdgeThreshold, Tile, filter_adjacent_pairs,
    find_overlapping_pairs, overlap_statistics, verify_against_grid,
};

use crate::CliError;

const AXIS_SUFFIXES: [char; 3] = ['x', 'y', 'z'];

/// Adjacency summary along one axis.
#[derive(Clone, Debug, PartialEq)]
pub struct AxisReport {
    pub axis: usize,
    pub adjacent: usize,
    pub stats: Option<OverlapStats>,
}

/// Adjacency summary of one channel.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelReport {
    pub tiles: usize,
    pub overlapping: usize,
    pub axes: Vec<AxisReport>,
}

/// Classify a channel's tile pairs, optionally verifying them against the
/// grid coordinates in the tile file names.
pub fn check_channel(
    tiles: &[Tile],
    threshold: ShortEdgeThreshold,
    verify_grid: bool,
) -> Result<ChannelReport, CliError> {
    let dims = tiles
        .first()
        .map(Tile::num_dimensions)
        .ok_or(GeometryError::EmptyCollection)?;
    let overlapping = find_overlapping_pairs(tiles)?;

    let grid = if verify_grid {
        let mut coords = HashMap::with_capacity(tiles.len());
        for tile in tiles {
            let parsed = grid_coordinates(tile, dims).ok_or_else(|| CliError::GridName {
                file: tile.file.display().to_string(),
            })?;
            coords.insert(tile.index, parsed);
        }
        Some(coords)
    } else {
        None
    };

    let mut axes = Vec::with_capacity(dims);
    for axis in 0..dims {
        let adjacent = filter_adjacent_pairs(&overlapping, Some(axis), threshold)?;
        if let Some(coords) = &grid {
            verify_against_grid(&overlapping, &adjacent, axis, |tile| {
                coords.get(&tile.index).cloned().unwrap_or_default()
            })?;
        }
        axes.push(AxisReport {
            axis,
            adjacent: adjacent.len(),
            stats: overlap_statistics(&adjacent, axis)?,
        });
    }

    Ok(ChannelReport {
        tiles: tiles.len(),
        overlapping: overlapping.len(),
        axes,
    })
}

/// Grid coordinates from a tile's file name: one `<digits><axis>` token per
/// axis, e.g. `tile_003x_001y_000z.raw` gives `[3, 1, 0]`.
pub fn grid_coordinates(tile: &Tile, dims: usize) -> Option<Vec<i64>> {
    let name = tile.file.file_name()?.to_str()?;
    let mut coords: Vec<Option<i64>> = vec![None; dims];
    for token in name.split(|c: char| !c.is_ascii_alphanumeric()) {
        let Some(suffix) = token.chars().last() else {
            continue;
        };
        let Some(axis) = AXIS_SUFFIXES.iter().position(|&s| s == suffix) else {
            continue;
        };
        let digits = &token[..token.len() - 1];
        if axis >= dims || digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        coords[axis] = digits.parse().ok();
    }
    coords.into_iter().collect()
}

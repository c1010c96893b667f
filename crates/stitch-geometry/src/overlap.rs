//! Pairwise tile overlap and adjacency classification.
//!
//! Adjacency is decided from the shape of the overlap region: two direct
//! neighbours on a regular placement grid overlap substantially on every axis
//! but one, and only marginally on that one ("short edge").

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};

use crate::boundaries::Boundaries;
use crate::error::GeometryError;
use crate::tile::Tile;

/// Fraction of the largest possible overlap below which an axis counts as a
/// short edge. Evaluated in integer arithmetic:
/// `overlap < min(size_a, size_b) * numerator / denominator`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShortEdgeThreshold {
    pub numerator: u64,
    pub denominator: u64,
}

/// Half of the smaller tile extent.
pub const DEFAULT_SHORT_EDGE_THRESHOLD: ShortEdgeThreshold = ShortEdgeThreshold {
    numerator: 1,
    denominator: 2,
};

impl Default for ShortEdgeThreshold {
    fn default() -> Self {
        DEFAULT_SHORT_EDGE_THRESHOLD
    }
}

impl ShortEdgeThreshold {
    fn is_short(&self, overlap: u64, max_possible: u64) -> bool {
        overlap < max_possible * self.numerator / self.denominator.max(1)
    }
}

/// Unordered pair of tiles.
///
/// Equality, hashing and ordering only look at the two tile indices, so
/// `(a, b)` and `(b, a)` are the same pair. Role order matters only to
/// consumers of [`filter_adjacent_pairs`], which fixes it canonically.
#[derive(Clone, Debug)]
pub struct TilePair {
    pub first: Tile,
    pub second: Tile,
}

impl TilePair {
    pub fn new(first: Tile, second: Tile) -> Self {
        Self { first, second }
    }

    /// Order-independent identity: `(min index, max index)`.
    pub fn key(&self) -> (usize, usize) {
        let (a, b) = (self.first.index, self.second.index);
        (a.min(b), a.max(b))
    }

    pub fn swap(&mut self) {
        std::mem::swap(&mut self.first, &mut self.second);
    }
}

impl PartialEq for TilePair {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for TilePair {}

impl Hash for TilePair {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for TilePair {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TilePair {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

/// Every pair of tiles whose boxes share a non-empty region.
///
/// Exhaustive pairwise test; mosaics hold thousands of tiles, not millions.
pub fn find_overlapping_pairs(tiles: &[Tile]) -> Result<BTreeSet<TilePair>, GeometryError> {
    let boxes = tiles
        .iter()
        .map(Tile::boundaries)
        .collect::<Result<Vec<_>, _>>()?;
    if let Some(first) = boxes.first() {
        let dims = first.num_dimensions();
        if let Some(other) = boxes.iter().find(|b| b.num_dimensions() != dims) {
            return Err(GeometryError::DimensionMismatch {
                expected: dims,
                actual: other.num_dimensions(),
            });
        }
    }

    let mut pairs = BTreeSet::new();
    for i in 0..tiles.len() {
        for j in (i + 1)..tiles.len() {
            if boxes[i].intersects(&boxes[j]) {
                pairs.insert(TilePair::new(tiles[i].clone(), tiles[j].clone()));
            }
        }
    }
    tracing::debug!(
        "{} overlapping pairs among {} tiles",
        pairs.len(),
        tiles.len()
    );
    Ok(pairs)
}

/// Global overlap region of a pair, `None` if the tiles do not overlap.
pub fn overlap_region(pair: &TilePair) -> Result<Option<Boundaries>, GeometryError> {
    let a = pair.first.boundaries()?;
    let b = pair.second.boundaries()?;
    if a.num_dimensions() != b.num_dimensions() {
        return Err(GeometryError::DimensionMismatch {
            expected: a.num_dimensions(),
            actual: b.num_dimensions(),
        });
    }
    Ok(a.intersect(&b))
}

/// Axis along which the pair is adjacent, if any.
///
/// Returns `Some(d)` iff the tiles overlap and `d` is the only short axis.
/// Pairs with no short axis or several short axes are not adjacent.
pub fn adjacency_axis(
    pair: &TilePair,
    threshold: ShortEdgeThreshold,
) -> Result<Option<usize>, GeometryError> {
    let Some(overlap) = overlap_region(pair)? else {
        return Ok(None);
    };
    let size_a = pair.first.size()?;
    let size_b = pair.second.size()?;

    let mut short_axes = (0..overlap.num_dimensions())
        .filter(|&d| threshold.is_short(overlap.dimension(d), size_a[d].min(size_b[d])));
    match (short_axes.next(), short_axes.next()) {
        (Some(d), None) => Ok(Some(d)),
        _ => Ok(None),
    }
}

/// Returns true if the pair is adjacent along exactly one axis, using the
/// default short-edge threshold.
pub fn is_adjacent(pair: &TilePair) -> Result<bool, GeometryError> {
    Ok(adjacency_axis(pair, DEFAULT_SHORT_EDGE_THRESHOLD)?.is_some())
}

/// Adjacent pairs, optionally restricted to one axis.
///
/// Input order is preserved and the input is left untouched. Each returned
/// pair is a copy with the tile at the lower position along the adjacency
/// axis as `first`; downstream consistency checks rely on that order.
pub fn filter_adjacent_pairs<'a>(
    pairs: impl IntoIterator<Item = &'a TilePair>,
    axis: Option<usize>,
    threshold: ShortEdgeThreshold,
) -> Result<Vec<TilePair>, GeometryError> {
    let mut adjacent = Vec::new();
    for pair in pairs {
        if let Some(wanted) = axis {
            let dims = pair.first.num_dimensions();
            if wanted >= dims {
                return Err(GeometryError::AxisOutOfRange {
                    axis: wanted,
                    dimensions: dims,
                });
            }
        }
        let Some(d) = adjacency_axis(pair, threshold)? else {
            continue;
        };
        if axis.is_some_and(|wanted| wanted != d) {
            continue;
        }
        let mut ordered = pair.clone();
        if ordered.first.position[d] > ordered.second.position[d] {
            ordered.swap();
        }
        adjacent.push(ordered);
    }
    Ok(adjacent)
}

/// Summary of overlap widths along one axis, in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OverlapStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

/// Overlap width statistics for pairs adjacent along `axis`.
///
/// The width of a pair is `size_first[axis] - |pos_second - pos_first|`.
/// Returns `None` for an empty pair list.
pub fn overlap_statistics(
    pairs: &[TilePair],
    axis: usize,
) -> Result<Option<OverlapStats>, GeometryError> {
    if pairs.is_empty() {
        return Ok(None);
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for pair in pairs {
        let size = pair.first.size()?;
        if axis >= size.len() {
            return Err(GeometryError::AxisOutOfRange {
                axis,
                dimensions: size.len(),
            });
        }
        let width =
            size[axis] as f64 - (pair.second.position[axis] - pair.first.position[axis]).abs();
        min = min.min(width);
        max = max.max(width);
        sum += width;
    }
    Ok(Some(OverlapStats {
        count: pairs.len(),
        min,
        max,
        mean: sum / pairs.len() as f64,
    }))
}

/// Check adjacency classification against known grid coordinates.
///
/// Among `overlapping`, the pairs whose grid coordinates differ by exactly one
/// step along `axis` and nowhere else must be exactly the pairs in
/// `adjacent`.
pub fn verify_against_grid<'a, F>(
    overlapping: impl IntoIterator<Item = &'a TilePair>,
    adjacent: &[TilePair],
    axis: usize,
    grid_of: F,
) -> Result<(), GeometryError>
where
    F: Fn(&Tile) -> Vec<i64>,
{
    let mut remaining: BTreeSet<(usize, usize)> = adjacent.iter().map(TilePair::key).collect();
    let mut missing = 0;
    for pair in overlapping {
        let a = grid_of(&pair.first);
        let b = grid_of(&pair.second);
        let diffs: Vec<(usize, i64)> = a
            .iter()
            .zip(&b)
            .enumerate()
            .filter(|(_, (x, y))| x != y)
            .map(|(d, (x, y))| (d, y - x))
            .collect();
        let is_grid_neighbour = matches!(diffs.as_slice(), [(d, step)] if *d == axis && step.abs() == 1);
        if is_grid_neighbour && !remaining.remove(&pair.key()) {
            missing += 1;
        }
    }
    if missing > 0 || !remaining.is_empty() {
        return Err(GeometryError::GridMismatch {
            axis,
            missing,
            extra: remaining.len(),
        });
    }
    Ok(())
}

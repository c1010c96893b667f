//! Tile descriptors: one source image volume placed in pixel space.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::boundaries::Boundaries;
use crate::error::GeometryError;

/// One source image volume with a known position in the mosaic.
///
/// Tiles are read-only inputs once loaded. `size` may be unset until the
/// image metadata has been resolved; deriving a box from such a tile fails.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tile {
    /// Stable identifier within the tile's channel.
    pub index: usize,
    /// Location of the backing pixel data.
    pub file: PathBuf,
    /// Origin in pixel space, one entry per axis.
    pub position: Vec<f64>,
    /// Extent in pixels, one entry per axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<Vec<u64>>,
    /// Physical size of one pixel, one entry per axis.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pixel_resolution: Option<Vec<f64>>,
}

impl Tile {
    pub fn new(index: usize, file: impl Into<PathBuf>, position: Vec<f64>, size: Vec<u64>) -> Self {
        Self {
            index,
            file: file.into(),
            position,
            size: Some(size),
            pixel_resolution: None,
        }
    }

    pub fn num_dimensions(&self) -> usize {
        self.position.len()
    }

    /// Position rounded to the pixel grid (halves round up).
    pub fn rounded_position(&self) -> Vec<i64> {
        self.position.iter().map(|&p| round_half_up(p)).collect()
    }

    /// Extent in pixels, or an error if it has not been resolved.
    pub fn size(&self) -> Result<&[u64], GeometryError> {
        self.size
            .as_deref()
            .ok_or(GeometryError::SizeUnset { index: self.index })
    }

    /// Pixel-space box covered by this tile.
    pub fn boundaries(&self) -> Result<Boundaries, GeometryError> {
        let size = self.size()?;
        if size.len() != self.position.len() {
            return Err(GeometryError::DimensionMismatch {
                expected: self.position.len(),
                actual: size.len(),
            });
        }
        Boundaries::from_min_size(self.rounded_position(), size)
    }
}

fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Shift a tile collection so that its bounding box starts at the origin.
///
/// The shift is the per-axis minimum of the rounded tile positions, always a
/// whole number of pixels, so every rounded position moves by exactly the
/// same integer and all pairwise pixel offsets are preserved. Returns the
/// offset that was subtracted.
pub fn translate_tiles_to_origin(tiles: &mut [Tile]) -> Result<Vec<i64>, GeometryError> {
    let first = tiles.first().ok_or(GeometryError::EmptyCollection)?;
    let dims = first.num_dimensions();
    let mut offset = vec![i64::MAX; dims];
    for tile in tiles.iter() {
        if tile.num_dimensions() != dims {
            return Err(GeometryError::DimensionMismatch {
                expected: dims,
                actual: tile.num_dimensions(),
            });
        }
        for (o, p) in offset.iter_mut().zip(tile.rounded_position()) {
            *o = (*o).min(p);
        }
    }
    for tile in tiles.iter_mut() {
        for (p, &o) in tile.position.iter_mut().zip(&offset) {
            *p -= o as f64;
        }
    }
    Ok(offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boundaries_from_position_and_size() {
        let tile = Tile::new(0, "a.raw", vec![10.4, 20.6, -3.0], vec![100, 50, 20]);
        let b = tile.boundaries().unwrap();
        assert_eq!(b.min_corner(), &[10, 21, -3]);
        assert_eq!(b.max_corner(), &[110, 71, 17]);
    }

    #[test]
    fn test_halves_round_up() {
        let tile = Tile::new(0, "a.raw", vec![0.5, -0.5], vec![1, 1]);
        assert_eq!(tile.rounded_position(), vec![1, 0]);
    }

    #[test]
    fn test_unset_size_is_geometry_error() {
        let mut tile = Tile::new(7, "a.raw", vec![0.0, 0.0], vec![1, 1]);
        tile.size = None;
        assert_eq!(
            tile.boundaries(),
            Err(GeometryError::SizeUnset { index: 7 })
        );
    }

    #[test]
    fn test_size_dimension_mismatch() {
        let tile = Tile::new(0, "a.raw", vec![0.0, 0.0, 0.0], vec![1, 1]);
        assert!(matches!(
            tile.boundaries(),
            Err(GeometryError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_translate_to_origin_preserves_offsets() {
        let mut tiles = vec![
            Tile::new(0, "a", vec![100.4, -50.0, 7.0], vec![10, 10, 10]),
            Tile::new(1, "b", vec![190.6, -41.5, 9.2], vec![10, 10, 10]),
            Tile::new(2, "c", vec![101.0, 30.2, 6.5], vec![10, 10, 10]),
        ];
        let before: Vec<Vec<i64>> = tiles.iter().map(Tile::rounded_position).collect();

        let offset = translate_tiles_to_origin(&mut tiles).unwrap();
        assert_eq!(offset, vec![100, -50, 7]);

        let after: Vec<Vec<i64>> = tiles.iter().map(Tile::rounded_position).collect();
        for i in 0..tiles.len() {
            for j in 0..tiles.len() {
                for d in 0..3 {
                    assert_eq!(
                        before[i][d] - before[j][d],
                        after[i][d] - after[j][d],
                        "offset drift between tiles {i} and {j} on axis {d}"
                    );
                }
            }
        }
        let bounds = crate::collection_boundaries(&tiles).unwrap();
        assert_eq!(bounds.min_corner(), &[0, 0, 0]);
    }

    #[test]
    fn test_translate_empty_is_error() {
        let mut tiles: Vec<Tile> = Vec::new();
        assert_eq!(
            translate_tiles_to_origin(&mut tiles),
            Err(GeometryError::EmptyCollection)
        );
    }

    #[test]
    fn test_json_field_names() {
        let mut tile = Tile::new(3, "/data/t3.raw", vec![1.0, 2.0], vec![4, 5]);
        tile.pixel_resolution = Some(vec![0.097, 0.097]);
        let json = serde_json::to_string(&tile).unwrap();
        assert!(json.contains("\"pixelResolution\""));
        let back: Tile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, tile);

        let unsized_tile: Tile =
            serde_json::from_str(r#"{"index":0,"file":"x","position":[0.0,0.0]}"#).unwrap();
        assert_eq!(unsized_tile.size, None);
    }
}

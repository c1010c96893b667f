//! Tile configuration files: a JSON array of tiles per channel.

use std::path::Path;

use stitch_geometry::Tile;
use tracing::debug;

use crate::error::FusionError;
use crate::export::save_json;

/// Load a channel's tiles. Relative tile paths are resolved against the
/// directory holding the configuration file.
pub fn load_tiles(path: &Path) -> Result<Vec<Tile>, FusionError> {
    let contents = std::fs::read_to_string(path).map_err(|source| FusionError::TileConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    let mut tiles: Vec<Tile> =
        serde_json::from_str(&contents).map_err(|source| FusionError::TileConfigParse {
            path: path.to_path_buf(),
            source,
        })?;

    if let Some(dir) = path.parent() {
        for tile in &mut tiles {
            if tile.file.is_relative() {
                tile.file = dir.join(&tile.file);
            }
        }
    }
    debug!(path = %path.display(), tiles = tiles.len(), "Loaded tile configuration");
    Ok(tiles)
}

/// Write tiles as a pretty JSON array, atomically.
pub fn save_tiles(path: &Path, tiles: &[Tile]) -> Result<(), FusionError> {
    save_json(path, &tiles)
}

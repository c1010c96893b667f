//! Raw `f32` volume files and the cell I/O seams.
//!
//! ## Format
//!
//! Headerless little-endian `f32` samples, x varying fastest. The extent is
//! not stored: it is implied by the size recorded for the tile or cell, so a
//! file whose length disagrees with that size is malformed.

use std::path::Path;

use crate::buffer::PixelBuffer;
use crate::error::FusionError;
use crate::layout::write_atomic;

const BYTES_PER_SAMPLE: u64 = std::mem::size_of::<f32>() as u64;

/// Source of tile pixel data.
pub trait VolumeReader: Send + Sync {
    /// Read the volume stored at `path`, whose extent is `dimensions`.
    fn read(&self, path: &Path, dimensions: &[u64]) -> Result<PixelBuffer, FusionError>;
}

/// Sink for fused cell data.
pub trait CellWriter: Send + Sync {
    /// Persist `buffer` at `path`, creating parent directories as needed.
    fn write(&self, path: &Path, buffer: &PixelBuffer) -> Result<(), FusionError>;
}

/// Reader and writer for headerless raw volumes.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawVolumeIo;

impl VolumeReader for RawVolumeIo {
    fn read(&self, path: &Path, dimensions: &[u64]) -> Result<PixelBuffer, FusionError> {
        let bytes = std::fs::read(path).map_err(|source| FusionError::TileRead {
            path: path.to_path_buf(),
            source,
        })?;

        let expected = dimensions.iter().product::<u64>() * BYTES_PER_SAMPLE;
        if bytes.len() as u64 != expected {
            return Err(FusionError::MalformedTile {
                path: path.to_path_buf(),
                expected,
                actual: bytes.len() as u64,
            });
        }

        let words: Vec<u32> = bytemuck::pod_collect_to_vec(&bytes[..]);
        let data = words
            .into_iter()
            .map(|word| f32::from_bits(u32::from_le(word)))
            .collect();
        PixelBuffer::from_data(dimensions.to_vec(), data)
    }
}

impl CellWriter for RawVolumeIo {
    fn write(&self, path: &Path, buffer: &PixelBuffer) -> Result<(), FusionError> {
        let words: Vec<u32> = buffer.data().iter().map(|v| v.to_bits().to_le()).collect();
        write_atomic(path, bytemuck::cast_slice(&words)).map_err(|source| {
            FusionError::CellWrite {
                path: path.to_path_buf(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fused/0/1/2.raw");
        let buffer =
            PixelBuffer::from_data(vec![3, 2], vec![0.0, 1.5, -2.0, 1e6, f32::MIN_POSITIVE, 42.0])
                .unwrap();

        RawVolumeIo.write(&path, &buffer).unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 24);
        assert_eq!(RawVolumeIo.read(&path, &[3, 2]).unwrap(), buffer);
    }

    #[test]
    fn test_samples_are_little_endian() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.raw");
        let buffer = PixelBuffer::from_data(vec![1], vec![1.0]).unwrap();
        RawVolumeIo.write(&path, &buffer).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), 1.0f32.to_le_bytes());
    }

    #[test]
    fn test_missing_tile_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            RawVolumeIo.read(&dir.path().join("absent.raw"), &[4, 4]),
            Err(FusionError::TileRead { .. })
        ));
    }

    #[test]
    fn test_length_mismatch_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.raw");
        std::fs::write(&path, [0u8; 60]).unwrap();
        match RawVolumeIo.read(&path, &[4, 4]) {
            Err(FusionError::MalformedTile {
                expected, actual, ..
            }) => {
                assert_eq!(expected, 64);
                assert_eq!(actual, 60);
            }
            other => panic!("expected MalformedTile, got {other:?}"),
        }
    }

    #[test]
    fn test_unwritable_cell_is_write_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fused"), "").unwrap();
        let buffer = PixelBuffer::zeros(vec![2, 2]);
        assert!(matches!(
            RawVolumeIo.write(&dir.path().join("fused/0/0.raw"), &buffer),
            Err(FusionError::CellWrite { .. })
        ));
    }
}

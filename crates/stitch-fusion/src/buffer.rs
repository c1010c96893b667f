//! Dense pixel buffers exchanged with blending kernels and cell writers.

use crate::error::FusionError;

/// Row-major `f32` volume, axis 0 (x) varying fastest.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelBuffer {
    dimensions: Vec<u64>,
    data: Vec<f32>,
}

impl PixelBuffer {
    /// Zero-filled buffer of the given extent.
    pub fn zeros(dimensions: Vec<u64>) -> Self {
        let len = dimensions.iter().product::<u64>() as usize;
        Self {
            dimensions,
            data: vec![0.0; len],
        }
    }

    /// Wrap existing samples; `data` must hold exactly one value per voxel.
    pub fn from_data(dimensions: Vec<u64>, data: Vec<f32>) -> Result<Self, FusionError> {
        let expected = dimensions.iter().product::<u64>();
        if data.len() as u64 != expected {
            return Err(FusionError::BufferExtent {
                expected: dimensions,
                actual: vec![data.len() as u64],
            });
        }
        Ok(Self { dimensions, data })
    }

    pub fn dimensions(&self) -> &[u64] {
        &self.dimensions
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Linear offset of a local voxel coordinate.
    pub fn offset(&self, coords: &[u64]) -> usize {
        linear_offset(&self.dimensions, coords)
    }

    pub fn get(&self, coords: &[u64]) -> f32 {
        self.data[self.offset(coords)]
    }
}

pub(crate) fn linear_offset(dimensions: &[u64], coords: &[u64]) -> usize {
    let mut offset = 0u64;
    let mut stride = 1u64;
    for (coord, dim) in coords.iter().zip(dimensions) {
        offset += coord * stride;
        stride *= dim;
    }
    offset as usize
}

/// Visit every coordinate of an extent in storage order.
pub(crate) fn for_each_coord(dimensions: &[u64], mut visit: impl FnMut(&[u64])) {
    if dimensions.is_empty() || dimensions.contains(&0) {
        return;
    }
    let mut coords = vec![0u64; dimensions.len()];
    'outer: loop {
        visit(&coords);
        for (axis, coord) in coords.iter_mut().enumerate() {
            *coord += 1;
            if *coord < dimensions[axis] {
                continue 'outer;
            }
            *coord = 0;
        }
        break;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_are_x_fastest() {
        let mut buffer = PixelBuffer::zeros(vec![4, 3, 2]);
        assert_eq!(buffer.len(), 24);
        assert_eq!(buffer.offset(&[1, 0, 0]), 1);
        assert_eq!(buffer.offset(&[0, 1, 0]), 4);
        assert_eq!(buffer.offset(&[0, 0, 1]), 12);
        let offset = buffer.offset(&[3, 2, 1]);
        buffer.data_mut()[offset] = 7.5;
        assert_eq!(buffer.data()[23], 7.5);
        assert_eq!(buffer.get(&[3, 2, 1]), 7.5);
    }

    #[test]
    fn test_from_data_checks_length() {
        assert!(PixelBuffer::from_data(vec![2, 2], vec![0.0; 4]).is_ok());
        assert!(matches!(
            PixelBuffer::from_data(vec![2, 2], vec![0.0; 3]),
            Err(FusionError::BufferExtent { .. })
        ));
    }

    #[test]
    fn test_for_each_coord_visits_in_storage_order() {
        let dims = [3u64, 2, 2];
        let mut seen = Vec::new();
        for_each_coord(&dims, |c| seen.push(linear_offset(&dims, c)));
        assert_eq!(seen, (0..12).collect::<Vec<_>>());

        let mut count = 0;
        for_each_coord(&[4, 0], |_| count += 1);
        assert_eq!(count, 0);
    }
}

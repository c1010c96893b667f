use serde::{Deserialize, Serialize};

use crate::error::GeometryError;
use crate::tile::Tile;

/// Axis-aligned integer box in pixel space, 2D or 3D.
///
/// Half-open on every axis: the box covers `min[d] <= x < max[d]`, so
/// `dimension(d) == max[d] - min[d]` and boxes that merely touch do not
/// intersect.
///
/// Invariant: `min[d] <= max[d]` on every axis. Constructors reject inverted
/// input instead of sorting it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "BoundariesRecord")]
pub struct Boundaries {
    min: Vec<i64>,
    max: Vec<i64>,
}

/// Unchecked wire form; deserialized boxes go through [`Boundaries::new`].
#[derive(Deserialize)]
struct BoundariesRecord {
    min: Vec<i64>,
    max: Vec<i64>,
}

impl TryFrom<BoundariesRecord> for Boundaries {
    type Error = GeometryError;

    fn try_from(record: BoundariesRecord) -> Result<Self, Self::Error> {
        Boundaries::new(record.min, record.max)
    }
}

impl Boundaries {
    /// Create a box from its lower and upper corners.
    pub fn new(min: Vec<i64>, max: Vec<i64>) -> Result<Self, GeometryError> {
        if min.len() != max.len() {
            return Err(GeometryError::DimensionMismatch {
                expected: min.len(),
                actual: max.len(),
            });
        }
        for (axis, (&lo, &hi)) in min.iter().zip(&max).enumerate() {
            if lo > hi {
                return Err(GeometryError::InvertedBounds {
                    axis,
                    min: lo,
                    max: hi,
                });
            }
        }
        Ok(Self { min, max })
    }

    /// Create a box from its lower corner and per-axis extent.
    pub fn from_min_size(min: Vec<i64>, size: &[u64]) -> Result<Self, GeometryError> {
        if min.len() != size.len() {
            return Err(GeometryError::DimensionMismatch {
                expected: min.len(),
                actual: size.len(),
            });
        }
        let max = min.iter().zip(size).map(|(&m, &s)| m + s as i64).collect();
        Ok(Self { min, max })
    }

    /// Smallest box enclosing every box of the iterator.
    pub fn enclosing<'a>(
        boxes: impl IntoIterator<Item = &'a Boundaries>,
    ) -> Result<Self, GeometryError> {
        let mut iter = boxes.into_iter();
        let first = iter.next().ok_or(GeometryError::EmptyCollection)?.clone();
        iter.try_fold(first, |acc, b| acc.union(b))
    }

    pub fn num_dimensions(&self) -> usize {
        self.min.len()
    }

    pub fn min(&self, d: usize) -> i64 {
        self.min[d]
    }

    pub fn max(&self, d: usize) -> i64 {
        self.max[d]
    }

    pub fn min_corner(&self) -> &[i64] {
        &self.min
    }

    pub fn max_corner(&self) -> &[i64] {
        &self.max
    }

    /// Extent along axis `d`.
    pub fn dimension(&self, d: usize) -> u64 {
        (self.max[d] - self.min[d]) as u64
    }

    /// Extent along every axis.
    pub fn dimensions(&self) -> Vec<u64> {
        (0..self.num_dimensions()).map(|d| self.dimension(d)).collect()
    }

    /// Returns true if the box has zero extent on at least one axis.
    pub fn is_empty(&self) -> bool {
        self.min.iter().zip(&self.max).any(|(lo, hi)| lo == hi)
    }

    /// Returns true if `other` lies entirely inside this box.
    pub fn contains(&self, other: &Boundaries) -> bool {
        self.num_dimensions() == other.num_dimensions()
            && (0..self.num_dimensions())
                .all(|d| other.min[d] >= self.min[d] && other.max[d] <= self.max[d])
    }

    /// Overlap of two boxes, or `None` when they do not overlap.
    ///
    /// An axis where the ranges only touch or are inverted means no overlap:
    /// a zero-extent intersection is never returned. Boxes of different
    /// dimensionality never overlap.
    pub fn intersect(&self, other: &Boundaries) -> Option<Boundaries> {
        if self.num_dimensions() != other.num_dimensions() {
            return None;
        }
        let mut min = Vec::with_capacity(self.num_dimensions());
        let mut max = Vec::with_capacity(self.num_dimensions());
        for d in 0..self.num_dimensions() {
            let lo = self.min[d].max(other.min[d]);
            let hi = self.max[d].min(other.max[d]);
            if lo >= hi {
                return None;
            }
            min.push(lo);
            max.push(hi);
        }
        Some(Boundaries { min, max })
    }

    /// Returns true if the two boxes share a non-empty region.
    pub fn intersects(&self, other: &Boundaries) -> bool {
        self.intersect(other).is_some()
    }

    /// Smallest box enclosing both boxes.
    pub fn union(&self, other: &Boundaries) -> Result<Boundaries, GeometryError> {
        if self.num_dimensions() != other.num_dimensions() {
            return Err(GeometryError::DimensionMismatch {
                expected: self.num_dimensions(),
                actual: other.num_dimensions(),
            });
        }
        Ok(Boundaries {
            min: self.min.iter().zip(&other.min).map(|(a, b)| *a.min(b)).collect(),
            max: self.max.iter().zip(&other.max).map(|(a, b)| *a.max(b)).collect(),
        })
    }

    /// Box shifted by `offset`.
    pub fn translate(&self, offset: &[i64]) -> Result<Boundaries, GeometryError> {
        if offset.len() != self.num_dimensions() {
            return Err(GeometryError::DimensionMismatch {
                expected: self.num_dimensions(),
                actual: offset.len(),
            });
        }
        Ok(Boundaries {
            min: self.min.iter().zip(offset).map(|(m, o)| m + o).collect(),
            max: self.max.iter().zip(offset).map(|(m, o)| m + o).collect(),
        })
    }
}

/// Box enclosing every tile of the collection.
pub fn collection_boundaries(tiles: &[Tile]) -> Result<Boundaries, GeometryError> {
    let boxes = tiles
        .iter()
        .map(Tile::boundaries)
        .collect::<Result<Vec<_>, _>>()?;
    Boundaries::enclosing(&boxes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bx(min: &[i64], max: &[i64]) -> Boundaries {
        Boundaries::new(min.to_vec(), max.to_vec()).unwrap()
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let result = Boundaries::new(vec![0, 5], vec![10, 4]);
        assert_eq!(
            result,
            Err(GeometryError::InvertedBounds {
                axis: 1,
                min: 5,
                max: 4
            })
        );
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        assert!(matches!(
            Boundaries::new(vec![0, 0, 0], vec![1, 1]),
            Err(GeometryError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_from_min_size() {
        let b = Boundaries::from_min_size(vec![2, 3, 4], &[10, 20, 30]).unwrap();
        assert_eq!(b.max_corner(), &[12, 23, 34]);
        assert_eq!(b.dimensions(), vec![10, 20, 30]);
    }

    #[test]
    fn test_intersect_overlapping() {
        let a = bx(&[0, 0, 0], &[10, 10, 10]);
        let b = bx(&[5, 2, 8], &[15, 12, 18]);
        let i = a.intersect(&b).unwrap();
        assert_eq!(i, bx(&[5, 2, 8], &[10, 10, 10]));
    }

    #[test]
    fn test_intersect_is_symmetric() {
        let boxes = [
            bx(&[0, 0], &[10, 10]),
            bx(&[5, -3], &[12, 4]),
            bx(&[10, 0], &[20, 10]),
            bx(&[-5, -5], &[0, 0]),
            bx(&[3, 3], &[4, 4]),
        ];
        for a in &boxes {
            for b in &boxes {
                assert_eq!(a.intersect(b), b.intersect(a));
            }
        }
    }

    #[test]
    fn test_touching_boxes_do_not_intersect() {
        let a = bx(&[0, 0, 0], &[10, 10, 10]);
        let b = bx(&[10, 0, 0], &[20, 10, 10]);
        assert_eq!(a.intersect(&b), None);
        assert!(!a.intersects(&b));
    }

    #[test]
    fn test_disjoint_boxes_do_not_intersect() {
        let a = bx(&[0, 0], &[10, 10]);
        let b = bx(&[20, 0], &[30, 10]);
        assert_eq!(a.intersect(&b), None);
    }

    #[test]
    fn test_mixed_dimensionality_does_not_intersect() {
        let a = bx(&[0, 0], &[10, 10]);
        let b = bx(&[0, 0, 0], &[10, 10, 10]);
        assert_eq!(a.intersect(&b), None);
        assert!(!b.intersects(&a));
    }

    #[test]
    fn test_union_encloses_both() {
        let a = bx(&[0, 5], &[5, 10]);
        let b = bx(&[3, -2], &[9, 7]);
        let u = a.union(&b).unwrap();
        assert_eq!(u, bx(&[0, -2], &[9, 10]));
        assert!(u.contains(&a));
        assert!(u.contains(&b));
    }

    #[test]
    fn test_enclosing_empty_is_error() {
        let none: Vec<Boundaries> = Vec::new();
        assert_eq!(
            Boundaries::enclosing(&none),
            Err(GeometryError::EmptyCollection)
        );
    }

    #[test]
    fn test_translate() {
        let a = bx(&[1, 2, 3], &[4, 5, 6]);
        let t = a.translate(&[-1, -2, -3]).unwrap();
        assert_eq!(t, bx(&[0, 0, 0], &[3, 3, 3]));
        assert_eq!(t.dimensions(), a.dimensions());
    }

    #[test]
    fn test_is_empty() {
        assert!(bx(&[0, 0], &[0, 5]).is_empty());
        assert!(!bx(&[0, 0], &[1, 5]).is_empty());
    }

    #[test]
    fn test_deserialize_checks_bounds() {
        let ok: Boundaries = serde_json::from_str(r#"{"min":[0,5],"max":[10,7]}"#).unwrap();
        assert_eq!(ok, bx(&[0, 5], &[10, 7]));
        assert_eq!(ok.dimensions(), vec![10, 2]);

        let inverted = serde_json::from_str::<Boundaries>(r#"{"min":[0,5],"max":[10,4]}"#);
        assert!(inverted.unwrap_err().to_string().contains("inverted bounds"));
        assert!(serde_json::from_str::<Boundaries>(r#"{"min":[0],"max":[1,2]}"#).is_err());
    }
}

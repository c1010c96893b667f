//! Per-level downsampling arithmetic for anisotropic data.
//!
//! Voxel dimensions are normalized by their smallest entry, so the finest
//! axis has extent 1. A level's full factor on an axis is `2^L` divided by that
//! axis' normalized extent, which keeps coarse levels close to isotropic. The
//! x and y axes halve at every level; the depth axis only starts shrinking once
//! the x/y resolution has caught up with it. That schedule requires x and y to
//! share the finest voxel size.

use crate::error::FusionError;

/// Index of the depth axis in 3D data.
pub const DEPTH_AXIS: usize = 2;

/// Divide voxel dimensions by their minimum.
///
/// Fails with [`FusionError::UnevenPlane`] unless every axis other than depth
/// normalizes to 1.
pub fn normalize_voxel_dimensions(voxel: &[f64]) -> Result<Vec<f64>, FusionError> {
    let min = voxel.iter().copied().fold(f64::INFINITY, f64::min);
    if voxel.is_empty() || !min.is_finite() || min <= 0.0 || voxel.iter().any(|v| !v.is_finite()) {
        return Err(FusionError::VoxelDimensions {
            voxel: voxel.to_vec(),
            dimensions: voxel.len(),
        });
    }
    let normalized: Vec<f64> = voxel.iter().map(|v| v / min).collect();
    let uneven = normalized
        .iter()
        .enumerate()
        .any(|(d, &n)| d != DEPTH_AXIS && n != 1.0);
    if uneven {
        return Err(FusionError::UnevenPlane {
            voxel: voxel.to_vec(),
        });
    }
    Ok(normalized)
}

/// Round half up, matching how tile positions are rounded.
fn round_half_up(value: f64) -> u64 {
    (value + 0.5).floor().max(0.0) as u64
}

/// Downsampling parameters of one pyramid level.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelPlan {
    pub level: u32,
    /// Total factor relative to the input resolution.
    pub full: Vec<u64>,
    /// Factor relative to the previous full tier.
    pub step: Vec<u64>,
    /// Output cell size.
    pub cell: Vec<u64>,
    /// Source-space partition size: `step * cell`.
    pub upscaled: Vec<u64>,
}

impl LevelPlan {
    /// Plan for `level` with base `cell_size` and normalized voxel dimensions.
    pub fn for_level(level: u32, cell_size: u64, normalized: &[f64]) -> Self {
        let scale = 1u64 << level;
        let dims = normalized.len();

        let full: Vec<u64> = normalized
            .iter()
            .map(|n| round_half_up(scale as f64 / n).max(1))
            .collect();
        let single: Vec<u64> = normalized
            .iter()
            .map(|n| round_half_up(cell_size as f64 / n))
            .collect();

        let mut step = Vec::with_capacity(dims);
        let mut cell = Vec::with_capacity(dims);
        for d in 0..dims {
            if d == DEPTH_AXIS {
                step.push(full[d]);
                cell.push(single[d] * (scale / full[d]));
            } else {
                step.push(if level == 0 { 1 } else { 2 });
                cell.push(single[d]);
            }
        }
        let upscaled = step.iter().zip(&cell).map(|(s, c)| s * c).collect();

        Self {
            level,
            full,
            step,
            cell,
            upscaled,
        }
    }

    /// 3D levels that shrink the depth axis go through an XY-only tier.
    pub fn needs_xy_tier(&self) -> bool {
        self.step.len() > DEPTH_AXIS && self.step[DEPTH_AXIS] != 1
    }

    /// Factors applied to the XY-only tier to reach the full tier.
    pub fn depth_factors(&self) -> Vec<u64> {
        let mut factors = vec![1; self.step.len()];
        if let Some(f) = factors.get_mut(DEPTH_AXIS) {
            *f = self.step[DEPTH_AXIS];
        }
        factors
    }

    /// Partition size over the XY-only tier: `cell` in x/y, `upscaled` in depth.
    pub fn depth_partition(&self) -> Vec<u64> {
        let mut size = self.cell.clone();
        if let Some(s) = size.get_mut(DEPTH_AXIS) {
            *s = self.upscaled[DEPTH_AXIS];
        }
        size
    }
}

/// Factors producing an XY-only tier from the previous XY chain tier.
pub fn xy_factors(num_dimensions: usize) -> Vec<u64> {
    (0..num_dimensions)
        .map(|d| if d == DEPTH_AXIS { 1 } else { 2 })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_voxel_dimensions(&[0.5, 0.5, 2.0]).unwrap(),
            vec![1.0, 1.0, 4.0]
        );
        assert_eq!(normalize_voxel_dimensions(&[3.0, 3.0]).unwrap(), vec![1.0, 1.0]);
        assert!(normalize_voxel_dimensions(&[]).is_err());
        assert!(normalize_voxel_dimensions(&[1.0, 0.0, 1.0]).is_err());
        assert!(normalize_voxel_dimensions(&[1.0, f64::NAN]).is_err());
    }

    #[test]
    fn test_uneven_plane_rejected() {
        for voxel in [&[1.0, 2.0][..], &[1.0, 2.0, 4.0], &[2.0, 2.0, 1.0], &[0.5, 0.6, 0.5]] {
            assert!(
                matches!(
                    normalize_voxel_dimensions(voxel),
                    Err(FusionError::UnevenPlane { .. })
                ),
                "{voxel:?}"
            );
        }
        assert!(normalize_voxel_dimensions(&[0.2, 0.2, 0.2]).is_ok());
    }

    #[test]
    fn test_isotropic_levels() {
        let norm = [1.0, 1.0, 1.0];
        let l0 = LevelPlan::for_level(0, 64, &norm);
        assert_eq!(l0.full, vec![1, 1, 1]);
        assert_eq!(l0.step, vec![1, 1, 1]);
        assert_eq!(l0.cell, vec![64, 64, 64]);
        assert_eq!(l0.upscaled, vec![64, 64, 64]);
        assert!(!l0.needs_xy_tier());

        let l2 = LevelPlan::for_level(2, 64, &norm);
        assert_eq!(l2.full, vec![4, 4, 4]);
        assert_eq!(l2.step, vec![2, 2, 4]);
        assert_eq!(l2.cell, vec![64, 64, 64]);
        assert_eq!(l2.upscaled, vec![128, 128, 256]);
        assert!(l2.needs_xy_tier());
        assert_eq!(l2.depth_factors(), vec![1, 1, 4]);
        assert_eq!(l2.depth_partition(), vec![64, 64, 256]);
    }

    #[test]
    fn test_anisotropic_depth_waits_for_xy() {
        // z sampled three times coarser than x/y
        let norm = [1.0, 1.0, 3.0];
        let steps: Vec<Vec<u64>> = (0..4)
            .map(|l| LevelPlan::for_level(l, 64, &norm).step)
            .collect();
        assert_eq!(
            steps,
            vec![vec![1, 1, 1], vec![2, 2, 1], vec![2, 2, 1], vec![2, 2, 3]]
        );

        let l3 = LevelPlan::for_level(3, 64, &norm);
        assert_eq!(l3.full, vec![8, 8, 3]);
        // single z = round(64 / 3) = 21; 21 * (8 / 3)
        assert_eq!(l3.cell, vec![64, 64, 42]);
        assert_eq!(l3.upscaled, vec![128, 128, 126]);
    }

    #[test]
    fn test_two_dimensional_never_needs_xy_tier() {
        let norm = [1.0, 1.0];
        for level in 0..6 {
            let plan = LevelPlan::for_level(level, 64, &norm);
            assert!(!plan.needs_xy_tier());
            assert_eq!(plan.depth_factors(), vec![1, 1]);
            assert_eq!(plan.depth_partition(), plan.cell);
        }
        let l1 = LevelPlan::for_level(1, 64, &norm);
        assert_eq!(l1.full, vec![2, 2]);
        assert_eq!(l1.step, vec![2, 2]);
        assert_eq!(l1.cell, vec![64, 64]);
    }

    #[test]
    fn test_xy_factors() {
        assert_eq!(xy_factors(3), vec![2, 2, 1]);
        assert_eq!(xy_factors(2), vec![2, 2]);
    }
}

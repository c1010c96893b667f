//! Persistence of tier cell lists, the basis of resumable runs.
//!
//! A tier that has been saved is never recomputed: the pyramid builder asks
//! the store first and loads the saved cells when they exist.

use std::sync::Mutex;

use rustc_hash::FxHashMap;
use stitch_geometry::Cell;

use crate::error::FusionError;
use crate::layout::{OutputLayout, TierId, write_atomic};

/// Storage for the cell list of each tier.
pub trait TierStore {
    /// Whether `tier` has been saved before.
    fn has(&self, tier: &TierId) -> bool;

    /// Cells of a saved tier. Fails if the tier is missing or unreadable.
    fn load(&self, tier: &TierId) -> Result<Vec<Cell>, FusionError>;

    /// Persist the cells of `tier`, replacing any previous content.
    fn save(&self, tier: &TierId, cells: &[Cell]) -> Result<(), FusionError>;
}

/// Tier store backed by pretty-printed JSON files under the output layout.
#[derive(Clone, Debug)]
pub struct FsTierStore {
    layout: OutputLayout,
}

impl FsTierStore {
    pub fn new(layout: OutputLayout) -> Self {
        Self { layout }
    }
}

impl TierStore for FsTierStore {
    fn has(&self, tier: &TierId) -> bool {
        self.layout.tier_config_path(tier).is_file()
    }

    fn load(&self, tier: &TierId) -> Result<Vec<Cell>, FusionError> {
        let path = self.layout.tier_config_path(tier);
        let contents = std::fs::read_to_string(&path).map_err(|source| FusionError::TierLoad {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| FusionError::TierParse { path, source })
    }

    fn save(&self, tier: &TierId, cells: &[Cell]) -> Result<(), FusionError> {
        let path = self.layout.tier_config_path(tier);
        let json = serde_json::to_string_pretty(cells)?;
        write_atomic(&path, json.as_bytes()).map_err(|source| FusionError::TierSave { path, source })
    }
}

/// Tier store kept in memory; nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryTierStore {
    tiers: Mutex<FxHashMap<TierId, Vec<Cell>>>,
}

impl MemoryTierStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of saved tiers.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FxHashMap<TierId, Vec<Cell>>> {
        // A poisoned map is still consistent: every insert is a single call.
        self.tiers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TierStore for MemoryTierStore {
    fn has(&self, tier: &TierId) -> bool {
        self.lock().contains_key(tier)
    }

    fn load(&self, tier: &TierId) -> Result<Vec<Cell>, FusionError> {
        self.lock()
            .get(tier)
            .cloned()
            .ok_or_else(|| FusionError::MissingTier {
                tier: tier.to_string(),
            })
    }

    fn save(&self, tier: &TierId, cells: &[Cell]) -> Result<(), FusionError> {
        self.lock().insert(*tier, cells.to_vec());
        Ok(())
    }
}

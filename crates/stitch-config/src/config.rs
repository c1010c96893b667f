//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Top-level job configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Fusion and pyramid settings.
    pub fusion: FusionConfig,
    /// Output layout settings.
    pub output: OutputConfig,
    /// Worker pool and failure policy.
    pub execution: ExecutionConfig,
    /// Tile adjacency classification.
    pub adjacency: AdjacencyConfig,
    /// Debug/development settings.
    pub debug: DebugConfig,
}

/// Fusion and pyramid configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FusionConfig {
    /// Tile configuration JSON files, one per channel, in channel order.
    pub inputs: Vec<PathBuf>,
    /// Output cell edge length in pixels along the finest-sampled axis.
    pub cell_size: u64,
    /// Physical voxel size per axis (x, y, z).
    pub voxel_dimensions: Vec<f64>,
    /// Unit of `voxel_dimensions`.
    pub voxel_unit: String,
}

/// Output layout configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    /// Root folder; channels are written to `<base_folder>/channel<N>`.
    pub base_folder: PathBuf,
    /// File extension of fused cells.
    pub extension: String,
}

/// Execution configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Worker threads (0 = derive from CPU count).
    pub threads: usize,
    /// Log and continue when a tier or cell cannot be saved, instead of
    /// aborting the channel. Intended for diagnostics only.
    pub best_effort_saves: bool,
}

/// Adjacency classification configuration.
///
/// An axis of a tile pair's overlap is "short" when it is below
/// `numerator / denominator` of the smaller tile extent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AdjacencyConfig {
    pub short_edge_numerator: u64,
    pub short_edge_denominator: u64,
}

/// Debug/development configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
    /// Directory for JSON log files in debug builds.
    pub log_dir: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            cell_size: 64,
            voxel_dimensions: vec![1.0, 1.0, 1.0],
            voxel_unit: "um".to_string(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            base_folder: PathBuf::from("."),
            extension: "raw".to_string(),
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            best_effort_saves: false,
        }
    }
}

impl Default for AdjacencyConfig {
    fn default() -> Self {
        Self {
            short_edge_numerator: 1,
            short_edge_denominator: 2,
        }
    }
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Default config directory: `<platform config dir>/stitch`, or the working
/// directory when the platform has none.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("stitch"))
        .unwrap_or_else(|| PathBuf::from("."))
}

// --- Load / Save / Validate ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join("config.ron");

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let config_path = config_dir.join("config.ron");
        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);

        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(&config_path, serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Check ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fusion.cell_size == 0 {
            return Err(ConfigError::Invalid("fusion.cell_size must be positive".into()));
        }
        if self.fusion.voxel_dimensions.is_empty()
            || self
                .fusion
                .voxel_dimensions
                .iter()
                .any(|v| !v.is_finite() || *v <= 0.0)
        {
            return Err(ConfigError::Invalid(
                "fusion.voxel_dimensions must be positive".into(),
            ));
        }
        if self.adjacency.short_edge_denominator == 0 {
            return Err(ConfigError::Invalid(
                "adjacency.short_edge_denominator must be positive".into(),
            ));
        }
        if self.output.extension.is_empty() {
            return Err(ConfigError::Invalid("output.extension must not be empty".into()));
        }
        Ok(())
    }
}

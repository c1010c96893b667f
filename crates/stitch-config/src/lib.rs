//! Job configuration for the stitching pipeline.
//!
//! Settings persist to disk as `config.ron` and can be overridden from the
//! command line via clap. Every section defaults, so partial files load.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{
    AdjacencyConfig, Config, DebugConfig, ExecutionConfig, FusionConfig, OutputConfig,
    default_config_dir,
};
pub use error::ConfigError;

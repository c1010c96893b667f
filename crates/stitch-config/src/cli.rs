//! Command-line overrides for the job configuration.

use std::path::PathBuf;

use clap::Args;

use crate::Config;

/// Command-line settings shared by every `stitch` subcommand.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct CliArgs {
    /// Tile configuration JSON, one per channel (repeatable, in channel order).
    #[arg(short, long = "input")]
    pub inputs: Vec<PathBuf>,

    /// Output base folder.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Output cell size in pixels.
    #[arg(long)]
    pub cell_size: Option<u64>,

    /// Physical voxel size, comma-separated (e.g. 0.097,0.097,0.18).
    #[arg(long, value_delimiter = ',')]
    pub voxel_size: Option<Vec<f64>>,

    /// Worker threads (0 = one per CPU).
    #[arg(long)]
    pub threads: Option<usize>,

    /// Log and continue on save failures instead of aborting.
    #[arg(long)]
    pub best_effort: bool,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if !args.inputs.is_empty() {
            self.fusion.inputs = args.inputs.clone();
        }
        if let Some(ref output) = args.output {
            self.output.base_folder = output.clone();
        }
        if let Some(size) = args.cell_size {
            self.fusion.cell_size = size;
        }
        if let Some(ref voxel) = args.voxel_size {
            self.fusion.voxel_dimensions = voxel.clone();
        }
        if let Some(threads) = args.threads {
            self.execution.threads = threads;
        }
        if args.best_effort {
            self.execution.best_effort_saves = true;
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
    }
}

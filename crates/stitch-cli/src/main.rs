//! `stitch`: fuse stitched tile mosaics into resumable multiscale pyramids.
//!
//! Settings come from `config.ron` in the config directory (created with
//! defaults on first use) and are overridden by command-line flags.
//!
//! Run with: `cargo run -p stitch-cli -- -i channel0.json -o /scratch/out fuse`

mod check;
mod import;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use stitch_config::{CliArgs, Config, ConfigError, default_config_dir};
use stitch_fusion::{
    DistanceBlender, FsTierStore, FusionError, OutputLayout, Pipeline, PyramidBuilder,
    PyramidSettings, RawVolumeIo, SaveFailurePolicy, ThreadPoolExecutor, load_tiles,
};
use stitch_geometry::{GeometryError, ShortEdgeThreshold};
use tracing::{error, info};

/// CLI arguments for the `stitch` binary.
#[derive(Parser, Debug)]
#[command(name = "stitch", about = "Tile mosaic fusion and multiscale pyramid export")]
struct StitchArgs {
    #[command(flatten)]
    common: CliArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
enum Command {
    /// Fuse every channel into a pyramid and write the export metadata.
    Fuse,
    /// Report tile overlaps and adjacency per axis.
    Check {
        /// Verify adjacency against grid coordinates in tile file names.
        #[arg(long)]
        grid: bool,
    },
    /// Write per-channel tile configurations from a microscope ImageList CSV.
    Import {
        /// ImageList CSV; configurations are written next to it.
        image_list: PathBuf,
        /// Physical pixel size per axis, comma-separated (e.g. 0.097,0.097,0.18).
        #[arg(short = 'r', long, value_delimiter = ',', required = true)]
        pixel_resolution: Vec<f64>,
        /// Tile size in pixels per axis, comma-separated.
        #[arg(short = 't', long, value_delimiter = ',', required = true)]
        tile_size: Vec<u64>,
        /// Objective-to-pixel axis mapping.
        #[arg(short = 'a', long, default_value = "-y,x,z")]
        axes: String,
        /// Folder holding the tile images, replacing the listed directories.
        #[arg(short = 'b', long)]
        images: Option<PathBuf>,
    },
}

/// Everything that can end a `stitch` invocation early.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Fusion(#[from] FusionError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
    #[error("no tile configurations given (use --input or fusion.inputs)")]
    NoInputs,
    #[error("no grid coordinates in tile file name {file}")]
    GridName { file: String },
    #[error("failed to read image list {}", .path.display())]
    ImageListRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("image list line {line}: {message}")]
    ImageList { line: usize, message: String },
    #[error("invalid axis mapping {axes:?}, expected a permutation of x,y,z such as -y,x,z")]
    AxisMapping { axes: String },
    #[error("invalid import settings: {message}")]
    ImportSettings { message: String },
}

fn main() -> ExitCode {
    let args = StitchArgs::parse();

    let config_dir = args.common.config.clone().unwrap_or_else(default_config_dir);
    let mut config = match Config::load_or_create(&config_dir) {
        Ok(config) => config,
        Err(err) => {
            // logging is configured from this file, so report directly
            eprintln!("stitch: {err}");
            return ExitCode::FAILURE;
        }
    };
    config.apply_cli_overrides(&args.common);

    stitch_log::init_logging(
        config.debug.log_dir.as_deref(),
        cfg!(debug_assertions),
        Some(&config),
    );

    match run(&config, &args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(config: &Config, command: &Command) -> Result<(), CliError> {
    config.validate()?;
    if let Command::Import {
        image_list,
        pixel_resolution,
        tile_size,
        axes,
        images,
    } = command
    {
        let settings =
            import::ImportSettings::new(pixel_resolution, tile_size, axes, images.clone())?;
        return import(config, image_list, &settings);
    }
    if config.fusion.inputs.is_empty() {
        return Err(CliError::NoInputs);
    }
    match command {
        Command::Fuse => fuse(config),
        Command::Check { grid } => check(config, *grid),
        Command::Import { .. } => Ok(()),
    }
}

fn fuse(config: &Config) -> Result<(), CliError> {
    let channels = config
        .fusion
        .inputs
        .iter()
        .map(|path| load_tiles(path))
        .collect::<Result<Vec<_>, _>>()?;

    let layout = OutputLayout::new(&config.output.base_folder, &config.output.extension);
    let store = FsTierStore::new(layout.clone());
    let blender = DistanceBlender::new(RawVolumeIo);
    let executor = ThreadPoolExecutor::from_config(config.execution.threads);
    let settings = PyramidSettings {
        cell_size: config.fusion.cell_size,
        voxel_dimensions: config.fusion.voxel_dimensions.clone(),
        save_policy: SaveFailurePolicy::from_best_effort(config.execution.best_effort_saves),
    };

    info!(
        "Fusing {} channel(s) into {} with {} worker(s)",
        channels.len(),
        config.output.base_folder.display(),
        executor.threads()
    );
    if settings.save_policy == SaveFailurePolicy::BestEffort {
        info!("Best-effort saves enabled: save failures are logged, not fatal");
    }

    let builder = PyramidBuilder::new(&store, &blender, &RawVolumeIo, &executor, layout, settings);
    let summary = Pipeline::new(builder, config.fusion.voxel_unit.clone()).run(channels)?;

    for descriptor in &summary.manifest.channels {
        info!(
            "Channel {}: {} level(s), dimensions {:?}",
            descriptor.channel,
            descriptor.num_levels(),
            descriptor.dimensions
        );
    }
    info!(
        "Done: {} cell(s) written, {} skipped, {} tier(s) resumed",
        summary.stats.cells_written, summary.stats.cells_skipped, summary.stats.tiers_resumed
    );
    Ok(())
}

fn short_edge_threshold(config: &Config) -> ShortEdgeThreshold {
    ShortEdgeThreshold {
        numerator: config.adjacency.short_edge_numerator,
        denominator: config.adjacency.short_edge_denominator,
    }
}

fn log_report(name: &str, report: &check::ChannelReport) {
    info!(
        "{name}: {} tiles, {} overlapping pairs",
        report.tiles, report.overlapping
    );
    for axis in &report.axes {
        match axis.stats {
            Some(stats) => info!(
                "  axis {}: {} adjacent, overlap min {:.1} max {:.1} mean {:.1}",
                axis.axis, axis.adjacent, stats.min, stats.max, stats.mean
            ),
            None => info!("  axis {}: no adjacent pairs", axis.axis),
        }
    }
}

fn import(
    config: &Config,
    image_list: &std::path::Path,
    settings: &import::ImportSettings,
) -> Result<(), CliError> {
    let threshold = short_edge_threshold(config);
    for (path, tiles) in import::import_image_list(image_list, settings)? {
        let report = check::check_channel(&tiles, threshold, false)?;
        log_report(&path.display().to_string(), &report);
    }
    Ok(())
}

fn check(config: &Config, verify_grid: bool) -> Result<(), CliError> {
    let threshold = short_edge_threshold(config);
    for (channel, path) in config.fusion.inputs.iter().enumerate() {
        let tiles = load_tiles(path)?;
        let report = check::check_channel(&tiles, threshold, verify_grid)?;
        log_report(&format!("Channel {channel}"), &report);
        if verify_grid {
            info!("Channel {channel}: adjacency matches file name grid");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_subcommands() {
        let args = StitchArgs::try_parse_from([
            "stitch",
            "-i",
            "ch0.json",
            "--cell-size",
            "128",
            "check",
            "--grid",
        ])
        .unwrap();
        assert_eq!(args.command, Command::Check { grid: true });
        assert_eq!(args.common.inputs, vec![PathBuf::from("ch0.json")]);
        assert_eq!(args.common.cell_size, Some(128));

        let args = StitchArgs::try_parse_from(["stitch", "fuse"]).unwrap();
        assert_eq!(args.command, Command::Fuse);
        assert!(StitchArgs::try_parse_from(["stitch"]).is_err());
    }

    #[test]
    fn test_run_without_inputs_fails() {
        assert!(matches!(
            run(&Config::default(), &Command::Fuse),
            Err(CliError::NoInputs)
        ));
    }

    #[test]
    fn test_run_rejects_invalid_config() {
        let mut config = Config::default();
        config.fusion.cell_size = 0;
        assert!(matches!(
            run(&config, &Command::Fuse),
            Err(CliError::Config(ConfigError::Invalid(_)))
        ));
    }

    #[test]
    fn test_fuse_and_check_from_config() {
        let dir = tempfile::tempdir().unwrap();
        let tile = dir.path().join("tile_000x_000y.raw");
        let bytes: Vec<u8> = std::iter::repeat_n(1.0f32.to_le_bytes(), 20 * 20)
            .flatten()
            .collect();
        std::fs::write(&tile, bytes).unwrap();
        let input = dir.path().join("channel0.json");
        std::fs::write(
            &input,
            r#"[{"index": 0, "file": "tile_000x_000y.raw", "position": [0.0, 0.0], "size": [20, 20]}]"#,
        )
        .unwrap();

        let mut config = Config::default();
        config.fusion.inputs = vec![input];
        config.fusion.cell_size = 16;
        config.output.base_folder = dir.path().join("out");
        config.execution.threads = 2;

        run(&config, &Command::Fuse).unwrap();
        assert!(dir.path().join("out/export.json").is_file());
        assert!(dir.path().join("out/channel0/scale0.json").is_file());
        assert!(dir.path().join("out/channel0/fused/0/1/1.raw").is_file());

        run(&config, &Command::Check { grid: true }).unwrap();
    }

    #[test]
    fn test_parse_import() {
        let args = StitchArgs::try_parse_from([
            "stitch",
            "import",
            "ImageList_images.csv",
            "-r",
            "0.097,0.097,0.18",
            "--tile-size",
            "2048,2048,500",
        ])
        .unwrap();
        assert_eq!(
            args.command,
            Command::Import {
                image_list: PathBuf::from("ImageList_images.csv"),
                pixel_resolution: vec![0.097, 0.097, 0.18],
                tile_size: vec![2048, 2048, 500],
                axes: "-y,x,z".to_string(),
                images: None,
            }
        );
        assert!(StitchArgs::try_parse_from(["stitch", "import", "list.csv"]).is_err());
    }

    #[test]
    fn test_import_then_check() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("ImageList_images.csv");
        std::fs::write(
            &list,
            "filepath,objectiveX,objectiveY,objectiveZ\n\
             s_488nm_000x_000y_000z_t.tif,0.0,0.0,0.0\n\
             s_488nm_000x_001y_000z_t.tif,8.0,0.0,0.0\n",
        )
        .unwrap();

        // importing needs no fusion inputs
        let import = Command::Import {
            image_list: list,
            pixel_resolution: vec![0.1, 0.1, 0.1],
            tile_size: vec![100, 100, 10],
            axes: "-y,x,z".to_string(),
            images: None,
        };
        run(&Config::default(), &import).unwrap();

        let mut config = Config::default();
        config.fusion.inputs = vec![dir.path().join("488nm.json")];
        run(&config, &Command::Check { grid: false }).unwrap();

        let bad_axes = Command::Import {
            image_list: dir.path().join("ImageList_images.csv"),
            pixel_resolution: vec![0.1, 0.1, 0.1],
            tile_size: vec![100, 100, 10],
            axes: "x,x,z".to_string(),
            images: None,
        };
        assert!(matches!(
            run(&Config::default(), &bad_axes),
            Err(CliError::AxisMapping { .. })
        ));
    }
}

//! `stitch import`: tile configurations from a microscope ImageList.
//!
//! The ImageList is a CSV with a header row and one row per tile:
//!
//! ```text
//! filepath,filename,stageX,stageY,stageZ,objectiveX,objectiveY,objectiveZ
//! ```
//!
//! Only the first column (or the second, when an image folder is given) and
//! the last three objective coordinates are used. Objective coordinates are
//! converted to pixels through the pixel resolution and an axis mapping, and
//! tiles are grouped into channels by the `_<NNN>nm_` wavelength token in
//! their file names. Each channel is written as `<NNN>nm.json` next to the
//! ImageList.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use stitch_fusion::save_tiles;
use stitch_geometry::Tile;
use tracing::info;

use crate::CliError;

/// Objective axes, in column order.
const OBJECTIVE_AXES: [char; 3] = ['x', 'y', 'z'];

/// Full rows carry a separate file name column.
const FULL_ROW_COLUMNS: usize = 8;

/// Objective-to-pixel axis mapping, e.g. `-y,x,z`: pixel x is the negated
/// objective y, pixel y is objective x, pixel z is objective z.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AxisMapping {
    /// Objective axis feeding each pixel axis.
    pub source: [usize; 3],
    /// Whether the pixel axis runs against the objective axis.
    pub flip: [bool; 3],
}

impl AxisMapping {
    pub fn parse(axes: &str) -> Result<Self, CliError> {
        let invalid = || CliError::AxisMapping {
            axes: axes.to_string(),
        };
        let entries: Vec<&str> = axes.split(',').map(str::trim).collect();
        if entries.len() != OBJECTIVE_AXES.len() {
            return Err(invalid());
        }

        let mut source = [0; 3];
        let mut flip = [false; 3];
        for (d, entry) in entries.iter().enumerate() {
            let (negated, name) = match entry.strip_prefix('-') {
                Some(name) => (true, name),
                None => (false, *entry),
            };
            let mut chars = name.chars();
            let axis = match (chars.next(), chars.next()) {
                (Some(c), None) => OBJECTIVE_AXES
                    .iter()
                    .position(|&a| a == c.to_ascii_lowercase()),
                _ => None,
            };
            source[d] = axis.ok_or_else(invalid)?;
            flip[d] = negated;
        }

        let mut seen = [false; 3];
        for &axis in &source {
            if std::mem::replace(&mut seen[axis], true) {
                return Err(invalid());
            }
        }
        Ok(Self { source, flip })
    }

    /// Pixel position of a tile from its objective coordinates.
    pub fn to_pixels(&self, objective: &[f64; 3], pixel_resolution: &[f64; 3]) -> Vec<f64> {
        (0..3)
            .map(|d| {
                let axis = self.source[d];
                let sign = if self.flip[d] { -1.0 } else { 1.0 };
                objective[axis] / pixel_resolution[axis] * sign
            })
            .collect()
    }
}

impl Default for AxisMapping {
    fn default() -> Self {
        Self {
            source: [1, 0, 2],
            flip: [true, false, false],
        }
    }
}

/// Settings of one import.
#[derive(Clone, Debug, PartialEq)]
pub struct ImportSettings {
    /// Physical pixel size per axis.
    pub pixel_resolution: [f64; 3],
    /// Tile size in pixels; the raw tiles carry no header to read it from.
    pub tile_size: [u64; 3],
    pub axes: AxisMapping,
    /// Folder holding the tile images. Without it the `filepath` column is
    /// used, relative to the ImageList.
    pub images: Option<PathBuf>,
}

impl ImportSettings {
    pub fn new(
        pixel_resolution: &[f64],
        tile_size: &[u64],
        axes: &str,
        images: Option<PathBuf>,
    ) -> Result<Self, CliError> {
        let pixel_resolution: [f64; 3] =
            pixel_resolution
                .try_into()
                .map_err(|_| CliError::ImportSettings {
                    message: format!("expected 3 pixel resolution values, got {pixel_resolution:?}"),
                })?;
        if pixel_resolution.iter().any(|r| !r.is_finite() || *r <= 0.0) {
            return Err(CliError::ImportSettings {
                message: format!("pixel resolution must be positive, got {pixel_resolution:?}"),
            });
        }
        let tile_size: [u64; 3] = tile_size.try_into().map_err(|_| CliError::ImportSettings {
            message: format!("expected 3 tile size values, got {tile_size:?}"),
        })?;
        if tile_size.contains(&0) {
            return Err(CliError::ImportSettings {
                message: format!("tile size must be positive, got {tile_size:?}"),
            });
        }
        Ok(Self {
            pixel_resolution,
            tile_size,
            axes: AxisMapping::parse(axes)?,
            images,
        })
    }
}

/// Wavelength in nanometers from a `..._488nm_...` file name token.
pub fn wavelength(file_name: &str) -> Option<u32> {
    let mut tokens = file_name.split('_');
    // the first token is a prefix, never the wavelength
    tokens.next();
    tokens
        .find_map(|token| {
            let digits = token.strip_suffix("nm")?;
            (digits.len() == 3 && digits.bytes().all(|b| b.is_ascii_digit())).then_some(digits)
        })
        .and_then(|digits| digits.parse().ok())
}

/// Parse ImageList contents into tiles grouped by wavelength. Relative paths
/// in the `filepath` column resolve against `base_dir`.
pub fn parse_image_list(
    contents: &str,
    base_dir: &Path,
    settings: &ImportSettings,
) -> Result<BTreeMap<u32, Vec<Tile>>, CliError> {
    let mut channels: BTreeMap<u32, Vec<Tile>> = BTreeMap::new();

    // line 1 is the header
    for (line_index, line) in contents.lines().enumerate().skip(1) {
        let line_number = line_index + 1;
        if line.trim().is_empty() {
            continue;
        }
        let invalid = |message: String| CliError::ImageList {
            line: line_number,
            message,
        };

        let columns: Vec<&str> = line.split(',').map(str::trim).collect();
        if columns.len() < 4 {
            return Err(invalid(format!(
                "expected a file path and 3 objective coordinates, got {} column(s)",
                columns.len()
            )));
        }

        let file = match &settings.images {
            None => base_dir.join(columns[0]),
            Some(images) if columns.len() >= FULL_ROW_COLUMNS => images.join(columns[1]),
            Some(images) => {
                let name = Path::new(columns[0])
                    .file_name()
                    .ok_or_else(|| invalid(format!("no file name in {:?}", columns[0])))?;
                images.join(name)
            }
        };
        let file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mut objective = [0.0; 3];
        for (d, value) in columns[columns.len() - 3..].iter().enumerate() {
            objective[d] = value
                .parse()
                .map_err(|_| invalid(format!("invalid objective coordinate {value:?}")))?;
        }

        let channel = wavelength(&file_name)
            .ok_or_else(|| invalid(format!("no _<NNN>nm_ wavelength in {file_name:?}")))?;
        let tiles = channels.entry(channel).or_default();
        let mut tile = Tile::new(
            tiles.len(),
            file,
            settings.axes.to_pixels(&objective, &settings.pixel_resolution),
            settings.tile_size.to_vec(),
        );
        tile.pixel_resolution = Some(settings.pixel_resolution.to_vec());
        tiles.push(tile);
    }
    Ok(channels)
}

/// Import an ImageList and write one tile configuration per channel next to
/// it. Returns the written configurations with their tiles, in wavelength
/// order.
pub fn import_image_list(
    path: &Path,
    settings: &ImportSettings,
) -> Result<Vec<(PathBuf, Vec<Tile>)>, CliError> {
    let contents = std::fs::read_to_string(path).map_err(|source| CliError::ImageListRead {
        path: path.to_path_buf(),
        source,
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let channels = parse_image_list(&contents, base_dir, settings)?;
    if channels.is_empty() {
        return Err(CliError::ImageList {
            line: 1,
            message: "no tiles listed".to_string(),
        });
    }

    let mut written = Vec::with_capacity(channels.len());
    for (nm, tiles) in channels {
        let output = base_dir.join(format!("{nm}nm.json"));
        save_tiles(&output, &tiles)?;
        info!("{nm}nm: {} tiles -> {}", tiles.len(), output.display());
        written.push((output, tiles));
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stitch_fusion::load_tiles;

    fn settings(images: Option<PathBuf>) -> ImportSettings {
        ImportSettings::new(&[0.1, 0.1, 0.5], &[100, 80, 20], "-y,x,z", images).unwrap()
    }

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
        }
    }

    const IMAGE_LIST: &str = "\
filepath,filename,stageX,stageY,stageZ,objectiveX,objectiveY,objectiveZ
raw/scan_488nm_ch0_000x_000y_000z_t.tif,scan_488nm_ch0_000x_000y_000z_t.tif,0,0,0,0.0,0.0,0.0
raw/scan_561nm_ch1_000x_000y_000z_t.tif,scan_561nm_ch1_000x_000y_000z_t.tif,0,0,0,0.0,0.0,0.0
raw/scan_488nm_ch0_001x_000y_000z_t.tif,scan_488nm_ch0_001x_000y_000z_t.tif,0,0,0,0.0,9.0,0.0
raw/scan_488nm_ch0_000x_001y_001z_t.tif,scan_488nm_ch0_000x_001y_001z_t.tif,0,0,0,7.0,0.0,5.0
";

    #[test]
    fn test_axis_mapping_parse() {
        let mapping = AxisMapping::parse("-y,x,z").unwrap();
        assert_eq!(mapping, AxisMapping::default());

        let mapping = AxisMapping::parse("x, -Z, y").unwrap();
        assert_eq!(mapping.source, [0, 2, 1]);
        assert_eq!(mapping.flip, [false, true, false]);

        for axes in ["x,x,z", "x,y", "w,x,z", "x,y,zz", "--x,y,z", ""] {
            assert!(
                matches!(AxisMapping::parse(axes), Err(CliError::AxisMapping { .. })),
                "{axes:?}"
            );
        }
    }

    #[test]
    fn test_axis_mapping_converts_to_pixels() {
        let mapping = AxisMapping::parse("-y,x,z").unwrap();
        let pixels = mapping.to_pixels(&[7.0, 9.0, 5.0], &[0.1, 0.2, 0.5]);
        assert_close(&pixels, &[-45.0, 70.0, 10.0]);

        let identity = AxisMapping::parse("x,y,z").unwrap();
        assert_close(
            &identity.to_pixels(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0]),
            &[1.0, 2.0, 3.0],
        );
    }

    #[test]
    fn test_wavelength_token() {
        assert_eq!(wavelength("scan_488nm_ch0_000x_000y_000z_t.tif"), Some(488));
        assert_eq!(wavelength("a_b_642nm_c.raw"), Some(642));
        assert_eq!(wavelength("488nm_ch0.tif"), None);
        assert_eq!(wavelength("scan_48nm_ch0.tif"), None);
        assert_eq!(wavelength("scan_ch0.tif"), None);
    }

    #[test]
    fn test_tiles_grouped_by_wavelength() {
        let channels = parse_image_list(IMAGE_LIST, Path::new("/data"), &settings(None)).unwrap();
        assert_eq!(channels.keys().copied().collect::<Vec<_>>(), vec![488, 561]);

        let blue = &channels[&488];
        assert_eq!(blue.len(), 3);
        assert_eq!(
            blue.iter().map(|t| t.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(
            blue[1].file,
            PathBuf::from("/data/raw/scan_488nm_ch0_001x_000y_000z_t.tif")
        );
        // objective y = 9 becomes pixel x = -90
        assert_close(&blue[1].position, &[-90.0, 0.0, 0.0]);
        assert_close(&blue[2].position, &[0.0, 70.0, 10.0]);
        assert_eq!(blue[2].size, Some(vec![100, 80, 20]));
        assert_eq!(blue[2].pixel_resolution, Some(vec![0.1, 0.1, 0.5]));

        let green = &channels[&561];
        assert_eq!(green.len(), 1);
        assert_eq!(green[0].index, 0);
    }

    #[test]
    fn test_images_folder_overrides_paths() {
        let images = PathBuf::from("/mnt/tiles");
        let channels = parse_image_list(IMAGE_LIST, Path::new("/data"), &settings(Some(images)))
            .unwrap();
        assert_eq!(
            channels[&561][0].file,
            PathBuf::from("/mnt/tiles/scan_561nm_ch1_000x_000y_000z_t.tif")
        );

        // without the file name column the name comes from the file path
        let short = "header\n/old/place/scan_405nm_a_000x_000y_000z_t.tif,1.0,2.0,3.0\n";
        let channels =
            parse_image_list(short, Path::new("/data"), &settings(Some("/mnt/tiles".into())))
                .unwrap();
        assert_eq!(
            channels[&405][0].file,
            PathBuf::from("/mnt/tiles/scan_405nm_a_000x_000y_000z_t.tif")
        );
    }

    #[test]
    fn test_malformed_rows_report_line() {
        let bad_number = "header\nscan_488nm_a.tif,0.0,abc,0.0\n";
        assert!(matches!(
            parse_image_list(bad_number, Path::new("/data"), &settings(None)),
            Err(CliError::ImageList { line: 2, .. })
        ));

        let no_wavelength = "header\n\nscan_a.tif,0.0,0.0,0.0\n";
        assert!(matches!(
            parse_image_list(no_wavelength, Path::new("/data"), &settings(None)),
            Err(CliError::ImageList { line: 3, .. })
        ));

        let too_short = "header\nscan_488nm_a.tif,0.0\n";
        assert!(parse_image_list(too_short, Path::new("/data"), &settings(None)).is_err());
    }

    #[test]
    fn test_invalid_settings() {
        assert!(ImportSettings::new(&[0.1, 0.1], &[1, 1, 1], "-y,x,z", None).is_err());
        assert!(ImportSettings::new(&[0.1, 0.0, 0.1], &[1, 1, 1], "-y,x,z", None).is_err());
        assert!(ImportSettings::new(&[0.1; 3], &[1, 0, 1], "-y,x,z", None).is_err());
        assert!(ImportSettings::new(&[0.1; 3], &[1, 1, 1], "x,y", None).is_err());
    }

    #[test]
    fn test_import_writes_channel_configurations() {
        let dir = tempfile::tempdir().unwrap();
        let list = dir.path().join("ImageList_images.csv");
        std::fs::write(&list, IMAGE_LIST).unwrap();

        let written = import_image_list(&list, &settings(None)).unwrap();
        let paths: Vec<&PathBuf> = written.iter().map(|(path, _)| path).collect();
        assert_eq!(
            paths,
            vec![&dir.path().join("488nm.json"), &dir.path().join("561nm.json")]
        );

        let loaded = load_tiles(&dir.path().join("488nm.json")).unwrap();
        assert_eq!(loaded, written[0].1);
        assert_eq!(loaded.len(), 3);

        let empty = dir.path().join("empty.csv");
        std::fs::write(&empty, "filepath,objectiveX,objectiveY,objectiveZ\n").unwrap();
        assert!(matches!(
            import_image_list(&empty, &settings(None)),
            Err(CliError::ImageList { .. })
        ));
        assert!(matches!(
            import_image_list(&dir.path().join("missing.csv"), &settings(None)),
            Err(CliError::ImageListRead { .. })
        ));
    }
}

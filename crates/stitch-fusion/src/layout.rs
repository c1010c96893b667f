//! On-disk layout of a fusion run.
//!
//! ```text
//! <base>/export.json
//! <base>/channel<N>/export-channel<N>.json
//! <base>/channel<N>/scale<L>.json          full tier configuration
//! <base>/channel<N>/scale<L>-xy.json       XY-only tier configuration
//! <base>/channel<N>/fused/<L>/<z>/<y>/<x>.<ext>
//! <base>/channel<N>/fused/<L>-xy/<z>/<y>/<x>.<ext>
//! ```

use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Which of a level's two tiers a [`TierId`] names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TierKind {
    /// Downsampled on every axis; recorded in the export metadata.
    Full,
    /// Intermediate tier downsampled along x and y only.
    XyOnly,
}

/// Identity of one persisted tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TierId {
    pub channel: usize,
    pub level: u32,
    pub kind: TierKind,
}

impl TierId {
    pub fn full(channel: usize, level: u32) -> Self {
        Self {
            channel,
            level,
            kind: TierKind::Full,
        }
    }

    pub fn xy_only(channel: usize, level: u32) -> Self {
        Self {
            channel,
            level,
            kind: TierKind::XyOnly,
        }
    }

    /// Suffix distinguishing the tier's files: `""` or `"-xy"`.
    fn suffix(&self) -> &'static str {
        match self.kind {
            TierKind::Full => "",
            TierKind::XyOnly => "-xy",
        }
    }
}

impl fmt::Display for TierId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "channel{}/scale{}{}",
            self.channel,
            self.level,
            self.suffix()
        )
    }
}

/// Path builder for everything a run writes below the output base folder.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputLayout {
    base: PathBuf,
    extension: String,
}

impl OutputLayout {
    pub fn new(base: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            extension: extension.into(),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn channel_dir(&self, channel: usize) -> PathBuf {
        self.base.join(format!("channel{channel}"))
    }

    fn fused_dir(&self, channel: usize) -> PathBuf {
        self.channel_dir(channel).join("fused")
    }

    /// Directory holding a tier's cell files.
    pub fn tier_dir(&self, tier: &TierId) -> PathBuf {
        self.fused_dir(tier.channel)
            .join(format!("{}{}", tier.level, tier.suffix()))
    }

    /// Location of a tier's persisted cell list.
    pub fn tier_config_path(&self, tier: &TierId) -> PathBuf {
        self.channel_dir(tier.channel)
            .join(format!("scale{}{}.json", tier.level, tier.suffix()))
    }

    pub fn export_path(&self, channel: usize) -> PathBuf {
        self.channel_dir(channel)
            .join(format!("export-channel{channel}.json"))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.base.join("export.json")
    }

    /// Placeholder path for a channel's cells, e.g.
    /// `<base>/channel0/fused/{level}/{z}/{y}/{x}.raw`.
    pub fn path_template(&self, channel: usize, num_dimensions: usize) -> String {
        let mut template = self.fused_dir(channel).join("{level}");
        for axis in AXIS_NAMES[..num_dimensions.min(AXIS_NAMES.len())]
            .iter()
            .rev()
        {
            template.push(format!("{{{axis}}}"));
        }
        format!("{}.{}", template.display(), self.extension)
    }
}

const AXIS_NAMES: [&str; 3] = ["x", "y", "z"];

/// `dir/<z>/<y>/<x>.<ext>` for a cell's grid index (slowest axis outermost).
pub fn cell_path(dir: &Path, grid: &[u64], extension: &str) -> PathBuf {
    let mut path = dir.to_path_buf();
    if let Some((x, outer)) = grid.split_first() {
        for index in outer.iter().rev() {
            path.push(index.to_string());
        }
        path.push(format!("{x}.{extension}"));
    }
    path
}

/// Write `bytes` to `path` through a sibling temp file and a rename, so that
/// readers see either the old content or the new, never a partial file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{file_name}.tmp"));

    let result = (|| {
        let mut file = std::fs::File::create(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        std::fs::rename(&temp_path, path)
    })();
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result?;
    sync_parent(path)
}

/// Flush the directory entry of `path` so a completed rename survives a crash.
#[cfg(unix)]
fn sync_parent(path: &Path) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::File::open(parent)?.sync_all()
}

// Directories cannot be opened as files here; the rename is all we get.
#[cfg(not(unix))]
fn sync_parent(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

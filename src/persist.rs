//! Saving the processed recording, and the size bookkeeping around it.
use std::borrow::Cow;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use tracing::info;

use crate::fiff::write_raw_to;
use crate::recording::Recording;

/// Stores a processed recording somewhere the user chose.
pub trait Persistence {
    /// Save `rec`, derived from the file `input`, into `dir`; returns the
    /// written path.
    fn save(&self, rec: &Recording, input: &Path, dir: &Path) -> Result<PathBuf>;
}

/// `run01_raw.fif` + `_preprocessed` → `run01_raw_preprocessed.fif`.
pub fn output_file_name(input: &Path, suffix: &str) -> Result<PathBuf> {
    let stem = input
        .file_stem()
        .ok_or_else(|| anyhow!("{} has no file name", input.display()))?;
    let mut name = stem.to_os_string();
    name.push(suffix);
    if let Some(ext) = input.extension() {
        name.push(".");
        name.push(ext);
    }
    Ok(PathBuf::from(name))
}

/// Sum of the sizes of `paths` as reported by the filesystem.
pub fn total_size<P: AsRef<Path>>(paths: &[P]) -> Result<u64> {
    paths.iter().try_fold(0_u64, |acc, p| {
        let p = p.as_ref();
        let len = std::fs::metadata(p)
            .with_context(|| format!("stat {}", p.display()))?
            .len();
        Ok(acc + len)
    })
}

/// Binary-prefixed size: `"512 B"`, `"1.5 KiB"`, `"2.0 GiB"`.
pub fn format_bytes(n: u64) -> String {
    const UNITS: [&str; 5] = ["KiB", "MiB", "GiB", "TiB", "PiB"];
    if n < 1024 {
        return format!("{n} B");
    }
    let mut value = n as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Writes FIFF files through a temporary file in the destination directory,
/// renamed into place once complete.
#[derive(Debug, Clone)]
pub struct FiffPersistence {
    suffix: String,
}

impl FiffPersistence {
    pub fn new(suffix: impl Into<String>) -> Self {
        Self { suffix: suffix.into() }
    }
}

impl Default for FiffPersistence {
    fn default() -> Self {
        Self::new("_preprocessed")
    }
}

impl Persistence for FiffPersistence {
    fn save(&self, rec: &Recording, input: &Path, dir: &Path) -> Result<PathBuf> {
        let target = dir.join(output_file_name(input, &self.suffix)?);
        let data = match rec.data() {
            Some(d) => Cow::Borrowed(d),
            None => Cow::Owned(rec.read_slice(0, rec.n_times())?),
        };

        let mut tmp = tempfile::Builder::new()
            .prefix(".meg-explorer-")
            .suffix(".part")
            .tempfile_in(dir)
            .with_context(|| format!("create temporary file in {}", dir.display()))?;
        write_raw_to(BufWriter::new(tmp.as_file_mut()), &rec.info, rec.first_samp(), &data)
            .with_context(|| format!("write {}", target.display()))?;
        tmp.as_file().sync_all().context("sync saved recording")?;
        tmp.persist(&target)
            .with_context(|| format!("move saved recording to {}", target.display()))?;

        info!(path = %target.display(), bads = ?rec.info.bads, "recording saved");
        Ok(target)
    }
}

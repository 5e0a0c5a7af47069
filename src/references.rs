//! Site reference files used by bad-channel detection and the spatial filter.
//!
//! - fine calibration (`sss_cal.dat`): one text line per MEG sensor,
//!   `name x y z ex1 ex2 ex3 ey1 ey2 ey3 ez1 ez2 ez3 imb [imb imb]`,
//!   `%`/`#` lines are comments.
//! - crosstalk (`ct_sparse.fif`): only checked to be a readable FIFF file.
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use ndarray::Array2;

use crate::fiff::{read_tree, scan_directory, try_load_directory, MeasInfo, SensorType};

/// Paths of the two reference files of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct References {
    pub crosstalk:   PathBuf,
    pub calibration: PathBuf,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FineCalEntry {
    pub name:      String,
    /// Sensor position (m) followed by three orientation vectors.
    pub loc:       [f64; 12],
    /// One value (1D calibration) or three (3D gradiometer imbalance).
    pub imbalance: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FineCalibration {
    pub entries: Vec<FineCalEntry>,
}

/// Channel names compare without spaces: `MEG0113` matches `MEG 0113`.
fn squash(name: &str) -> String {
    name.chars().filter(|c| !c.is_whitespace()).collect()
}

impl FineCalibration {
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries = Vec::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('%') || line.starts_with('#') {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.len() != 14 && fields.len() != 16 {
                bail!("line {}: expected 14 or 16 fields, got {}", lineno + 1, fields.len());
            }
            let values = fields[1..]
                .iter()
                .map(|f| f.parse::<f64>())
                .collect::<Result<Vec<f64>, _>>()
                .with_context(|| format!("line {}: non-numeric field", lineno + 1))?;
            let mut loc = [0.0; 12];
            loc.copy_from_slice(&values[..12]);
            entries.push(FineCalEntry {
                name: fields[0].to_string(),
                loc,
                imbalance: values[12..].to_vec(),
            });
        }
        if entries.is_empty() {
            bail!("no calibration entries");
        }
        Ok(Self { entries })
    }

    pub fn read(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read fine calibration {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parse fine calibration {}", path.display()))
    }

    pub fn find(&self, ch_name: &str) -> Option<&FineCalEntry> {
        let key = squash(ch_name);
        self.entries.iter().find(|e| squash(&e.name) == key)
    }

    /// Per-row scale factors for `info`'s channels: magnetometers take their
    /// 1D calibration value, every other row stays at 1.
    pub fn scales(&self, info: &MeasInfo) -> Vec<f64> {
        info.chs
            .iter()
            .map(|ch| match (ch.sensor_type(), self.find(&ch.name)) {
                (Some(SensorType::Magnetometer), Some(e)) => match e.imbalance.as_slice() {
                    [v] if v.is_finite() && *v > 0.0 => *v,
                    _ => 1.0,
                },
                _ => 1.0,
            })
            .collect()
    }

    /// Scale the rows of `data` (`[n_chan, T]`) in place.
    pub fn apply(&self, info: &MeasInfo, data: &mut Array2<f64>) {
        for (mut row, s) in data.rows_mut().into_iter().zip(self.scales(info)) {
            if s != 1.0 {
                row.mapv_inplace(|v| v * s);
            }
        }
    }

    /// How many MEG channels of `info` have an entry.
    pub fn coverage(&self, info: &MeasInfo) -> usize {
        info.chs.iter().filter(|c| c.is_meg() && self.find(&c.name).is_some()).count()
    }
}

/// Verify that `path` parses as a FIFF file; returns its tag count.
pub fn check_crosstalk(path: &Path) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("open crosstalk {}", path.display()))?;
    let mut reader = BufReader::new(file);
    let directory = match try_load_directory(&mut reader)
        .with_context(|| format!("{} is not a FIFF file", path.display()))?
    {
        Some(d) => d,
        None => scan_directory(&mut reader)?,
    };
    read_tree(&mut reader, &directory)
        .with_context(|| format!("malformed crosstalk file {}", path.display()))?;
    Ok(directory.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAL: &str = "\
% fine calibration
MEG0111 -0.1 0.06 0.03 0 0 1 0 1 0 -1 0 0 1.01
MEG0112 -0.1 0.06 0.03 0 0 1 0 1 0 -1 0 0 0.02 -0.01 0.003 0.0
";

    #[test]
    fn parses_one_and_three_imbalance_lines() {
        let cal = FineCalibration::parse(CAL).unwrap();
        assert_eq!(cal.entries.len(), 2);
        assert_eq!(cal.entries[0].imbalance, vec![1.01]);
        assert_eq!(cal.entries[1].imbalance.len(), 3);
        assert_eq!(cal.entries[1].loc[0], -0.1);
    }

    #[test]
    fn lookup_ignores_spaces() {
        let cal = FineCalibration::parse(CAL).unwrap();
        assert!(cal.find("MEG 0111").is_some());
        assert!(cal.find("MEG 9999").is_none());
    }

    #[test]
    fn bad_lines_are_rejected() {
        assert!(FineCalibration::parse("MEG0111 1 2 3\n").is_err());
        assert!(FineCalibration::parse("MEG0111 -0.1 x 0.03 0 0 1 0 1 0 -1 0 0 1.0\n").is_err());
        assert!(FineCalibration::parse("% only a comment\n").is_err());
    }

    #[test]
    fn text_file_is_not_crosstalk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ct_sparse.fif");
        std::fs::write(&path, CAL).unwrap();
        assert!(check_crosstalk(&path).is_err());
        assert!(check_crosstalk(&dir.path().join("missing.fif")).is_err());
    }
}

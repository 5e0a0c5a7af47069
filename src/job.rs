//! What a preprocessing run needs to start, and the fixed stage table.
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JobError {
    #[error("no {0} file was selected")]
    EmptyPath(&'static str),
}

/// The three input files of one run.  Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobDescriptor {
    raw:         PathBuf,
    crosstalk:   PathBuf,
    calibration: PathBuf,
}

impl JobDescriptor {
    /// Paths are only checked for emptiness; existence and format are the
    /// first stages' business.
    pub fn new(
        raw: impl Into<PathBuf>,
        crosstalk: impl Into<PathBuf>,
        calibration: impl Into<PathBuf>,
    ) -> Result<Self, JobError> {
        let raw = non_empty(raw.into(), "recording")?;
        let crosstalk = non_empty(crosstalk.into(), "crosstalk")?;
        let calibration = non_empty(calibration.into(), "calibration")?;
        Ok(Self { raw, crosstalk, calibration })
    }

    pub fn raw(&self) -> &Path {
        &self.raw
    }

    pub fn crosstalk(&self) -> &Path {
        &self.crosstalk
    }

    pub fn calibration(&self) -> &Path {
        &self.calibration
    }
}

fn non_empty(path: PathBuf, what: &'static str) -> Result<PathBuf, JobError> {
    if path.as_os_str().is_empty() {
        Err(JobError::EmptyPath(what))
    } else {
        Ok(path)
    }
}

/// The six pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    LoadRecording,
    DetectBadChannels,
    ChpiAmplitudes,
    HeadPosition,
    MaxwellFilter,
    BandPass,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::LoadRecording,
        Stage::DetectBadChannels,
        Stage::ChpiAmplitudes,
        Stage::HeadPosition,
        Stage::MaxwellFilter,
        Stage::BandPass,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::LoadRecording => "Loading recording",
            Stage::DetectBadChannels => "Detecting bad channels",
            Stage::ChpiAmplitudes => "Computing cHPI amplitudes",
            Stage::HeadPosition => "Computing head position",
            Stage::MaxwellFilter => "Applying Maxwell filter",
            Stage::BandPass => "Band-pass filtering",
        }
    }

    /// Percent published once this stage has completed.
    pub fn checkpoint(self) -> u8 {
        match self {
            Stage::LoadRecording => 10,
            Stage::DetectBadChannels => 30,
            Stage::ChpiAmplitudes => 45,
            Stage::HeadPosition => 65,
            Stage::MaxwellFilter => 95,
            Stage::BandPass => 100,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<Stage> {
        Stage::ALL.get(i).copied()
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

//! The artifact passed from stage to stage.
//!
//! A [`Recording`] starts out backed by its file (only the info and buffer
//! table in memory) and is materialised the first time a stage needs to
//! rewrite samples.  Either way the info travels with it, so bads added by
//! one stage are seen by the next.
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use ndarray::{s, Array2};

use crate::fiff::{open_raw, MeasInfo, RawFif};

#[derive(Debug, Clone)]
enum Samples {
    OnDisk(RawFif),
    InMemory(Array2<f64>),
}

#[derive(Debug, Clone)]
pub struct Recording {
    pub info:   MeasInfo,
    first_samp: u64,
    filenames:  Vec<PathBuf>,
    samples:    Samples,
}

impl Recording {
    /// Open `path` without reading samples.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_raw(open_raw(path)?))
    }

    pub fn from_raw(raw: RawFif) -> Self {
        Self {
            info: raw.info.clone(),
            first_samp: raw.first_samp,
            filenames: raw.filenames(),
            samples: Samples::OnDisk(raw),
        }
    }

    /// An in-memory recording, `data` is `[n_chan, n_times]` and calibrated.
    pub fn from_data(info: MeasInfo, first_samp: u64, data: Array2<f64>) -> Result<Self> {
        if data.nrows() != info.n_chan {
            bail!("data has {} rows, info describes {} channels", data.nrows(), info.n_chan);
        }
        Ok(Self { info, first_samp, filenames: Vec::new(), samples: Samples::InMemory(data) })
    }

    pub fn first_samp(&self) -> u64 {
        self.first_samp
    }

    /// Files the samples were read from; empty for synthetic recordings.
    pub fn filenames(&self) -> &[PathBuf] {
        &self.filenames
    }

    pub fn sfreq(&self) -> f64 {
        self.info.sfreq
    }

    pub fn n_times(&self) -> usize {
        match &self.samples {
            Samples::OnDisk(raw) => raw.n_times(),
            Samples::InMemory(data) => data.ncols(),
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.n_times() as f64 / self.info.sfreq
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.samples, Samples::InMemory(_))
    }

    /// Samples `[start, end)` of every channel, read from disk if needed.
    pub fn read_slice(&self, start: usize, end: usize) -> Result<Array2<f64>> {
        match &self.samples {
            Samples::OnDisk(raw) => raw.read_slice(start, end),
            Samples::InMemory(data) => {
                let end = end.min(data.ncols());
                if start > end {
                    bail!("invalid slice {start}..{end}");
                }
                Ok(data.slice(s![.., start..end]).to_owned())
            }
        }
    }

    /// Read every sample into memory (`preload=True`).  No-op when loaded.
    pub fn load(&mut self) -> Result<()> {
        if let Samples::OnDisk(raw) = &self.samples {
            let data = raw.read_all_data()?;
            self.samples = Samples::InMemory(data);
        }
        Ok(())
    }

    /// `None` until [`Recording::load`] has run.
    pub fn data(&self) -> Option<&Array2<f64>> {
        match &self.samples {
            Samples::InMemory(data) => Some(data),
            Samples::OnDisk(_) => None,
        }
    }

    /// Mutable samples, loading them first if necessary.
    pub fn data_mut(&mut self) -> Result<&mut Array2<f64>> {
        self.load()?;
        match &mut self.samples {
            Samples::InMemory(data) => Ok(data),
            Samples::OnDisk(_) => bail!("recording samples failed to load"),
        }
    }
}

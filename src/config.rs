//! Pipeline configuration.
//!
//! [`PipelineConfig`] holds every tunable parameter of the six preprocessing
//! stages plus the progress polling interval and the save-name suffix.  The
//! defaults are the values the tool has always used; a JSON file can override
//! any subset of them (missing keys keep their default).
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::filter::FilterPhase;

/// Parameters for the whole preprocessing run.
///
/// ```
/// use meg_explorer::PipelineConfig;
///
/// let cfg = PipelineConfig {
///     h_freq: 40.0,          // tighter lowpass than the default 120 Hz
///     ..PipelineConfig::default()
/// };
/// assert_eq!(cfg.min_count, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Window length in seconds for automatic bad-channel detection.
    ///
    /// Default: `30.0` s.
    pub bad_duration: f64,

    /// A channel must be flagged in at least this many windows to be marked
    /// bad.  Recordings with fewer windows require every window.
    ///
    /// Default: `10`.
    pub min_count: usize,

    /// Robust z-score above which a channel's peak-to-peak marks it noisy in
    /// a window.
    ///
    /// Default: `7.0`.
    pub bad_limit: f64,

    /// Sliding window for cHPI amplitude estimation, seconds.
    ///
    /// Default: `0.5` s.
    pub t_window: f64,

    /// Minimum step between cHPI windows, seconds.
    ///
    /// Default: `0.1` s.
    pub t_step_min: f64,

    /// Segment length for the spatial filter's temporal projection, seconds.
    ///
    /// Default: `10.0` s.
    pub st_duration: f64,

    /// Correlation threshold above which interference is projected out.
    ///
    /// Default: `0.98`.
    pub st_correlation: f64,

    /// Band-pass lower edge, Hz.  Default: `0.01`.
    pub l_freq: f64,

    /// Band-pass upper edge, Hz.  Default: `120.0`.
    pub h_freq: f64,

    /// Default: [`FilterPhase::ZeroDouble`].
    pub phase: FilterPhase,

    /// How often the progress monitor polls the worker, milliseconds.
    ///
    /// Default: `1000`.
    pub poll_interval_ms: u64,

    /// Inserted between the input's stem and extension when saving.
    ///
    /// Default: `"_preprocessed"`.
    pub save_suffix: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            bad_duration: 30.0,
            min_count: 10,
            bad_limit: 7.0,
            t_window: 0.5,
            t_step_min: 0.1,
            st_duration: 10.0,
            st_correlation: 0.98,
            l_freq: 0.01,
            h_freq: 120.0,
            phase: FilterPhase::ZeroDouble,
            poll_interval_ms: 1000,
            save_suffix: "_preprocessed".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file; absent keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Reject values no stage can run with.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("bad_duration", self.bad_duration),
            ("t_window", self.t_window),
            ("t_step_min", self.t_step_min),
            ("st_duration", self.st_duration),
            ("l_freq", self.l_freq),
            ("h_freq", self.h_freq),
        ];
        for (name, v) in positive {
            if !(v.is_finite() && v > 0.0) {
                bail!("{name} must be positive, got {v}");
            }
        }
        if self.l_freq >= self.h_freq {
            bail!("l_freq ({}) must be below h_freq ({})", self.l_freq, self.h_freq);
        }
        if !(0.0..=1.0).contains(&self.st_correlation) {
            bail!("st_correlation must be within [0, 1], got {}", self.st_correlation);
        }
        if self.min_count == 0 {
            bail!("min_count must be at least 1");
        }
        Ok(())
    }
}

//! The numerical side of the pipeline.
//!
//! [`Processor`] has one method per worker stage.  Each consumes the previous
//! artifact and returns the next one, so a superseded artifact is dropped as
//! soon as the stage that replaces it returns.
//!
//! ```text
//! load_recording ─→ Recording
//! detect_bad_channels(Recording) ─→ Recording (bads appended)
//! chpi_amplitudes(&Recording) ─→ ChpiAmplitudes
//! chpi_locations(ChpiAmplitudes) ─→ ChpiLocations
//! head_positions(ChpiLocations) ─→ HeadPositions
//! maxwell_filter(Recording, HeadPositions) ─→ Recording
//! band_pass(Recording) ─→ Recording
//! ```
pub mod bads;
pub mod chpi;
pub mod maxwell;
pub mod native;

use std::path::Path;

use anyhow::Result;
use ndarray::{Array2, Array3};

use crate::recording::Recording;
use crate::references::References;

pub use native::NativeProcessor;

pub trait Processor: Send + Sync + 'static {
    fn load_recording(&self, path: &Path) -> Result<Recording>;

    fn detect_bad_channels(&self, raw: Recording, refs: &References) -> Result<Recording>;

    fn chpi_amplitudes(&self, raw: &Recording) -> Result<ChpiAmplitudes>;

    fn chpi_locations(&self, raw: &Recording, amplitudes: ChpiAmplitudes) -> Result<ChpiLocations>;

    fn head_positions(&self, raw: &Recording, locations: ChpiLocations) -> Result<HeadPositions>;

    fn maxwell_filter(&self, raw: Recording, refs: &References, head_pos: HeadPositions) -> Result<Recording>;

    fn band_pass(&self, raw: Recording) -> Result<Recording>;
}

/// Per-window coil amplitudes on the good MEG channels.
#[derive(Debug, Clone, PartialEq)]
pub struct ChpiAmplitudes {
    /// Window centres, seconds (`first_samp` included).
    pub times: Vec<f64>,
    pub freqs: Vec<f64>,
    /// Channel indices the third axis of `amps` refers to.
    pub picks: Vec<usize>,
    /// `[n_windows, n_coils, n_picks]`.
    pub amps:  Array3<f64>,
}

impl ChpiAmplitudes {
    pub fn empty(freqs: Vec<f64>, picks: Vec<usize>) -> Self {
        let shape = (0, freqs.len(), picks.len());
        Self { times: Vec::new(), freqs, picks, amps: Array3::zeros(shape) }
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }
}

/// Per-window coil positions in device coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct ChpiLocations {
    pub times: Vec<f64>,
    /// `[n_windows, n_coils, 3]`, metres.
    pub rrs:   Array3<f64>,
    /// `[n_windows, n_coils]`, in `[0, 1]`.
    pub gofs:  Array2<f64>,
}

/// Head positions in MNE's `pos` layout, one row per window:
/// `[t, q1, q2, q3, x, y, z, gof, err, v]`.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadPositions {
    pub pos: Array2<f64>,
}

impl HeadPositions {
    pub const N_COLS: usize = 10;

    pub fn empty() -> Self {
        Self { pos: Array2::zeros((0, Self::N_COLS)) }
    }

    pub fn len(&self) -> usize {
        self.pos.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.pos.nrows() == 0
    }

    pub fn times(&self) -> Vec<f64> {
        self.pos.column(0).to_vec()
    }
}

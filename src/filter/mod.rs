//! FIR filter design and application.
//!
//! - [`design`]: Hamming-windowed sinc highpass / lowpass kernels, matching
//!   `mne.filter.create_filter(fir_window='hamming', fir_design='firwin')`.
//! - [`apply`]: overlap-add zero-phase convolution on picked channels.
pub mod apply;
pub mod design;

use anyhow::{bail, Result};
use ndarray::Array2;

pub use apply::{apply_fir_zero_phase, filter_1d, FilterPhase};
pub use design::{auto_filter_length, design_highpass, design_lowpass, firwin, hamming};

/// Band-pass `picks` of `data` between `l_freq` and `h_freq` Hz, like
/// `raw.filter(l_freq, h_freq, picks=..., phase=...)`.
pub fn band_pass_inplace(
    data: &mut Array2<f64>,
    picks: &[usize],
    l_freq: f64,
    h_freq: f64,
    sfreq: f64,
    phase: FilterPhase,
) -> Result<()> {
    if l_freq >= h_freq {
        bail!("band-pass needs l_freq < h_freq, got {l_freq} ≥ {h_freq}");
    }
    let hp = design_highpass(l_freq, sfreq)?;
    let lp = design_lowpass(h_freq, sfreq)?;
    for _ in 0..phase.passes() {
        apply_fir_zero_phase(data, picks, &hp)?;
        apply_fir_zero_phase(data, picks, &lp)?;
    }
    Ok(())
}

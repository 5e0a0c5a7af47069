//! FIR design matching `mne.filter.create_filter(fir_design='firwin',
//! fir_window='hamming')`.
//!
//! Transition bandwidths and lengths follow MNE's `'auto'` rules:
//!   • highpass: `min(max(0.25 · l_freq, 2), l_freq)`
//!   • lowpass:  `min(max(0.25 · h_freq, 2), sfreq/2 − h_freq)`
//!   • length:   `ceil(3.3 / trans_bw · sfreq)`, rounded up to odd
use std::f64::consts::PI;
use anyhow::{bail, Result};

pub fn highpass_trans_bandwidth(l_freq: f64) -> f64 {
    (0.25 * l_freq).max(2.0).min(l_freq)
}

pub fn lowpass_trans_bandwidth(h_freq: f64, sfreq: f64) -> f64 {
    (0.25 * h_freq).max(2.0).min(sfreq / 2.0 - h_freq)
}

/// Number of taps for `trans_bw`, always odd.
pub fn auto_filter_length(trans_bw: f64, sfreq: f64) -> usize {
    let n = ((3.3 / trans_bw * sfreq).ceil() as usize).max(1);
    n | 1
}

/// Zero-phase highpass at `l_freq` Hz.
pub fn design_highpass(l_freq: f64, sfreq: f64) -> Result<Vec<f64>> {
    check_edge(l_freq, sfreq)?;
    let trans_bw = highpass_trans_bandwidth(l_freq);
    let n = auto_filter_length(trans_bw, sfreq);
    // firwin cutoff sits in the middle of the transition band
    Ok(firwin(n, l_freq - trans_bw / 2.0, sfreq, false))
}

/// Zero-phase lowpass at `h_freq` Hz.
pub fn design_lowpass(h_freq: f64, sfreq: f64) -> Result<Vec<f64>> {
    check_edge(h_freq, sfreq)?;
    let trans_bw = lowpass_trans_bandwidth(h_freq, sfreq);
    let n = auto_filter_length(trans_bw, sfreq);
    Ok(firwin(n, h_freq + trans_bw / 2.0, sfreq, true))
}

fn check_edge(freq: f64, sfreq: f64) -> Result<()> {
    if !(freq.is_finite() && freq > 0.0) {
        bail!("filter edge must be a positive frequency, got {freq}");
    }
    if freq >= sfreq / 2.0 {
        bail!("filter edge {freq} Hz must be below Nyquist ({} Hz)", sfreq / 2.0);
    }
    Ok(())
}

/// Hamming-windowed sinc with unit DC gain; `pass_zero = false` gives the
/// spectrally inverted highpass.  `n` must be odd.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Vec<f64> {
    debug_assert!(n % 2 == 1, "firwin needs an odd length");
    let alpha = (n - 1) as f64 / 2.0;
    let fc = cutoff_hz / (sfreq / 2.0);
    let win = hamming(n);

    let mut h: Vec<f64> = win
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let x = i as f64 - alpha;
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * w
        })
        .collect();

    let dc: f64 = h.iter().sum();
    h.iter_mut().for_each(|v| *v /= dc);

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }
    h
}

pub fn hamming(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

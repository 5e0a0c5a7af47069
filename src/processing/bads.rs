//! Automatic flat/noisy MEG channel detection.
//!
//! The recording is cut into `bad_duration`-second windows.  In each window
//! every good MEG channel gets a peak-to-peak value (after fine-calibration
//! scaling).  A channel is flat when that value is below a per-type floor
//! and noisy when its robust z-score within its sensor type exceeds
//! `bad_limit`.  Being flat or noisy in at least `min_count` windows (every
//! window, for short recordings) makes the channel bad.
use std::collections::HashMap;

use anyhow::Result;
use tracing::debug;

use crate::config::PipelineConfig;
use crate::fiff::SensorType;
use crate::recording::Recording;
use crate::references::FineCalibration;

/// Peak-to-peak floors below which a channel counts as flat.
const FLAT_MAG: f64 = 1e-17; // T
const FLAT_GRAD: f64 = 1e-15; // T/m

/// MAD → standard deviation for normal data.
const MAD_TO_STD: f64 = 1.4826;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BadChannels {
    pub noisy: Vec<String>,
    pub flat:  Vec<String>,
}

impl BadChannels {
    /// Noisy first, then flat, like `noisy + flat`.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.noisy.iter().chain(&self.flat).map(String::as_str)
    }
}

pub fn find_bad_channels(
    rec: &Recording,
    cal: &FineCalibration,
    cfg: &PipelineConfig,
) -> Result<BadChannels> {
    let picks = rec.info.good_meg_picks();
    let n_times = rec.n_times();
    if picks.is_empty() || n_times == 0 {
        return Ok(BadChannels::default());
    }

    let win = ((cfg.bad_duration * rec.sfreq()).round() as usize).max(1);
    let n_win = (n_times / win).max(1);
    let required = cfg.min_count.min(n_win);
    let scales = cal.scales(&rec.info);

    let mut flat_count = vec![0_usize; picks.len()];
    let mut noisy_count = vec![0_usize; picks.len()];

    for w in 0..n_win {
        let start = w * win;
        // the last window absorbs the remainder
        let stop = if w + 1 == n_win { n_times } else { start + win };
        let block = rec.read_slice(start, stop)?;

        let ptp: Vec<f64> = picks
            .iter()
            .map(|&ch| {
                let row = block.row(ch);
                let (lo, hi) = row
                    .iter()
                    .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
                (hi - lo) * scales[ch]
            })
            .collect();

        let mut by_type: HashMap<SensorType, Vec<usize>> = HashMap::new();
        for (k, &ch) in picks.iter().enumerate() {
            let Some(kind) = rec.info.chs[ch].sensor_type() else { continue };
            let floor = match kind {
                SensorType::Magnetometer => FLAT_MAG,
                SensorType::Gradiometer => FLAT_GRAD,
            };
            if ptp[k] < floor {
                flat_count[k] += 1;
            } else {
                by_type.entry(kind).or_default().push(k);
            }
        }

        for members in by_type.values() {
            let values: Vec<f64> = members.iter().map(|&k| ptp[k]).collect();
            for (&k, z) in members.iter().zip(robust_z(&values)) {
                if z > cfg.bad_limit {
                    noisy_count[k] += 1;
                }
            }
        }
        debug!(window = w, n_windows = n_win, "bad-channel window scored");
    }

    let mut bads = BadChannels::default();
    for (k, &ch) in picks.iter().enumerate() {
        let name = &rec.info.chs[ch].name;
        if noisy_count[k] >= required {
            bads.noisy.push(name.clone());
        } else if flat_count[k] >= required {
            bads.flat.push(name.clone());
        }
    }
    Ok(bads)
}

/// `(x - median) / (1.4826 · MAD)`; all zeros when the MAD vanishes.
fn robust_z(values: &[f64]) -> Vec<f64> {
    let med = median(values);
    let dev: Vec<f64> = values.iter().map(|v| (v - med).abs()).collect();
    let scale = median(&dev) * MAD_TO_STD;
    if scale.is_nan() || scale <= 0.0 {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - med) / scale).collect()
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        0.5 * (sorted[mid - 1] + sorted[mid])
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiff::constants::*;
    use crate::fiff::{ChannelInfo, MeasInfo};
    use ndarray::Array2;

    fn mags(n: usize) -> MeasInfo {
        MeasInfo {
            n_chan: n,
            sfreq: 100.0,
            lowpass: None,
            highpass: None,
            line_freq: None,
            chs: (0..n)
                .map(|i| ChannelInfo {
                    scan_no: i as i32 + 1,
                    log_no: i as i32 + 1,
                    kind: FIFFV_MEG_CH,
                    range: 1.0,
                    cal: 1.0,
                    coil_type: 3024,
                    loc: [0.0; 12],
                    unit: FIFF_UNIT_T,
                    unit_mul: 0,
                    name: format!("MEG {:04}", i + 1),
                })
                .collect(),
            bads: vec![],
            experimenter: None,
            description: None,
            hpi_freqs: vec![],
            dev_head_t: None,
        }
    }

    fn cfg() -> PipelineConfig {
        PipelineConfig { bad_duration: 1.0, min_count: 3, ..PipelineConfig::default() }
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), 2.0);
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), 2.5);
    }

    #[test]
    fn flat_and_noisy_channels_are_found() {
        let n = 12;
        // 5 one-second windows
        let data = Array2::from_shape_fn((n, 500), |(c, t)| {
            let amp = match c {
                3 => 0.0,
                7 => 100e-12,
                _ => 1e-12 * (1.0 + 0.05 * c as f64),
            };
            amp * (t as f64 * 0.3 + c as f64).sin()
        });
        let rec = Recording::from_data(mags(n), 0, data).unwrap();
        let bads = find_bad_channels(&rec, &FineCalibration::default(), &cfg()).unwrap();
        assert_eq!(bads.noisy, vec!["MEG 0008"]);
        assert_eq!(bads.flat, vec!["MEG 0004"]);
        assert_eq!(bads.all().collect::<Vec<_>>(), ["MEG 0008", "MEG 0004"]);
    }

    #[test]
    fn brief_glitch_is_below_min_count() {
        let n = 10;
        let data = Array2::from_shape_fn((n, 500), |(c, t)| {
            // channel 2 bursts only during the first window
            let amp = if c == 2 && t < 100 { 1e-10 } else { 1e-12 * (1.0 + 0.05 * c as f64) };
            amp * (t as f64 * 0.3).cos()
        });
        let rec = Recording::from_data(mags(n), 0, data).unwrap();
        let bads = find_bad_channels(&rec, &FineCalibration::default(), &cfg()).unwrap();
        assert!(bads.noisy.is_empty());
        assert!(bads.flat.is_empty());
    }

    #[test]
    fn existing_bads_are_skipped() {
        let mut info = mags(4);
        info.bads = vec!["MEG 0001".into()];
        let data = Array2::from_shape_fn((4, 300), |(c, _)| if c == 0 { 0.0 } else { 1.0 });
        let rec = Recording::from_data(info, 0, data).unwrap();
        let bads = find_bad_channels(&rec, &FineCalibration::default(), &cfg()).unwrap();
        // constant rows are flat too, but the existing bad is not re-reported
        assert_eq!(bads.flat, vec!["MEG 0002", "MEG 0003", "MEG 0004"]);
    }
}

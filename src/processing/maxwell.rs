//! Spatial interference suppression.
//!
//! After fine-calibration scaling, the recording is split into
//! `st_duration`-second segments.  In each segment the common-mode signal of
//! every sensor type (mean over its good channels) is regressed out of each
//! good channel that correlates with it at `|r| >= st_correlation`.
//! Environmental fields reach all sensors of a type coherently, brain
//! signals do not, so only the former crosses the threshold.
use std::collections::HashMap;

use anyhow::{bail, Result};
use ndarray::{s, Array1, ArrayView1};
use tracing::{debug, warn};

use super::HeadPositions;
use crate::config::PipelineConfig;
use crate::fiff::SensorType;
use crate::recording::Recording;
use crate::references::FineCalibration;

/// Head positions may start or end this far (seconds) outside the data.
const COVERAGE_SLACK: f64 = 1.0;

pub fn spatial_filter(
    mut rec: Recording,
    cal: &FineCalibration,
    head_pos: &HeadPositions,
    cfg: &PipelineConfig,
) -> Result<Recording> {
    check_head_pos(&rec, head_pos)?;

    let mut groups: HashMap<SensorType, Vec<usize>> = HashMap::new();
    for ch in rec.info.good_meg_picks() {
        if let Some(kind) = rec.info.chs[ch].sensor_type() {
            groups.entry(kind).or_default().push(ch);
        }
    }
    let seg = ((cfg.st_duration * rec.sfreq()).round() as usize).max(2);

    let info = rec.info.clone();
    let data = rec.data_mut()?;
    cal.apply(&info, data);

    let n_times = data.ncols();
    let mut projected = 0_usize;
    for start in (0..n_times).step_by(seg) {
        let stop = (start + seg).min(n_times);
        if stop - start < 2 {
            continue;
        }
        for members in groups.values().filter(|m| m.len() >= 2) {
            let mut common = Array1::<f64>::zeros(stop - start);
            for &ch in members {
                common += &data.slice(s![ch, start..stop]);
            }
            common /= members.len() as f64;
            let common = centred(common.view());
            let power = common.dot(&common);
            if power <= 0.0 {
                continue;
            }
            for &ch in members {
                let mut row = data.slice_mut(s![ch, start..stop]);
                let x = centred(row.view());
                let cov = x.dot(&common);
                let r = cov / (x.dot(&x) * power).sqrt();
                if r.abs() >= cfg.st_correlation {
                    row.scaled_add(-cov / power, &common);
                    projected += 1;
                }
            }
        }
    }
    debug!(projected, segment_samples = seg, "spatial filter applied");
    Ok(rec)
}

fn centred(x: ArrayView1<f64>) -> Array1<f64> {
    let mean = x.mean().unwrap_or(0.0);
    x.mapv(|v| v - mean)
}

/// Head positions must be time-ordered and overlap the recording.
fn check_head_pos(rec: &Recording, head_pos: &HeadPositions) -> Result<()> {
    if head_pos.is_empty() {
        warn!("no head positions, spatial filter runs without movement information");
        return Ok(());
    }
    let times = head_pos.times();
    if times.windows(2).any(|w| w[1] < w[0]) {
        bail!("head position times are not sorted");
    }
    let t0 = rec.first_samp() as f64 / rec.sfreq();
    let t1 = t0 + rec.duration_secs();
    let (first, last) = (times[0], times[times.len() - 1]);
    if first > t1 || last < t0 || first < t0 - COVERAGE_SLACK || last > t1 + COVERAGE_SLACK {
        bail!("head positions span {first:.2}..{last:.2} s, recording spans {t0:.2}..{t1:.2} s");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiff::constants::*;
    use crate::fiff::{ChannelInfo, MeasInfo};
    use ndarray::Array2;

    fn info(n: usize) -> MeasInfo {
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
            bads: vec!["MEG 0004".into()],
            experimenter: None,
            description: None,
            hpi_freqs: vec![],
            dev_head_t: None,
        }
    }

    fn cfg() -> PipelineConfig {
        PipelineConfig { st_duration: 2.0, ..PipelineConfig::default() }
    }

    #[test]
    fn coherent_interference_is_removed() {
        // 3 good channels share a large 1 Hz field, channel 3 is bad
        let data = Array2::from_shape_fn((4, 400), |(c, t)| {
            let field = (2.0 * std::f64::consts::PI * t as f64 / 100.0).sin();
            let own = 1e-3 * ((t * (c + 3)) as f64).sin();
            field + own
        });
        let rec = Recording::from_data(info(4), 0, data.clone()).unwrap();
        let out = spatial_filter(rec, &FineCalibration::default(), &HeadPositions::empty(), &cfg()).unwrap();
        let out = out.data().unwrap();

        for c in 0..3 {
            let peak = out.row(c).iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            assert!(peak < 0.05, "channel {c} kept {peak}");
        }
        // bads are left alone
        assert_eq!(out.row(3), data.row(3));
    }

    #[test]
    fn uncorrelated_channels_pass_through() {
        let data = Array2::from_shape_fn((4, 400), |(c, t)| ((t * (c + 2)) as f64 * 0.7).sin());
        let rec = Recording::from_data(info(4), 0, data.clone()).unwrap();
        let out = spatial_filter(rec, &FineCalibration::default(), &HeadPositions::empty(), &cfg()).unwrap();
        assert_eq!(out.data().unwrap(), &data);
        assert_eq!(out.info.bads, vec!["MEG 0004"]);
    }

    #[test]
    fn head_positions_outside_recording_are_rejected() {
        let rec = Recording::from_data(info(4), 0, Array2::zeros((4, 400))).unwrap();
        let mut pos = Array2::zeros((2, HeadPositions::N_COLS));
        pos[[0, 0]] = 50.0;
        pos[[1, 0]] = 51.0;
        let head_pos = HeadPositions { pos };
        assert!(spatial_filter(rec, &FineCalibration::default(), &head_pos, &cfg()).is_err());
    }
}

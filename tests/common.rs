/// Shared helpers: synthetic recordings and reference files on disk, and
/// scripted collaborators.
use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Result};
use meg_explorer::fiff::constants::*;
use meg_explorer::fiff::{write_raw, ChannelInfo, CoordTrans, MeasInfo};
use meg_explorer::{
    ChpiAmplitudes, ChpiLocations, HeadPositions, PipelineConfig, Processor, Recording, References,
    Stage, Viewer,
};
use ndarray::Array2;

pub const SFREQ: f64 = 500.0;
pub const HPI_FREQS: [f64; 2] = [83.0, 143.0];
/// Channel planted as flat in [`synthetic_data`].
pub const FLAT: usize = 3;
/// Channel planted as noisy in [`synthetic_data`].
pub const NOISY: usize = 9;

#[allow(unused)]
pub fn channel_name(i: usize) -> String {
    format!("MEG {:04}", i + 1)
}

/// Magnetometers spread over a hemisphere of radius 12 cm.
#[allow(unused)]
pub fn meg_info(n_chan: usize) -> MeasInfo {
    let chs = (0..n_chan)
        .map(|i| {
            let az = 2.0 * PI * i as f64 / n_chan as f64;
            let el = 0.3 + 0.9 * (i % 4) as f64 / 4.0;
            let mut loc = [0f32; 12];
            loc[0] = (0.12 * el.cos() * az.cos()) as f32;
            loc[1] = (0.12 * el.cos() * az.sin()) as f32;
            loc[2] = (0.12 * el.sin()) as f32;
            loc[5] = 1.0;
            loc[7] = 1.0;
            loc[9] = 1.0;
            ChannelInfo {
                scan_no: i as i32 + 1,
                log_no: i as i32 + 1,
                kind: FIFFV_MEG_CH,
                range: 1.0,
                cal: 1.0,
                coil_type: 3024,
                loc,
                unit: FIFF_UNIT_T,
                unit_mul: 0,
                name: channel_name(i),
            }
        })
        .collect();
    MeasInfo {
        n_chan,
        sfreq: SFREQ,
        lowpass: Some(165.0),
        highpass: Some(0.1),
        line_freq: Some(50.0),
        chs,
        bads: vec![],
        experimenter: Some("tests".into()),
        description: Some("synthetic recording".into()),
        hpi_freqs: HPI_FREQS.to_vec(),
        dev_head_t: Some(CoordTrans {
            from: FIFFV_COORD_DEVICE,
            to: FIFFV_COORD_HEAD,
            rot: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            trans: [0.0, 0.0, 0.04],
        }),
    }
}

/// `[n_chan, secs · SFREQ]`: a 7 Hz rhythm and two cHPI lines on every
/// channel, channel [`FLAT`] dead and channel [`NOISY`] a hundred times
/// louder than the rest.
#[allow(unused)]
pub fn synthetic_data(n_chan: usize, secs: f64) -> Array2<f64> {
    let n_t = (secs * SFREQ) as usize;
    Array2::from_shape_fn((n_chan, n_t), |(c, i)| {
        let t = i as f64 / SFREQ;
        if c == FLAT {
            return 0.0;
        }
        let brain = 1e-12 * (1.0 + 0.05 * c as f64) * (2.0 * PI * 7.0 * t + c as f64).sin();
        let hpi: f64 = HPI_FREQS
            .iter()
            .enumerate()
            .map(|(k, f)| {
                let gain = 0.5e-12 * (1.0 + 0.3 * ((c + k) as f64).cos());
                gain * (2.0 * PI * f * t).sin()
            })
            .sum();
        let signal = brain + hpi;
        if c == NOISY { 100.0 * signal } else { signal }
    })
}

#[allow(unused)]
pub fn write_recording(dir: &Path, name: &str, n_chan: usize, secs: f64) -> PathBuf {
    let path = dir.join(name);
    write_raw(&path, &meg_info(n_chan), 0, &synthetic_data(n_chan, secs)).unwrap();
    path
}

/// A crosstalk stand-in (any well-formed FIFF file) and a fine-calibration
/// file with a unit entry per channel.
#[allow(unused)]
pub fn write_references(dir: &Path, n_chan: usize) -> (PathBuf, PathBuf) {
    let ct = dir.join("ct_sparse.fif");
    write_raw(&ct, &meg_info(1), 0, &Array2::zeros((1, 10))).unwrap();

    let cal = dir.join("sss_cal.dat");
    let mut text = String::from("% synthetic fine calibration\n");
    for ch in &meg_info(n_chan).chs {
        let p = ch.position();
        text.push_str(&format!(
            "{} {:.4} {:.4} {:.4} 0 0 1 0 1 0 1 0 0 1.0\n",
            ch.name.replace(' ', ""),
            p[0],
            p[1],
            p[2]
        ));
    }
    std::fs::write(&cal, text).unwrap();
    (ct, cal)
}

/// Settings that keep the native stages fast on a few seconds of data.
#[allow(unused)]
pub fn quick_config() -> PipelineConfig {
    PipelineConfig {
        bad_duration: 1.0,
        min_count: 3,
        st_duration: 2.0,
        l_freq: 1.0,
        h_freq: 40.0,
        poll_interval_ms: 5,
        ..PipelineConfig::default()
    }
}

/// A processor that opens the recording for real but does trivial work in
/// every later stage, optionally slowly, failing or panicking at one stage.
#[allow(unused)]
#[derive(Debug, Default, Clone)]
pub struct ScriptedProcessor {
    pub delay:    Duration,
    pub fail_at:  Option<Stage>,
    pub panic_at: Option<Stage>,
}

#[allow(unused)]
impl ScriptedProcessor {
    pub fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::default() }
    }

    pub fn failing_at(stage: Stage) -> Self {
        Self { fail_at: Some(stage), ..Self::default() }
    }

    pub fn panicking_at(stage: Stage) -> Self {
        Self { panic_at: Some(stage), ..Self::default() }
    }

    fn enter(&self, stage: Stage) -> Result<()> {
        std::thread::sleep(self.delay);
        if self.panic_at == Some(stage) {
            panic!("scripted panic in {stage}");
        }
        if self.fail_at == Some(stage) {
            bail!("scripted failure in {stage}");
        }
        Ok(())
    }
}

impl Processor for ScriptedProcessor {
    fn load_recording(&self, path: &Path) -> Result<Recording> {
        self.enter(Stage::LoadRecording)?;
        Recording::open(path)
    }

    fn detect_bad_channels(&self, mut raw: Recording, _refs: &References) -> Result<Recording> {
        self.enter(Stage::DetectBadChannels)?;
        raw.info.add_bads([channel_name(FLAT)]);
        Ok(raw)
    }

    fn chpi_amplitudes(&self, raw: &Recording) -> Result<ChpiAmplitudes> {
        self.enter(Stage::ChpiAmplitudes)?;
        Ok(ChpiAmplitudes::empty(raw.info.hpi_freqs.clone(), raw.info.good_meg_picks()))
    }

    fn chpi_locations(&self, _raw: &Recording, amplitudes: ChpiAmplitudes) -> Result<ChpiLocations> {
        self.enter(Stage::HeadPosition)?;
        let n_coil = amplitudes.freqs.len();
        Ok(ChpiLocations {
            times: amplitudes.times,
            rrs: ndarray::Array3::zeros((0, n_coil, 3)),
            gofs: Array2::zeros((0, n_coil)),
        })
    }

    fn head_positions(&self, _raw: &Recording, _locations: ChpiLocations) -> Result<HeadPositions> {
        Ok(HeadPositions::empty())
    }

    fn maxwell_filter(&self, mut raw: Recording, _refs: &References, _head_pos: HeadPositions) -> Result<Recording> {
        self.enter(Stage::MaxwellFilter)?;
        raw.load()?;
        Ok(raw)
    }

    fn band_pass(&self, raw: Recording) -> Result<Recording> {
        self.enter(Stage::BandPass)?;
        Ok(raw)
    }
}

/// Remembers what it was asked to show instead of drawing.
#[allow(unused)]
#[derive(Debug, Default)]
pub struct RecordingViewer {
    /// `(title, bads)` per call.
    pub shown: Vec<(String, Vec<String>)>,
}

#[allow(unused)]
impl RecordingViewer {
    pub fn titles(&self) -> Vec<&str> {
        self.shown.iter().map(|(t, _)| t.as_str()).collect()
    }
}

impl Viewer for RecordingViewer {
    fn show(&mut self, rec: &Recording, title: &str) -> Result<Option<PathBuf>> {
        self.shown.push((title.to_string(), rec.info.bads.clone()));
        Ok(None)
    }
}

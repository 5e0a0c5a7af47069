//! Raw FIF writer (`raw.save()` for a preloaded recording).
//!
//! The file written is the minimal layout MNE itself produces for a single
//! raw file: `FIFF_FILE_ID`, a `FIFF_DIR_POINTER` of -1 (no directory, readers
//! scan the tag chain), one `FIFFB_MEAS` holding `FIFFB_MEAS_INFO` and
//! `FIFFB_RAW_DATA`, and a closing `FIFF_NOP`.
//!
//! Samples are written calibrated, as big-endian f32, with `cal = range = 1`
//! in every channel struct so a reader reproduces the in-memory values.
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use anyhow::{bail, Context, Result};
use ndarray::{s, Array2};

use super::constants::*;
use super::info::MeasInfo;
use super::tag::TagWriter;

/// `FIFFC_VERSION` (1.3).
const FIFF_FILE_VERSION: i32 = 0x0001_0003;

/// Write `data` (`[n_chan, n_times]`, calibrated) with `info` to `path`.
pub fn write_raw(path: &Path, info: &MeasInfo, first_samp: u64, data: &Array2<f64>) -> Result<()> {
    let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
    write_raw_to(BufWriter::new(file), info, first_samp, data)
        .with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Same as [`write_raw`] into any sink.
pub fn write_raw_to<W: Write>(out: W, info: &MeasInfo, first_samp: u64, data: &Array2<f64>) -> Result<W> {
    let (n_chan, n_times) = data.dim();
    if n_chan != info.n_chan || n_chan != info.chs.len() {
        bail!("data has {n_chan} channels, info describes {}", info.chs.len());
    }
    if n_times == 0 {
        bail!("refusing to write an empty recording");
    }
    let first_samp = i32::try_from(first_samp).context("first sample does not fit FIFF_FIRST_SAMPLE")?;

    let mut w = TagWriter::new(out);
    w.write_bytes(FIFF_FILE_ID, FIFFT_ID_STRUCT, &file_id())?;
    w.write_i32(FIFF_DIR_POINTER, -1)?;

    w.start_block(FIFFB_MEAS)?;
    write_info(&mut w, info)?;

    w.start_block(FIFFB_RAW_DATA)?;
    w.write_i32(FIFF_FIRST_SAMPLE, first_samp)?;
    // One-second buffers, like MNE's default `buffer_size_sec`.
    let step = (info.sfreq.round() as usize).max(1);
    let mut payload = Vec::with_capacity(step * n_chan * 4);
    for start in (0..n_times).step_by(step) {
        let stop = (start + step).min(n_times);
        payload.clear();
        for column in data.slice(s![.., start..stop]).columns() {
            for &v in column {
                payload.extend_from_slice(&(v as f32).to_be_bytes());
            }
        }
        w.write_bytes(FIFF_DATA_BUFFER, FIFFT_FLOAT, &payload)?;
    }
    w.end_block(FIFFB_RAW_DATA)?;

    w.end_block(FIFFB_MEAS)?;
    w.finish()
}

fn write_info<W: Write>(w: &mut TagWriter<W>, info: &MeasInfo) -> Result<()> {
    w.start_block(FIFFB_MEAS_INFO)?;
    w.write_i32(FIFF_NCHAN, i32::try_from(info.n_chan).context("too many channels")?)?;
    w.write_f32(FIFF_SFREQ, info.sfreq as f32)?;
    w.write_f32(FIFF_LOWPASS, info.lowpass.map_or(f32::NAN, |v| v as f32))?;
    w.write_f32(FIFF_HIGHPASS, info.highpass.map_or(f32::NAN, |v| v as f32))?;
    if let Some(line) = info.line_freq {
        w.write_f32(FIFF_LINE_FREQ, line as f32)?;
    }
    if let Some(t) = &info.dev_head_t {
        w.write_bytes(FIFF_COORD_TRANS, FIFFT_COORD_TRANS_STRUCT, &t.to_bytes())?;
    }
    if let Some(who) = &info.experimenter {
        w.write_string(FIFF_EXPERIMENTER, who)?;
    }
    if let Some(text) = &info.description {
        w.write_string(FIFF_DESCRIPTION, text)?;
    }
    for ch in &info.chs {
        let mut stored = ch.clone();
        stored.cal = 1.0;
        stored.range = 1.0;
        w.write_bytes(FIFF_CH_INFO, FIFFT_CH_INFO_STRUCT, &stored.to_bytes())?;
    }
    if !info.bads.is_empty() {
        w.write_string(FIFF_BAD_CHS, &info.bads.join(":"))?;
    }
    if !info.hpi_freqs.is_empty() {
        w.start_block(FIFFB_HPI_MEAS)?;
        w.write_i32(FIFF_HPI_NCOIL, i32::try_from(info.hpi_freqs.len()).context("too many HPI coils")?)?;
        for &f in &info.hpi_freqs {
            w.start_block(FIFFB_HPI_COIL)?;
            w.write_f32(FIFF_HPI_COIL_FREQ, f as f32)?;
            w.end_block(FIFFB_HPI_COIL)?;
        }
        w.end_block(FIFFB_HPI_MEAS)?;
    }
    w.end_block(FIFFB_MEAS_INFO)
}

fn file_id() -> [u8; 20] {
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    let mut id = [0u8; 20];
    id[0..4].copy_from_slice(&FIFF_FILE_VERSION.to_be_bytes());
    // machine id stays zero
    id[12..16].copy_from_slice(&(now.as_secs() as i32).to_be_bytes());
    id[16..20].copy_from_slice(&(now.subsec_micros() as i32).to_be_bytes());
    id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiff::info::{ChannelInfo, CoordTrans};
    use crate::fiff::raw::open_raw;
    use approx::assert_abs_diff_eq;

    fn info(n: usize) -> MeasInfo {
        let chs = (0..n)
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
            .collect();
        MeasInfo {
            n_chan: n,
            sfreq: 200.0,
            lowpass: Some(66.0),
            highpass: Some(0.1),
            line_freq: Some(50.0),
            chs,
            bads: vec!["MEG 0002".into()],
            experimenter: None,
            description: Some("unit test".into()),
            hpi_freqs: vec![83.0, 143.0],
            dev_head_t: Some(CoordTrans::identity(FIFFV_COORD_DEVICE, FIFFV_COORD_HEAD)),
        }
    }

    #[test]
    fn written_file_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t_raw.fif");
        let info = info(3);
        // 450 samples → two full one-second buffers and a partial one.
        let data = Array2::from_shape_fn((3, 450), |(c, t)| (c as f64 + 1.0) * 1e-12 * t as f64);
        write_raw(&path, &info, 1000, &data).unwrap();

        let raw = open_raw(&path).unwrap();
        assert_eq!(raw.first_samp, 1000);
        assert_eq!(raw.n_times(), 450);
        assert_eq!(raw.buffers.len(), 3);
        assert_eq!(raw.info.bads, info.bads);
        assert_eq!(raw.info.hpi_freqs, vec![83.0, 143.0]);
        assert_eq!(raw.info.ch_names(), info.ch_names());
        assert_abs_diff_eq!(raw.info.sfreq, 200.0);
        assert!(raw.info.dev_head_t.is_some());

        let back = raw.read_all_data().unwrap();
        for (a, b) in back.iter().zip(data.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-15);
        }
    }

    #[test]
    fn slice_spans_buffer_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s_raw.fif");
        let data = Array2::from_shape_fn((3, 500), |(c, t)| (c * 1000 + t) as f64);
        write_raw(&path, &info(3), 0, &data).unwrap();

        let raw = open_raw(&path).unwrap();
        let part = raw.read_slice(190, 215).unwrap();
        assert_eq!(part.dim(), (3, 25));
        assert_abs_diff_eq!(part[[2, 0]], 2190.0);
        assert_abs_diff_eq!(part[[0, 24]], 214.0);
    }

    #[test]
    fn channel_mismatch_is_rejected() {
        let data = Array2::<f64>::zeros((2, 10));
        assert!(write_raw_to(Vec::new(), &info(3), 0, &data).is_err());
    }
}

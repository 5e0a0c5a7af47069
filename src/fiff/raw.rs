//! Raw FIF reader (`mne.io.read_raw_fif(..., preload=False)`).
//!
//! [`open_raw`] reads the tag directory, the measurement info and the table
//! of data buffers; samples stay on disk until [`RawFif::read_all_data`] or
//! [`RawFif::read_slice`] is called.
//!
//! Stored samples are `[n_samp, n_chan]`, big-endian; calibrated values are
//! `raw × cal × range` per channel.
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use anyhow::{anyhow, bail, Context, Result};
use ndarray::{s, Array2};

use super::constants::*;
use super::info::{read_meas_info, MeasInfo};
use super::tag::{read_i32, TagHeader};
use super::tree::{read_tree, scan_directory, try_load_directory};

/// One data buffer; `tag == None` marks a skipped (zero-filled) span.
#[derive(Debug, Clone)]
pub struct BufferRecord {
    pub tag:        Option<TagHeader>,
    pub first_samp: u64,
    pub n_samp:     usize,
}

/// An opened raw recording, samples not loaded.
#[derive(Debug, Clone)]
pub struct RawFif {
    pub info:       MeasInfo,
    pub first_samp: u64,
    /// Inclusive.
    pub last_samp:  u64,
    pub path:       PathBuf,
    pub buffers:    Vec<BufferRecord>,
}

impl RawFif {
    #[inline]
    pub fn n_times(&self) -> usize {
        (self.last_samp - self.first_samp + 1) as usize
    }

    #[inline]
    pub fn duration_secs(&self) -> f64 {
        self.n_times() as f64 / self.info.sfreq
    }

    /// Files backing this recording.
    pub fn filenames(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }

    /// All samples, calibrated, `[n_chan, n_times]`.
    pub fn read_all_data(&self) -> Result<Array2<f64>> {
        self.read_slice(0, self.n_times())
    }

    /// Samples `[start, end)` relative to `first_samp`, like `raw[:, start:end]`.
    pub fn read_slice(&self, start: usize, end: usize) -> Result<Array2<f64>> {
        let end = end.min(self.n_times());
        if start > end {
            bail!("invalid slice {start}..{end}");
        }
        let n_ch = self.info.n_chan;
        let cals = self.info.cals();
        let mut out = Array2::<f64>::zeros((n_ch, end - start));

        let file = File::open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let mut reader = BufReader::new(file);

        let mut base = 0_usize;
        for buf in &self.buffers {
            let buf_end = base + buf.n_samp;
            if base < end && buf_end > start {
                let lo = start.saturating_sub(base);
                let hi = buf.n_samp.min(end - base);
                let dst = base + lo - start;
                if let Some(tag) = &buf.tag {
                    let block = read_buffer(&mut reader, tag, buf.n_samp, &cals)?;
                    out.slice_mut(s![.., dst..dst + hi - lo])
                        .assign(&block.slice(s![.., lo..hi]));
                }
            }
            base = buf_end;
            if base >= end {
                break;
            }
        }
        Ok(out)
    }
}

pub fn open_raw<P: AsRef<Path>>(path: P) -> Result<RawFif> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let mut reader = BufReader::new(file);

    let directory = match try_load_directory(&mut reader)? {
        Some(d) => d,
        None => scan_directory(&mut reader)?,
    };
    let tree = read_tree(&mut reader, &directory)?;
    let info = read_meas_info(&mut reader, &tree)
        .with_context(|| format!("read measurement info of {}", path.display()))?;

    let meas = tree
        .find_block(FIFFB_MEAS)
        .ok_or_else(|| anyhow!("FIFFB_MEAS not found"))?;
    let raw_node = meas
        .find_block(FIFFB_RAW_DATA)
        .or_else(|| meas.find_block(FIFFB_CONTINUOUS_DATA))
        .ok_or_else(|| anyhow!("no raw-data block in {}", path.display()))?;

    if info.n_chan == 0 {
        bail!("recording has no channels");
    }

    let mut next_samp = match raw_node.find_tag(FIFF_FIRST_SAMPLE) {
        Some(t) => u64::try_from(read_i32(&mut reader, t)?).context("negative first sample")?,
        None => 0,
    };
    let mut buffers: Vec<BufferRecord> = Vec::new();
    let mut pending_skip = 0_usize;

    for ent in &raw_node.entries {
        match ent.kind {
            FIFF_DATA_SKIP => {
                pending_skip += usize::try_from(read_i32(&mut reader, ent)?).unwrap_or(0);
            }
            FIFF_DATA_BUFFER => {
                let bps = bytes_per_sample(ent.ftype)
                    .ok_or_else(|| anyhow!("unsupported buffer type {}", ent.ftype))?;
                let n_samp = ent.payload_len() / (bps * info.n_chan);
                if pending_skip > 0 {
                    // A skip before the first buffer shifts the start instead
                    // of inserting zeros.
                    let gap = n_samp * pending_skip;
                    if !buffers.is_empty() {
                        buffers.push(BufferRecord { tag: None, first_samp: next_samp, n_samp: gap });
                    }
                    next_samp += gap as u64;
                    pending_skip = 0;
                }
                buffers.push(BufferRecord { tag: Some(*ent), first_samp: next_samp, n_samp });
                next_samp += n_samp as u64;
            }
            _ => {}
        }
    }

    let first_samp = match buffers.first() {
        Some(b) => b.first_samp,
        None => bail!("no FIFF_DATA_BUFFER tags in {}", path.display()),
    };
    if next_samp == first_samp {
        bail!("raw data buffers of {} are empty", path.display());
    }

    Ok(RawFif {
        info,
        first_samp,
        last_samp: next_samp - 1,
        path: path.to_path_buf(),
        buffers,
    })
}

/// Decode one buffer into calibrated `[n_chan, n_samp]`.
fn read_buffer<R: Read + Seek>(
    reader: &mut R,
    tag: &TagHeader,
    n_samp: usize,
    cals: &[f64],
) -> Result<Array2<f64>> {
    let n_chan = cals.len();
    let bps = bytes_per_sample(tag.ftype)
        .ok_or_else(|| anyhow!("unsupported buffer type {}", tag.ftype))?;
    reader
        .seek(SeekFrom::Start(tag.data_pos()))
        .with_context(|| format!("seek to buffer data @ {:#x}", tag.data_pos()))?;
    let mut bytes = vec![0u8; n_samp * n_chan * bps];
    reader.read_exact(&mut bytes).context("read data buffer")?;

    let decode: fn(&[u8]) -> f64 = match tag.ftype {
        FIFFT_FLOAT => |b| f64::from(f32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        FIFFT_DOUBLE => |b| f64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]),
        FIFFT_INT => |b| f64::from(i32::from_be_bytes([b[0], b[1], b[2], b[3]])),
        FIFFT_SHORT | FIFFT_DAU_PACK16 => |b| f64::from(i16::from_be_bytes([b[0], b[1]])),
        other => bail!("unsupported buffer type {other}"),
    };

    let mut out = Array2::<f64>::zeros((n_chan, n_samp));
    for (i, sample) in bytes.chunks_exact(bps).enumerate() {
        let (t, c) = (i / n_chan, i % n_chan);
        out[[c, t]] = decode(sample) * cals[c];
    }
    Ok(out)
}

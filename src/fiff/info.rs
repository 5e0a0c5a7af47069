//! Measurement info (MNE's `Info`) for MEG recordings.
//!
//! Besides channels, sfreq and bads this reads the pieces the preprocessing
//! stages need: HPI coil frequencies and the device→head transform.
use std::io::{Read, Seek};
use anyhow::{anyhow, bail, Result};

use super::constants::*;
use super::tag::*;
use super::tree::Node;

// ── Channel info ─────────────────────────────────────────────────────────

/// One `FIFFT_CH_INFO_STRUCT` entry.
///
/// ```text
/// off  size  field
///   0     4  scanno      i32
///   4     4  logno       i32
///   8     4  kind        i32
///  12     4  range       f32
///  16     4  cal         f32
///  20     4  coil_type   i32
///  24    48  loc         12 × f32   position (m) + 3 orientation vectors
///  72     4  unit        i32
///  76     4  unit_mul    i32
///  80    16  ch_name     Latin-1, NUL-padded
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelInfo {
    pub scan_no:   i32,
    pub log_no:    i32,
    pub kind:      i32,
    pub range:     f32,
    pub cal:       f32,
    pub coil_type: i32,
    pub loc:       [f32; 12],
    pub unit:      i32,
    pub unit_mul:  i32,
    pub name:      String,
}

/// MEG sensor family; bad-channel statistics and the spatial filter treat
/// them separately because their units differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorType {
    Magnetometer,
    Gradiometer,
}

pub const CH_INFO_LEN: usize = 96;

impl ChannelInfo {
    /// Scale from stored sample to physical units: `cal × range`.
    #[inline]
    pub fn calibration(&self) -> f64 {
        f64::from(self.cal) * f64::from(self.range)
    }

    #[inline]
    pub fn is_meg(&self) -> bool {
        self.kind == FIFFV_MEG_CH
    }

    /// `None` for non-MEG channels.
    pub fn sensor_type(&self) -> Option<SensorType> {
        if !self.is_meg() {
            return None;
        }
        Some(if self.unit == FIFF_UNIT_T_M { SensorType::Gradiometer } else { SensorType::Magnetometer })
    }

    /// Sensor position in metres.
    pub fn position(&self) -> [f64; 3] {
        [f64::from(self.loc[0]), f64::from(self.loc[1]), f64::from(self.loc[2])]
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < CH_INFO_LEN {
            bail!("ch_info payload too short: {} bytes (need {CH_INFO_LEN})", raw.len());
        }
        let word = |off: usize| [raw[off], raw[off + 1], raw[off + 2], raw[off + 3]];
        let mut loc = [0f32; 12];
        for (i, v) in loc.iter_mut().enumerate() {
            *v = f32::from_be_bytes(word(24 + 4 * i));
        }
        let name_bytes = &raw[80..96];
        let end = name_bytes.iter().position(|&b| b == 0).unwrap_or(name_bytes.len());
        Ok(ChannelInfo {
            scan_no:   i32::from_be_bytes(word(0)),
            log_no:    i32::from_be_bytes(word(4)),
            kind:      i32::from_be_bytes(word(8)),
            range:     f32::from_be_bytes(word(12)),
            cal:       f32::from_be_bytes(word(16)),
            coil_type: i32::from_be_bytes(word(20)),
            loc,
            unit:      i32::from_be_bytes(word(72)),
            unit_mul:  i32::from_be_bytes(word(76)),
            name:      name_bytes[..end].iter().map(|&b| b as char).collect(),
        })
    }

    /// Encode as a ch_info payload.  Names longer than 15 bytes are cut so
    /// the field keeps a terminating NUL.
    pub fn to_bytes(&self) -> [u8; CH_INFO_LEN] {
        let mut out = [0u8; CH_INFO_LEN];
        out[0..4].copy_from_slice(&self.scan_no.to_be_bytes());
        out[4..8].copy_from_slice(&self.log_no.to_be_bytes());
        out[8..12].copy_from_slice(&self.kind.to_be_bytes());
        out[12..16].copy_from_slice(&self.range.to_be_bytes());
        out[16..20].copy_from_slice(&self.cal.to_be_bytes());
        out[20..24].copy_from_slice(&self.coil_type.to_be_bytes());
        for (i, v) in self.loc.iter().enumerate() {
            out[24 + 4 * i..28 + 4 * i].copy_from_slice(&v.to_be_bytes());
        }
        out[72..76].copy_from_slice(&self.unit.to_be_bytes());
        out[76..80].copy_from_slice(&self.unit_mul.to_be_bytes());
        for (dst, c) in out[80..95].iter_mut().zip(self.name.chars()) {
            *dst = u8::try_from(u32::from(c)).unwrap_or(b'?');
        }
        out
    }
}

// ── Coordinate transform ─────────────────────────────────────────────────

/// A rigid transform between two coordinate frames (`FIFFT_COORD_TRANS_STRUCT`).
///
/// Layout: from, to (i32), rot (3×3 f32, row-major), move (3 f32), then the
/// inverse rotation and translation, 104 bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct CoordTrans {
    pub from:  i32,
    pub to:    i32,
    pub rot:   [[f64; 3]; 3],
    pub trans: [f64; 3],
}

pub const COORD_TRANS_LEN: usize = 104;

impl CoordTrans {
    pub fn identity(from: i32, to: i32) -> Self {
        Self {
            from,
            to,
            rot: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            trans: [0.0; 3],
        }
    }

    pub fn from_bytes(raw: &[u8]) -> Result<Self> {
        if raw.len() < COORD_TRANS_LEN {
            bail!("coord_trans payload too short: {} bytes", raw.len());
        }
        let f = |i: usize| {
            let o = 8 + 4 * i;
            f64::from(f32::from_be_bytes([raw[o], raw[o + 1], raw[o + 2], raw[o + 3]]))
        };
        let mut rot = [[0.0; 3]; 3];
        for (r, row) in rot.iter_mut().enumerate() {
            for (c, v) in row.iter_mut().enumerate() {
                *v = f(3 * r + c);
            }
        }
        Ok(Self {
            from: i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
            to:   i32::from_be_bytes([raw[4], raw[5], raw[6], raw[7]]),
            rot,
            trans: [f(9), f(10), f(11)],
        })
    }

    /// Encode, filling the inverse part from the transpose of `rot`.
    pub fn to_bytes(&self) -> [u8; COORD_TRANS_LEN] {
        let mut vals = [0f32; 24];
        for r in 0..3 {
            for c in 0..3 {
                vals[3 * r + c] = self.rot[r][c] as f32;
                vals[12 + 3 * r + c] = self.rot[c][r] as f32;
            }
        }
        for i in 0..3 {
            vals[9 + i] = self.trans[i] as f32;
            // inverse translation: -Rᵀ t
            vals[21 + i] = -(0..3).map(|k| self.rot[k][i] * self.trans[k]).sum::<f64>() as f32;
        }
        let mut out = [0u8; COORD_TRANS_LEN];
        out[0..4].copy_from_slice(&self.from.to_be_bytes());
        out[4..8].copy_from_slice(&self.to.to_be_bytes());
        for (i, v) in vals.iter().enumerate() {
            out[8 + 4 * i..12 + 4 * i].copy_from_slice(&v.to_be_bytes());
        }
        out
    }
}

// ── Measurement info ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct MeasInfo {
    pub n_chan:       usize,
    pub sfreq:        f64,
    pub lowpass:      Option<f64>,
    pub highpass:     Option<f64>,
    pub line_freq:    Option<f64>,
    pub chs:          Vec<ChannelInfo>,
    pub bads:         Vec<String>,
    pub experimenter: Option<String>,
    pub description:  Option<String>,
    /// cHPI coil frequencies in Hz, one per coil.
    pub hpi_freqs:    Vec<f64>,
    pub dev_head_t:   Option<CoordTrans>,
}

impl MeasInfo {
    pub fn cals(&self) -> Vec<f64> {
        self.chs.iter().map(ChannelInfo::calibration).collect()
    }

    pub fn ch_names(&self) -> Vec<&str> {
        self.chs.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn is_bad(&self, name: &str) -> bool {
        self.bads.iter().any(|b| b == name)
    }

    /// Indices of MEG channels (`picks='meg'`), bads included.
    pub fn meg_picks(&self) -> Vec<usize> {
        self.chs.iter().enumerate().filter(|(_, c)| c.is_meg()).map(|(i, _)| i).collect()
    }

    /// Indices of MEG channels not listed in `bads`.
    pub fn good_meg_picks(&self) -> Vec<usize> {
        self.meg_picks().into_iter().filter(|&i| !self.is_bad(&self.chs[i].name)).collect()
    }

    /// Append `names` to `bads`, skipping duplicates; returns how many were new.
    pub fn add_bads<I, S>(&mut self, names: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut added = 0;
        for name in names {
            let name = name.into();
            if !self.is_bad(&name) {
                self.bads.push(name);
                added += 1;
            }
        }
        added
    }
}

pub fn read_meas_info<R: Read + Seek>(reader: &mut R, tree: &Node) -> Result<MeasInfo> {
    let info_node = tree
        .find_block(FIFFB_MEAS)
        .and_then(|m| m.find_block(FIFFB_MEAS_INFO))
        .ok_or_else(|| anyhow!("FIFFB_MEAS_INFO block not found"))?;

    let finite = |v: f32| v.is_finite().then_some(f64::from(v));

    let mut n_chan = None;
    let mut sfreq = None;
    let mut info = MeasInfo {
        n_chan: 0,
        sfreq: 0.0,
        lowpass: None,
        highpass: None,
        line_freq: None,
        chs: Vec::new(),
        bads: Vec::new(),
        experimenter: None,
        description: None,
        hpi_freqs: Vec::new(),
        dev_head_t: None,
    };

    for ent in &info_node.entries {
        match ent.kind {
            FIFF_NCHAN => n_chan = Some(read_i32(reader, ent)?),
            FIFF_SFREQ => sfreq = Some(f64::from(read_f32(reader, ent)?)),
            FIFF_LOWPASS => info.lowpass = finite(read_f32(reader, ent)?),
            FIFF_HIGHPASS => info.highpass = finite(read_f32(reader, ent)?),
            FIFF_LINE_FREQ => info.line_freq = finite(read_f32(reader, ent)?),
            FIFF_CH_INFO => info.chs.push(ChannelInfo::from_bytes(&read_raw_bytes(reader, ent)?)?),
            FIFF_BAD_CHS => {
                info.bads = read_string(reader, ent)?
                    .split(':')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            FIFF_EXPERIMENTER => info.experimenter = Some(read_string(reader, ent)?),
            FIFF_DESCRIPTION => info.description = Some(read_string(reader, ent)?),
            FIFF_COORD_TRANS => {
                let t = CoordTrans::from_bytes(&read_raw_bytes(reader, ent)?)?;
                if t.from == FIFFV_COORD_DEVICE && t.to == FIFFV_COORD_HEAD {
                    info.dev_head_t = Some(t);
                }
            }
            _ => {}
        }
    }

    // One FIFFB_HPI_COIL per coil, nested in FIFFB_HPI_MEAS.
    if let Some(hpi) = info_node.find_block(FIFFB_HPI_MEAS) {
        for coil in hpi.find_blocks(FIFFB_HPI_COIL) {
            if let Some(tag) = coil.find_tag(FIFF_HPI_COIL_FREQ) {
                let f = read_f32(reader, tag)?;
                if f.is_finite() && f > 0.0 {
                    info.hpi_freqs.push(f64::from(f));
                }
            }
        }
    }

    let n_chan = n_chan.ok_or_else(|| anyhow!("FIFF_NCHAN not found"))?;
    info.n_chan = usize::try_from(n_chan).map_err(|_| anyhow!("negative FIFF_NCHAN {n_chan}"))?;
    info.sfreq = sfreq.ok_or_else(|| anyhow!("FIFF_SFREQ not found"))?;
    if info.sfreq.is_nan() || info.sfreq <= 0.0 {
        bail!("invalid sampling frequency {}", info.sfreq);
    }
    if info.chs.len() != info.n_chan {
        bail!("expected {} ch_info structs, got {}", info.n_chan, info.chs.len());
    }
    Ok(info)
}

//! FIFF format constants.
//!
//! Names follow `mne/_fiff/constants.py` so the reader and writer can be
//! cross-checked against MNE.  Only the subset needed to read and write a
//! continuous MEG recording (plus its HPI metadata) lives here.
//!
//! Every datum in a FIF file is a **tag**: a 16-byte big-endian header
//! (`kind`, `type`, `size`, `next`) followed by `size` payload bytes.
//! `FIFF_BLOCK_START` / `FIFF_BLOCK_END` tags nest tags into a tree of blocks.

#![allow(dead_code)]

// ── Block kinds ───────────────────────────────────────────────────────────

/// One recording.
pub const FIFFB_MEAS:            i32 = 100;
/// Channel metadata, sfreq, bad channels, HPI setup.
pub const FIFFB_MEAS_INFO:       i32 = 101;
/// Continuous raw data.
pub const FIFFB_RAW_DATA:        i32 = 102;
/// HPI fit results.
pub const FIFFB_HPI_RESULT:      i32 = 107;
/// HPI measurement setup (contains one `FIFFB_HPI_COIL` per coil).
pub const FIFFB_HPI_MEAS:        i32 = 108;
/// One HPI coil.
pub const FIFFB_HPI_COIL:        i32 = 110;
/// Continuous data written by some acquisition systems instead of `FIFFB_RAW_DATA`.
pub const FIFFB_CONTINUOUS_DATA: i32 = 112;

// ── Tag kinds: structure ──────────────────────────────────────────────────

pub const FIFF_FILE_ID:     i32 = 100;
/// Payload: byte offset of the tag directory, or -1 when there is none.
pub const FIFF_DIR_POINTER: i32 = 101;
/// Payload: block kind (i32).
pub const FIFF_BLOCK_START: i32 = 104;
pub const FIFF_BLOCK_END:   i32 = 105;
/// Empty tag; MNE closes every file with one whose `next` is -1.
pub const FIFF_NOP:         i32 = 108;

// ── Tag kinds: measurement info ───────────────────────────────────────────

pub const FIFF_NCHAN:         i32 = 200;
/// f32, Hz.
pub const FIFF_SFREQ:         i32 = 201;
pub const FIFF_CH_INFO:       i32 = 203;
/// Free text; MNE stores `info['description']` here.
pub const FIFF_COMMENT:       i32 = 206;
pub const FIFF_FIRST_SAMPLE:  i32 = 208;
pub const FIFF_EXPERIMENTER:  i32 = 212;
pub const FIFF_HPI_NCOIL:     i32 = 216;
/// f32, Hz; NaN when unknown.
pub const FIFF_LOWPASS:       i32 = 219;
/// Colon-separated channel names.
pub const FIFF_BAD_CHS:       i32 = 220;
pub const FIFF_COORD_TRANS:   i32 = 222;
/// f32, Hz; NaN when unknown.
pub const FIFF_HIGHPASS:      i32 = 223;
pub const FIFF_LINE_FREQ:     i32 = 235;
/// f32, Hz, one per `FIFFB_HPI_COIL`.
pub const FIFF_HPI_COIL_FREQ: i32 = 236;
pub const FIFF_DESCRIPTION:   i32 = FIFF_COMMENT;

// ── Tag kinds: data ───────────────────────────────────────────────────────

/// Interleaved `[n_samp, n_chan]` samples.
pub const FIFF_DATA_BUFFER: i32 = 300;
/// Skip `n` whole buffers.
pub const FIFF_DATA_SKIP:   i32 = 301;

// ── Payload types ─────────────────────────────────────────────────────────

pub const FIFFT_VOID:               u32 = 0;
pub const FIFFT_SHORT:              u32 = 2;
pub const FIFFT_INT:                u32 = 3;
pub const FIFFT_FLOAT:              u32 = 4;
pub const FIFFT_DOUBLE:             u32 = 5;
/// Latin-1, not NUL-terminated.
pub const FIFFT_STRING:             u32 = 10;
/// Same wire width as `FIFFT_SHORT`.
pub const FIFFT_DAU_PACK16:         u32 = 16;
pub const FIFFT_COMPLEX_FLOAT:      u32 = 20;
pub const FIFFT_COMPLEX_DOUBLE:     u32 = 21;
/// 96 bytes, see [`super::info::ChannelInfo`].
pub const FIFFT_CH_INFO_STRUCT:     u32 = 30;
/// 20 bytes: version, machine id (2 × i32), seconds, microseconds.
pub const FIFFT_ID_STRUCT:          u32 = 31;
/// 16 bytes per entry.
pub const FIFFT_DIR_ENTRY_STRUCT:   u32 = 32;
/// 104 bytes, see [`super::info::CoordTrans`].
pub const FIFFT_COORD_TRANS_STRUCT: u32 = 35;

// ── `next` sentinels ──────────────────────────────────────────────────────

/// Next tag follows immediately at `pos + 16 + size`.
pub const FIFFV_NEXT_SEQ:  i32 = 0;
/// End of the tag chain.
pub const FIFFV_NEXT_NONE: i32 = -1;

// ── Channel kinds ─────────────────────────────────────────────────────────

pub const FIFFV_MEG_CH:     i32 = 1;
pub const FIFFV_EEG_CH:     i32 = 2;
pub const FIFFV_STIM_CH:    i32 = 3;
pub const FIFFV_EOG_CH:     i32 = 202;
pub const FIFFV_REF_MEG_CH: i32 = 301;
pub const FIFFV_ECG_CH:     i32 = 402;
pub const FIFFV_MISC_CH:    i32 = 502;

// ── Units ─────────────────────────────────────────────────────────────────

/// Tesla: magnetometers.
pub const FIFF_UNIT_T:   i32 = 112;
/// Tesla per metre: planar gradiometers.
pub const FIFF_UNIT_T_M: i32 = 201;

// ── Coordinate frames ─────────────────────────────────────────────────────

pub const FIFFV_COORD_DEVICE: i32 = 1;
pub const FIFFV_COORD_HEAD:   i32 = 4;

/// Bytes per sample for numeric buffer types, `None` for anything else.
///
/// ```
/// use meg_explorer::fiff::constants::{bytes_per_sample, FIFFT_FLOAT, FIFFT_SHORT};
/// assert_eq!(bytes_per_sample(FIFFT_FLOAT), Some(4));
/// assert_eq!(bytes_per_sample(FIFFT_SHORT), Some(2));
/// assert_eq!(bytes_per_sample(99), None);
/// ```
pub fn bytes_per_sample(tag_type: u32) -> Option<usize> {
    match tag_type {
        FIFFT_SHORT | FIFFT_DAU_PACK16 => Some(2),
        FIFFT_INT | FIFFT_FLOAT        => Some(4),
        FIFFT_DOUBLE                   => Some(8),
        FIFFT_COMPLEX_FLOAT            => Some(8),
        FIFFT_COMPLEX_DOUBLE           => Some(16),
        _                              => None,
    }
}

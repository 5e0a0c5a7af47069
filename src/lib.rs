//! # meg-explorer: guided MEG preprocessing with live progress
//!
//! `meg-explorer` walks a user through picking a raw MEG recording plus the
//! site's crosstalk and fine-calibration files, cleans the recording on a
//! background thread while a progress bar polls it, optionally saves the
//! result next to the other data, and plots it.
//!
//! ## Pipeline overview
//!
//! ```text
//! run01_raw.fif  ct_sparse.fif  sss_cal.dat
//!   │
//!   ├─ 1 load recording        native FIFF reader, samples stay on disk   10 %
//!   ├─ 2 bad channels          flat / noisy in ≥ min_count 30 s windows   30 %
//!   ├─ 3 cHPI amplitudes       0.5 s windows, 0.1 s step                  45 %
//!   ├─ 4 coil locs → head pos  MNE `pos` rows [t, q1..q3, x, y, z, …]     65 %
//!   ├─ 5 spatial filter        10 s segments, r ≥ 0.98 projected out      95 %
//!   └─ 6 band-pass (MEG)       0.01–120 Hz FIR, zero-double phase        100 %
//!        │
//!        └─→ Processed { recording, total_bytes }
//! ```
//!
//! Stages run in order on one worker thread ([`Worker`]).  Each consumes the
//! previous artifact, so at most two generations of a recording are alive at
//! once.  The foreground [`ProgressMonitor`] polls the worker's
//! [`ProgressRecord`] on a fixed tick and finishes exactly once.
//!
//! ## Quick start
//!
//! ```no_run
//! use meg_explorer::{preprocess, Completion, JobDescriptor, PipelineConfig};
//!
//! let job = JobDescriptor::new("run01_raw.fif", "ct_sparse.fif", "sss_cal.dat").unwrap();
//! match preprocess(job, &PipelineConfig::default()).unwrap() {
//!     Completion::Succeeded(p) => println!("bads: {:?}", p.recording.info.bads),
//!     Completion::Failed(f) => eprintln!("{f}"),
//!     Completion::Cancelled => {}
//! }
//! ```
//!
//! ## Running individual pieces
//!
//! ```no_run
//! use meg_explorer::fiff::open_raw;
//! use meg_explorer::filter::{band_pass_inplace, FilterPhase};
//!
//! let raw = open_raw("run01_raw.fif").unwrap();
//! let mut data = raw.read_all_data().unwrap();          // [C, T]  f64
//! let picks = raw.info.meg_picks();
//! band_pass_inplace(&mut data, &picks, 1.0, 40.0, raw.info.sfreq, FilterPhase::ZeroDouble).unwrap();
//! ```

pub mod config;
pub mod dialogs;
pub mod fiff;
pub mod filter;
pub mod job;
pub mod logging;
pub mod monitor;
pub mod orchestrator;
pub mod persist;
pub mod processing;
pub mod progress;
pub mod recording;
pub mod references;
pub mod view;
pub mod worker;

use std::sync::Arc;

use anyhow::Result;

// ── Crate-root re-exports ─────────────────────────────────────────────────

pub use config::PipelineConfig;
pub use dialogs::{Dialogs, InitialChoice, PresetDialogs, RfdDialogs, SaveChoice};
pub use job::{JobDescriptor, JobError, Stage};
pub use monitor::{MonitorStop, ProgressMonitor, ProgressView, TerminalProgress};
pub use orchestrator::{Orchestrator, Outcome};
pub use persist::{format_bytes, output_file_name, total_size, FiffPersistence, Persistence};
pub use processing::{ChpiAmplitudes, ChpiLocations, HeadPositions, NativeProcessor, Processor};
pub use progress::{ProgressRecord, ProgressSnapshot};
pub use recording::Recording;
pub use references::{FineCalibration, References};
pub use view::{SvgPlotter, Viewer};
pub use worker::{CancelToken, Completion, Processed, StageFailure, Worker, WorkerHandle};

/// Run `job` with the native processor and wait for it, without a progress
/// display.
///
/// # Errors
///
/// Only if the worker thread cannot be started; stage failures come back as
/// [`Completion::Failed`].
pub fn preprocess(job: JobDescriptor, cfg: &PipelineConfig) -> Result<Completion> {
    let processor = Arc::new(NativeProcessor::new(cfg.clone()));
    Ok(Worker::spawn(job, processor, CancelToken::new())?.join())
}

//! End-to-end flow: choose files, run the worker under the monitor, offer
//! to save, show the result.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::dialogs::{Dialogs, FileFilter, InitialChoice, SaveChoice, DAT_FILES, FIF_FILES};
use crate::job::{JobDescriptor, Stage};
use crate::monitor::{MonitorStop, ProgressMonitor, ProgressView};
use crate::persist::{format_bytes, Persistence};
use crate::processing::Processor;
use crate::recording::Recording;
use crate::view::Viewer;
use crate::worker::{CancelToken, Completion, StageFailure, Worker};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The user cancelled a prompt before any work started.
    Aborted,
    ViewedRaw,
    Processed { saved: Option<PathBuf> },
    Failed(StageFailure),
    Cancelled,
}

pub struct Orchestrator<D, P, V> {
    dialogs:     D,
    persistence: P,
    viewer:      V,
    processor:   Arc<dyn Processor>,
    progress:    Box<dyn ProgressView>,
    monitor:     ProgressMonitor,
}

impl<D: Dialogs, P: Persistence, V: Viewer> Orchestrator<D, P, V> {
    pub fn new(
        dialogs: D,
        persistence: P,
        viewer: V,
        processor: Arc<dyn Processor>,
        progress: Box<dyn ProgressView>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            dialogs,
            persistence,
            viewer,
            processor,
            progress,
            monitor: ProgressMonitor::new(poll_interval),
        }
    }

    pub fn dialogs(&self) -> &D {
        &self.dialogs
    }

    pub fn viewer(&self) -> &V {
        &self.viewer
    }

    /// Stops the progress monitor of the current (or next) run.
    pub fn stopper(&self) -> MonitorStop {
        self.monitor.stopper()
    }

    pub fn run(&mut self) -> Result<Outcome> {
        let choice = self.dialogs.initial_choice();
        if choice == InitialChoice::Cancel {
            info!("cancelled at the first prompt");
            return Ok(Outcome::Aborted);
        }

        self.dialogs.message(
            "Step 1 of 3",
            "First, select the FIF file containing your data. Click OK to open the browser.",
        );
        let Some(raw) = self.pick("Select the FIF file containing your data", FIF_FILES) else {
            return Ok(Outcome::Aborted);
        };

        if choice == InitialChoice::ViewRaw {
            let rec = match self.processor.load_recording(&raw) {
                Ok(rec) => rec,
                Err(e) => return Ok(self.fail(StageFailure { stage: Stage::LoadRecording, message: format!("{e:#}") })),
            };
            self.present(&rec, &raw, "raw")?;
            return Ok(Outcome::ViewedRaw);
        }

        self.dialogs.message("Step 2 of 3", "Next, select the crosstalk file. Its name starts with \"ct_sparse\".");
        let Some(crosstalk) = self.pick("Select the crosstalk file (ct_sparse*.fif)", FIF_FILES) else {
            return Ok(Outcome::Aborted);
        };
        self.dialogs.message("Step 3 of 3", "Finally, select the calibration file. Its name starts with \"sss_cal\".");
        let Some(calibration) = self.pick("Select the calibration file (sss_cal*.dat)", DAT_FILES) else {
            return Ok(Outcome::Aborted);
        };

        let job = JobDescriptor::new(raw, crosstalk, calibration)?;
        let worker = Worker::spawn(job.clone(), Arc::clone(&self.processor), CancelToken::new())?;
        let processed = match self.monitor.run(worker, self.progress.as_mut()) {
            Completion::Succeeded(p) => p,
            Completion::Failed(f) => return Ok(self.fail(f)),
            Completion::Cancelled => {
                self.dialogs.message("Cancelled", "Preprocessing was cancelled. Nothing was saved.");
                return Ok(Outcome::Cancelled);
            }
        };

        let saved = match self.dialogs.save_choice(&format_bytes(processed.total_bytes)) {
            SaveChoice::Save => self.save(&processed.recording, job.raw()),
            SaveChoice::Discard => {
                info!("result not saved");
                None
            }
        };
        self.present(&processed.recording, job.raw(), "preprocessed")?;
        Ok(Outcome::Processed { saved })
    }

    /// A cancelled or empty selection is `None`.
    fn pick(&mut self, title: &str, filter: FileFilter) -> Option<PathBuf> {
        let picked = self.dialogs.pick_file(title, filter).filter(|p| !p.as_os_str().is_empty());
        if picked.is_none() {
            info!(%title, "file selection cancelled, aborting");
        }
        picked
    }

    fn save(&mut self, rec: &Recording, input: &Path) -> Option<PathBuf> {
        let dir = self
            .dialogs
            .pick_directory("Select the folder to save the preprocessed file")
            .filter(|p| !p.as_os_str().is_empty());
        let Some(dir) = dir else {
            info!("no folder chosen, result not saved");
            return None;
        };
        match self.persistence.save(rec, input, &dir) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(error = %format!("{e:#}"), "saving failed");
                self.dialogs.error("Saving failed", &format!("{e:#}"));
                None
            }
        }
    }

    fn fail(&mut self, failure: StageFailure) -> Outcome {
        self.dialogs.error(
            "Preprocessing failed",
            &format!("{} failed:\n{}", failure.stage, failure.message),
        );
        Outcome::Failed(failure)
    }

    fn present(&mut self, rec: &Recording, input: &Path, kind: &str) -> Result<()> {
        let stem = input.file_stem().map_or_else(|| "recording".into(), |s| s.to_string_lossy());
        let title = format!("{stem} ({kind})");
        let shown = self.viewer.show(rec, &title).with_context(|| format!("show {title}"));
        match shown {
            Ok(Some(path)) => {
                self.dialogs.message("Plot", &format!("The plot was written to {}", path.display()));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                self.dialogs.error("Plot failed", &format!("{e:#}"));
                Err(e)
            }
        }
    }
}

//! The background worker: six stages on their own OS thread.
//!
//! The worker is the only writer of its [`ProgressRecord`].  Each stage
//! publishes `(stage, previous checkpoint)` when it starts and
//! `(stage, checkpoint)` when it finishes, so the percent never goes down
//! and the record always names the stage that is running.
//!
//! The outcome comes back through [`WorkerHandle::join`], which consumes the
//! handle: success, a stage failure, or a cancellation observed at a stage
//! boundary.  A panicking stage is reported as a failure of that stage.
use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{error, info, info_span};

use crate::job::{JobDescriptor, Stage};
use crate::persist::total_size;
use crate::processing::Processor;
use crate::progress::{ProgressRecord, ProgressSnapshot};
use crate::recording::Recording;
use crate::references::References;

/// What a successful run hands over.
#[derive(Debug)]
pub struct Processed {
    pub recording:   Recording,
    /// Size of the files backing the input recording, in bytes.
    pub total_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{stage} failed: {message}")]
pub struct StageFailure {
    pub stage:   Stage,
    pub message: String,
}

#[derive(Debug)]
pub enum Completion {
    Succeeded(Processed),
    Failed(StageFailure),
    Cancelled,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Succeeded(_))
    }

    pub fn failure(&self) -> Option<&StageFailure> {
        match self {
            Completion::Failed(f) => Some(f),
            _ => None,
        }
    }
}

/// Cooperative stop request, honoured before the next stage starts.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct Worker;

impl Worker {
    /// Start `job` on a new thread named `meg-worker`.
    pub fn spawn(
        job: JobDescriptor,
        processor: Arc<dyn Processor>,
        cancel: CancelToken,
    ) -> Result<WorkerHandle> {
        let progress = Arc::new(ProgressRecord::new());
        let thread = {
            let progress = Arc::clone(&progress);
            let cancel = cancel.clone();
            thread::Builder::new()
                .name("meg-worker".into())
                .spawn(move || {
                    let _span = info_span!("worker", raw = %job.raw().display()).entered();
                    let run = Run { processor: processor.as_ref(), progress: &progress, cancel: &cancel };
                    run.pipeline(&job)
                })
                .context("spawn worker thread")?
        };
        Ok(WorkerHandle { progress, cancel, thread })
    }
}

pub struct WorkerHandle {
    progress: Arc<ProgressRecord>,
    cancel:   CancelToken,
    thread:   JoinHandle<Completion>,
}

impl WorkerHandle {
    pub fn progress(&self) -> ProgressSnapshot {
        self.progress.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Block until the worker ends and take its outcome.
    pub fn join(self) -> Completion {
        match self.thread.join() {
            Ok(completion) => completion,
            Err(payload) => {
                let stage = self.progress.snapshot().stage.unwrap_or(Stage::LoadRecording);
                let message = format!("worker panicked: {}", panic_message(payload.as_ref()));
                error!(%stage, %message, "worker thread panicked");
                Completion::Failed(StageFailure { stage, message })
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

enum Interrupted {
    Failed(StageFailure),
    Cancelled,
}

struct Run<'a> {
    processor: &'a dyn Processor,
    progress:  &'a ProgressRecord,
    cancel:    &'a CancelToken,
}

impl Run<'_> {
    fn pipeline(&self, job: &JobDescriptor) -> Completion {
        match self.stages(job) {
            Ok(processed) => {
                info!(total_bytes = processed.total_bytes, "pipeline finished");
                Completion::Succeeded(processed)
            }
            Err(Interrupted::Failed(failure)) => {
                error!(stage = %failure.stage, message = %failure.message, "pipeline failed");
                Completion::Failed(failure)
            }
            Err(Interrupted::Cancelled) => {
                info!("pipeline cancelled");
                Completion::Cancelled
            }
        }
    }

    fn stages(&self, job: &JobDescriptor) -> Result<Processed, Interrupted> {
        let refs = References {
            crosstalk:   job.crosstalk().to_path_buf(),
            calibration: job.calibration().to_path_buf(),
        };

        let (raw, total_bytes) = self.stage(Stage::LoadRecording, |p| {
            let raw = p.load_recording(job.raw())?;
            let total_bytes = total_size(raw.filenames())?;
            Ok((raw, total_bytes))
        })?;

        let raw = self.stage(Stage::DetectBadChannels, |p| p.detect_bad_channels(raw, &refs))?;

        let amplitudes = self.stage(Stage::ChpiAmplitudes, |p| p.chpi_amplitudes(&raw))?;

        // amplitudes → locations → positions; each is consumed by the next
        let head_pos = self.stage(Stage::HeadPosition, |p| {
            let locations = p.chpi_locations(&raw, amplitudes)?;
            p.head_positions(&raw, locations)
        })?;

        // the unfiltered recording and the positions end here
        let raw = self.stage(Stage::MaxwellFilter, |p| p.maxwell_filter(raw, &refs, head_pos))?;

        let recording = self.stage(Stage::BandPass, |p| p.band_pass(raw))?;

        Ok(Processed { recording, total_bytes })
    }

    fn stage<T>(
        &self,
        stage: Stage,
        body: impl FnOnce(&dyn Processor) -> Result<T>,
    ) -> Result<T, Interrupted> {
        if self.cancel.is_cancelled() {
            info!(%stage, "cancellation requested, not starting stage");
            return Err(Interrupted::Cancelled);
        }
        let before = stage
            .index()
            .checked_sub(1)
            .and_then(Stage::from_index)
            .map_or(0, Stage::checkpoint);
        self.progress.publish(stage, before);

        let started = Instant::now();
        let out = body(self.processor).map_err(|e| {
            Interrupted::Failed(StageFailure { stage, message: format!("{e:#}") })
        })?;

        self.progress.publish(stage, stage.checkpoint());
        info!(
            %stage,
            percent = stage.checkpoint(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "stage complete"
        );
        Ok(out)
    }
}

//! Polls a running worker on the calling thread and drives a progress view.
//!
//! The monitor wakes on a fixed tick, or early when a stop is requested.
//! While the worker runs, every tick pushes the current snapshot to the
//! view.  The first tick that finds the worker finished joins it, hands the
//! completion to [`ProgressView::finish`] and returns; that is the only path
//! out of the loop, so `finish` runs exactly once per monitored worker.
use std::io::{self, Stderr, Write};
use std::time::Duration;

use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use tracing::{debug, info};

use crate::progress::ProgressSnapshot;
use crate::worker::{Completion, WorkerHandle};

pub trait ProgressView {
    fn update(&mut self, snapshot: ProgressSnapshot);

    /// Tear the view down.  Called once, after the worker has ended.
    fn finish(&mut self, completion: &Completion);
}

/// Requests that a running [`ProgressMonitor`] stop.  Cloneable, so a
/// signal handler or another thread can hold one.
#[derive(Debug, Clone)]
pub struct MonitorStop(Sender<()>);

impl MonitorStop {
    pub fn stop(&self) {
        // the monitor owns a sender too, so the channel is never disconnected
        let _ = self.0.send(());
    }
}

pub struct ProgressMonitor {
    interval: Duration,
    stop_tx:  Sender<()>,
    stop_rx:  Receiver<()>,
}

impl ProgressMonitor {
    pub fn new(interval: Duration) -> Self {
        let (stop_tx, stop_rx) = unbounded();
        Self { interval, stop_tx, stop_rx }
    }

    pub fn stopper(&self) -> MonitorStop {
        MonitorStop(self.stop_tx.clone())
    }

    /// Poll `worker` until it ends.  After a stop request the worker is asked
    /// to cancel and the view stops receiving updates; the monitor still waits
    /// for the worker to reach a stage boundary before finishing.
    pub fn run<V: ProgressView + ?Sized>(&self, worker: WorkerHandle, view: &mut V) -> Completion {
        let ticker = tick(self.interval);
        let mut stopping = false;
        let mut polls = 0_u64;

        loop {
            select! {
                recv(ticker) -> _ => {}
                recv(self.stop_rx) -> _ => {
                    if !stopping {
                        info!("stop requested, cancelling worker at the next stage boundary");
                        worker.cancel();
                        stopping = true;
                    }
                }
            }
            polls += 1;

            if worker.is_finished() {
                let completion = worker.join();
                debug!(polls, success = completion.is_success(), "worker finished");
                view.finish(&completion);
                return completion;
            }
            if !stopping {
                view.update(worker.progress());
            }
        }
    }
}

/// A one-line text progress bar.
pub struct TerminalProgress<W: Write = Stderr> {
    out:   W,
    width: usize,
    last:  Option<ProgressSnapshot>,
}

impl TerminalProgress<Stderr> {
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> TerminalProgress<W> {
    pub fn new(out: W) -> Self {
        Self { out, width: 30, last: None }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn bar(&self, percent: u8) -> String {
        let filled = self.width * usize::from(percent.min(100)) / 100;
        format!("[{}{}]", "#".repeat(filled), "-".repeat(self.width - filled))
    }
}

impl<W: Write> ProgressView for TerminalProgress<W> {
    fn update(&mut self, snapshot: ProgressSnapshot) {
        if self.last == Some(snapshot) {
            return;
        }
        self.last = Some(snapshot);
        let line = format!("\r{} {:>3}% {:<32}", self.bar(snapshot.percent), snapshot.percent, snapshot.label());
        // progress output is cosmetic; a closed terminal must not stop the run
        let _ = self.out.write_all(line.as_bytes()).and_then(|()| self.out.flush());
    }

    fn finish(&mut self, completion: &Completion) {
        let status = match completion {
            Completion::Succeeded(_) => format!("{} 100% Done", self.bar(100)),
            Completion::Failed(f) => format!("Failed while {}", f.stage.name().to_lowercase()),
            Completion::Cancelled => "Cancelled".to_string(),
        };
        let _ = writeln!(self.out, "\r{status:<70}").and_then(|()| self.out.flush());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::Stage;

    #[test]
    fn bar_rendering() {
        let mut view = TerminalProgress::new(Vec::new());
        view.update(ProgressSnapshot { stage: Some(Stage::ChpiAmplitudes), percent: 45 });
        // unchanged snapshots are not redrawn
        view.update(ProgressSnapshot { stage: Some(Stage::ChpiAmplitudes), percent: 45 });
        let text = String::from_utf8(view.into_inner()).unwrap();
        assert_eq!(text.matches('\r').count(), 1);
        assert!(text.contains("[#############-----------------]  45% Computing cHPI amplitudes"));
    }

    #[test]
    fn finish_reports_failure_stage() {
        let mut view = TerminalProgress::new(Vec::new());
        view.finish(&Completion::Failed(crate::worker::StageFailure {
            stage: Stage::MaxwellFilter,
            message: "boom".into(),
        }));
        let text = String::from_utf8(view.into_inner()).unwrap();
        assert!(text.contains("Failed while applying maxwell filter"));
    }
}

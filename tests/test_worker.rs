/// Worker: stage order, progress publication, failure capture and
/// cancellation, driven through a scripted processor.
mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use common::*;
use meg_explorer::{CancelToken, Completion, JobDescriptor, Stage, Worker};
use tempfile::TempDir;

fn job(dir: &TempDir) -> JobDescriptor {
    let raw = write_recording(dir.path(), "run01_raw.fif", 8, 2.0);
    let (ct, cal) = write_references(dir.path(), 8);
    JobDescriptor::new(raw, ct, cal).unwrap()
}

#[test]
fn succeeds_and_reports_input_size() {
    let dir = TempDir::new().unwrap();
    let job = job(&dir);
    let expected = std::fs::metadata(job.raw()).unwrap().len();

    let worker = Worker::spawn(job, Arc::new(ScriptedProcessor::default()), CancelToken::new()).unwrap();
    let completion = worker.join();

    let Completion::Succeeded(processed) = completion else {
        panic!("expected success, got {completion:?}");
    };
    assert_eq!(processed.total_bytes, expected);
    assert!(processed.recording.is_loaded());
    assert_eq!(processed.recording.info.bads, vec![channel_name(FLAT)]);
}

#[test]
fn progress_is_monotonic_and_ends_at_100() {
    let dir = TempDir::new().unwrap();
    let processor = Arc::new(ScriptedProcessor::slow(Duration::from_millis(20)));
    let worker = Worker::spawn(job(&dir), processor, CancelToken::new()).unwrap();

    let mut seen = Vec::new();
    while !worker.is_finished() {
        seen.push(worker.progress());
        thread::sleep(Duration::from_millis(2));
    }
    let last = worker.progress();
    assert!(worker.join().is_success());

    for pair in seen.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        assert!(b.percent >= a.percent, "percent went back: {a:?} -> {b:?}");
        assert!(b.stage.map(Stage::index) >= a.stage.map(Stage::index), "stage went back: {a:?} -> {b:?}");
    }
    assert_eq!(last.stage, Some(Stage::BandPass));
    assert_eq!(last.percent, 100);
    // a slow run is observed mid-way at least once
    assert!(seen.iter().any(|s| s.stage.is_some() && s.percent < 100));
}

#[test]
fn failure_names_the_stage() {
    let dir = TempDir::new().unwrap();
    let processor = Arc::new(ScriptedProcessor::failing_at(Stage::MaxwellFilter));
    let completion = Worker::spawn(job(&dir), processor, CancelToken::new()).unwrap().join();

    let failure = completion.failure().expect("failed");
    assert_eq!(failure.stage, Stage::MaxwellFilter);
    assert!(failure.message.contains("scripted failure"), "{}", failure.message);
}

#[test]
fn missing_recording_fails_loading() {
    let dir = TempDir::new().unwrap();
    let (ct, cal) = write_references(dir.path(), 4);
    let job = JobDescriptor::new(dir.path().join("absent_raw.fif"), ct, cal).unwrap();
    let completion = Worker::spawn(job, Arc::new(ScriptedProcessor::default()), CancelToken::new())
        .unwrap()
        .join();
    assert_eq!(completion.failure().map(|f| f.stage), Some(Stage::LoadRecording));
}

#[test]
fn panic_is_reported_against_the_running_stage() {
    let dir = TempDir::new().unwrap();
    let processor = Arc::new(ScriptedProcessor::panicking_at(Stage::ChpiAmplitudes));
    let completion = Worker::spawn(job(&dir), processor, CancelToken::new()).unwrap().join();

    let failure = completion.failure().expect("failed");
    assert_eq!(failure.stage, Stage::ChpiAmplitudes);
    assert!(failure.message.contains("scripted panic"), "{}", failure.message);
}

#[test]
fn cancelled_before_start_runs_nothing() {
    let dir = TempDir::new().unwrap();
    let cancel = CancelToken::new();
    cancel.cancel();
    let worker = Worker::spawn(job(&dir), Arc::new(ScriptedProcessor::default()), cancel).unwrap();
    let progress = {
        while !worker.is_finished() {
            thread::sleep(Duration::from_millis(1));
        }
        worker.progress()
    };
    assert!(matches!(worker.join(), Completion::Cancelled));
    assert_eq!(progress.stage, None);
    assert_eq!(progress.percent, 0);
}

#[test]
fn cancel_stops_at_a_stage_boundary() {
    let dir = TempDir::new().unwrap();
    let processor = Arc::new(ScriptedProcessor::slow(Duration::from_millis(50)));
    let worker = Worker::spawn(job(&dir), processor, CancelToken::new()).unwrap();

    thread::sleep(Duration::from_millis(30));
    worker.cancel();
    let progress_at_cancel = worker.progress();
    let completion = worker.join();

    assert!(matches!(completion, Completion::Cancelled), "{completion:?}");
    assert!(progress_at_cancel.percent < 100);
}

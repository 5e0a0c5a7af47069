//! Progress shared between the worker thread and the monitor.
//!
//! Stage and percent live in one `AtomicU32` (`stage + 1` in the high half,
//! percent in the low half), so a reader always sees a pair written by the
//! same `publish`.  Zero in the high half means no stage has reported yet.
use std::sync::atomic::{AtomicU32, Ordering};

use crate::job::Stage;

#[derive(Debug, Default)]
pub struct ProgressRecord {
    word: AtomicU32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub stage:   Option<Stage>,
    pub percent: u8,
}

impl ProgressSnapshot {
    pub fn label(&self) -> &'static str {
        self.stage.map_or("Starting", Stage::name)
    }
}

fn pack(stage: Stage, percent: u8) -> u32 {
    ((stage.index() as u32 + 1) << 16) | u32::from(percent.min(100))
}

fn unpack(word: u32) -> ProgressSnapshot {
    let stage = match word >> 16 {
        0 => None,
        n => Stage::from_index(n as usize - 1),
    };
    ProgressSnapshot { stage, percent: (word & 0xffff) as u8 }
}

impl ProgressRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `stage` reached `percent`.  Percent is clamped to 100 and
    /// never goes down: stages advance in lockstep with it, so the packed
    /// word is compared as a whole.
    pub fn publish(&self, stage: Stage, percent: u8) {
        self.word.fetch_max(pack(stage, percent), Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        unpack(self.word.load(Ordering::Acquire))
    }
}

//! [`Processor`] implemented on the crate's own FIFF reader and filters.
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use super::{bads, chpi, maxwell, ChpiAmplitudes, ChpiLocations, HeadPositions, Processor};
use crate::config::PipelineConfig;
use crate::filter::band_pass_inplace;
use crate::recording::Recording;
use crate::references::{check_crosstalk, FineCalibration, References};

#[derive(Debug, Clone, Default)]
pub struct NativeProcessor {
    cfg: PipelineConfig,
}

impl NativeProcessor {
    pub fn new(cfg: PipelineConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.cfg
    }

    fn references(&self, refs: &References) -> Result<FineCalibration> {
        check_crosstalk(&refs.crosstalk)?;
        FineCalibration::read(&refs.calibration)
    }
}

impl Processor for NativeProcessor {
    fn load_recording(&self, path: &Path) -> Result<Recording> {
        let rec = Recording::open(path)?;
        info!(
            path = %path.display(),
            n_chan = rec.info.n_chan,
            sfreq = rec.sfreq(),
            duration_s = rec.duration_secs(),
            "recording opened"
        );
        Ok(rec)
    }

    fn detect_bad_channels(&self, mut raw: Recording, refs: &References) -> Result<Recording> {
        let cal = self.references(refs)?;
        let covered = cal.coverage(&raw.info);
        if covered == 0 {
            warn!("fine calibration has no entry for any MEG channel of this recording");
        }
        let found = bads::find_bad_channels(&raw, &cal, &self.cfg).context("bad-channel detection")?;
        let added = raw.info.add_bads(found.all().map(str::to_string));
        info!(noisy = ?found.noisy, flat = ?found.flat, added, "bad channels marked");
        Ok(raw)
    }

    fn chpi_amplitudes(&self, raw: &Recording) -> Result<ChpiAmplitudes> {
        chpi::compute_amplitudes(raw, &self.cfg)
    }

    fn chpi_locations(&self, raw: &Recording, amplitudes: ChpiAmplitudes) -> Result<ChpiLocations> {
        chpi::compute_locations(raw, amplitudes)
    }

    fn head_positions(&self, raw: &Recording, locations: ChpiLocations) -> Result<HeadPositions> {
        let pos = chpi::compute_head_pos(raw, locations)?;
        info!(n_positions = pos.len(), "head positions computed");
        Ok(pos)
    }

    fn maxwell_filter(&self, raw: Recording, refs: &References, head_pos: HeadPositions) -> Result<Recording> {
        let cal = self.references(refs)?;
        maxwell::spatial_filter(raw, &cal, &head_pos, &self.cfg)
    }

    fn band_pass(&self, mut raw: Recording) -> Result<Recording> {
        let picks = raw.info.meg_picks();
        let sfreq = raw.sfreq();
        let cfg = &self.cfg;
        band_pass_inplace(raw.data_mut()?, &picks, cfg.l_freq, cfg.h_freq, sfreq, cfg.phase)
            .with_context(|| format!("band-pass {}–{} Hz", cfg.l_freq, cfg.h_freq))?;
        raw.info.highpass = Some(cfg.l_freq);
        raw.info.lowpass = Some(cfg.h_freq);
        Ok(raw)
    }
}

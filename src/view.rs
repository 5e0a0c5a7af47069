//! Showing a recording to the user.
//!
//! [`SvgPlotter`] draws the first channels over the first seconds as stacked,
//! individually scaled traces (bad channels in grey, like `raw.plot()`) and
//! writes the figure to an SVG file.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use plotters::prelude::*;
use tracing::info;

use crate::recording::Recording;

pub trait Viewer {
    /// Present `rec`; returns the file written, if the viewer writes one.
    fn show(&mut self, rec: &Recording, title: &str) -> Result<Option<PathBuf>>;
}

#[derive(Debug, Clone)]
pub struct SvgPlotter {
    pub out_dir:    PathBuf,
    pub n_channels: usize,
    /// Seconds shown from the start of the recording.
    pub duration:   f64,
    pub size:       (u32, u32),
}

impl SvgPlotter {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self { out_dir: out_dir.into(), n_channels: 20, duration: 10.0, size: (1400, 900) }
    }

    pub fn render(&self, rec: &Recording, title: &str, path: &Path) -> Result<()> {
        let n_ch = self.n_channels.min(rec.info.n_chan);
        let n_t = ((self.duration * rec.sfreq()).round() as usize).clamp(1, rec.n_times().max(1));
        let data = rec.read_slice(0, n_t)?;
        let t0 = rec.first_samp() as f64 / rec.sfreq();
        let t1 = t0 + n_t as f64 / rec.sfreq();

        let root = SVGBackend::new(path, self.size).into_drawing_area();
        root.fill(&WHITE).map_err(|e| anyhow!("plot: {e}"))?;
        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 20).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(90)
            .build_cartesian_2d(t0..t1, -(n_ch as f64)..1.0)
            .map_err(|e| anyhow!("plot: {e}"))?;

        // one row per channel: label the row centres with channel names
        let names: Vec<String> = rec.info.chs.iter().take(n_ch).map(|c| c.name.clone()).collect();
        chart
            .configure_mesh()
            .disable_y_mesh()
            .x_desc("Time (s)")
            .y_labels(n_ch.max(1) + 1)
            .y_label_formatter(&|y| {
                let row = (-y).round();
                if row >= 0.0 && (row as usize) < names.len() && (y + row).abs() < 1e-6 {
                    names[row as usize].clone()
                } else {
                    String::new()
                }
            })
            .draw()
            .map_err(|e| anyhow!("plot: {e}"))?;

        for (c, row) in data.rows().into_iter().take(n_ch).enumerate() {
            let (lo, hi) = row
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
            let mid = 0.5 * (lo + hi);
            let half = if hi > lo { 0.5 * (hi - lo) / 0.45 } else { 1.0 };
            let colour = if rec.info.is_bad(&rec.info.chs[c].name) { RGBColor(160, 160, 160) } else { BLUE };
            let offset = -(c as f64);
            chart
                .draw_series(LineSeries::new(
                    row.iter()
                        .enumerate()
                        .map(|(i, &v)| (t0 + i as f64 / rec.sfreq(), offset + (v - mid) / half)),
                    colour.stroke_width(1),
                ))
                .map_err(|e| anyhow!("plot: {e}"))?;
        }
        root.present().map_err(|e| anyhow!("plot: {e}"))?;
        Ok(())
    }
}

impl Viewer for SvgPlotter {
    fn show(&mut self, rec: &Recording, title: &str) -> Result<Option<PathBuf>> {
        let stem: String = title
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect();
        std::fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("create {}", self.out_dir.display()))?;
        let path = self.out_dir.join(format!("{stem}.svg"));
        self.render(rec, title, &path)
            .with_context(|| format!("render {}", path.display()))?;
        info!(path = %path.display(), "plot written");
        Ok(Some(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fiff::constants::*;
    use crate::fiff::{ChannelInfo, MeasInfo};
    use ndarray::Array2;

    #[test]
    fn writes_an_svg_file() {
        let info = MeasInfo {
            n_chan: 2,
            sfreq: 50.0,
            lowpass: None,
            highpass: None,
            line_freq: None,
            chs: ["MEG 0111", "MEG 0121"]
                .iter()
                .enumerate()
                .map(|(i, n)| ChannelInfo {
                    scan_no: i as i32 + 1,
                    log_no: i as i32 + 1,
                    kind: FIFFV_MEG_CH,
                    range: 1.0,
                    cal: 1.0,
                    coil_type: 3024,
                    loc: [0.0; 12],
                    unit: FIFF_UNIT_T,
                    unit_mul: 0,
                    name: n.to_string(),
                })
                .collect(),
            bads: vec!["MEG 0121".into()],
            experimenter: None,
            description: None,
            hpi_freqs: vec![],
            dev_head_t: None,
        };
        let data = Array2::from_shape_fn((2, 100), |(c, t)| ((t + c) as f64 * 0.2).sin());
        let rec = Recording::from_data(info, 0, data).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let mut plotter = SvgPlotter::new(dir.path());
        let path = plotter.show(&rec, "run01 raw").unwrap().unwrap();
        assert_eq!(path.file_name().unwrap(), "run01_raw.svg");
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("polyline"));
    }
}

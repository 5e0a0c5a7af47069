//! Overlap-add zero-phase FIR application (MNE's `_overlap_add_filter`).
//!
//! Zero phase comes from shifting the output left by `(N-1)/2`, not from a
//! forward-backward pass.  Edges are padded with `N-1` reflect-limited
//! samples per side to keep the transient out of the signal.
use anyhow::{bail, Result};
use ndarray::{Array2, ArrayView1};
use rustfft::{num_complex::Complex, FftPlanner};

/// How the band-pass kernels are applied (`phase=` in `raw.filter`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterPhase {
    /// One zero-phase pass.
    Zero,
    /// Two zero-phase passes: squared magnitude response, still zero phase.
    ZeroDouble,
}

impl FilterPhase {
    pub fn passes(self) -> usize {
        match self {
            FilterPhase::Zero => 1,
            FilterPhase::ZeroDouble => 2,
        }
    }
}

/// Filter the rows listed in `picks` of `data` (`[C, T]`) in place.
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, picks: &[usize], h: &[f64]) -> Result<()> {
    if h.len() % 2 == 0 {
        bail!("zero-phase FIR needs an odd number of taps, got {}", h.len());
    }
    let n_ch = data.nrows();
    if let Some(&bad) = picks.iter().find(|&&p| p >= n_ch) {
        bail!("pick {bad} out of range for {n_ch} channels");
    }
    let n_t = data.ncols();
    if n_t == 0 || picks.is_empty() {
        return Ok(());
    }

    let n_edge = h.len() - 1;
    let n_fft = choose_fft_len(h.len(), n_t + 2 * n_edge);
    let mut planner = FftPlanner::<f64>::new();
    let kernel = Kernel {
        h_fft: spectrum(&mut planner, h, n_fft),
        n_h: h.len(),
        n_fft,
    };

    for &ch in picks {
        let y = kernel.filter(&mut planner, data.row(ch))?;
        data.row_mut(ch).assign(&ArrayView1::from(&y));
    }
    Ok(())
}

/// Filter one signal; output has the input's length.
pub fn filter_1d(x: &[f64], h: &[f64]) -> Result<Vec<f64>> {
    let mut data = Array2::from_shape_vec((1, x.len()), x.to_vec())?;
    apply_fir_zero_phase(&mut data, &[0], h)?;
    Ok(data.row(0).to_vec())
}

struct Kernel {
    h_fft: Vec<Complex<f64>>,
    n_h:   usize,
    n_fft: usize,
}

impl Kernel {
    fn filter(&self, planner: &mut FftPlanner<f64>, x: ArrayView1<f64>) -> Result<Vec<f64>> {
        let x: Vec<f64> = x.to_vec();
        let n_edge = self.n_h - 1;
        let shift = n_edge / 2;
        let ext = reflect_limited_pad(&x, n_edge);
        let n_ext = ext.len();
        let n_seg = self.n_fft - self.n_h + 1;

        let fwd = planner.plan_fft_forward(self.n_fft);
        let inv = planner.plan_fft_inverse(self.n_fft);
        let scale = 1.0 / self.n_fft as f64;
        let mut acc = vec![0.0; n_ext];
        let mut buf = vec![Complex::default(); self.n_fft];

        for start in (0..n_ext).step_by(n_seg) {
            let stop = (start + n_seg).min(n_ext);
            buf.iter_mut().for_each(|b| *b = Complex::default());
            for (b, &v) in buf.iter_mut().zip(&ext[start..stop]) {
                b.re = v;
            }
            fwd.process(&mut buf);
            for (b, hf) in buf.iter_mut().zip(&self.h_fft) {
                *b *= hf;
            }
            inv.process(&mut buf);

            // Sample `p` of this block's product lands at `start + p - shift`.
            let skip = shift.saturating_sub(start);
            let out0 = start + skip - shift;
            for (o, b) in acc[out0..].iter_mut().zip(&buf[skip..]) {
                *o += b.re * scale;
            }
        }

        if acc.len() < n_edge + x.len() {
            bail!("overlap-add produced {} samples, expected at least {}", acc.len(), n_edge + x.len());
        }
        Ok(acc[n_edge..n_edge + x.len()].to_vec())
    }
}

/// Odd reflection about the end samples (MNE's `_smart_pad`), zero-filled
/// where the signal is shorter than the requested padding.
fn reflect_limited_pad(x: &[f64], n_pad: usize) -> Vec<f64> {
    let n = x.len();
    let reach = n_pad.min(n.saturating_sub(1));
    let mut out = Vec::with_capacity(n + 2 * n_pad);

    out.extend(std::iter::repeat(0.0).take(n_pad - reach));
    out.extend((1..=reach).rev().map(|i| 2.0 * x[0] - x[i]));
    out.extend_from_slice(x);
    let last = x[n - 1];
    out.extend((1..=reach).map(|i| 2.0 * last - x[n - 1 - i]));
    out.extend(std::iter::repeat(0.0).take(n_pad - reach));
    out
}

/// Power-of-two FFT length minimising MNE's overlap-add cost estimate.
fn choose_fft_len(n_h: usize, n_x: usize) -> usize {
    let min_fft = 2 * n_h - 1;
    let lo = (min_fft as f64).log2().ceil() as u32;
    let hi = ((n_x as f64).log2().ceil() as u32 + 1).max(lo);

    (lo..=hi)
        .map(|pow| {
            let n = 1_usize << pow;
            let n_seg = (n - n_h + 1) as f64;
            let cost = (n_x as f64 / n_seg).ceil() * n as f64 * (f64::from(pow) + 1.0)
                + 4e-5 * n as f64 * n_x as f64;
            (n, cost)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map_or(1 << hi, |(n, _)| n)
}

fn spectrum(planner: &mut FftPlanner<f64>, h: &[f64], n_fft: usize) -> Vec<Complex<f64>> {
    let mut buf: Vec<Complex<f64>> = h
        .iter()
        .map(|&re| Complex { re, im: 0.0 })
        .chain(std::iter::repeat(Complex::default()))
        .take(n_fft)
        .collect();
    planner.plan_fft_forward(n_fft).process(&mut buf);
    buf
}

//! Continuous HPI: coil amplitudes, coil locations, head positions.
//!
//! Amplitudes are fitted per sliding window by linear least squares against
//! a sine/cosine pair for every coil frequency plus a constant and a slope
//! (so drifts don't leak into the fit).  The fit matrix depends only on the
//! window length, so its pseudo-inverse is computed once.
use anyhow::{bail, Result};
use ndarray::{s, Array2, Array3, Axis};
use std::f64::consts::PI;
use tracing::{debug, warn};

use super::{ChpiAmplitudes, ChpiLocations, HeadPositions};
use crate::config::PipelineConfig;
use crate::recording::Recording;

/// Sensors this close to the strongest one count towards a coil's goodness.
const NEIGHBOUR_RADIUS: f64 = 0.04; // m

/// Samples read per disk access while sliding windows.
const READ_CHUNK_SECS: f64 = 10.0;

pub fn compute_amplitudes(rec: &Recording, cfg: &PipelineConfig) -> Result<ChpiAmplitudes> {
    let sfreq = rec.sfreq();
    let freqs = rec.info.hpi_freqs.clone();
    let picks = rec.info.good_meg_picks();
    if freqs.is_empty() {
        warn!("no cHPI coil frequencies in the measurement info, head motion will not be estimated");
        return Ok(ChpiAmplitudes::empty(freqs, picks));
    }
    if let Some(f) = freqs.iter().find(|&&f| f >= sfreq / 2.0) {
        bail!("cHPI frequency {f} Hz is above Nyquist ({} Hz)", sfreq / 2.0);
    }
    if picks.is_empty() {
        bail!("no good MEG channels to fit cHPI amplitudes on");
    }

    let n_coef = 2 * freqs.len() + 2;
    let win_len = ((cfg.t_window * sfreq).round() as usize).max(n_coef);
    let step = ((cfg.t_step_min * sfreq).round() as usize).max(1);
    let n_times = rec.n_times();
    if win_len > n_times {
        bail!("recording ({n_times} samples) is shorter than one cHPI window ({win_len} samples)");
    }

    let proj = pseudo_inverse(&design_matrix(&freqs, win_len, sfreq))?;
    let starts: Vec<usize> = (0..=n_times - win_len).step_by(step).collect();
    let mut amps = Array3::<f64>::zeros((starts.len(), freqs.len(), picks.len()));
    let mut times = Vec::with_capacity(starts.len());

    let chunk = ((READ_CHUNK_SECS * sfreq) as usize).max(win_len);
    let mut block = Array2::<f64>::zeros((picks.len(), 0));
    let mut block_start = 0_usize;

    for (w, &start) in starts.iter().enumerate() {
        if start + win_len > block_start + block.ncols() {
            block_start = start;
            let stop = (start + chunk + win_len).min(n_times);
            block = rec.read_slice(start, stop)?.select(Axis(0), &picks);
        }
        let off = start - block_start;
        let window = block.slice(s![.., off..off + win_len]);
        let coefs = proj.dot(&window.t()); // [n_coef, n_picks]
        for k in 0..freqs.len() {
            for j in 0..picks.len() {
                amps[[w, k, j]] = coefs[[2 * k, j]].hypot(coefs[[2 * k + 1, j]]);
            }
        }
        times.push((rec.first_samp() as f64 + start as f64 + win_len as f64 / 2.0) / sfreq);
    }
    debug!(n_windows = times.len(), n_coils = freqs.len(), "cHPI amplitudes fitted");
    Ok(ChpiAmplitudes { times, freqs, picks, amps })
}

/// Columns: `sin, cos` per frequency, then constant and centred slope.
fn design_matrix(freqs: &[f64], n: usize, sfreq: f64) -> Array2<f64> {
    let n_coef = 2 * freqs.len() + 2;
    let centre = (n as f64 - 1.0) / 2.0;
    Array2::from_shape_fn((n, n_coef), |(i, c)| {
        let t = i as f64 / sfreq;
        match c {
            c if c < 2 * freqs.len() => {
                let phase = 2.0 * PI * freqs[c / 2] * t;
                if c % 2 == 0 { phase.sin() } else { phase.cos() }
            }
            c if c == n_coef - 2 => 1.0,
            _ => (i as f64 - centre) / n as f64,
        }
    })
}

/// `(XᵀX)⁻¹ Xᵀ` for a tall, full-rank `x`.
fn pseudo_inverse(x: &Array2<f64>) -> Result<Array2<f64>> {
    solve(x.t().dot(x), x.t().to_owned())
}

/// Solve `a · X = b` by Gauss-Jordan elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array2<f64>) -> Result<Array2<f64>> {
    let n = a.nrows();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        let p = a[[pivot, col]];
        if p.abs() < 1e-12 {
            bail!("singular fit matrix (coil frequencies too close for the window length?)");
        }
        if pivot != col {
            for c in 0..n {
                a.swap([pivot, c], [col, c]);
            }
            for c in 0..b.ncols() {
                b.swap([pivot, c], [col, c]);
            }
        }
        a.row_mut(col).mapv_inplace(|v| v / p);
        b.row_mut(col).mapv_inplace(|v| v / p);
        for r in 0..n {
            if r == col {
                continue;
            }
            let f = a[[r, col]];
            if f == 0.0 {
                continue;
            }
            let a_pivot = a.row(col).to_owned();
            let b_pivot = b.row(col).to_owned();
            a.row_mut(r).scaled_add(-f, &a_pivot);
            b.row_mut(r).scaled_add(-f, &b_pivot);
        }
    }
    Ok(b)
}

/// Amplitude-weighted centroid of sensor positions, per window and coil.
pub fn compute_locations(rec: &Recording, amps: ChpiAmplitudes) -> Result<ChpiLocations> {
    let (n_win, n_coil, n_pick) = amps.amps.dim();
    let positions: Vec<[f64; 3]> = amps.picks.iter().map(|&p| rec.info.chs[p].position()).collect();
    if positions.len() != n_pick {
        bail!("amplitude picks ({}) do not match the amplitude array ({n_pick})", positions.len());
    }

    let mut rrs = Array3::<f64>::zeros((n_win, n_coil, 3));
    let mut gofs = Array2::<f64>::zeros((n_win, n_coil));

    for w in 0..n_win {
        for k in 0..n_coil {
            let weights: Vec<f64> = (0..n_pick).map(|j| amps.amps[[w, k, j]].powi(2)).collect();
            let total: f64 = weights.iter().sum();
            let (rr, gof) = if total > 0.0 {
                let mut rr = [0.0; 3];
                for (wj, pos) in weights.iter().zip(&positions) {
                    for d in 0..3 {
                        rr[d] += wj * pos[d] / total;
                    }
                }
                let strongest = (0..n_pick)
                    .max_by(|&i, &j| weights[i].total_cmp(&weights[j]))
                    .map_or([0.0; 3], |j| positions[j]);
                let near: f64 = weights
                    .iter()
                    .zip(&positions)
                    .filter(|(_, pos)| distance(pos, &strongest) <= NEIGHBOUR_RADIUS)
                    .map(|(wj, _)| wj)
                    .sum();
                (rr, near / total)
            } else {
                (mean_position(&positions), 0.0)
            };
            for d in 0..3 {
                rrs[[w, k, d]] = rr[d];
            }
            gofs[[w, k]] = gof;
        }
    }
    Ok(ChpiLocations { times: amps.times, rrs, gofs })
}

/// Head positions relative to the first window, expressed as the
/// device→head transform of the recording moved by the constellation shift.
pub fn compute_head_pos(rec: &Recording, locs: ChpiLocations) -> Result<HeadPositions> {
    let (n_win, n_coil, _) = locs.rrs.dim();
    if n_win == 0 || n_coil == 0 {
        return Ok(HeadPositions::empty());
    }
    if locs.times.len() != n_win {
        bail!("{} location times for {n_win} windows", locs.times.len());
    }

    let (rot, trans0) = match &rec.info.dev_head_t {
        Some(t) => (t.rot, t.trans),
        None => ([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]], [0.0; 3]),
    };
    let quat = rot_to_quat(&rot);

    let mut pos = Array2::<f64>::zeros((n_win, HeadPositions::N_COLS));
    let mut prev: Option<(f64, [f64; 3])> = None;

    for w in 0..n_win {
        let mut shift = [0.0; 3];
        for k in 0..n_coil {
            for d in 0..3 {
                shift[d] += (locs.rrs[[w, k, d]] - locs.rrs[[0, k, d]]) / n_coil as f64;
            }
        }
        let mut trans = trans0;
        for (r, t) in trans.iter_mut().enumerate() {
            *t -= (0..3).map(|c| rot[r][c] * shift[c]).sum::<f64>();
        }

        let err = ((0..n_coil)
            .map(|k| {
                let moved: Vec<f64> = (0..3).map(|d| locs.rrs[[0, k, d]] + shift[d]).collect();
                (0..3).map(|d| (locs.rrs[[w, k, d]] - moved[d]).powi(2)).sum::<f64>()
            })
            .sum::<f64>()
            / n_coil as f64)
            .sqrt();
        let gof = locs.gofs.row(w).mean().unwrap_or(0.0);

        let t = locs.times[w];
        let v = match prev {
            Some((t_prev, tr_prev)) if t > t_prev => distance(&trans, &tr_prev) / (t - t_prev),
            _ => 0.0,
        };
        prev = Some((t, trans));

        let row = [t, quat[0], quat[1], quat[2], trans[0], trans[1], trans[2], gof, err, v];
        pos.row_mut(w).iter_mut().zip(row).for_each(|(dst, v)| *dst = v);
    }
    Ok(HeadPositions { pos })
}

/// Vector part of the unit quaternion of `rot`, with a non-negative scalar
/// part (MNE's `rot_to_quat`).
pub fn rot_to_quat(rot: &[[f64; 3]; 3]) -> [f64; 3] {
    let trace = rot[0][0] + rot[1][1] + rot[2][2];
    let (w, x, y, z) = if trace > 0.0 {
        let s = 2.0 * (trace + 1.0).sqrt();
        (0.25 * s, (rot[2][1] - rot[1][2]) / s, (rot[0][2] - rot[2][0]) / s, (rot[1][0] - rot[0][1]) / s)
    } else if rot[0][0] > rot[1][1] && rot[0][0] > rot[2][2] {
        let s = 2.0 * (1.0 + rot[0][0] - rot[1][1] - rot[2][2]).sqrt();
        ((rot[2][1] - rot[1][2]) / s, 0.25 * s, (rot[0][1] + rot[1][0]) / s, (rot[0][2] + rot[2][0]) / s)
    } else if rot[1][1] > rot[2][2] {
        let s = 2.0 * (1.0 + rot[1][1] - rot[0][0] - rot[2][2]).sqrt();
        ((rot[0][2] - rot[2][0]) / s, (rot[0][1] + rot[1][0]) / s, 0.25 * s, (rot[1][2] + rot[2][1]) / s)
    } else {
        let s = 2.0 * (1.0 + rot[2][2] - rot[0][0] - rot[1][1]).sqrt();
        ((rot[1][0] - rot[0][1]) / s, (rot[0][2] + rot[2][0]) / s, (rot[1][2] + rot[2][1]) / s, 0.25 * s)
    };
    let sign = if w < 0.0 { -1.0 } else { 1.0 };
    [sign * x, sign * y, sign * z]
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    (0..3).map(|d| (a[d] - b[d]).powi(2)).sum::<f64>().sqrt()
}

fn mean_position(positions: &[[f64; 3]]) -> [f64; 3] {
    let mut m = [0.0; 3];
    for p in positions {
        for d in 0..3 {
            m[d] += p[d] / positions.len().max(1) as f64;
        }
    }
    m
}

use std::hint::black_box;
use std::path::PathBuf;

use criterion::{criterion_group, criterion_main, Criterion};
use meg_explorer::fiff::constants::*;
use meg_explorer::fiff::{open_raw, write_raw, ChannelInfo, MeasInfo};
use meg_explorer::filter::{band_pass_inplace, FilterPhase};
use ndarray::Array2;
use tempfile::TempDir;

const N_CHAN: usize = 32;
const SFREQ: f64 = 1000.0;
const SECS: usize = 20;

fn info() -> MeasInfo {
    let chs = (0..N_CHAN)
        .map(|i| ChannelInfo {
            scan_no: i as i32 + 1,
            log_no: i as i32 + 1,
            kind: FIFFV_MEG_CH,
            range: 1.0,
            cal: 1.0,
            coil_type: 3024,
            loc: [0.0; 12],
            unit: FIFF_UNIT_T,
            unit_mul: 0,
            name: format!("MEG {:04}", i + 1),
        })
        .collect();
    MeasInfo {
        n_chan: N_CHAN,
        sfreq: SFREQ,
        lowpass: Some(330.0),
        highpass: Some(0.1),
        line_freq: Some(50.0),
        chs,
        bads: vec![],
        experimenter: None,
        description: None,
        hpi_freqs: vec![],
        dev_head_t: None,
    }
}

fn data() -> Array2<f64> {
    Array2::from_shape_fn((N_CHAN, SECS * SFREQ as usize), |(c, i)| {
        1e-12 * ((i as f64 / SFREQ) * (7.0 + c as f64)).sin()
    })
}

/// Writes the synthetic recording once; the directory lives as long as the guard.
fn fixture() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bench_raw.fif");
    write_raw(&path, &info(), 0, &data()).unwrap();
    (dir, path)
}

fn bench_write_raw(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("out_raw.fif");
    let (info, data) = (info(), data());
    c.bench_function("write_raw [32×20000]", |b| {
        b.iter(|| write_raw(black_box(&path), &info, 0, &data).unwrap())
    });
}

fn bench_open_raw(c: &mut Criterion) {
    let (_dir, path) = fixture();
    c.bench_function("open_raw (header + tree)", |b| {
        b.iter(|| {
            let raw = open_raw(black_box(&path)).unwrap();
            black_box(raw.info.n_chan)
        })
    });
}

fn bench_read_slice_10s(c: &mut Criterion) {
    let (_dir, path) = fixture();
    let raw = open_raw(&path).unwrap();
    c.bench_function("read_slice 10 000 samples (10 s)", |b| {
        b.iter(|| {
            let data = raw.read_slice(black_box(0), black_box(10_000)).unwrap();
            black_box(data[[0, 0]])
        })
    });
}

fn bench_band_pass(c: &mut Criterion) {
    let picks: Vec<usize> = (0..N_CHAN).collect();
    let original = data();
    c.bench_function("band_pass 1–40 Hz zero-double [32×20000]", |b| {
        b.iter(|| {
            let mut data = original.clone();
            band_pass_inplace(&mut data, &picks, 1.0, 40.0, SFREQ, FilterPhase::ZeroDouble).unwrap();
            black_box(data[[0, 0]])
        })
    });
}

criterion_group!(benches, bench_write_raw, bench_open_raw, bench_read_slice_10s, bench_band_pass);
criterion_main!(benches);

//! Parameter computation for one epoch stack.
//!
//! Every parameter is a per-epoch, per-channel value (`[E, C]`), or the
//! average over epochs (`[C]`) when `segmentation.average` is set.
//!
//! | key                      | definition (per epoch, channel)                        |
//! |--------------------------|--------------------------------------------------------|
//! | `mean`                   | `Σx / T`                                               |
//! | `variance`               | `Σ(x-μ)² / T`                                          |
//! | `median`                 | middle value (mean of the two middles for even `T`)    |
//! | `kurtosis`               | `m₄ / m₂² − 3` (Fisher, biased)                        |
//! | `skewness`               | `m₃ / m₂^1.5` (biased)                                 |
//! | `absolute_power_{band}`  | `Σ PSD(f) · Δf`, `f ∈ [min, max]`                      |
//! | `relative_power_{band}`  | absolute power of the band / absolute power of broadband |
//!
//! Spectral parameters are only computed on the broadband pass; a band-limited
//! signal has no meaningful power outside its own band.
use std::collections::BTreeMap;
use std::f64::consts::PI;

use anyhow::Result;
use ndarray::{Array1, Array2, ArrayD, ArrayView1, Axis};
use rustfft::{num_complex::Complex, FftPlanner};

use crate::config::{Band, Settings};
use crate::epoch::EpochStack;

/// Named parameter arrays.
pub type ParameterSet = BTreeMap<String, ArrayD<f64>>;

/// Computes parameters for one non-empty epoch stack.
pub trait ParameterComputer {
    fn compute(&self, epochs: &EpochStack, settings: &Settings, fs: f64, band: &Band) -> Result<ParameterSet>;
}

/// Descriptive statistics and periodogram band power.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardParameters;

impl ParameterComputer for StandardParameters {
    fn compute(&self, epochs: &EpochStack, settings: &Settings, fs: f64, band: &Band) -> Result<ParameterSet> {
        let params = &settings.parameters;
        let average = settings.segmentation.average;
        let mut out = ParameterSet::new();

        let stats: [(&str, bool, fn(ArrayView1<'_, f64>) -> f64); 5] = [
            ("mean", params.statistics.mean, mean),
            ("variance", params.statistics.variance, variance),
            ("median", params.statistics.median, median),
            ("kurtosis", params.statistics.kurtosis, kurtosis),
            ("skewness", params.statistics.skewness, skewness),
        ];
        for (name, enabled, f) in stats {
            if enabled {
                let per_epoch = epochs.data.map_axis(Axis(1), f);
                out.insert(name.to_string(), finish(per_epoch, average));
            }
        }

        let wants_power = !params.absolute_power.is_empty() || !params.relative_power.is_empty();
        if wants_power && band.is_broadband() {
            let (freqs, psd) = stack_psd(epochs, fs);
            for b in &params.absolute_power {
                let p = band_power(&freqs, &psd, b.min, b.max);
                out.insert(format!("absolute_power_{}", b.name), finish(p, average));
            }
            if !params.relative_power.is_empty() {
                let total = band_power(&freqs, &psd, params.broadband_min, params.broadband_max);
                for b in &params.relative_power {
                    let p = band_power(&freqs, &psd, b.min, b.max) / &total;
                    out.insert(format!("relative_power_{}", b.name), finish(p, average));
                }
            }
        } else if wants_power {
            log::debug!("band '{}': spectral parameters only run on broadband", band.name);
        }

        Ok(out)
    }
}

/// `[E, C]` as-is, or its NaN-skipping mean over epochs.
fn finish(per_epoch: Array2<f64>, average: bool) -> ArrayD<f64> {
    if !average {
        return per_epoch.into_dyn();
    }
    per_epoch
        .axis_iter(Axis(1))
        .map(|col| {
            let (s, n) = col
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
            if n > 0 { s / n as f64 } else { f64::NAN }
        })
        .collect::<Array1<f64>>()
        .into_dyn()
}

// ── Statistics ───────────────────────────────────────────────────────────────

fn mean(x: ArrayView1<'_, f64>) -> f64 {
    x.mean().unwrap_or(f64::NAN)
}

/// Central moment of order `k`.
fn moment(x: ArrayView1<'_, f64>, k: i32) -> f64 {
    let m = mean(x);
    x.iter().map(|&v| (v - m).powi(k)).sum::<f64>() / x.len() as f64
}

fn variance(x: ArrayView1<'_, f64>) -> f64 {
    moment(x, 2)
}

fn median(x: ArrayView1<'_, f64>) -> f64 {
    let mut v = x.to_vec();
    if v.is_empty() {
        return f64::NAN;
    }
    v.sort_by(|a, b| a.total_cmp(b));
    let mid = v.len() / 2;
    if v.len() % 2 == 0 { (v[mid - 1] + v[mid]) / 2.0 } else { v[mid] }
}

fn kurtosis(x: ArrayView1<'_, f64>) -> f64 {
    moment(x, 4) / moment(x, 2).powi(2) - 3.0
}

fn skewness(x: ArrayView1<'_, f64>) -> f64 {
    moment(x, 3) / moment(x, 2).powf(1.5)
}

// ── Spectrum ─────────────────────────────────────────────────────────────────

/// One-sided Hann-windowed periodogram (density scaling, units²/Hz).
///
/// Returns `(freqs, psd)` with `T / 2 + 1` bins.
pub fn periodogram(x: &[f64], fs: f64) -> (Vec<f64>, Vec<f64>) {
    let n = x.len();
    if n == 0 {
        return (vec![], vec![]);
    }
    let win: Vec<f64> = if n == 1 {
        vec![1.0]
    } else {
        (0..n).map(|i| 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos()).collect()
    };
    let s2: f64 = win.iter().map(|w| w * w).sum();

    let mut buf: Vec<Complex<f64>> = x.iter().zip(&win).map(|(&v, &w)| Complex::new(v * w, 0.0)).collect();
    FftPlanner::<f64>::new().plan_fft_forward(n).process(&mut buf);

    let n_bins = n / 2 + 1;
    let scale = 1.0 / (fs * s2);
    let psd = (0..n_bins)
        .map(|k| {
            let p = buf[k].norm_sqr() * scale;
            let nyquist = n % 2 == 0 && k == n / 2;
            if k == 0 || nyquist { p } else { 2.0 * p }
        })
        .collect();
    let freqs = (0..n_bins).map(|k| k as f64 * fs / n as f64).collect();
    (freqs, psd)
}

/// Periodogram of every epoch/channel: `(freqs, psd[E, C, F])`.
fn stack_psd(epochs: &EpochStack, fs: f64) -> (Vec<f64>, ndarray::Array3<f64>) {
    let (n_e, n_t, n_c) = epochs.data.dim();
    let n_f = n_t / 2 + 1;
    let mut psd = ndarray::Array3::<f64>::zeros((n_e, n_c, n_f));
    let mut freqs = Vec::new();
    for e in 0..n_e {
        for c in 0..n_c {
            let trace: Vec<f64> = epochs.data.slice(ndarray::s![e, .., c]).to_vec();
            let (f, p) = periodogram(&trace, fs);
            psd.slice_mut(ndarray::s![e, c, ..]).assign(&ArrayView1::from(&p));
            freqs = f;
        }
    }
    (freqs, psd)
}

/// `Σ psd · Δf` over `min <= f <= max`, shape `[E, C]`.
fn band_power(freqs: &[f64], psd: &ndarray::Array3<f64>, min: f64, max: f64) -> Array2<f64> {
    let df = if freqs.len() > 1 { freqs[1] - freqs[0] } else { 0.0 };
    let bins: Vec<usize> = freqs
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f >= min && f <= max)
        .map(|(i, _)| i)
        .collect();
    psd.map_axis(Axis(2), |spec| bins.iter().map(|&k| spec[k]).sum::<f64>() * df)
}

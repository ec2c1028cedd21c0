//! FFT resampling of epochs to a target rate.
//!
//! Each channel trace is resampled independently:
//!   1. Pad with reflect-limited samples (next power of two, see [`auto_npad`]).
//!   2. rfft(padded)  →  complex half-spectrum.
//!   3. If downsampling: double the Nyquist bin.
//!      If upsampling:   halve  the Nyquist bin.
//!   4. Scale all bins by `new_len_padded / old_len_padded`.
//!   5. irfft(spectrum, n = new_len_padded), truncating or zero-padding the
//!      spectrum as needed.
//!   6. Strip the resampled padding edges.
//!
//! [`resample_epochs`] applies this along the time axis of an epoch stack,
//! with the output length fixed by the epoch window and the target rate:
//! `round(target_fs * (end_ms - start_ms) / 1000)`.
use ndarray::{Array3, ArrayView1, Axis};
use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::epoch::EpochStack;
use crate::error::{Result, SegmentationError};

/// Padding on each side: up to the next power of two.
///
/// ```text
/// min_add = min(n // 8, 100) * 2
/// total   = 2^ceil(log2(n + min_add)) - n
/// npads   = [total // 2, total - total // 2]
/// ```
pub fn auto_npad(n: usize) -> (usize, usize) {
    let min_add = (n / 8).min(100) * 2;
    let sum = (n + min_add).max(1);
    let next_pow2 = 1usize << ((sum as f64).log2().ceil() as u32);
    let total = next_pow2 - n;
    (total / 2, total - total / 2)
}

/// Resample one trace to exactly `new_len` samples.
pub fn resample_1d(x: &[f64], new_len: usize, npad_l: usize, npad_r: usize) -> Vec<f64> {
    let n_in = x.len();
    if n_in == 0 || new_len == 0 {
        return vec![0.0; new_len];
    }
    if new_len == n_in {
        return x.to_vec();
    }
    let ratio = new_len as f64 / n_in as f64;

    // Reflect-limited padding.
    let pad_l = npad_l.min(n_in - 1);
    let pad_r = npad_r.min(n_in - 1);
    let old_len = n_in + pad_l + pad_r;

    let mut buf: Vec<Complex<f64>> = Vec::with_capacity(old_len);
    for i in (1..=pad_l).rev() {
        buf.push(Complex::new(2.0 * x[0] - x[i], 0.0));
    }
    buf.extend(x.iter().map(|&v| Complex::new(v, 0.0)));
    let last = x[n_in - 1];
    for i in 1..=pad_r {
        let idx = (n_in - 1).saturating_sub(i);
        buf.push(Complex::new(2.0 * last - x[idx], 0.0));
    }

    let new_len_padded = ((ratio * old_len as f64).round() as usize).max(1);
    let shorter = new_len_padded < old_len;
    let use_len = if shorter { new_len_padded } else { old_len };

    let mut planner: FftPlanner<f64> = FftPlanner::new();
    planner.plan_fft_forward(old_len).process(&mut buf);

    let rfft_len = old_len / 2 + 1;
    let mut x_fft: Vec<Complex<f64>> = buf[..rfft_len].to_vec();

    if use_len % 2 == 0 {
        let nyq = use_len / 2;
        if nyq < x_fft.len() {
            x_fft[nyq] *= if shorter { 2.0 } else { 0.5 };
        }
    }

    let scale = new_len_padded as f64 / old_len as f64;
    for v in &mut x_fft {
        *v *= scale;
    }

    // Inverse: rebuild the full Hermitian spectrum of length new_len_padded.
    let new_rfft_len = new_len_padded / 2 + 1;
    let mut spec = vec![Complex::<f64>::default(); new_len_padded];
    let n_copy = x_fft.len().min(new_rfft_len);
    spec[..n_copy].copy_from_slice(&x_fft[..n_copy]);
    for i in 1..new_rfft_len {
        let idx = new_len_padded - i;
        if idx >= new_rfft_len {
            spec[idx] = spec[i].conj();
        }
    }
    planner.plan_fft_inverse(new_len_padded).process(&mut spec);
    let inv = 1.0 / new_len_padded as f64;

    let remove_l = ((ratio * pad_l as f64).round() as usize).min(new_len_padded);
    let mut out: Vec<f64> = spec[remove_l..]
        .iter()
        .take(new_len)
        .map(|c| c.re * inv)
        .collect();
    out.resize(new_len, 0.0);
    out
}

/// Samples per epoch after resampling a `window_ms` epoch to `target_fs`.
pub fn resampled_len(window_ms: (f64, f64), target_fs: f64) -> usize {
    (target_fs * (window_ms.1 - window_ms.0) / 1000.0).round() as usize
}

/// Resample every epoch of `stack` along time to `target_fs`.
///
/// `window_ms` is the epoch's time span (`[0, trial_length]` for condition
/// epochs, `[start, end]` for event epochs); it fixes the output length.
/// Epoch and channel axes and labels are unchanged.
pub fn resample_epochs(stack: EpochStack, window_ms: (f64, f64), target_fs: f64) -> Result<EpochStack> {
    if !(target_fs > 0.0) || !(window_ms.1 > window_ms.0) {
        return Err(SegmentationError::InvalidConfig(format!(
            "cannot resample a {}..{} ms window to {target_fs} Hz",
            window_ms.0, window_ms.1
        )));
    }
    let new_len = resampled_len(window_ms, target_fs);
    if new_len == 0 {
        return Err(SegmentationError::InvalidConfig(format!(
            "resampling to {target_fs} Hz leaves no sample in a {} ms window",
            window_ms.1 - window_ms.0
        )));
    }
    if new_len == stack.n_samples() {
        return Ok(stack);
    }

    let (n_e, n_t, n_c) = stack.data.dim();
    let (npad_l, npad_r) = auto_npad(n_t);
    let mut data = Array3::<f64>::zeros((n_e, new_len, n_c));
    for (src, mut dst) in stack.data.outer_iter().zip(data.outer_iter_mut()) {
        for (col, mut out) in src.axis_iter(Axis(1)).zip(dst.axis_iter_mut(Axis(1))) {
            let trace = col.to_vec();
            let resampled = resample_1d(&trace, new_len, npad_l, npad_r);
            out.assign(&ArrayView1::from(&resampled));
        }
    }
    EpochStack::new(data, stack.labels)
}

//! Zero-phase FIR filtering by FFT overlap-add.
//!
//! The linear convolution of the padded trace with `h` is built block by
//! block and read back `(N-1)/2` samples late, which cancels the group delay
//! of a symmetric kernel.  Each end is extended by `N-1` samples of odd
//! reflection so the start-up transient falls outside the returned samples.
use std::sync::Arc;

use ndarray::{Array2, Axis};
use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Filter every channel of `data` ([T, C]) in place with the odd-length `h`.
///
/// The FFT plans and the kernel spectrum are shared by all channels.
pub fn apply_fir_zero_phase(data: &mut Array2<f64>, h: &[f64]) {
    let n_t = data.nrows();
    if n_t == 0 || h.is_empty() {
        return;
    }
    let conv = OverlapAdd::new(h, n_t);
    for mut col in data.axis_iter_mut(Axis(1)) {
        let trace: Vec<f64> = col.iter().copied().collect();
        for (dst, v) in col.iter_mut().zip(conv.zero_phase(&trace)) {
            *dst = v;
        }
    }
}

/// A kernel prepared for block convolution at one FFT size.
struct OverlapAdd {
    taps: usize,
    /// Input samples consumed per block.
    block: usize,
    /// Kernel spectrum, pre-scaled by `1 / n_fft`.
    spectrum: Vec<Complex<f64>>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl OverlapAdd {
    /// Prepare `h` for traces of `n_samples` samples.
    fn new(h: &[f64], n_samples: usize) -> Self {
        let taps = h.len();
        let n_fft = fft_len(taps, n_samples + 2 * (taps - 1));

        let mut planner = FftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n_fft);
        let inverse = planner.plan_fft_inverse(n_fft);

        let mut spectrum = vec![Complex::default(); n_fft];
        for (s, &v) in spectrum.iter_mut().zip(h) {
            s.re = v;
        }
        forward.process(&mut spectrum);
        let scale = 1.0 / n_fft as f64;
        spectrum.iter_mut().for_each(|s| *s *= scale);

        Self { taps, block: n_fft - taps + 1, spectrum, forward, inverse }
    }

    /// Full linear convolution with the kernel: `x.len() + taps - 1` samples.
    fn convolve(&self, x: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; x.len() + self.taps - 1];
        let mut buf = vec![Complex::default(); self.spectrum.len()];

        for (k, chunk) in x.chunks(self.block).enumerate() {
            buf.fill(Complex::default());
            for (b, &v) in buf.iter_mut().zip(chunk) {
                b.re = v;
            }
            self.forward.process(&mut buf);
            for (b, &s) in buf.iter_mut().zip(&self.spectrum) {
                *b *= s;
            }
            self.inverse.process(&mut buf);

            // chunk + taps - 1 <= n_fft, so the circular product has no wrap.
            let start = k * self.block;
            let tail = &mut out[start..start + chunk.len() + self.taps - 1];
            for (o, b) in tail.iter_mut().zip(&buf) {
                *o += b.re;
            }
        }
        out
    }

    /// Filtered copy of `x`, same length, aligned with the input.
    fn zero_phase(&self, x: &[f64]) -> Vec<f64> {
        if x.is_empty() {
            return Vec::new();
        }
        let edge = self.taps - 1;
        let delay = edge / 2;
        let full = self.convolve(&odd_reflect_pad(x, edge));
        full[edge + delay..edge + delay + x.len()].to_vec()
    }
}

/// Extend `x` by `edge` samples on each side, mirroring through the end
/// samples: `2·x[0] - x[i]` on the left and `2·x[n-1] - x[n-1-i]` on the
/// right.  Mirror positions past the opposite end are zero.
fn odd_reflect_pad(x: &[f64], edge: usize) -> Vec<f64> {
    let n = x.len();
    let (first, last) = match (x.first(), x.last()) {
        (Some(&f), Some(&l)) => (f, l),
        _ => return vec![0.0; 2 * edge],
    };
    let left = (1..=edge).rev().map(|i| if i < n { 2.0 * first - x[i] } else { 0.0 });
    let right = (1..=edge).map(|i| if i < n { 2.0 * last - x[n - 1 - i] } else { 0.0 });
    left.chain(x.iter().copied()).chain(right).collect()
}

/// Power-of-two FFT size with the lowest estimated overlap-add cost for a
/// `taps`-long kernel over `n` samples.
///
/// Cost per candidate `L`: `ceil(n / (L - taps + 1)) · L · (log2 L + 1) + 4e-5 · L · n`.
fn fft_len(taps: usize, n: usize) -> usize {
    let smallest = (2 * taps - 1).next_power_of_two();
    let largest = (n.max(1).next_power_of_two() * 2).max(smallest);
    let cost = |len: usize| {
        let blocks = n.div_ceil(len - taps + 1) as f64;
        blocks * len as f64 * (len.trailing_zeros() as f64 + 1.0) + 4e-5 * len as f64 * n as f64
    };
    std::iter::successors(Some(smallest), |&len| (len < largest).then_some(len * 2))
        .min_by(|&a, &b| cost(a).total_cmp(&cost(b)))
        .unwrap_or(smallest)
}

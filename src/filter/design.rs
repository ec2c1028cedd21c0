//! FIR filter design (Hamming-windowed sinc, `scipy.signal.firwin` style).
//!
//! A filter of order `N` has `N + 1` taps, bumped to the next odd count so
//! the impulse response is symmetric around a whole sample:
//!   • lowpass   = windowed sinc, unit DC gain
//!   • bandpass  = lowpass(high) − lowpass(low), unit gain at the band centre
//!   • bandstop  = lowpass(low) + (δ − lowpass(high)), unit DC gain
use std::f64::consts::PI;

/// Odd tap count for a filter of the given order.
pub fn numtaps(order: usize) -> usize {
    let n = order + 1;
    if n % 2 == 0 { n + 1 } else { n }
}

/// Windowed-sinc FIR with `-6 dB` point at `cutoff_hz`.
///
/// `pass_zero = true` gives a lowpass with unit DC gain, `false` the
/// spectral inverse (highpass).  Cut-offs at or above Nyquist give a pure
/// delta lowpass.  `n` must be odd.
pub fn firwin(n: usize, cutoff_hz: f64, sfreq: f64, pass_zero: bool) -> Vec<f64> {
    let n = if n % 2 == 0 { n + 1 } else { n };
    let alpha = (n - 1) as f64 / 2.0;
    let nyq = sfreq / 2.0;
    let fc = (cutoff_hz / nyq).clamp(0.0, 1.0);

    let win = hamming(n);

    let mut h: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64 - alpha;
            // f(x) = sin(π·fc·x) / (π·x);  lim_{x→0} f(x) = fc
            let sinc = if x == 0.0 { fc } else { (PI * fc * x).sin() / (PI * x) };
            sinc * win[i]
        })
        .collect();

    let s: f64 = h.iter().sum();
    if s.abs() > f64::EPSILON {
        h.iter_mut().for_each(|v| *v /= s);
    }

    if !pass_zero {
        h.iter_mut().for_each(|v| *v = -*v);
        h[n / 2] += 1.0;
    }
    h
}

/// Bandpass `[low_hz, high_hz]` of the given order.
pub fn design_bandpass(low_hz: f64, high_hz: f64, sfreq: f64, order: usize) -> Vec<f64> {
    let n = numtaps(order);
    let lp_high = firwin(n, high_hz, sfreq, true);
    let lp_low = firwin(n, low_hz, sfreq, true);
    let mut h: Vec<f64> = lp_high.iter().zip(&lp_low).map(|(a, b)| a - b).collect();

    let centre = (low_hz + high_hz.min(sfreq / 2.0)) / 2.0;
    let g = gain_at(&h, centre, sfreq);
    if g.abs() > f64::EPSILON {
        h.iter_mut().for_each(|v| *v /= g);
    }
    h
}

/// Bandstop (notch) `[low_hz, high_hz]` of the given order.
pub fn design_bandstop(low_hz: f64, high_hz: f64, sfreq: f64, order: usize) -> Vec<f64> {
    let n = numtaps(order);
    let lp_low = firwin(n, low_hz, sfreq, true);
    let hp_high = firwin(n, high_hz, sfreq, false);
    lp_low.iter().zip(&hp_high).map(|(a, b)| a + b).collect()
}

/// Magnitude of the zero-phase response of a symmetric `h` at `f_hz`.
pub fn gain_at(h: &[f64], f_hz: f64, sfreq: f64) -> f64 {
    let alpha = (h.len() as f64 - 1.0) / 2.0;
    let w = 2.0 * PI * f_hz / sfreq;
    h.iter()
        .enumerate()
        .map(|(i, &v)| v * (w * (i as f64 - alpha)).cos())
        .sum()
}

/// Hamming window of length `n`.
pub fn hamming(n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![1.0; n];
    }
    (0..n)
        .map(|i| 0.54 - 0.46 * (2.0 * PI * i as f64 / (n - 1) as f64).cos())
        .collect()
}

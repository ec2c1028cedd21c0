//! Preprocessing collaborator: filtering and re-referencing of a whole
//! recording before it is cut into epochs.
//!
//! The batch driver only talks to the [`Preprocessor`] trait; the default
//! [`FirPreprocessor`] chains
//!
//! ```text
//! signal [T, C]
//!   ├─ bandpass (FIR, zero phase)     if configured
//!   ├─ bandstop (FIR, zero phase)     if configured
//!   └─ common average reference       if configured
//! ```
use anyhow::{bail, Result};
use ndarray::Array2;

use crate::config::{Band, FilterBand, PreprocessingConfig};
use crate::filter::{apply_fir_zero_phase, design_bandpass, design_bandstop};
use crate::reference::average_reference_inplace;

/// FIR order used to isolate one band.
pub const BAND_FILTER_ORDER: usize = 1000;

/// Signal transforms applied before segmentation.  Shapes are preserved.
pub trait Preprocessor {
    /// Run the configured preprocessing chain on `signal` ([T, C]).
    fn apply(&self, signal: &Array2<f64>, fs: f64, cfg: &PreprocessingConfig) -> Result<Array2<f64>>;

    /// Isolate `band` from `signal` with a bandpass.
    fn band_segmentation(&self, signal: &Array2<f64>, band: &Band, fs: f64) -> Result<Array2<f64>>;
}

/// Preprocessing settings for one band: the configured chain with its
/// bandpass replaced by the band's limits.
pub fn config_for_band(cfg: &PreprocessingConfig, band: &Band) -> PreprocessingConfig {
    PreprocessingConfig {
        bandpass: Some(FilterBand { min: band.min, max: band.max, order: BAND_FILTER_ORDER }),
        ..cfg.clone()
    }
}

/// Windowed-sinc FIR filtering plus common average reference.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirPreprocessor;

fn check_band(stage: &str, min: f64, max: f64, fs: f64) -> Result<()> {
    if !(fs > 0.0) {
        bail!("{stage}: sampling rate must be positive (got {fs} Hz)");
    }
    if min >= fs / 2.0 {
        bail!("{stage}: lower edge {min} Hz is at or above Nyquist ({} Hz)", fs / 2.0);
    }
    if !(min < max) {
        bail!("{stage}: limits must satisfy min < max (got {min}..{max} Hz)");
    }
    Ok(())
}

impl Preprocessor for FirPreprocessor {
    fn apply(&self, signal: &Array2<f64>, fs: f64, cfg: &PreprocessingConfig) -> Result<Array2<f64>> {
        let mut out = signal.clone();
        if let Some(bp) = &cfg.bandpass {
            check_band("bandpass", bp.min, bp.max, fs)?;
            let h = design_bandpass(bp.min, bp.max, fs, bp.order);
            apply_fir_zero_phase(&mut out, &h);
            log::debug!("bandpass {}-{} Hz, {} taps", bp.min, bp.max, h.len());
        }
        if let Some(notch) = &cfg.notch {
            check_band("notch", notch.min, notch.max, fs)?;
            let h = design_bandstop(notch.min, notch.max, fs, notch.order);
            apply_fir_zero_phase(&mut out, &h);
            log::debug!("bandstop {}-{} Hz, {} taps", notch.min, notch.max, h.len());
        }
        if cfg.car {
            average_reference_inplace(&mut out);
        }
        Ok(out)
    }

    fn band_segmentation(&self, signal: &Array2<f64>, band: &Band, fs: f64) -> Result<Array2<f64>> {
        check_band(&band.name, band.min, band.max, fs)?;
        let h = design_bandpass(band.min, band.max, fs, BAND_FILTER_ORDER);
        let mut out = signal.clone();
        apply_fir_zero_phase(&mut out, &h);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn two_tones(fs: f64, n: usize) -> Array2<f64> {
        Array2::from_shape_fn((n, 2), |(t, _)| {
            let t = t as f64 / fs;
            (2.0 * PI * 10.0 * t).sin() + (2.0 * PI * 50.0 * t).sin()
        })
    }

    #[test]
    fn disabled_chain_is_identity() {
        let x = two_tones(250.0, 500);
        let y = FirPreprocessor.apply(&x, 250.0, &PreprocessingConfig::default()).unwrap();
        assert_eq!(x, y);
    }

    #[test]
    fn band_segmentation_keeps_the_band() {
        let fs = 250.0;
        let x = two_tones(fs, 5000);
        let alpha = Band::new("alpha", 8.0, 13.0);
        let y = FirPreprocessor.band_segmentation(&x, &alpha, fs).unwrap();
        for t in 1500..3500 {
            let want = (2.0 * PI * 10.0 * t as f64 / fs).sin();
            approx::assert_abs_diff_eq!(y[[t, 0]], want, epsilon = 2e-2);
        }
    }

    #[test]
    fn notch_and_car() {
        let fs = 250.0;
        let mut x = two_tones(fs, 5000);
        x.column_mut(1).mapv_inplace(|v| v + 3.0);
        let cfg = PreprocessingConfig {
            apply: true,
            bandpass: None,
            notch: Some(FilterBand { min: 48.0, max: 52.0, order: 1000 }),
            car: true,
        };
        let y = FirPreprocessor.apply(&x, fs, &cfg).unwrap();
        // CAR: channels sum to zero at every sample.
        for t in 0..5000 {
            approx::assert_abs_diff_eq!(y[[t, 0]] + y[[t, 1]], 0.0, epsilon = 1e-9);
        }
        // Identical tones cancel; only the offset difference remains.
        approx::assert_abs_diff_eq!(y[[2500, 0]], -1.5, epsilon = 2e-2);
    }

    #[test]
    fn band_above_nyquist_is_rejected() {
        let x = two_tones(100.0, 100);
        let gamma = Band::new("gamma", 60.0, 90.0);
        assert!(FirPreprocessor.band_segmentation(&x, &gamma, 100.0).is_err());
    }

    #[test]
    fn band_config_overrides_bandpass_only() {
        let cfg = PreprocessingConfig { apply: true, car: true, ..Default::default() };
        let banded = config_for_band(&cfg, &Band::new("beta", 13.0, 30.0));
        assert!(banded.car);
        assert_eq!(banded.bandpass, Some(FilterBand { min: 13.0, max: 30.0, order: BAND_FILTER_ORDER }));
    }
}

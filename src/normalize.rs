//! Per-epoch normalisation and global channel statistics.
//!
//! `normalize_epoch_inplace`: for each channel of one `[T, C]` epoch:
//!   `dc`: epoch[:, c] -= mean(baseline[:, c])
//!   `z` : epoch[:, c]  = (epoch[:, c] - mean(baseline[:, c])) / std(baseline[:, c])   (ddof = 0)
//!
//! `channel_stats`: per-channel mean (NaN-ignoring) and std (ddof = 0) of a
//! whole `[T, C]` signal, the reference for artifact thresholding.
use ndarray::{Array1, Array3, ArrayView2, ArrayViewMut2, Axis};

use crate::config::Normalization;
use crate::error::{Result, SegmentationError};

/// Normalise `epoch` ([T, C]) in place with statistics from `baseline` ([Tb, C]).
///
/// A z-score with a zero-variance baseline channel fails with
/// [`SegmentationError::DegenerateBaseline`] and leaves `epoch` untouched.
pub fn normalize_epoch_inplace(
    mut epoch: ArrayViewMut2<'_, f64>,
    baseline: ArrayView2<'_, f64>,
    kind: Normalization,
) -> Result<()> {
    if baseline.ncols() != epoch.ncols() || baseline.nrows() == 0 {
        return Err(SegmentationError::ShapeMismatch {
            expected: format!("non-empty baseline with {} channels", epoch.ncols()),
            got: format!("{:?}", baseline.shape()),
        });
    }
    let mean = baseline.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(epoch.ncols()));
    match kind {
        Normalization::Dc => {
            for mut row in epoch.rows_mut() {
                row -= &mean;
            }
        }
        Normalization::Z => {
            let std = baseline.std_axis(Axis(0), 0.0);
            if let Some(channel) = std.iter().position(|&s| !(s > 0.0)) {
                return Err(SegmentationError::DegenerateBaseline { channel });
            }
            for mut row in epoch.rows_mut() {
                row -= &mean;
                row /= &std;
            }
        }
    }
    Ok(())
}

/// Normalise every epoch of `epochs` ([E, T, C]) against itself.
///
/// Epochs with a degenerate baseline are left unnormalised; their count is
/// returned.
pub fn normalize_epochs_inplace(epochs: &mut Array3<f64>, kind: Normalization) -> usize {
    let mut degenerate = 0;
    for (e, mut epoch) in epochs.outer_iter_mut().enumerate() {
        let baseline = epoch.to_owned();
        if let Err(err) = normalize_epoch_inplace(epoch.view_mut(), baseline.view(), kind) {
            log::warn!("epoch {e}: {err}; left unnormalised");
            degenerate += 1;
        }
    }
    degenerate
}

/// Per-channel `(mean, std)` of a `[T, C]` signal.
///
/// The mean skips NaN samples; the std uses `ddof = 0`.
pub fn channel_stats(signal: ArrayView2<'_, f64>) -> (Array1<f64>, Array1<f64>) {
    let mean = signal
        .axis_iter(Axis(1))
        .map(|col| {
            let (sum, n) = col
                .iter()
                .filter(|v| !v.is_nan())
                .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
            if n > 0 { sum / n as f64 } else { f64::NAN }
        })
        .collect::<Array1<f64>>();
    let std = if signal.nrows() > 0 {
        signal.std_axis(Axis(0), 0.0)
    } else {
        Array1::from_elem(signal.ncols(), f64::NAN)
    };
    (mean, std)
}

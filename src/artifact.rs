//! Threshold-based artifact rejection.
//!
//! For every epoch `e` and channel `c`:
//!
//! ```text
//! bad(e, c)  = #{ t : |x[e, t, c] - μ[c]| > k · σ[c] }  ≥  n_samp
//! reject(e)  = #{ c : bad(e, c) }                        ≥  n_cha
//! ```
//!
//! `μ`, `σ` are the per-channel statistics of the continuous signal the
//! epochs were cut from (see [`crate::normalize::channel_stats`]).
use ndarray::{Array1, ArrayView1, Axis};

use crate::config::ThresholdConfig;
use crate::epoch::EpochStack;
use crate::error::{Result, SegmentationError};

/// Indices (ascending) of the epochs that fail the thresholds.
pub fn noisy_epochs(
    stack: &EpochStack,
    mean: ArrayView1<'_, f64>,
    std: ArrayView1<'_, f64>,
    cfg: &ThresholdConfig,
) -> Result<Vec<usize>> {
    let n_ch = stack.n_channels();
    if mean.len() != n_ch || std.len() != n_ch {
        return Err(SegmentationError::ShapeMismatch {
            expected: format!("{n_ch} channel statistics"),
            got: format!("mean {} / std {}", mean.len(), std.len()),
        });
    }
    let limit: Array1<f64> = std.mapv(|s| cfg.k * s);

    let rejected = stack
        .data
        .outer_iter()
        .enumerate()
        .filter_map(|(e, epoch)| {
            let noisy_channels = epoch
                .axis_iter(Axis(1))
                .zip(mean.iter().zip(limit.iter()))
                .filter(|(col, (m, lim))| {
                    col.iter().filter(|&&v| (v - **m).abs() > **lim).count() >= cfg.n_samples
                })
                .count();
            (noisy_channels >= cfg.n_channels).then_some(e)
        })
        .collect();
    Ok(rejected)
}

/// Drop noisy epochs (and their labels), keeping the order of the rest.
///
/// Returns the surviving stack and the rejected indices.
pub fn reject_noisy_epochs(
    stack: EpochStack,
    mean: ArrayView1<'_, f64>,
    std: ArrayView1<'_, f64>,
    cfg: &ThresholdConfig,
) -> Result<(EpochStack, Vec<usize>)> {
    let rejected = noisy_epochs(&stack, mean, std, cfg)?;
    if rejected.is_empty() {
        return Ok((stack, rejected));
    }
    let keep: Vec<usize> = (0..stack.len()).filter(|i| rejected.binary_search(i).is_err()).collect();
    Ok((stack.select(&keep), rejected))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array3};

    fn flat_stack(n_epochs: usize) -> EpochStack {
        let data = Array3::<f64>::zeros((n_epochs, 50, 4));
        let labels = (0..n_epochs).map(|i| format!("e{i}")).collect();
        EpochStack::new(data, labels).unwrap()
    }

    #[test]
    fn clean_stack_is_untouched() {
        let stack = flat_stack(3);
        let cfg = ThresholdConfig { k: 3.0, n_samples: 1, n_channels: 1 };
        let (kept, rejected) =
            reject_noisy_epochs(stack.clone(), Array1::zeros(4).view(), Array1::ones(4).view(), &cfg).unwrap();
        assert!(rejected.is_empty());
        assert_eq!(kept, stack);
    }

    #[test]
    fn exactly_k_sigma_is_not_an_outlier() {
        let mut stack = flat_stack(1);
        stack.data.slice_mut(ndarray::s![0, .., ..]).fill(3.0);
        let cfg = ThresholdConfig { k: 3.0, n_samples: 1, n_channels: 1 };
        let rejected = noisy_epochs(&stack, Array1::zeros(4).view(), Array1::ones(4).view(), &cfg).unwrap();
        assert!(rejected.is_empty());
    }

    #[test]
    fn labels_follow_survivors() {
        let mut stack = flat_stack(4);
        stack.data.slice_mut(ndarray::s![1, ..10, ..]).fill(100.0);
        let cfg = ThresholdConfig { k: 2.0, n_samples: 5, n_channels: 4 };
        let (kept, rejected) =
            reject_noisy_epochs(stack, Array1::zeros(4).view(), Array1::ones(4).view(), &cfg).unwrap();
        assert_eq!(rejected, vec![1]);
        assert_eq!(kept.labels, vec!["e0", "e2", "e3"]);
    }

    #[test]
    fn statistics_length_is_checked() {
        let stack = flat_stack(1);
        let cfg = ThresholdConfig { k: 3.0, n_samples: 1, n_channels: 1 };
        assert!(noisy_epochs(&stack, Array1::zeros(3).view(), Array1::ones(4).view(), &cfg).is_err());
    }
}

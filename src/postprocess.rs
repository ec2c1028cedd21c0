//! Post-processing of a freshly cut epoch stack.
//!
//! Fixed order: thresholding first, then resampling, so rejected epochs are
//! never resampled.  Both stages are optional; with neither configured the
//! stack is returned unchanged.
use ndarray::Array1;

use crate::config::ThresholdConfig;
use crate::epoch::EpochStack;
use crate::error::Result;
use crate::{artifact, resample};

/// Post-processing stages for one run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PostProcess {
    /// Thresholding parameters and the `(mean, std)` of the continuous
    /// signal the epochs came from.
    pub threshold: Option<(ThresholdConfig, Array1<f64>, Array1<f64>)>,
    /// Target rate and the epoch window in milliseconds.
    pub resample: Option<(f64, (f64, f64))>,
}

/// What post-processing did to one stack.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostProcessReport {
    pub epochs_in: usize,
    /// Indices (into the input stack) of rejected epochs.
    pub rejected: Vec<usize>,
    pub resampled: bool,
}

impl PostProcess {
    pub fn is_noop(&self) -> bool {
        self.threshold.is_none() && self.resample.is_none()
    }

    /// Run the configured stages on `stack`.
    ///
    /// `None` when thresholding rejects every epoch.
    pub fn run(&self, stack: EpochStack) -> Result<(Option<EpochStack>, PostProcessReport)> {
        let mut report = PostProcessReport { epochs_in: stack.len(), ..Default::default() };
        let mut stack = stack;

        if let Some((cfg, mean, std)) = &self.threshold {
            let (kept, rejected) = artifact::reject_noisy_epochs(stack, mean.view(), std.view(), cfg)?;
            report.rejected = rejected;
            if kept.is_empty() {
                return Ok((None, report));
            }
            stack = kept;
        }

        if let Some((target_fs, window_ms)) = self.resample {
            stack = resample::resample_epochs(stack, window_ms, target_fs)?;
            report.resampled = true;
        }

        Ok((Some(stack), report))
    }
}

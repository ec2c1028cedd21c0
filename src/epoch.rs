//! Epoch cutting.
//!
//! Two modes, both producing an [`EpochStack`] shaped `[E, T, C]`:
//!
//! * [`tile_epochs`]: fixed-length windows tiled from the start of a
//!   segment with a configurable stride.  A trailing remainder shorter than
//!   one epoch is dropped, never padded.
//! * [`cut_event_epochs`]: one window per event onset, `[start, end)`
//!   milliseconds around it, with an optional baseline window for
//!   normalisation.
//!
//! Normalisation is per epoch: fixed-length epochs are their own baseline,
//! event epochs use their baseline window (or the whole epoch when none is
//! given).  A degenerate z-score baseline leaves that epoch unnormalised.
use ndarray::{s, stack, Array2, Array3, ArrayView2, Axis};

use crate::config::{BaselineWindow, Normalization};
use crate::error::{Result, SegmentationError};
use crate::normalize::{normalize_epoch_inplace, normalize_epochs_inplace};

/// Stacked epochs with one provenance label per epoch.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochStack {
    /// `[n_epochs, n_samples, n_channels]`.
    pub data: Array3<f64>,
    pub labels: Vec<String>,
}

impl EpochStack {
    pub fn new(data: Array3<f64>, labels: Vec<String>) -> Result<Self> {
        if labels.len() != data.shape()[0] {
            return Err(SegmentationError::ShapeMismatch {
                expected: format!("{} epoch labels", data.shape()[0]),
                got: labels.len().to_string(),
            });
        }
        Ok(Self { data, labels })
    }

    pub fn len(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn n_samples(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn n_channels(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn epoch(&self, i: usize) -> ArrayView2<'_, f64> {
        self.data.index_axis(Axis(0), i)
    }

    /// Keep only the epochs at `keep` (ascending), with their labels.
    pub fn select(&self, keep: &[usize]) -> EpochStack {
        EpochStack {
            data: self.data.select(Axis(0), keep),
            labels: keep.iter().map(|&i| self.labels[i].clone()).collect(),
        }
    }

    /// Concatenate stacks along the epoch axis, in order.
    ///
    /// Empty inputs are skipped; `None` when nothing remains.  All non-empty
    /// stacks must share `(n_samples, n_channels)`.
    pub fn concat(stacks: Vec<EpochStack>) -> Result<Option<EpochStack>> {
        let stacks: Vec<EpochStack> = stacks.into_iter().filter(|s| !s.is_empty()).collect();
        let Some(first) = stacks.first() else {
            return Ok(None);
        };
        let dims = (first.n_samples(), first.n_channels());
        if let Some(bad) = stacks.iter().find(|s| (s.n_samples(), s.n_channels()) != dims) {
            return Err(SegmentationError::ShapeMismatch {
                expected: format!("epochs of {dims:?}"),
                got: format!("{:?}", (bad.n_samples(), bad.n_channels())),
            });
        }
        let views: Vec<_> = stacks.iter().map(|s| s.data.view()).collect();
        let data = ndarray::concatenate(Axis(0), &views).map_err(|e| SegmentationError::ShapeMismatch {
            expected: format!("epochs of {dims:?}"),
            got: e.to_string(),
        })?;
        let labels = stacks.into_iter().flat_map(|s| s.labels).collect();
        Ok(Some(EpochStack { data, labels }))
    }
}

/// Milliseconds → samples, rounded to nearest.
pub fn ms_to_samples(ms: f64, fs: f64) -> isize {
    (ms * fs / 1000.0).round() as isize
}

// ── Fixed-length tiling ──────────────────────────────────────────────────────

/// Epoch length and stride in samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    pub epoch_samples: usize,
    pub stride: usize,
}

impl FixedWindow {
    /// `trial_length_ms / 1000 * fs` samples per epoch; the stride is
    /// `stride_pct` % of that (100 % when `None`).
    pub fn from_ms(trial_length_ms: f64, stride_pct: Option<f64>, fs: f64) -> Result<Self> {
        let epoch_samples = ms_to_samples(trial_length_ms, fs);
        if epoch_samples < 1 {
            return Err(SegmentationError::InvalidConfig(format!(
                "trial length {trial_length_ms} ms is shorter than one sample at {fs} Hz"
            )));
        }
        let epoch_samples = epoch_samples as usize;
        let pct = stride_pct.unwrap_or(100.0);
        let stride = ((epoch_samples as f64 * pct / 100.0).round() as usize).max(1);
        Ok(Self { epoch_samples, stride })
    }

    /// Epochs that fit in `n` samples.
    pub fn count(&self, n: usize) -> usize {
        if n < self.epoch_samples {
            0
        } else {
            (n - self.epoch_samples) / self.stride + 1
        }
    }
}

/// Tile `segment` ([T, C]) into fixed-length epochs.
///
/// Labels are `"{label}_{i}"`.  `None` when the segment is shorter than one
/// epoch.
pub fn tile_epochs(
    segment: ArrayView2<'_, f64>,
    window: FixedWindow,
    norm: Option<Normalization>,
    label: &str,
) -> Option<EpochStack> {
    let n_epochs = window.count(segment.nrows());
    if n_epochs == 0 {
        return None;
    }
    let len = window.epoch_samples;
    let mut data = Array3::<f64>::zeros((n_epochs, len, segment.ncols()));
    for e in 0..n_epochs {
        let start = e * window.stride;
        data.slice_mut(s![e, .., ..])
            .assign(&segment.slice(s![start..start + len, ..]));
    }
    if let Some(kind) = norm {
        normalize_epochs_inplace(&mut data, kind);
    }
    let labels = (0..n_epochs).map(|i| format!("{label}_{i}")).collect();
    Some(EpochStack { data, labels })
}

// ── Event-anchored cutting ───────────────────────────────────────────────────

/// Event window in samples relative to each onset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventWindow {
    /// First sample relative to the onset (negative = pre-onset).
    pub offset: isize,
    pub n_samples: usize,
    /// Baseline `(offset, length)` relative to the onset.
    pub baseline: Option<(isize, usize)>,
}

impl EventWindow {
    pub fn from_ms(
        start_ms: f64,
        end_ms: f64,
        baseline: Option<BaselineWindow>,
        fs: f64,
    ) -> Result<Self> {
        let offset = ms_to_samples(start_ms, fs);
        let n_samples = ms_to_samples(end_ms - start_ms, fs);
        if n_samples < 1 {
            return Err(SegmentationError::InvalidConfig(format!(
                "event window {start_ms}..{end_ms} ms is shorter than one sample at {fs} Hz"
            )));
        }
        let baseline = match baseline {
            Some(b) => {
                let len = ms_to_samples(b.end_ms - b.start_ms, fs);
                if len < 1 {
                    return Err(SegmentationError::InvalidConfig(format!(
                        "baseline {}..{} ms is shorter than one sample at {fs} Hz",
                        b.start_ms, b.end_ms
                    )));
                }
                Some((ms_to_samples(b.start_ms, fs), len as usize))
            }
            None => None,
        };
        Ok(Self { offset, n_samples: n_samples as usize, baseline })
    }
}

/// `start..start + len` if it lies inside `0..n`.
fn span(anchor: usize, offset: isize, len: usize, n: usize) -> Option<(usize, usize)> {
    let start = anchor as isize + offset;
    if start < 0 {
        return None;
    }
    let start = start as usize;
    (start + len <= n).then_some((start, start + len))
}

/// Cut one epoch per onset sample of `signal` ([T, C]).
///
/// Onsets whose window (or, when normalising, whose baseline) falls outside
/// the signal are skipped.  `labels[i]` names the epoch of `onsets[i]`.
/// `None` when no onset yields an epoch.
pub fn cut_event_epochs(
    signal: ArrayView2<'_, f64>,
    onsets: &[usize],
    labels: &[String],
    window: &EventWindow,
    norm: Option<Normalization>,
) -> Option<EpochStack> {
    let n = signal.nrows();
    let mut epochs: Vec<Array2<f64>> = Vec::with_capacity(onsets.len());
    let mut kept_labels = Vec::with_capacity(onsets.len());

    for (i, &onset) in onsets.iter().enumerate() {
        let Some((a, b)) = span(onset, window.offset, window.n_samples, n) else {
            log::debug!("onset at sample {onset}: window outside the signal, skipped");
            continue;
        };
        let mut epoch = signal.slice(s![a..b, ..]).to_owned();

        if let Some(kind) = norm {
            let baseline = match window.baseline {
                Some((offset, len)) => match span(onset, offset, len, n) {
                    Some((ba, bb)) => signal.slice(s![ba..bb, ..]).to_owned(),
                    None => {
                        log::debug!("onset at sample {onset}: baseline outside the signal, skipped");
                        continue;
                    }
                },
                None => epoch.clone(),
            };
            if let Err(err) = normalize_epoch_inplace(epoch.view_mut(), baseline.view(), kind) {
                log::warn!("onset at sample {onset}: {err}; left unnormalised");
            }
        }

        epochs.push(epoch);
        kept_labels.push(labels.get(i).cloned().unwrap_or_else(|| format!("onset_{onset}")));
    }

    if epochs.is_empty() {
        return None;
    }
    let views: Vec<_> = epochs.iter().map(|e| e.view()).collect();
    let data = stack(Axis(0), &views).ok()?;
    Some(EpochStack { data, labels: kept_labels })
}

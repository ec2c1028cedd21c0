//! Recordings and their condition/event marks.
//!
//! A [`Recording`] is consumed read-only by the segmentation stages.  On disk
//! it is a safetensors file (see [`crate::io`]) with tensors `signal`
//! `[T, C]`, `times` `[T]` and `fs` `[1]`; the marks and channel names are
//! JSON strings in the header metadata.
use anyhow::{bail, Context};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Result, SegmentationError};
use crate::io::{StFile, StWriter};

/// Numeric code attached to a condition or event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelInfo {
    pub label: i64,
}

/// Human-readable name → numeric code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelMap(pub BTreeMap<String, LabelInfo>);

impl LabelMap {
    pub fn insert(&mut self, name: impl Into<String>, code: i64) {
        self.0.insert(name.into(), LabelInfo { label: code });
    }

    pub fn name_of(&self, code: i64) -> Option<&str> {
        self.0
            .iter()
            .find(|(_, info)| info.label == code)
            .map(|(name, _)| name.as_str())
    }

    pub fn code_of(&self, name: &str) -> Option<i64> {
        self.0.get(name).map(|info| info.label)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Raw condition/event markers of a recording.
///
/// `conditions_labels` holds boundary codes: each condition instance is a
/// consecutive pair `(code, code)` whose times are its start and end.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Marks {
    pub conditions_labels: Vec<i64>,
    pub conditions_times: Vec<f64>,
    pub events_labels: Vec<i64>,
    pub events_times: Vec<f64>,
    pub conditions: LabelMap,
    pub events: LabelMap,
}

impl Marks {
    /// Copy of the marks with an unterminated final condition closed at
    /// `last_time`.  A lone boundary label counts as unterminated.
    pub fn repaired(&self, last_time: f64) -> Marks {
        let mut out = self.clone();
        let n = out.conditions_labels.len();
        if n % 2 == 1 && (n == 1 || out.conditions_labels[n - 1] != out.conditions_labels[n - 2]) {
            let code = out.conditions_labels[n - 1];
            out.conditions_labels.push(code);
            out.conditions_times.push(last_time);
            log::debug!("closed unterminated condition {code} at t={last_time:.3}s");
        }
        out
    }

    /// `(start, end)` times of every occurrence of condition `code`.
    ///
    /// Boundaries carrying `code` are taken in order and paired; an odd
    /// count is [`SegmentationError::MalformedMarks`].
    pub fn condition_occurrences(&self, code: i64) -> Result<Vec<(f64, f64)>> {
        let times: Vec<f64> = self
            .conditions_labels
            .iter()
            .zip(&self.conditions_times)
            .filter(|&(&label, _)| label == code)
            .map(|(_, &t)| t)
            .collect();
        if times.len() % 2 != 0 {
            return Err(SegmentationError::MalformedMarks { code, count: times.len() });
        }
        Ok(times.chunks_exact(2).map(|p| (p[0], p[1])).collect())
    }

    /// Indices of events with `code` and `start <= t <= end`.
    pub fn events_in_range(&self, code: i64, start: f64, end: f64) -> Vec<usize> {
        self.events_labels
            .iter()
            .zip(&self.events_times)
            .enumerate()
            .filter(|&(_, (&label, &t))| label == code && t >= start && t <= end)
            .map(|(i, _)| i)
            .collect()
    }

    /// Times of every event with `code`.
    pub fn event_times(&self, code: i64) -> Vec<f64> {
        self.events_labels
            .iter()
            .zip(&self.events_times)
            .filter(|&(&label, _)| label == code)
            .map(|(_, &t)| t)
            .collect()
    }

    fn check_lengths(&self) -> Result<()> {
        if self.conditions_labels.len() != self.conditions_times.len() {
            return Err(SegmentationError::ShapeMismatch {
                expected: format!("{} condition times", self.conditions_labels.len()),
                got: self.conditions_times.len().to_string(),
            });
        }
        if self.events_labels.len() != self.events_times.len() {
            return Err(SegmentationError::ShapeMismatch {
                expected: format!("{} event times", self.events_labels.len()),
                got: self.events_times.len().to_string(),
            });
        }
        Ok(())
    }
}

/// A multichannel recording.
#[derive(Debug, Clone)]
pub struct Recording {
    /// `[n_samples, n_channels]`.
    pub signal: Array2<f64>,
    /// Sampling rate in Hz.
    pub fs: f64,
    /// Ascending sample timestamps in seconds (not necessarily from 0).
    pub times: Vec<f64>,
    pub channels: Vec<String>,
    pub marks: Marks,
}

impl Recording {
    /// Build a recording, checking that the signal, time vector and marks agree.
    pub fn new(signal: Array2<f64>, fs: f64, times: Vec<f64>, marks: Marks) -> Result<Self> {
        let channels = (0..signal.ncols()).map(|c| format!("ch{c}")).collect();
        let rec = Self { signal, fs, times, channels, marks };
        rec.validate()?;
        Ok(rec)
    }

    /// Check the invariants [`Recording::new`] enforces.
    ///
    /// The fields are public, so a [`RecordingSource`] may hand back a value
    /// that never went through `new`.
    pub fn validate(&self) -> Result<()> {
        if self.times.len() != self.signal.nrows() {
            return Err(SegmentationError::ShapeMismatch {
                expected: format!("{} timestamps", self.signal.nrows()),
                got: self.times.len().to_string(),
            });
        }
        if self.times.is_empty() {
            return Err(SegmentationError::EmptyTimeVector);
        }
        if !(self.fs > 0.0) {
            return Err(SegmentationError::InvalidConfig(format!(
                "sampling rate must be positive (got {})",
                self.fs
            )));
        }
        self.marks.check_lengths()
    }

    /// Build a recording whose time vector starts at `t0` with step `1 / fs`.
    pub fn from_signal(signal: Array2<f64>, fs: f64, t0: f64, marks: Marks) -> Result<Self> {
        let times = (0..signal.nrows()).map(|i| t0 + i as f64 / fs).collect();
        Self::new(signal, fs, times, marks)
    }

    pub fn with_channels(mut self, channels: Vec<String>) -> Self {
        self.channels = channels;
        self
    }

    /// The same recording carrying a processed `signal` of identical shape.
    pub fn with_signal(&self, signal: Array2<f64>) -> Result<Recording> {
        if signal.dim() != self.signal.dim() {
            return Err(SegmentationError::ShapeMismatch {
                expected: format!("{:?}", self.signal.dim()),
                got: format!("{:?}", signal.dim()),
            });
        }
        Ok(Recording {
            signal,
            fs: self.fs,
            times: self.times.clone(),
            channels: self.channels.clone(),
            marks: self.marks.clone(),
        })
    }

    pub fn n_samples(&self) -> usize {
        self.signal.nrows()
    }

    pub fn n_channels(&self) -> usize {
        self.signal.ncols()
    }

    /// `times[last] - times[0]`.
    pub fn duration(&self) -> f64 {
        match (self.times.first(), self.times.last()) {
            (Some(first), Some(last)) => last - first,
            _ => 0.0,
        }
    }

    /// Marks with an unterminated final condition closed at the last sample.
    pub fn repaired_marks(&self) -> Marks {
        let last = self.times.last().copied().unwrap_or(0.0);
        self.marks.repaired(last)
    }

    /// Read a recording from a safetensors file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let st = StFile::open(path)?;

        let shape = st.shape("signal")?;
        if shape.len() != 2 {
            bail!("'signal' must be 2-D [samples, channels], got shape {shape:?}");
        }
        let signal = Array2::from_shape_vec((shape[0], shape[1]), st.read_f64("signal")?)
            .context("reshaping 'signal'")?;
        let times = st.read_f64("times")?;
        let fs = st
            .read_f64("fs")?
            .first()
            .copied()
            .context("'fs' tensor is empty")?;

        // Marks are optional; a recording without them is one long no-condition.
        let marks: Marks = match st.metadata("marks") {
            Some(json) => serde_json::from_str(json).context("parsing marks metadata")?,
            None => Marks::default(),
        };

        let mut rec = Self::new(signal, fs, times, marks)
            .with_context(|| format!("invalid recording {}", path.display()))?;
        if let Some(json) = st.metadata("channels") {
            let channels: Vec<String> = serde_json::from_str(json).context("parsing channel names")?;
            if channels.len() == rec.n_channels() {
                rec.channels = channels;
            }
        }
        Ok(rec)
    }

    /// Serialise into a safetensors writer (same layout as [`Recording::load`]).
    pub fn to_writer(&self) -> anyhow::Result<StWriter> {
        let mut w = StWriter::new();
        w.add_array("signal", &self.signal);
        w.add_f64("times", &self.times, &[self.times.len()]);
        w.add_f64("fs", &[self.fs], &[1]);
        w.add_metadata("marks", serde_json::to_string(&self.marks)?);
        w.add_metadata("channels", serde_json::to_string(&self.channels)?);
        Ok(w)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        self.to_writer()?.write(path)
    }
}

/// Loader seam for the batch driver.
pub trait RecordingSource {
    fn load(&self, path: &Path) -> anyhow::Result<Recording>;
}

/// Loads recordings stored with [`Recording::save`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SafetensorsSource;

impl RecordingSource for SafetensorsSource {
    fn load(&self, path: &Path) -> anyhow::Result<Recording> {
        Recording::load(path)
    }
}

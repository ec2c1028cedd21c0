//! Pipeline configuration.
//!
//! [`Settings`] holds every tunable parameter of a batch run: how the signal
//! is preprocessed, how it is cut into epochs, which parameters are computed
//! and where the outputs go.  It is an immutable value built once (usually
//! from a TOML file) and passed by reference into every pipeline call.
//!
//! ```
//! use eegseg::config::{Settings, SegmentationMode};
//!
//! let cfg = Settings::from_toml_str(r#"
//!     [segmentation]
//!     selected_conditions = ["task"]
//!
//!     [segmentation.mode]
//!     type = "condition"
//!     trial_length_ms = 1000.0
//! "#).unwrap();
//!
//! assert!(matches!(cfg.segmentation.mode, SegmentationMode::Condition { .. }));
//! ```
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Result, SegmentationError};
use crate::timeline::NO_CONDITION;

/// Complete configuration of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub preprocessing: PreprocessingConfig,
    pub segmentation: SegmentationConfig,
    pub parameters: ParametersConfig,
    pub output: OutputConfig,
}

impl Settings {
    /// Parse and validate settings from a TOML document.
    pub fn from_toml_str(text: &str) -> anyhow::Result<Self> {
        let settings: Settings = toml::from_str(text).context("parsing settings TOML")?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate a TOML settings file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("loading settings from {}", path.display()))
    }

    /// Reject missing or contradictory values before any file is touched.
    pub fn validate(&self) -> Result<()> {
        self.preprocessing.validate()?;
        self.segmentation.validate()?;
        self.parameters.validate()?;
        Ok(())
    }
}

// ── Preprocessing ────────────────────────────────────────────────────────────

/// Cut-off pair and FIR order for a bandpass or bandstop stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterBand {
    pub min: f64,
    pub max: f64,
    /// FIR order; the filter has `order + 1` taps (rounded up to odd).
    pub order: usize,
}

/// Preprocessing applied to the whole signal before segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessingConfig {
    /// Run the preprocessing stage at all.
    ///
    /// When `false` and band segmentation is on, each band is still
    /// extracted with a plain bandpass.
    ///
    /// Default: `false`.
    pub apply: bool,

    /// Bandpass stage.  Replaced by the current band's limits (order 1000)
    /// when band segmentation is requested.
    pub bandpass: Option<FilterBand>,

    /// Bandstop (notch) stage.
    pub notch: Option<FilterBand>,

    /// Common average reference after filtering.
    ///
    /// Default: `false`.
    pub car: bool,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self { apply: false, bandpass: None, notch: None, car: false }
    }
}

impl PreprocessingConfig {
    fn validate(&self) -> Result<()> {
        for (stage, band) in [("bandpass", &self.bandpass), ("notch", &self.notch)] {
            if let Some(b) = band {
                if !(b.min < b.max) || b.min < 0.0 {
                    return Err(SegmentationError::InvalidConfig(format!(
                        "{stage} limits must satisfy 0 <= min < max (got {}..{})",
                        b.min, b.max
                    )));
                }
                if b.order == 0 {
                    return Err(SegmentationError::InvalidConfig(format!(
                        "{stage} order must be positive"
                    )));
                }
            }
        }
        Ok(())
    }
}

// ── Segmentation ─────────────────────────────────────────────────────────────

/// Per-epoch normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// `(x - μ) / σ` with baseline mean and standard deviation.
    Z,
    /// `x - μ` with baseline mean.
    Dc,
}

/// Baseline window relative to each event onset, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaselineWindow {
    pub start_ms: f64,
    pub end_ms: f64,
}

/// How the signal is cut.  Selected once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SegmentationMode {
    /// Fixed-length tiling of every occurrence of each selected condition.
    Condition {
        trial_length_ms: f64,
        /// Step between consecutive epoch starts as a percentage of the
        /// epoch length.  `None` (or 100) tiles without overlap.
        #[serde(default)]
        trial_stride_pct: Option<f64>,
    },
    /// One epoch per event onset, `[window_start_ms, window_end_ms]` around it.
    Event {
        window_start_ms: f64,
        window_end_ms: f64,
        #[serde(default)]
        baseline: Option<BaselineWindow>,
    },
}

impl Default for SegmentationMode {
    fn default() -> Self {
        SegmentationMode::Condition { trial_length_ms: 1000.0, trial_stride_pct: None }
    }
}

impl SegmentationMode {
    /// Epoch window in milliseconds: `[0, trial_length]` for conditions,
    /// `[window_start, window_end]` for events.
    pub fn window_ms(&self) -> (f64, f64) {
        match *self {
            SegmentationMode::Condition { trial_length_ms, .. } => (0.0, trial_length_ms),
            SegmentationMode::Event { window_start_ms, window_end_ms, .. } => {
                (window_start_ms, window_end_ms)
            }
        }
    }
}

/// Artifact-rejection thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Sigma multiplier.
    pub k: f64,
    /// Minimum offending samples for a channel to count as noisy.
    pub n_samples: usize,
    /// Minimum noisy channels for the epoch to be rejected.
    pub n_channels: usize,
}

/// Epoching, normalisation and post-processing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub mode: SegmentationMode,

    /// Condition names to segment.  `"no-condition"` (or `"null"`) stands for
    /// the whole recording.
    ///
    /// Default: `["no-condition"]`.
    pub selected_conditions: Vec<String>,

    /// Event names to segment (event mode only).
    pub selected_events: Vec<String>,

    /// Per-epoch normalisation.  Default: none.
    pub normalization: Option<Normalization>,

    /// Average computed parameters across epochs.
    ///
    /// Default: `false`.
    pub average: bool,

    /// Artifact rejection.  Default: off.
    pub thresholding: Option<ThresholdConfig>,

    /// Resample every retained epoch to this rate (Hz).  Default: off.
    pub resample_fs: Option<f64>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            mode: SegmentationMode::default(),
            selected_conditions: vec![NO_CONDITION.to_string()],
            selected_events: vec![],
            normalization: None,
            average: false,
            thresholding: None,
            resample_fs: None,
        }
    }
}

impl SegmentationConfig {
    fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SegmentationError::InvalidConfig(msg));
        match self.mode {
            SegmentationMode::Condition { trial_length_ms, trial_stride_pct } => {
                if !(trial_length_ms > 0.0) {
                    return invalid(format!("trial length must be positive (got {trial_length_ms} ms)"));
                }
                if let Some(pct) = trial_stride_pct {
                    if !(pct > 0.0 && pct <= 100.0) {
                        return invalid(format!("trial stride must be in (0, 100] % (got {pct})"));
                    }
                }
            }
            SegmentationMode::Event { window_start_ms, window_end_ms, baseline } => {
                if !(window_end_ms > window_start_ms) {
                    return invalid(format!(
                        "event window end must follow its start (got {window_start_ms}..{window_end_ms} ms)"
                    ));
                }
                if let Some(b) = baseline {
                    if !(b.end_ms > b.start_ms) {
                        return invalid(format!(
                            "baseline end must follow its start (got {}..{} ms)",
                            b.start_ms, b.end_ms
                        ));
                    }
                }
            }
        }
        if self.selected_conditions.is_empty() {
            return invalid("no condition selected".into());
        }
        if let Some(t) = self.thresholding {
            if !(t.k > 0.0) {
                return invalid(format!("threshold k must be positive (got {})", t.k));
            }
            if t.n_samples == 0 || t.n_channels == 0 {
                return invalid("threshold sample and channel counts must be at least 1".into());
            }
        }
        if let Some(fs) = self.resample_fs {
            if !(fs > 0.0) {
                return invalid(format!("resample rate must be positive (got {fs} Hz)"));
            }
        }
        Ok(())
    }
}

// ── Parameters ───────────────────────────────────────────────────────────────

/// A named frequency range in Hz.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub name: String,
    pub min: f64,
    pub max: f64,
}

impl Band {
    pub const BROADBAND: &'static str = "broadband";

    pub fn new(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self { name: name.into(), min, max }
    }

    pub fn is_broadband(&self) -> bool {
        self.name == Self::BROADBAND
    }
}

/// Which descriptive statistics to compute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatisticSelection {
    pub mean: bool,
    pub variance: bool,
    pub median: bool,
    pub kurtosis: bool,
    pub skewness: bool,
}

/// Band segmentation and parameter selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParametersConfig {
    /// Repeat preprocessing and segmentation once per entry of `bands`.
    ///
    /// Default: `false` (a single broadband pass).
    pub band_segmentation: bool,

    pub bands: Vec<Band>,

    /// Limits of the broadband pseudo-band.  Default: `1..70` Hz.
    pub broadband_min: f64,
    pub broadband_max: f64,

    pub statistics: StatisticSelection,

    /// Bands for absolute power (broadband pass only).
    pub absolute_power: Vec<Band>,

    /// Bands for power relative to the broadband range (broadband pass only).
    pub relative_power: Vec<Band>,
}

impl Default for ParametersConfig {
    fn default() -> Self {
        Self {
            band_segmentation: false,
            bands: vec![],
            broadband_min: 1.0,
            broadband_max: 70.0,
            statistics: StatisticSelection::default(),
            absolute_power: vec![],
            relative_power: vec![],
        }
    }
}

impl ParametersConfig {
    pub fn broadband(&self) -> Band {
        Band::new(Band::BROADBAND, self.broadband_min, self.broadband_max)
    }

    /// Bands iterated by the batch driver: the selected bands, or the single
    /// broadband pseudo-band when band segmentation is off.
    pub fn bands(&self) -> Vec<Band> {
        if self.band_segmentation {
            self.bands.clone()
        } else {
            vec![self.broadband()]
        }
    }

    fn validate(&self) -> Result<()> {
        if self.band_segmentation && self.bands.is_empty() {
            return Err(SegmentationError::InvalidConfig(
                "band segmentation requested without any band".into(),
            ));
        }
        let all = std::iter::once(self.broadband())
            .chain(self.bands.iter().cloned())
            .chain(self.absolute_power.iter().cloned())
            .chain(self.relative_power.iter().cloned());
        for band in all {
            if !(band.min < band.max) || band.min < 0.0 {
                return Err(SegmentationError::InvalidConfig(format!(
                    "band '{}' must satisfy 0 <= min < max (got {}..{})",
                    band.name, band.min, band.max
                )));
            }
        }
        Ok(())
    }
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Where and what to persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root directory; the fixed sub-folders are created below it.
    pub dir: PathBuf,
    pub save_preprocessed: bool,
    pub save_segmented: bool,
    pub save_parameters: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            save_preprocessed: false,
            save_segmented: true,
            save_parameters: true,
        }
    }
}

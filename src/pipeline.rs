//! Batch driver: files × bands → segmentation.
//!
//! ```text
//! for file in files                       (failures isolated per file)
//!   load recording
//!   for band in bands                     (one unit of progress each)
//!     preprocess / isolate band           → Preprocessed_signals/
//!     segment every combination           → Segmented_signals/, Signal_parameters/
//! ```
//!
//! Cancellation is checked between units.  Progress is reported after every
//! unit, including the units of a file that failed, so the counter is
//! monotonic and reaches the total unless the run is cancelled.
use anyhow::Context;
use ndarray::Array2;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::{Band, Settings};
use crate::output::{FsOutputSink, OutputSink, Payload};
use crate::parameters::{ParameterComputer, StandardParameters};
use crate::preprocess::{config_for_band, FirPreprocessor, Preprocessor};
use crate::recording::{Recording, RecordingSource, SafetensorsSource};
use crate::segment::{Outcome, Segmenter};
use crate::timeline::Timeline;

/// Cooperative cancellation flag shared between the driver and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Snapshot passed to the progress callback after every unit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub file: String,
    pub band: String,
}

impl Progress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    /// Whole percent, rounded down.
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0) as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileFailure {
    pub file: PathBuf,
    pub message: String,
}

/// Summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchReport {
    pub files_total: usize,
    pub files_ok: usize,
    pub failures: Vec<FileFailure>,
    pub units_completed: usize,
    pub units_total: usize,
    /// Combinations that produced outputs.
    pub saved: usize,
    /// Combinations with no epochs.
    pub empty: usize,
    /// Combinations skipped on an error.
    pub skipped: usize,
    pub cancelled: bool,
}

impl BatchReport {
    pub fn any_failed(&self) -> bool {
        !self.failures.is_empty()
    }

    fn tick(&mut self, file: &str, band: &str, on_progress: &mut dyn FnMut(&Progress)) {
        self.units_completed += 1;
        on_progress(&Progress {
            completed: self.units_completed,
            total: self.units_total,
            file: file.to_string(),
            band: band.to_string(),
        });
    }
}

/// Output base name of a recording: its file stem.
pub fn base_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// The batch driver with its collaborators.
pub struct Pipeline<'a> {
    pub settings: &'a Settings,
    pub source: &'a dyn RecordingSource,
    pub preprocessor: &'a dyn Preprocessor,
    pub compute: &'a dyn ParameterComputer,
    pub sink: &'a dyn OutputSink,
}

impl<'a> Pipeline<'a> {
    /// Process every file.  Never fails; per-file errors land in the report.
    pub fn run(
        &self,
        files: &[PathBuf],
        cancel: &CancelToken,
        on_progress: &mut dyn FnMut(&Progress),
    ) -> BatchReport {
        let bands = self.settings.parameters.bands();
        let mut report = BatchReport {
            files_total: files.len(),
            units_total: files.len() * bands.len(),
            ..Default::default()
        };

        for path in files {
            if cancel.is_cancelled() {
                report.cancelled = true;
                break;
            }
            let base = base_name(path);
            log::info!("{base}: processing {}", path.display());
            let before = report.units_completed;

            match self.process_file(path, &base, &bands, cancel, &mut report, on_progress) {
                Ok(true) => report.files_ok += 1,
                Ok(false) => {
                    report.cancelled = true;
                    break;
                }
                Err(err) => {
                    log::warn!("{base}: failed: {err:#}");
                    report.failures.push(FileFailure { file: path.clone(), message: format!("{err:#}") });
                    for band in bands.iter().skip(report.units_completed - before) {
                        report.tick(&base, &band.name, on_progress);
                    }
                }
            }
        }

        log::info!(
            "batch done: {}/{} files ok, {} failed, {} outputs saved, {} empty, {} skipped{}",
            report.files_ok,
            report.files_total,
            report.failures.len(),
            report.saved,
            report.empty,
            report.skipped,
            if report.cancelled { " (cancelled)" } else { "" }
        );
        report
    }

    /// `Ok(false)` when cancelled between bands.
    fn process_file(
        &self,
        path: &Path,
        base: &str,
        bands: &[Band],
        cancel: &CancelToken,
        report: &mut BatchReport,
        on_progress: &mut dyn FnMut(&Progress),
    ) -> anyhow::Result<bool> {
        let rec = self.source.load(path).with_context(|| format!("loading {}", path.display()))?;
        rec.validate().with_context(|| format!("invalid recording {}", path.display()))?;
        match Timeline::reconstruct(&rec.marks, &rec.times) {
            Ok(t) => log::info!(
                "{base}: {:.1} s, {} channels, {} condition intervals, {} events",
                t.duration,
                rec.n_channels(),
                t.conditions.len(),
                t.events.len()
            ),
            Err(err) => log::warn!("{base}: timeline: {err}"),
        }

        let segmenter = Segmenter::new(self.settings, self.compute, self.sink);
        for band in bands {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            log::info!("{base}: band '{}' ({}-{} Hz)", band.name, band.min, band.max);

            let prepared = self.prepare(&rec, band).with_context(|| format!("preprocessing band '{}'", band.name))?;
            let filtered = if prepared.is_some() { None } else { self.band_only(&rec, band)? };
            if let Some(p) = &prepared {
                self.sink.save(Payload::Preprocessed(p), base, &band.name)?;
            }
            let signal = prepared
                .as_ref()
                .map(|p| &p.signal)
                .or(filtered.as_ref())
                .unwrap_or(&rec.signal);

            self.run_band(&segmenter, &rec, signal, base, band, report);
            report.tick(base, &band.name, on_progress);
        }
        Ok(true)
    }

    /// Preprocessed recording for `band`, when preprocessing is enabled.
    ///
    /// With band segmentation the configured bandpass is replaced by the
    /// band's limits.
    fn prepare(&self, rec: &Recording, band: &Band) -> anyhow::Result<Option<Recording>> {
        let prep = &self.settings.preprocessing;
        if !prep.apply {
            return Ok(None);
        }
        let cfg = if self.settings.parameters.band_segmentation {
            config_for_band(prep, band)
        } else {
            prep.clone()
        };
        let signal = self.preprocessor.apply(&rec.signal, rec.fs, &cfg)?;
        Ok(Some(rec.with_signal(signal)?))
    }

    /// Band-isolated signal when band segmentation runs without preprocessing.
    fn band_only(&self, rec: &Recording, band: &Band) -> anyhow::Result<Option<Array2<f64>>> {
        if !self.settings.parameters.band_segmentation {
            return Ok(None);
        }
        let filtered = self
            .preprocessor
            .band_segmentation(&rec.signal, band, rec.fs)
            .with_context(|| format!("isolating band '{}'", band.name))?;
        Ok(Some(filtered))
    }

    fn run_band(
        &self,
        segmenter: &Segmenter<'_>,
        rec: &Recording,
        signal: &Array2<f64>,
        base: &str,
        band: &Band,
        report: &mut BatchReport,
    ) {
        for result in segmenter.segment(rec, signal, base, band) {
            match result.outcome {
                Outcome::Saved { .. } => report.saved += 1,
                Outcome::Empty => report.empty += 1,
                Outcome::Skipped { .. } => report.skipped += 1,
            }
        }
    }
}

/// Run the batch with the default collaborators: safetensors recordings,
/// FIR preprocessing, standard parameters and the on-disk output layout of
/// `settings.output`.
pub fn run_pipeline(
    files: &[PathBuf],
    settings: &Settings,
    cancel: &CancelToken,
    on_progress: &mut dyn FnMut(&Progress),
) -> BatchReport {
    let sink = FsOutputSink::from_config(&settings.output);
    let pipeline = Pipeline {
        settings,
        source: &SafetensorsSource,
        preprocessor: &FirPreprocessor,
        compute: &StandardParameters,
        sink: &sink,
    };
    pipeline.run(files, cancel, on_progress)
}

//! # eegseg: condition/event segmentation of marked EEG recordings
//!
//! `eegseg` turns continuous multichannel recordings, annotated with
//! bracketing *conditions* and point *events*, into stacks of fixed-shape
//! epochs ready for feature extraction.
//!
//! ## Pipeline overview
//!
//! ```text
//! recording.safetensors  (signal [T, C], times [T], fs, marks)
//!   │
//!   ├─ timeline::Timeline::reconstruct   conditions + synthesized no-condition filler, events
//!   ├─ preprocess                        FIR bandpass / bandstop, common average reference
//!   │    └─ per band                     one bandpass per requested band (or broadband)
//!   ├─ segment                           per condition  → fixed-length tiling
//!   │                                    per (condition, event) → event-anchored windows
//!   ├─ postprocess                       thresholding, then resampling
//!   ├─ parameters                        statistics, band power
//!   └─ output                            Preprocessed_signals/ Segmented_signals/ Signal_parameters/
//! ```
//!
//! ## Quick start
//!
//! ```no_run
//! use eegseg::{run_pipeline, CancelToken, Settings};
//! use std::path::{Path, PathBuf};
//!
//! let settings = Settings::load(Path::new("settings.toml")).unwrap();
//! let files = vec![PathBuf::from("data/s01.safetensors")];
//!
//! let report = run_pipeline(&files, &settings, &CancelToken::new(), &mut |p| {
//!     println!("{}% {} {}", p.percent(), p.file, p.band);
//! });
//! assert!(!report.any_failed());
//! ```
//!
//! ## Running individual steps
//!
//! ```no_run
//! use eegseg::config::Normalization;
//! use eegseg::epoch::{tile_epochs, FixedWindow};
//! use eegseg::index::nearest_index;
//! use eegseg::recording::Recording;
//! use eegseg::timeline::Timeline;
//! use std::path::Path;
//!
//! let rec = Recording::load(Path::new("data/s01.safetensors")).unwrap();
//! let timeline = Timeline::reconstruct(&rec.marks, &rec.times).unwrap();
//!
//! let window = FixedWindow::from_ms(1000.0, None, rec.fs).unwrap();
//! for task in timeline.occurrences("task") {
//!     let a = nearest_index(&rec.times, rec.times[0] + task.start).unwrap();
//!     let b = nearest_index(&rec.times, rec.times[0] + task.end).unwrap();
//!     let segment = rec.signal.slice(ndarray::s![a..b, ..]);
//!     if let Some(stack) = tile_epochs(segment, window, Some(Normalization::Dc), "task") {
//!         println!("{} epochs of {:?}", stack.len(), (stack.n_samples(), stack.n_channels()));
//!     }
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod epoch;
pub mod error;
pub mod filter;
pub mod index;
pub mod io;
pub mod normalize;
pub mod output;
pub mod parameters;
pub mod pipeline;
pub mod postprocess;
pub mod preprocess;
pub mod recording;
pub mod reference;
pub mod resample;
pub mod segment;
pub mod timeline;

// ── Crate-root re-exports ─────────────────────────────────────────────────

// config
pub use config::{
    Band, BaselineWindow, FilterBand, Normalization, OutputConfig, ParametersConfig,
    PreprocessingConfig, SegmentationConfig, SegmentationMode, Settings, ThresholdConfig,
};

// error
pub use error::SegmentationError;

// recording + timeline
pub use recording::{LabelMap, Marks, Recording, RecordingSource, SafetensorsSource};
pub use timeline::{Catalog, Condition, Event, Timeline, NO_CONDITION, NULL_CONDITION};

// indexing, cutting, post-processing
pub use artifact::reject_noisy_epochs;
pub use epoch::{cut_event_epochs, tile_epochs, EpochStack, EventWindow, FixedWindow};
pub use index::{nearest_index, nearest_index_array};
pub use postprocess::{PostProcess, PostProcessReport};
pub use resample::resample_epochs;

// collaborators
pub use output::{FsOutputSink, OutputFlags, OutputKind, OutputSink, Payload};
pub use parameters::{ParameterComputer, ParameterSet, StandardParameters};
pub use preprocess::{FirPreprocessor, Preprocessor};

// orchestration
pub use pipeline::{run_pipeline, BatchReport, CancelToken, Pipeline, Progress};
pub use segment::{Combination, CombinationResult, Outcome, Segmenter};

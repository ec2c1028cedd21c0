//! Segmentation of one (recording, band) unit.
//!
//! Condition mode visits every selected condition; event mode every selected
//! (condition, event) pair.  Each such combination is handled on its own:
//!
//! ```text
//! locate occurrences ─► cut epochs per occurrence ─► concatenate
//!   ─► threshold ─► resample ─► save epochs ─► compute + save parameters
//! ```
//!
//! A combination ends as [`Outcome::Saved`], [`Outcome::Empty`] (nothing to
//! cut, not an error) or [`Outcome::Skipped`] (malformed marks, unknown
//! names, collaborator failures).  One combination's failure never stops the
//! next.
use ndarray::{s, Array2};

use crate::config::{Band, SegmentationConfig, SegmentationMode, Settings};
use crate::epoch::{cut_event_epochs, tile_epochs, EpochStack, EventWindow, FixedWindow};
use crate::error::{Result, SegmentationError};
use crate::index::{nearest_index, nearest_index_array};
use crate::normalize::channel_stats;
use crate::output::{OutputSink, Payload};
use crate::parameters::ParameterComputer;
use crate::postprocess::PostProcess;
use crate::recording::Recording;
use crate::timeline::{is_whole_recording, Timeline, NO_CONDITION, NULL_CONDITION};

/// One condition, or one (condition, event) pair in event mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Combination {
    pub condition: String,
    pub event: Option<String>,
}

impl Combination {
    /// `condition` or `condition_event`.
    pub fn label(&self) -> String {
        match &self.event {
            Some(evt) => format!("{}_{}", self.condition, evt),
            None => self.condition.clone(),
        }
    }
}

/// Combinations requested by `cfg`, in selection order.
///
/// Event mode with no selected event yields none.
pub fn combinations(cfg: &SegmentationConfig) -> Vec<Combination> {
    match cfg.mode {
        SegmentationMode::Condition { .. } => cfg
            .selected_conditions
            .iter()
            .map(|c| Combination { condition: c.clone(), event: None })
            .collect(),
        SegmentationMode::Event { .. } => cfg
            .selected_conditions
            .iter()
            .flat_map(|c| {
                cfg.selected_events
                    .iter()
                    .map(move |e| Combination { condition: c.clone(), event: Some(e.clone()) })
            })
            .collect(),
    }
}

/// Sample range `[start, end)` of every occurrence of `condition`.
///
/// Boundaries snap to the nearest sample.  An odd boundary count fails with
/// [`SegmentationError::MalformedMarks`].
pub fn condition_ranges(rec: &Recording, condition: &str) -> Result<Vec<(usize, usize)>> {
    let code = rec
        .marks
        .conditions
        .code_of(condition)
        .ok_or_else(|| SegmentationError::UnknownName { kind: "condition", name: condition.to_string() })?;
    let occurrences = rec.repaired_marks().condition_occurrences(code)?;
    occurrences
        .into_iter()
        .map(|(start, end)| {
            let a = nearest_index(&rec.times, start).ok_or(SegmentationError::EmptyTimeVector)?;
            let b = nearest_index(&rec.times, end).ok_or(SegmentationError::EmptyTimeVector)?;
            Ok((a, b))
        })
        .collect()
}

/// Cut the raw (not yet post-processed) epochs of one combination from
/// `signal`, a `[T, C]` signal sharing `rec`'s time vector.
///
/// `Ok(None)` when there is nothing to cut.  In event mode `"null"` takes
/// every instance of the event while `"no-condition"` takes only those
/// outside all labeled conditions.
pub fn cut(
    rec: &Recording,
    signal: &Array2<f64>,
    cfg: &SegmentationConfig,
    combo: &Combination,
) -> Result<Option<EpochStack>> {
    if signal.nrows() != rec.times.len() {
        return Err(SegmentationError::ShapeMismatch {
            expected: format!("{} samples", rec.times.len()),
            got: signal.nrows().to_string(),
        });
    }
    let t0 = rec.times.first().copied().ok_or(SegmentationError::EmptyTimeVector)?;
    let norm = cfg.normalization;
    let cond = combo.condition.as_str();

    match (&cfg.mode, &combo.event) {
        (SegmentationMode::Condition { trial_length_ms, trial_stride_pct }, _) => {
            let window = FixedWindow::from_ms(*trial_length_ms, *trial_stride_pct, rec.fs)?;
            if is_whole_recording(cond) {
                return Ok(tile_epochs(signal.view(), window, norm, cond));
            }
            let stacks = condition_ranges(rec, cond)?
                .into_iter()
                .filter_map(|(a, b)| {
                    let label = format!("{cond}@{:.3}s", rec.times[a] - t0);
                    tile_epochs(signal.slice(s![a..b.max(a), ..]), window, norm, &label)
                })
                .collect();
            EpochStack::concat(stacks)
        }
        (SegmentationMode::Event { .. }, None) => Ok(None),
        (SegmentationMode::Event { window_start_ms, window_end_ms, baseline }, Some(evt)) => {
            let window = EventWindow::from_ms(*window_start_ms, *window_end_ms, *baseline, rec.fs)?;
            let code = rec
                .marks
                .events
                .code_of(evt)
                .ok_or_else(|| SegmentationError::UnknownName { kind: "event", name: evt.clone() })?;

            let onset_groups: Vec<Vec<f64>> = match cond {
                NULL_CONDITION => vec![rec.marks.event_times(code)],
                // Only events the timeline leaves outside every labeled condition.
                NO_CONDITION => {
                    let timeline = Timeline::reconstruct(&rec.marks, &rec.times)?;
                    vec![timeline
                        .events_in(NO_CONDITION)
                        .filter(|e| e.name == *evt)
                        .map(|e| t0 + e.time)
                        .collect()]
                }
                _ => condition_ranges(rec, cond)?
                    .into_iter()
                    .map(|(a, b)| {
                        let (start, end) = (rec.times[a], rec.times[b]);
                        rec.marks
                            .events_in_range(code, start, end)
                            .into_iter()
                            .map(|i| rec.marks.events_times[i])
                            .collect()
                    })
                    .collect(),
            };

            let stacks = onset_groups
                .into_iter()
                .filter(|onsets| !onsets.is_empty())
                .filter_map(|onsets| {
                    let idx = nearest_index_array(&rec.times, &onsets);
                    let labels: Vec<String> =
                        onsets.iter().map(|t| format!("{cond}_{evt}@{:.3}s", t - t0)).collect();
                    cut_event_epochs(signal.view(), &idx, &labels, &window, norm)
                })
                .collect();
            EpochStack::concat(stacks)
        }
    }
}

/// How one combination ended.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Saved { epochs: usize, rejected: usize },
    Empty,
    Skipped { reason: String },
}

/// Result of one combination of one (recording, band) unit.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinationResult {
    pub combination: Combination,
    pub outcome: Outcome,
}

/// Runs every requested combination of one (recording, band) unit and
/// hands the results to the parameter and output collaborators.
pub struct Segmenter<'a> {
    settings: &'a Settings,
    compute: &'a dyn ParameterComputer,
    sink: &'a dyn OutputSink,
}

impl<'a> Segmenter<'a> {
    pub fn new(settings: &'a Settings, compute: &'a dyn ParameterComputer, sink: &'a dyn OutputSink) -> Self {
        Self { settings, compute, sink }
    }

    /// Segment `signal` (the band's version of `rec.signal`).
    ///
    /// Outputs are named `{base}_segmentation_{label}` and
    /// `{base}_parameters_{label}` for `band`.
    pub fn segment(&self, rec: &Recording, signal: &Array2<f64>, base: &str, band: &Band) -> Vec<CombinationResult> {
        let cfg = &self.settings.segmentation;
        let post = self.post_process(signal);

        combinations(cfg)
            .into_iter()
            .map(|combination| {
                let outcome = match self.run_one(rec, signal, base, band, &combination, &post) {
                    Ok(outcome) => outcome,
                    Err(err) => {
                        log::warn!("{base} [{}] {}: skipped: {err:#}", band.name, combination.label());
                        Outcome::Skipped { reason: format!("{err:#}") }
                    }
                };
                CombinationResult { combination, outcome }
            })
            .collect()
    }

    fn post_process(&self, signal: &Array2<f64>) -> PostProcess {
        let cfg = &self.settings.segmentation;
        let threshold = cfg.thresholding.map(|t| {
            let (mean, std) = channel_stats(signal.view());
            (t, mean, std)
        });
        let resample = cfg.resample_fs.map(|fs| (fs, cfg.mode.window_ms()));
        PostProcess { threshold, resample }
    }

    fn run_one(
        &self,
        rec: &Recording,
        signal: &Array2<f64>,
        base: &str,
        band: &Band,
        combination: &Combination,
        post: &PostProcess,
    ) -> anyhow::Result<Outcome> {
        let label = combination.label();
        let Some(raw) = cut(rec, signal, &self.settings.segmentation, combination)? else {
            log::info!("{base} [{}] {label}: no epochs", band.name);
            return Ok(Outcome::Empty);
        };

        let (stack, report) = post.run(raw)?;
        let Some(stack) = stack else {
            log::info!("{base} [{}] {label}: all {} epochs rejected", band.name, report.epochs_in);
            return Ok(Outcome::Empty);
        };
        log::info!(
            "{base} [{}] {label}: {} epochs kept, {} rejected",
            band.name,
            stack.len(),
            report.rejected.len()
        );

        let fs = if report.resampled {
            self.settings.segmentation.resample_fs.unwrap_or(rec.fs)
        } else {
            rec.fs
        };

        self.sink.save(Payload::Epochs(&stack), &format!("{base}_segmentation_{label}"), &band.name)?;
        let params = self.compute.compute(&stack, self.settings, fs, band)?;
        self.sink.save(Payload::Parameters(&params), &format!("{base}_parameters_{label}"), &band.name)?;

        Ok(Outcome::Saved { epochs: stack.len(), rejected: report.rejected.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_join_condition_and_event() {
        let c = Combination { condition: "task".into(), event: Some("stim".into()) };
        assert_eq!(c.label(), "task_stim");
        assert_eq!(Combination { condition: "rest".into(), event: None }.label(), "rest");
    }

    #[test]
    fn event_mode_pairs_every_condition_with_every_event() {
        let cfg = SegmentationConfig {
            mode: SegmentationMode::Event { window_start_ms: 0.0, window_end_ms: 100.0, baseline: None },
            selected_conditions: vec!["a".into(), "b".into()],
            selected_events: vec!["x".into(), "y".into()],
            ..SegmentationConfig::default()
        };
        let labels: Vec<String> = combinations(&cfg).iter().map(Combination::label).collect();
        assert_eq!(labels, vec!["a_x", "a_y", "b_x", "b_y"]);
    }

    #[test]
    fn event_mode_without_events_has_no_combinations() {
        let cfg = SegmentationConfig {
            mode: SegmentationMode::Event { window_start_ms: 0.0, window_end_ms: 100.0, baseline: None },
            selected_conditions: vec!["task".into()],
            ..SegmentationConfig::default()
        };
        assert!(combinations(&cfg).is_empty());
    }
}

mod common;
use common::{marks, recording, MemorySink};
use eegseg::config::{Band, SegmentationMode, Settings, ThresholdConfig};
use eegseg::epoch::EpochStack;
use eegseg::output::OutputKind;
use eegseg::parameters::{ParameterComputer, ParameterSet, StandardParameters};
use eegseg::recording::Recording;
use eegseg::segment::{Outcome, Segmenter};
use ndarray::s;
use std::cell::RefCell;

fn broadband() -> Band {
    Band::new(Band::BROADBAND, 1.0, 40.0)
}

fn settings(conditions: &[&str]) -> Settings {
    let mut s = Settings::default();
    s.segmentation.mode = SegmentationMode::Condition { trial_length_ms: 1000.0, trial_stride_pct: None };
    s.segmentation.selected_conditions = conditions.iter().map(|c| c.to_string()).collect();
    s.parameters.statistics.mean = true;
    s.parameters.statistics.variance = true;
    s
}

/// Task at 10-20 s, rest at 30-40 s, stim events inside both.
fn rec() -> Recording {
    let m = marks(
        0.0,
        &[("task", 1, &[(10.0, 20.0)]), ("rest", 2, &[(30.0, 40.0)])],
        &[("stim", 7, &[12.0, 15.0, 33.0])],
    );
    recording(100.0, 60.0, 2, 0.0, m)
}

/// Records the sampling rate it is called with.
#[derive(Default)]
struct FsRecorder {
    seen: RefCell<Vec<f64>>,
}

impl ParameterComputer for FsRecorder {
    fn compute(&self, _: &EpochStack, _: &Settings, fs: f64, _: &Band) -> anyhow::Result<ParameterSet> {
        self.seen.borrow_mut().push(fs);
        Ok(ParameterSet::new())
    }
}

/// Fails on the first call only.
#[derive(Default)]
struct FailOnce {
    calls: RefCell<usize>,
}

impl ParameterComputer for FailOnce {
    fn compute(&self, _: &EpochStack, _: &Settings, _: f64, _: &Band) -> anyhow::Result<ParameterSet> {
        let mut calls = self.calls.borrow_mut();
        *calls += 1;
        if *calls == 1 {
            anyhow::bail!("numerical failure");
        }
        Ok(ParameterSet::new())
    }
}

#[test]
fn event_mode_without_selected_events_does_nothing() {
    let mut s = settings(&["task"]);
    s.segmentation.mode = SegmentationMode::Event { window_start_ms: -100.0, window_end_ms: 400.0, baseline: None };
    let sink = MemorySink::default();
    let rec = rec();

    let results = Segmenter::new(&s, &StandardParameters, &sink).segment(&rec, &rec.signal, "s01", &broadband());
    assert!(results.is_empty());
    assert!(sink.saved.borrow().is_empty());
}

#[test]
fn saves_epochs_then_parameters_per_combination() {
    let s = settings(&["task", "rest"]);
    let sink = MemorySink::default();
    let rec = rec();

    let results = Segmenter::new(&s, &StandardParameters, &sink).segment(&rec, &rec.signal, "s01", &broadband());
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r.outcome == Outcome::Saved { epochs: 10, rejected: 0 }));

    let saved: Vec<(OutputKind, String)> =
        sink.saved.borrow().iter().map(|s| (s.kind, s.base.clone())).collect();
    assert_eq!(
        saved,
        vec![
            (OutputKind::Seg, "s01_segmentation_task".to_string()),
            (OutputKind::Param, "s01_parameters_task".to_string()),
            (OutputKind::Seg, "s01_segmentation_rest".to_string()),
            (OutputKind::Param, "s01_parameters_rest".to_string()),
        ]
    );
    assert!(sink.saved.borrow().iter().all(|s| s.band == "broadband"));
    assert!(sink.of_kind(OutputKind::Param).iter().all(|p| p.size == 2));
}

#[test]
fn event_combinations_are_named_condition_event() {
    let mut s = settings(&["task", "rest"]);
    s.segmentation.mode = SegmentationMode::Event { window_start_ms: -100.0, window_end_ms: 400.0, baseline: None };
    s.segmentation.selected_events = vec!["stim".into()];
    let sink = MemorySink::default();
    let rec = rec();

    let results = Segmenter::new(&s, &StandardParameters, &sink).segment(&rec, &rec.signal, "s01", &broadband());
    let epochs: Vec<(String, Outcome)> =
        results.into_iter().map(|r| (r.combination.label(), r.outcome)).collect();
    assert_eq!(
        epochs,
        vec![
            ("task_stim".to_string(), Outcome::Saved { epochs: 2, rejected: 0 }),
            ("rest_stim".to_string(), Outcome::Saved { epochs: 1, rejected: 0 }),
        ]
    );
    let seg = sink.of_kind(OutputKind::Seg);
    assert_eq!(seg[0].base, "s01_segmentation_task_stim");
    assert_eq!(seg[0].size, 2);
}

#[test]
fn bad_combinations_are_skipped_and_the_rest_continue() {
    let mut m = marks(0.0, &[("task", 1, &[(10.0, 20.0)]), ("rest", 2, &[(30.0, 40.0)])], &[]);
    // A third "rest" boundary leaves that condition unpaired.
    m.conditions_labels.push(2);
    m.conditions_times.push(45.0);
    let rec = recording(100.0, 60.0, 2, 0.0, m);
    let s = settings(&["rest", "sleep", "task"]);
    let sink = MemorySink::default();

    let results = Segmenter::new(&s, &StandardParameters, &sink).segment(&rec, &rec.signal, "s01", &broadband());
    assert!(matches!(&results[0].outcome, Outcome::Skipped { reason } if reason.contains("malformed")));
    assert!(matches!(&results[1].outcome, Outcome::Skipped { reason } if reason.contains("sleep")));
    assert_eq!(results[2].outcome, Outcome::Saved { epochs: 10, rejected: 0 });
    assert_eq!(sink.of_kind(OutputKind::Seg).len(), 1);
}

#[test]
fn too_short_condition_is_empty_not_an_error() {
    let rec = recording(100.0, 30.0, 2, 0.0, marks(0.0, &[("blink", 3, &[(5.0, 5.4)])], &[]));
    let s = settings(&["blink"]);
    let sink = MemorySink::default();

    let results = Segmenter::new(&s, &StandardParameters, &sink).segment(&rec, &rec.signal, "s01", &broadband());
    assert_eq!(results[0].outcome, Outcome::Empty);
    assert!(sink.saved.borrow().is_empty());
}

#[test]
fn parameter_failure_only_skips_its_own_combination() {
    let s = settings(&["task", "rest"]);
    let sink = MemorySink::default();
    let compute = FailOnce::default();
    let rec = rec();

    let results = Segmenter::new(&s, &compute, &sink).segment(&rec, &rec.signal, "s01", &broadband());
    assert!(matches!(results[0].outcome, Outcome::Skipped { .. }));
    assert_eq!(results[1].outcome, Outcome::Saved { epochs: 10, rejected: 0 });
    // The failed combination's epochs were already written; its parameters were not.
    assert_eq!(sink.of_kind(OutputKind::Seg).len(), 2);
    assert_eq!(sink.of_kind(OutputKind::Param).len(), 1);
}

#[test]
fn thresholding_and_resampling_reach_the_parameters() {
    let rec = rec();
    let mut signal = rec.signal.clone();
    // One spike burst inside the fifth task epoch.
    signal.slice_mut(s![1500..1520, ..]).fill(100.0);

    let mut s = settings(&["task"]);
    s.segmentation.thresholding = Some(ThresholdConfig { k: 3.0, n_samples: 5, n_channels: 1 });
    s.segmentation.resample_fs = Some(50.0);
    let sink = MemorySink::default();
    let recorder = FsRecorder::default();

    let results = Segmenter::new(&s, &recorder, &sink).segment(&rec, &signal, "s01", &broadband());
    assert_eq!(results[0].outcome, Outcome::Saved { epochs: 9, rejected: 1 });
    assert_eq!(*recorder.seen.borrow(), vec![50.0]);
}

mod common;
use common::{marks, recording};
use eegseg::config::{BaselineWindow, Normalization, SegmentationConfig, SegmentationMode};
use eegseg::epoch::{cut_event_epochs, tile_epochs, EventWindow, FixedWindow};
use eegseg::error::SegmentationError;
use eegseg::segment::{cut, Combination};
use eegseg::recording::{Marks, Recording};
use eegseg::{NO_CONDITION, NULL_CONDITION};
use ndarray::{s, Array2, Axis};

fn condition_cfg(trial_length_ms: f64, stride: Option<f64>) -> SegmentationConfig {
    SegmentationConfig {
        mode: SegmentationMode::Condition { trial_length_ms, trial_stride_pct: stride },
        ..SegmentationConfig::default()
    }
}

fn event_cfg(start: f64, end: f64, baseline: Option<BaselineWindow>) -> SegmentationConfig {
    SegmentationConfig {
        mode: SegmentationMode::Event { window_start_ms: start, window_end_ms: end, baseline },
        ..SegmentationConfig::default()
    }
}

fn combo(condition: &str, event: Option<&str>) -> Combination {
    Combination { condition: condition.into(), event: event.map(String::from) }
}

// ── Condition mode ───────────────────────────────────────────────────────────

#[test]
fn forty_second_task_at_250_hz_gives_forty_epochs() {
    let rec = recording(250.0, 100.0, 4, 0.0, marks(0.0, &[("task", 1, &[(20.0, 60.0)])], &[]));
    let stack = cut(&rec, &rec.signal, &condition_cfg(1000.0, None), &combo("task", None))
        .unwrap()
        .unwrap();

    assert_eq!(stack.data.dim(), (40, 250, 4));
    // Epochs are contiguous slices of the task, in order.
    assert_eq!(stack.epoch(0), rec.signal.slice(s![5000..5250, ..]));
    assert_eq!(stack.epoch(39), rec.signal.slice(s![14750..15000, ..]));
    assert_eq!(stack.labels[0], "task@20.000s_0");
}

#[test]
fn epoch_count_sums_over_occurrences() {
    let m = marks(50.0, &[("task", 1, &[(10.0, 14.5), (30.0, 33.2)]), ("rest", 2, &[(15.0, 25.0)])], &[]);
    let rec = recording(100.0, 60.0, 3, 50.0, m);
    let stack = cut(&rec, &rec.signal, &condition_cfg(1000.0, None), &combo("task", None))
        .unwrap()
        .unwrap();

    // 450 samples → 4 epochs, 320 samples → 3 epochs; remainders dropped.
    assert_eq!(stack.len(), 7);
    assert_eq!(stack.labels.iter().filter(|l| l.starts_with("task@10.000s")).count(), 4);
    assert_eq!(stack.labels.iter().filter(|l| l.starts_with("task@30.000s")).count(), 3);
}

#[test]
fn whole_recording_is_tiled_with_stride() {
    let rec = recording(100.0, 10.0, 2, 0.0, marks(0.0, &[("task", 1, &[(2.0, 4.0)])], &[]));
    for name in [NO_CONDITION, "null"] {
        let stack = cut(&rec, &rec.signal, &condition_cfg(1000.0, Some(50.0)), &combo(name, None))
            .unwrap()
            .unwrap();
        // 1001 samples, 100-sample epochs every 50 samples.
        assert_eq!(stack.len(), 19);
        assert_eq!(stack.epoch(1), rec.signal.slice(s![50..150, ..]));
    }
}

#[test]
fn occurrence_shorter_than_one_epoch_yields_nothing() {
    let rec = recording(100.0, 10.0, 2, 0.0, marks(0.0, &[("task", 1, &[(2.0, 2.5)])], &[]));
    let out = cut(&rec, &rec.signal, &condition_cfg(1000.0, None), &combo("task", None)).unwrap();
    assert!(out.is_none());
}

#[test]
fn z_normalised_tiles_have_zero_mean_unit_std() {
    let rec = recording(100.0, 10.0, 3, 0.0, marks(0.0, &[], &[]));
    let cfg = SegmentationConfig { normalization: Some(Normalization::Z), ..condition_cfg(500.0, None) };
    let stack = cut(&rec, &rec.signal, &cfg, &combo(NO_CONDITION, None)).unwrap().unwrap();

    for epoch in stack.data.outer_iter() {
        for col in epoch.axis_iter(Axis(1)) {
            approx::assert_abs_diff_eq!(col.mean().unwrap(), 0.0, epsilon = 1e-9);
            approx::assert_abs_diff_eq!(col.std(0.0), 1.0, epsilon = 1e-9);
        }
    }
}

#[test]
fn unknown_condition_and_malformed_marks_are_errors() {
    let mut m = marks(0.0, &[("task", 1, &[(1.0, 2.0)])], &[]);
    m.conditions_labels.push(1);
    m.conditions_times.push(5.0);
    let rec = recording(100.0, 10.0, 2, 0.0, m);
    let cfg = condition_cfg(100.0, None);

    assert!(matches!(
        cut(&rec, &rec.signal, &cfg, &combo("task", None)),
        Err(SegmentationError::MalformedMarks { code: 1, count: 3 })
    ));
    assert!(matches!(
        cut(&rec, &rec.signal, &cfg, &combo("sleep", None)),
        Err(SegmentationError::UnknownName { kind: "condition", .. })
    ));
}

#[test]
fn signal_must_match_the_time_vector() {
    let rec = recording(100.0, 10.0, 2, 0.0, marks(0.0, &[], &[]));
    let short = Array2::<f64>::zeros((10, 2));
    assert!(matches!(
        cut(&rec, &short, &condition_cfg(100.0, None), &combo(NO_CONDITION, None)),
        Err(SegmentationError::ShapeMismatch { .. })
    ));
}

#[test]
fn recording_without_samples_is_an_error() {
    let rec = Recording {
        signal: Array2::zeros((0, 2)),
        fs: 100.0,
        times: vec![],
        channels: vec![],
        marks: Marks::default(),
    };
    for c in [combo(NO_CONDITION, None), combo("task", None)] {
        assert!(matches!(
            cut(&rec, &rec.signal, &condition_cfg(100.0, None), &c),
            Err(SegmentationError::EmptyTimeVector)
        ));
    }
}

// ── Event mode ───────────────────────────────────────────────────────────────

#[test]
fn five_onsets_give_five_event_epochs() {
    let onsets = [2.0, 4.0, 6.0, 8.0, 10.0];
    let rec = recording(100.0, 20.0, 3, 0.0, marks(0.0, &[], &[("stim", 9, &onsets)]));
    let stack = cut(&rec, &rec.signal, &event_cfg(-200.0, 800.0, None), &combo(NO_CONDITION, Some("stim")))
        .unwrap()
        .unwrap();

    assert_eq!(stack.data.dim(), (5, 100, 3));
    // Window starts 20 samples before the onset at sample 200.
    assert_eq!(stack.epoch(0), rec.signal.slice(s![180..280, ..]));
    assert_eq!(stack.labels[4], "no-condition_stim@10.000s");
}

#[test]
fn only_events_inside_the_condition_are_cut() {
    let m = marks(
        100.0,
        &[("task", 1, &[(5.0, 15.0)])],
        &[("stim", 9, &[1.0, 6.0, 9.0, 14.0, 18.0]), ("resp", 10, &[7.0])],
    );
    let rec = recording(100.0, 20.0, 2, 100.0, m);
    let stack = cut(&rec, &rec.signal, &event_cfg(0.0, 500.0, None), &combo("task", Some("stim")))
        .unwrap()
        .unwrap();
    assert_eq!(stack.labels, vec!["task_stim@6.000s", "task_stim@9.000s", "task_stim@14.000s"]);
}

#[test]
fn no_condition_keeps_events_outside_labeled_conditions() {
    let m = marks(0.0, &[("task", 1, &[(10.0, 20.0)])], &[("stim", 9, &[5.0, 12.0, 15.0, 30.0])]);
    let rec = recording(100.0, 40.0, 2, 0.0, m);
    let cfg = event_cfg(0.0, 500.0, None);

    let outside = cut(&rec, &rec.signal, &cfg, &combo(NO_CONDITION, Some("stim"))).unwrap().unwrap();
    assert_eq!(outside.labels, vec!["no-condition_stim@5.000s", "no-condition_stim@30.000s"]);

    // "null" still means every instance in the recording.
    let all = cut(&rec, &rec.signal, &cfg, &combo(NULL_CONDITION, Some("stim"))).unwrap().unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all.labels[1], "null_stim@12.000s");
}

#[test]
fn windows_outside_the_signal_are_skipped() {
    let rec = recording(100.0, 10.0, 2, 0.0, marks(0.0, &[], &[("stim", 9, &[0.1, 5.0, 9.9])]));
    let stack = cut(&rec, &rec.signal, &event_cfg(-200.0, 800.0, None), &combo(NO_CONDITION, Some("stim")))
        .unwrap()
        .unwrap();
    assert_eq!(stack.len(), 1);
    assert_eq!(stack.labels[0], "no-condition_stim@5.000s");
}

#[test]
fn no_matching_event_is_empty_and_unknown_event_is_an_error() {
    let m = marks(0.0, &[("task", 1, &[(1.0, 3.0)])], &[("stim", 9, &[8.0])]);
    let rec = recording(100.0, 10.0, 2, 0.0, m);
    let cfg = event_cfg(0.0, 100.0, None);

    assert!(cut(&rec, &rec.signal, &cfg, &combo("task", Some("stim"))).unwrap().is_none());
    assert!(matches!(
        cut(&rec, &rec.signal, &cfg, &combo("task", Some("blink"))),
        Err(SegmentationError::UnknownName { kind: "event", .. })
    ));
}

#[test]
fn dc_baseline_zeroes_the_pre_onset_mean() {
    let rec = recording(100.0, 10.0, 3, 0.0, marks(0.0, &[], &[("stim", 9, &[3.0, 6.0])]));
    let cfg = SegmentationConfig {
        normalization: Some(Normalization::Dc),
        ..event_cfg(-200.0, 800.0, Some(BaselineWindow { start_ms: -200.0, end_ms: 0.0 }))
    };
    let stack = cut(&rec, &rec.signal, &cfg, &combo(NO_CONDITION, Some("stim"))).unwrap().unwrap();

    for epoch in stack.data.outer_iter() {
        let baseline_mean = epoch.slice(s![..20, ..]).mean_axis(Axis(0)).unwrap();
        for m in baseline_mean.iter() {
            approx::assert_abs_diff_eq!(*m, 0.0, epsilon = 1e-9);
        }
    }
}

// ── Low-level cutters ────────────────────────────────────────────────────────

#[test]
fn tiling_drops_the_remainder() {
    let signal = Array2::from_shape_fn((1050, 2), |(t, _)| t as f64);
    let window = FixedWindow::from_ms(1000.0, None, 100.0).unwrap();
    let stack = tile_epochs(signal.view(), window, None, "x").unwrap();
    assert_eq!(stack.len(), 10);
    assert_eq!(stack.data[[9, 99, 0]], 999.0);
}

#[test]
fn degenerate_z_baseline_leaves_the_epoch_raw() {
    let mut signal = Array2::<f64>::from_elem((300, 2), 4.0);
    signal.slice_mut(s![150.., ..]).fill(7.0);
    let window = EventWindow::from_ms(
        -100.0,
        100.0,
        Some(BaselineWindow { start_ms: -100.0, end_ms: 0.0 }),
        100.0,
    )
    .unwrap();
    let labels = vec!["a".to_string()];
    let stack = cut_event_epochs(signal.view(), &[150], &labels, &window, Some(Normalization::Z)).unwrap();
    assert_eq!(stack.epoch(0), signal.slice(s![140..160, ..]));
}

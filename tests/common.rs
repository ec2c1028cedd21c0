/// Shared helpers: synthetic recordings and an in-memory output sink.
use eegseg::output::{OutputKind, OutputSink, Payload};
use eegseg::recording::{Marks, Recording};
use ndarray::Array2;
use std::cell::RefCell;
use std::path::PathBuf;

/// Deterministic zero-mean pseudo-noise in [-1, 1), `[n, c]`.
#[allow(unused)]
pub fn noise(n: usize, c: usize, seed: u64) -> Array2<f64> {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    Array2::from_shape_fn((n, c), |_| {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 11) as f64 / (1u64 << 53) as f64) * 2.0 - 1.0
    })
}

/// Marks from named conditions with relative `(start, end)` intervals and
/// named events with relative times; all shifted by `t0`.
#[allow(unused)]
pub fn marks(t0: f64, conditions: &[(&str, i64, &[(f64, f64)])], events: &[(&str, i64, &[f64])]) -> Marks {
    let mut m = Marks::default();

    let mut bounds: Vec<(f64, f64, i64)> = conditions
        .iter()
        .flat_map(|&(_, code, intervals)| intervals.iter().map(move |&(a, b)| (a, b, code)))
        .collect();
    bounds.sort_by(|x, y| x.0.total_cmp(&y.0));
    for (a, b, code) in bounds {
        m.conditions_labels.extend([code, code]);
        m.conditions_times.extend([t0 + a, t0 + b]);
    }

    let mut instants: Vec<(f64, i64)> = events
        .iter()
        .flat_map(|&(_, code, times)| times.iter().map(move |&t| (t, code)))
        .collect();
    instants.sort_by(|x, y| x.0.total_cmp(&y.0));
    for (t, code) in instants {
        m.events_labels.push(code);
        m.events_times.push(t0 + t);
    }

    for &(name, code, _) in conditions {
        m.conditions.insert(name, code);
    }
    for &(name, code, _) in events {
        m.events.insert(name, code);
    }
    m
}

/// A noise recording of `duration_s` seconds (`duration_s * fs + 1` samples)
/// starting at `t0`.
#[allow(unused)]
pub fn recording(fs: f64, duration_s: f64, n_channels: usize, t0: f64, marks: Marks) -> Recording {
    let n = (duration_s * fs).round() as usize + 1;
    Recording::from_signal(noise(n, n_channels, 7), fs, t0, marks).unwrap()
}

/// One persisted output.
#[allow(unused)]
#[derive(Debug, Clone, PartialEq)]
pub struct Saved {
    pub kind: OutputKind,
    pub base: String,
    pub band: String,
    /// Epoch count (segmented), key count (parameters), sample count (preprocessed).
    pub size: usize,
}

/// Records every save instead of writing files.
#[allow(unused)]
#[derive(Default)]
pub struct MemorySink {
    pub saved: RefCell<Vec<Saved>>,
}

#[allow(unused)]
impl MemorySink {
    pub fn of_kind(&self, kind: OutputKind) -> Vec<Saved> {
        self.saved.borrow().iter().filter(|s| s.kind == kind).cloned().collect()
    }
}

impl OutputSink for MemorySink {
    fn save(&self, payload: Payload<'_>, base: &str, band: &str) -> anyhow::Result<Option<PathBuf>> {
        let size = match payload {
            Payload::Preprocessed(rec) => rec.n_samples(),
            Payload::Epochs(stack) => stack.len(),
            Payload::Parameters(params) => params.len(),
        };
        self.saved.borrow_mut().push(Saved {
            kind: payload.kind(),
            base: base.to_string(),
            band: band.to_string(),
            size,
        });
        Ok(None)
    }
}

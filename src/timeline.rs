//! Condition/event timeline reconstruction.
//!
//! Turns the raw boundary/event label arrays of a recording into two ordered
//! tables:
//!
//! * **conditions**: named, non-overlapping intervals that together cover
//!   `[0, duration]` exactly.  Any span not claimed by a labeled condition
//!   becomes a synthesized [`NO_CONDITION`] interval.
//! * **events**: named instants, each owned by the condition interval it
//!   falls in (boundaries inclusive).
//!
//! All times are relative to the first sample of the recording.
use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::{Result, SegmentationError};
use crate::recording::Marks;

/// Name of the synthesized filler condition.
pub const NO_CONDITION: &str = "no-condition";

/// Selection name for the whole recording.
///
/// In condition mode it tiles the same span as [`NO_CONDITION`]; in event
/// mode it selects every instance of the event.
pub const NULL_CONDITION: &str = "null";

/// `true` for the condition-mode selection names that tile the whole recording.
pub fn is_whole_recording(name: &str) -> bool {
    name == NO_CONDITION || name == NULL_CONDITION
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub name: String,
    pub start: f64,
    pub end: f64,
}

impl Condition {
    pub fn new(name: impl Into<String>, start: f64, end: f64) -> Self {
        Self { name: name.into(), start, end }
    }

    /// Inclusive on both ends.
    pub fn contains(&self, t: f64) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }

    pub fn is_filler(&self) -> bool {
        self.name == NO_CONDITION
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub name: String,
    pub time: f64,
    /// Name of the condition interval containing `time`.
    pub condition: String,
}

/// Reconstructed conditions and events of one recording.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeline {
    pub duration: f64,
    /// Sorted by start, gapless, non-overlapping.
    pub conditions: Vec<Condition>,
    /// In marker order.
    pub events: Vec<Event>,
}

impl Timeline {
    /// Rebuild the timeline from raw marks and the recording's time vector.
    ///
    /// An unterminated final condition is closed at the last timestamp.
    /// Fails on unknown codes, mismatched boundary pairs, reversed or
    /// overlapping labeled intervals.
    pub fn reconstruct(marks: &Marks, times: &[f64]) -> Result<Self> {
        let (t0, t_last) = match (times.first(), times.last()) {
            (Some(&a), Some(&b)) => (a, b),
            _ => return Err(SegmentationError::EmptyTimeVector),
        };
        let duration = t_last - t0;
        let marks = marks.repaired(t_last);

        let labels = &marks.conditions_labels;
        if labels.len() % 2 != 0 {
            let code = labels[labels.len() - 1];
            let count = labels.iter().filter(|&&l| l == code).count();
            return Err(SegmentationError::MalformedMarks { code, count });
        }

        let mut labeled = Vec::with_capacity(labels.len() / 2);
        for (i, (codes, bounds)) in labels
            .chunks_exact(2)
            .zip(marks.conditions_times.chunks_exact(2))
            .enumerate()
        {
            if codes[0] != codes[1] {
                return Err(SegmentationError::PairMismatch { index: i, start: codes[0], end: codes[1] });
            }
            let name = marks
                .conditions
                .name_of(codes[0])
                .ok_or(SegmentationError::UnknownLabel { kind: "condition", code: codes[0] })?;
            let start = (bounds[0] - t0).clamp(0.0, duration);
            let end = (bounds[1] - t0).clamp(0.0, duration);
            if end < start {
                return Err(SegmentationError::ReversedInterval { name: name.to_string(), start, end });
            }
            labeled.push(Condition::new(name, start, end));
        }
        labeled.sort_by(|a, b| a.start.total_cmp(&b.start));

        for pair in labeled.windows(2) {
            if pair[1].start < pair[0].end {
                return Err(SegmentationError::OverlappingConditions {
                    first: pair[0].name.clone(),
                    second: pair[1].name.clone(),
                });
            }
        }

        let gaps = null_condition_gaps(&labeled, duration);
        let mut conditions = labeled;
        conditions.extend(gaps);
        conditions.sort_by(|a, b| a.start.total_cmp(&b.start));

        let mut events = Vec::with_capacity(marks.events_labels.len());
        for (&code, &t) in marks.events_labels.iter().zip(&marks.events_times) {
            let name = marks
                .events
                .name_of(code)
                .ok_or(SegmentationError::UnknownLabel { kind: "event", code })?;
            let rel = t - t0;
            // Labeled intervals win over filler on a shared boundary; among
            // labeled ones the earlier-sorted interval wins.
            let owner = conditions
                .iter()
                .find(|c| !c.is_filler() && c.contains(rel))
                .or_else(|| conditions.iter().find(|c| c.contains(rel)))
                .map(|c| c.name.as_str())
                .unwrap_or(NO_CONDITION);
            events.push(Event { name: name.to_string(), time: rel, condition: owner.to_string() });
        }

        Ok(Self { duration, conditions, events })
    }

    /// Sorted, de-duplicated condition names (including the filler if present).
    pub fn condition_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.conditions.iter().map(|c| c.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Sorted, de-duplicated event names.
    pub fn event_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.events.iter().map(|e| e.name.clone()).collect();
        names.sort();
        names.dedup();
        names
    }

    /// Every interval carrying `name`.
    pub fn occurrences<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Condition> + 'a {
        self.conditions.iter().filter(move |c| c.name == name)
    }

    /// Events owned by `condition`.
    pub fn events_in<'a>(&'a self, condition: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| e.condition == condition)
    }
}

/// Intervals of `[0, duration]` not covered by `sorted` (ascending by start,
/// non-overlapping).  With no conditions the whole recording is one gap.
pub fn null_condition_gaps(sorted: &[Condition], duration: f64) -> Vec<Condition> {
    let (first, last) = match (sorted.first(), sorted.last()) {
        (Some(f), Some(l)) => (f, l),
        _ => return vec![Condition::new(NO_CONDITION, 0.0, duration)],
    };

    let mut gaps = Vec::new();
    if first.start > 0.0 {
        gaps.push(Condition::new(NO_CONDITION, 0.0, first.start));
    }
    for pair in sorted.windows(2) {
        if pair[1].start > pair[0].end {
            gaps.push(Condition::new(NO_CONDITION, pair[0].end, pair[1].start));
        }
    }
    if last.end < duration {
        gaps.push(Condition::new(NO_CONDITION, last.end, duration));
    }
    gaps
}

/// Condition and event names gathered across several recordings, with
/// occurrence counts, for populating selection lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Catalog {
    /// Condition name → number of intervals.
    pub conditions: BTreeMap<String, usize>,
    /// Event name → number of instants.
    pub events: BTreeMap<String, usize>,
    /// Condition name → event name → number of instants owned.
    pub events_by_condition: BTreeMap<String, BTreeMap<String, usize>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, timeline: &Timeline) {
        for c in &timeline.conditions {
            *self.conditions.entry(c.name.clone()).or_default() += 1;
        }
        for e in &timeline.events {
            *self.events.entry(e.name.clone()).or_default() += 1;
            *self
                .events_by_condition
                .entry(e.condition.clone())
                .or_default()
                .entry(e.name.clone())
                .or_default() += 1;
        }
    }

    pub fn condition_names(&self) -> Vec<&str> {
        self.conditions.keys().map(String::as_str).collect()
    }

    pub fn event_names(&self) -> Vec<&str> {
        self.events.keys().map(String::as_str).collect()
    }
}

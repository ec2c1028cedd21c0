//! Typed failures raised by the timeline, indexing, cutting and
//! post-processing stages.
//!
//! Collaborator seams (loading, preprocessing, parameter computation,
//! output) return `anyhow::Result` instead; the orchestrator and the batch
//! driver turn both kinds into a logged skip.
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SegmentationError {
    /// A condition code appears an odd number of times in the boundary labels.
    #[error("malformed marks: condition label {code} has {count} boundaries (expected an even count)")]
    MalformedMarks { code: i64, count: usize },

    /// A start/end pair whose two codes differ.
    #[error("malformed marks: boundary pair {index} opens with {start} but closes with {end}")]
    PairMismatch { index: usize, start: i64, end: i64 },

    #[error("condition '{name}' ends ({end}s) before it starts ({start}s)")]
    ReversedInterval { name: String, start: f64, end: f64 },

    #[error("conditions '{first}' and '{second}' overlap")]
    OverlappingConditions { first: String, second: String },

    #[error("unknown {kind} label {code}")]
    UnknownLabel { kind: &'static str, code: i64 },

    #[error("unknown {kind} name '{name}'")]
    UnknownName { kind: &'static str, name: String },

    /// Zero-variance baseline during z-score normalisation.
    #[error("degenerate baseline: channel {channel} has zero variance")]
    DegenerateBaseline { channel: usize },

    #[error("time vector is empty")]
    EmptyTimeVector,

    #[error("shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SegmentationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_marks_message_names_the_label() {
        let err = SegmentationError::MalformedMarks { code: 7, count: 3 };
        let msg = err.to_string();
        assert!(msg.contains('7'));
        assert!(msg.contains('3'));
    }
}

//! Output persistence.
//!
//! Fixed layout below the output directory:
//!
//! ```text
//! <dir>/Preprocessed_signals/{file}_preprocessing_{band}.safetensors
//! <dir>/Segmented_signals/{file}_segmentation_{condition}[_{event}]_{band}.safetensors
//! <dir>/Signal_parameters/{file}_parameters_{condition}[_{event}]_{band}.safetensors
//! ```
//!
//! Every file is written to a temporary sibling and renamed into place, so
//! an interrupted run never leaves a half-written output behind.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::OutputConfig;
use crate::epoch::EpochStack;
use crate::io::StWriter;
use crate::parameters::ParameterSet;
use crate::recording::Recording;

pub const EXTENSION: &str = "safetensors";

/// The three output families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputKind {
    Prep,
    Seg,
    Param,
}

impl OutputKind {
    pub fn folder(self) -> &'static str {
        match self {
            OutputKind::Prep => "Preprocessed_signals",
            OutputKind::Seg => "Segmented_signals",
            OutputKind::Param => "Signal_parameters",
        }
    }

    /// File stem for `base` and `band`.
    pub fn file_stem(self, base: &str, band: &str) -> String {
        match self {
            OutputKind::Prep => format!("{base}_preprocessing_{band}"),
            OutputKind::Seg | OutputKind::Param => format!("{base}_{band}"),
        }
    }
}

/// What to persist.
#[derive(Debug, Clone, Copy)]
pub enum Payload<'a> {
    Preprocessed(&'a Recording),
    Epochs(&'a EpochStack),
    Parameters(&'a ParameterSet),
}

impl Payload<'_> {
    pub fn kind(&self) -> OutputKind {
        match self {
            Payload::Preprocessed(_) => OutputKind::Prep,
            Payload::Epochs(_) => OutputKind::Seg,
            Payload::Parameters(_) => OutputKind::Param,
        }
    }
}

/// Which output families are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFlags {
    pub prep: bool,
    pub seg: bool,
    pub param: bool,
}

impl OutputFlags {
    pub fn enabled(&self, kind: OutputKind) -> bool {
        match kind {
            OutputKind::Prep => self.prep,
            OutputKind::Seg => self.seg,
            OutputKind::Param => self.param,
        }
    }
}

impl From<&OutputConfig> for OutputFlags {
    fn from(cfg: &OutputConfig) -> Self {
        Self { prep: cfg.save_preprocessed, seg: cfg.save_segmented, param: cfg.save_parameters }
    }
}

/// Persistence seam for the orchestrator and the batch driver.
pub trait OutputSink {
    /// Persist `payload` under `base` for `band`.
    ///
    /// Returns the written path, or `None` when that output kind is disabled.
    fn save(&self, payload: Payload<'_>, base: &str, band: &str) -> Result<Option<PathBuf>>;
}

/// Writes safetensors files into the fixed folder layout.
#[derive(Debug, Clone)]
pub struct FsOutputSink {
    pub dir: PathBuf,
    pub flags: OutputFlags,
}

impl FsOutputSink {
    pub fn new(dir: impl Into<PathBuf>, flags: OutputFlags) -> Self {
        Self { dir: dir.into(), flags }
    }

    pub fn from_config(cfg: &OutputConfig) -> Self {
        Self::new(cfg.dir.clone(), OutputFlags::from(cfg))
    }

    pub fn path_for(&self, kind: OutputKind, base: &str, band: &str) -> PathBuf {
        self.dir
            .join(kind.folder())
            .join(format!("{}.{EXTENSION}", kind.file_stem(base, band)))
    }
}

fn encode(payload: Payload<'_>) -> Result<StWriter> {
    match payload {
        Payload::Preprocessed(rec) => rec.to_writer(),
        Payload::Epochs(stack) => {
            let mut w = StWriter::new();
            w.add_array("epochs", &stack.data);
            w.add_metadata("labels", serde_json::to_string(&stack.labels)?);
            Ok(w)
        }
        Payload::Parameters(params) => {
            let mut w = StWriter::new();
            for (name, value) in params {
                w.add_array(name, value);
            }
            Ok(w)
        }
    }
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}

impl OutputSink for FsOutputSink {
    fn save(&self, payload: Payload<'_>, base: &str, band: &str) -> Result<Option<PathBuf>> {
        let kind = payload.kind();
        if !self.flags.enabled(kind) {
            return Ok(None);
        }
        let path = self.path_for(kind, base, band);
        if let Some(parent) = path.parent() {
            ensure_dir(parent)?;
        }
        encode(payload)?
            .write(&path)
            .with_context(|| format!("saving {kind:?} output {}", path.display()))?;
        log::debug!("wrote {}", path.display());
        Ok(Some(path))
    }
}
